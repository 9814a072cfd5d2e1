pub mod cache;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod delivery;
pub mod error;
pub mod logging;
pub mod query;
pub mod race;
pub mod request_id;
pub mod resolve;
pub mod routes;
pub mod search;
pub mod server;
pub mod types;

use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::resolve::Resolver;

#[derive(Clone)]
pub struct AppState {
    pub resolver: Arc<Resolver>,
}

// Re-export for easy access
pub use error::ResolveError;
pub use types::*;

impl AppState {
    pub fn new(config: &Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        Ok(Self {
            resolver: Arc::new(Resolver::new(config, shutdown)?),
        })
    }
}
