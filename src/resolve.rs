//! The resolution pipeline: cache, then coalesced catalog search and race.

use anyhow::Context;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, Instrument};

use crate::cache::ExpiringCache;
use crate::config::Config;
use crate::dedup::DedupGate;
use crate::delivery::{CandidateResolver, DeliveryClient};
use crate::error::ResolveError;
use crate::query::Query;
use crate::race::RaceCoordinator;
use crate::search::CatalogClient;

pub struct Resolver {
    cache: Arc<ExpiringCache<Query, String>>,
    gate: DedupGate<Query, String, ResolveError>,
    catalog: Arc<CatalogClient>,
    race: RaceCoordinator<dyn CandidateResolver>,
    cache_ttl: Duration,
    resolve_timeout: Duration,
    shutdown: CancellationToken,
}

impl Resolver {
    /// Build the pipeline against the configured upstreams.
    ///
    /// Cancelling `shutdown` stops every in-flight resolution.
    pub fn new(config: &Config, shutdown: CancellationToken) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(config.http_timeout())
            .build()
            .context("Failed to build HTTP client")?;

        let catalog = CatalogClient::new(
            http.clone(),
            config.catalog_url.clone(),
            config.default_quality.clone(),
        );
        let delivery: Arc<dyn CandidateResolver> =
            Arc::new(DeliveryClient::new(http, config.delivery_url.clone()));

        Ok(Self::with_parts(
            catalog,
            delivery,
            config.cache_ttl(),
            config.resolve_timeout(),
            shutdown,
        ))
    }

    pub fn with_parts(
        catalog: CatalogClient,
        delivery: Arc<dyn CandidateResolver>,
        cache_ttl: Duration,
        resolve_timeout: Duration,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            cache: Arc::new(ExpiringCache::new()),
            gate: DedupGate::new(),
            catalog: Arc::new(catalog),
            race: RaceCoordinator::new(delivery),
            cache_ttl,
            resolve_timeout,
            shutdown,
        }
    }

    /// Resolve a query to a playable URL.
    ///
    /// Cache hits return without touching the network. On a miss, concurrent
    /// callers for the same query share one catalog search and one race, and
    /// the winner is cached once for the whole group.
    pub async fn resolve(&self, query: &Query) -> Result<String, ResolveError> {
        if let Some(url) = self.cache.get(query) {
            info!("Cache hit");
            return Ok(url);
        }
        info!("Cache miss");

        let cache = self.cache.clone();
        let catalog = self.catalog.clone();
        let race = self.race.clone();
        let ttl = self.cache_ttl;
        let shutdown = self.shutdown.clone();
        let timeout = self.resolve_timeout;
        let key = query.clone();
        let span = info_span!("resolve", query = %key);

        self.gate
            .do_once(query.clone(), move || {
                // Only the leader gets here; joiners share its deadline.
                let ctx = deadline_token(&shutdown, timeout);
                async move {
                    let _cancel_on_exit = ctx.clone().drop_guard();

                    // A group that finished between our cache check and now
                    // may already have filled the entry.
                    if let Some(url) = cache.get(&key) {
                        return Ok(url);
                    }

                    let candidates = catalog.search(&ctx, &key).await?;
                    info!(candidates = candidates.len(), "Catalog returned candidates");

                    let url = race.race_first_success(&ctx, candidates).await?;
                    cache.set(key, url.clone(), ttl);
                    info!(ttl_secs = ttl.as_secs(), "Result cached");
                    Ok::<_, ResolveError>(url)
                }
                .instrument(span)
            })
            .await
    }

    /// Number of queries currently being resolved upstream.
    pub fn in_flight(&self) -> usize {
        self.gate.in_flight()
    }
}

/// A child of `parent` that also cancels itself once `timeout` elapses.
fn deadline_token(parent: &CancellationToken, timeout: Duration) -> CancellationToken {
    let token = parent.child_token();
    let timer = token.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = tokio::time::sleep(timeout) => timer.cancel(),
            _ = timer.cancelled() => {}
        }
    });
    token
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_deadline_token_fires_after_timeout() {
        let parent = CancellationToken::new();
        let token = deadline_token(&parent, Duration::from_secs(30));

        tokio::time::sleep(Duration::from_secs(29)).await;
        assert!(!token.is_cancelled());

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(token.is_cancelled());
        assert!(!parent.is_cancelled());
    }

    #[tokio::test]
    async fn test_deadline_token_follows_parent() {
        let parent = CancellationToken::new();
        let token = deadline_token(&parent, Duration::from_secs(30));

        parent.cancel();
        assert!(token.is_cancelled());
    }
}
