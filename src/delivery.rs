use crate::error::{transport_detail, ResolveError, UpstreamLeg};
use crate::types::*;
use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use url::Url;

/// Turns one catalog candidate into a playable URL.
///
/// Implementations must return `ResolveError::Cancelled` when `ctx` fires
/// before or during the lookup, `NotFound` when the candidate is simply
/// unavailable, and `Upstream` for everything else.
#[async_trait]
pub trait CandidateResolver: Send + Sync {
    async fn resolve(
        &self,
        ctx: &CancellationToken,
        candidate: &Candidate,
    ) -> Result<String, ResolveError>;
}

/// Client for the upstream delivery API.
#[derive(Debug, Clone)]
pub struct DeliveryClient {
    http: reqwest::Client,
    endpoint: Url,
}

impl DeliveryClient {
    pub fn new(http: reqwest::Client, endpoint: Url) -> Self {
        Self { http, endpoint }
    }

    async fn fetch(&self, candidate: &Candidate) -> Result<String, ResolveError> {
        let resp = self
            .http
            .get(self.endpoint.clone())
            .query(&[
                ("id", candidate.id.to_string().as_str()),
                ("quality", candidate.quality.as_str()),
            ])
            .header(ACCEPT, "application/json")
            .send()
            .await
            .map_err(|e| ResolveError::upstream(UpstreamLeg::Delivery, transport_detail(&e)))?;

        match resp.status() {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => {
                return Err(ResolveError::NotFound(format!(
                    "upstream API returned 404 for track ID {}",
                    candidate.id
                )));
            }
            status => {
                return Err(ResolveError::upstream(
                    UpstreamLeg::Delivery,
                    format!("track URL API returned non-200 status: {}", status.as_u16()),
                ));
            }
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| ResolveError::upstream(UpstreamLeg::Delivery, transport_detail(&e)))?;
        first_usable_url(&body)
    }
}

#[async_trait]
impl CandidateResolver for DeliveryClient {
    async fn resolve(
        &self,
        ctx: &CancellationToken,
        candidate: &Candidate,
    ) -> Result<String, ResolveError> {
        if ctx.is_cancelled() {
            return Err(ResolveError::Cancelled);
        }
        debug!(track_id = candidate.id, quality = %candidate.quality, "Requesting track URL");

        tokio::select! {
            _ = ctx.cancelled() => Err(ResolveError::Cancelled),
            url = self.fetch(candidate) => url,
        }
    }
}

/// First non-empty `OriginalTrackUrl` in a delivery payload.
pub(crate) fn first_usable_url(body: &[u8]) -> Result<String, ResolveError> {
    let items: Vec<DeliveryItem> = serde_json::from_slice(body).map_err(|e| {
        ResolveError::upstream(
            UpstreamLeg::Delivery,
            format!("failed to decode track URL response: {e}"),
        )
    })?;

    items
        .into_iter()
        .filter_map(|item| item.original_track_url)
        .find(|url| !url.is_empty())
        .ok_or_else(|| {
            ResolveError::upstream(
                UpstreamLeg::Delivery,
                "no usable URL in upstream API response",
            )
        })
}
