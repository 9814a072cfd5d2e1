use crate::error::{transport_detail, ResolveError, UpstreamLeg};
use crate::query::Query;
use crate::types::*;
use reqwest::header::ACCEPT;
use reqwest::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};
use url::Url;

/// Client for the upstream catalog search.
#[derive(Debug, Clone)]
pub struct CatalogClient {
    http: reqwest::Client,
    endpoint: Url,
    default_quality: String,
}

impl CatalogClient {
    pub fn new(http: reqwest::Client, endpoint: Url, default_quality: String) -> Self {
        Self {
            http,
            endpoint,
            default_quality,
        }
    }

    /// Search the catalog and return candidates in upstream order.
    ///
    /// An empty result is `NotFound`; anything wrong with the call or the
    /// payload is an upstream error on the catalog leg.
    pub async fn search(
        &self,
        ctx: &CancellationToken,
        query: &Query,
    ) -> Result<Vec<Candidate>, ResolveError> {
        info!("Searching catalog for: {}", query);

        let request = self
            .http
            .get(self.endpoint.clone())
            .query(&[("s", query.as_str())])
            .header(ACCEPT, "application/json");

        let body = tokio::select! {
            _ = ctx.cancelled() => return Err(ResolveError::Cancelled),
            body = fetch(request) => body?,
        };

        let candidates = parse_candidates(&body, &self.default_quality)?;
        if candidates.is_empty() {
            return Err(ResolveError::NotFound(
                "catalog returned no items".to_string(),
            ));
        }

        debug!("Catalog returned {} candidates", candidates.len());
        Ok(candidates)
    }
}

async fn fetch(request: reqwest::RequestBuilder) -> Result<Vec<u8>, ResolveError> {
    let resp = request
        .send()
        .await
        .map_err(|e| ResolveError::upstream(UpstreamLeg::Catalog, transport_detail(&e)))?;

    let status = resp.status();
    if status != StatusCode::OK {
        return Err(ResolveError::upstream(
            UpstreamLeg::Catalog,
            format!("search API returned non-200 status: {}", status.as_u16()),
        ));
    }

    let body = resp
        .bytes()
        .await
        .map_err(|e| ResolveError::upstream(UpstreamLeg::Catalog, transport_detail(&e)))?;
    Ok(body.to_vec())
}

/// Decode a catalog payload.
///
/// A top-level `items` array is decoded strictly. Payloads without one are
/// walked depth-first for track-shaped objects instead.
pub(crate) fn parse_candidates(
    body: &[u8],
    default_quality: &str,
) -> Result<Vec<Candidate>, ResolveError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| {
        ResolveError::upstream(
            UpstreamLeg::Catalog,
            format!("failed to decode search response: {e}"),
        )
    })?;

    if value.get("items").is_some() {
        let response = CatalogResponse::deserialize(&value).map_err(|e| {
            ResolveError::upstream(
                UpstreamLeg::Catalog,
                format!("failed to decode search items: {e}"),
            )
        })?;
        let items = response
            .items
            .into_iter()
            .map(|mut item| {
                if item.quality.is_empty() {
                    item.quality = default_quality.to_string();
                }
                item
            })
            .collect();
        return Ok(items);
    }

    let mut found = Vec::new();
    collect_isrc_tracks(&value, default_quality, &mut found);
    Ok(found)
}

/// Collect every object carrying an `id` alongside a non-empty `isrc`, in
/// document order. Matched objects are not descended into.
fn collect_isrc_tracks(value: &Value, default_quality: &str, found: &mut Vec<Candidate>) {
    match value {
        Value::Object(map) => {
            let has_isrc = map
                .get("isrc")
                .and_then(Value::as_str)
                .is_some_and(|isrc| !isrc.trim().is_empty());
            let id = map.get("id").and_then(|id| match id {
                Value::Number(n) => n.as_i64(),
                Value::String(s) => s.trim().parse().ok(),
                _ => None,
            });

            if let (true, Some(id)) = (has_isrc, id) {
                let quality = map
                    .get("audioQuality")
                    .and_then(Value::as_str)
                    .filter(|q| !q.is_empty())
                    .unwrap_or(default_quality)
                    .to_string();
                found.push(Candidate { id, quality });
                return;
            }

            for child in map.values() {
                collect_isrc_tracks(child, default_quality, found);
            }
        }
        Value::Array(items) => {
            for item in items {
                collect_isrc_tracks(item, default_quality, found);
            }
        }
        _ => {}
    }
}
