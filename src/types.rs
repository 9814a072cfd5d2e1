use serde::{Deserialize, Deserializer, Serialize};

/// One catalog entry that might resolve to a playable URL.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: i64,
    #[serde(rename = "audioQuality", default, deserialize_with = "null_as_default")]
    pub quality: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ResolveResponse {
    pub url: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: u16,
    pub name: String,
    pub description: String,
}

// Catalog API types
#[derive(Debug, Deserialize)]
pub struct CatalogResponse {
    #[serde(default, deserialize_with = "null_as_default")]
    pub items: Vec<Candidate>,
}

// Delivery API types
#[derive(Debug, Deserialize)]
pub struct DeliveryItem {
    #[serde(rename = "OriginalTrackUrl", default)]
    pub original_track_url: Option<String>,
}

/// Upstream sends `null` where it means "nothing".
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
