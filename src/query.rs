//! Normalization of the raw search text taken from the request path.

use regex::Regex;
use std::fmt;
use std::sync::LazyLock;

use crate::error::ResolveError;

/// Everything from a standalone "feat" onward ("feat.", "Feat", ...).
static FEATURING: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\bfeat\b.*$").expect("valid featuring regex"));

/// A validated, normalized query. Also the cache and coalescing key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Query(String);

impl Query {
    pub fn parse(raw: &str) -> Result<Self, ResolveError> {
        let spaced = raw.replace('+', " ");
        let stripped = FEATURING.replace(&spaced, "");
        let normalized = stripped.split_whitespace().collect::<Vec<_>>().join(" ");

        if normalized.is_empty() {
            return Err(ResolveError::InvalidInput(
                "Search query is required".to_string(),
            ));
        }
        Ok(Query(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
