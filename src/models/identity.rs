//! Identifies which bucket a gateway talks to.

use serde::{Deserialize, Serialize};

/// A bucket plus the region hosting it.
///
/// Fixed for the lifetime of a gateway; a reconfiguration builds a new
/// gateway instead of mutating this value.
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StoreIdentity {
    /// Bucket name (e.g. "team-assets").
    pub bucket_name: String,

    /// Region where the bucket is hosted (e.g. "eu-central-1").
    pub region: String,
}

impl StoreIdentity {
    pub fn new(bucket_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            bucket_name: bucket_name.into(),
            region: region.into(),
        }
    }
}

impl std::fmt::Display for StoreIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.bucket_name, self.region)
    }
}
