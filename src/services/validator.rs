//! ConnectivityValidator checks a candidate identity against the
//! configured one, then proves the store is reachable.

use crate::{
    models::identity::StoreIdentity,
    services::gateway::{GatewayError, GatewayResult, ObjectStoreGateway},
};
use tracing::{info, warn};

pub struct ConnectivityValidator<'a> {
    gateway: &'a ObjectStoreGateway,
}

impl<'a> ConnectivityValidator<'a> {
    pub fn new(gateway: &'a ObjectStoreGateway) -> Self {
        Self { gateway }
    }

    /// Identity comparison happens locally; a mismatch never reaches the
    /// store. A matching identity is followed by a one-key listing whose
    /// failure is returned as-is.
    pub async fn validate(&self, candidate: &StoreIdentity) -> GatewayResult<()> {
        let configured = self.gateway.identity();

        if candidate.bucket_name != configured.bucket_name {
            warn!(
                expected = %configured.bucket_name,
                actual = %candidate.bucket_name,
                "bucket mismatch"
            );
            return Err(GatewayError::Mismatch {
                field: "Bucket",
                expected: configured.bucket_name.clone(),
                actual: candidate.bucket_name.clone(),
            });
        }
        if candidate.region != configured.region {
            warn!(
                expected = %configured.region,
                actual = %candidate.region,
                "region mismatch"
            );
            return Err(GatewayError::Mismatch {
                field: "Region",
                expected: configured.region.clone(),
                actual: candidate.region.clone(),
            });
        }

        self.gateway.probe().await?;
        info!(identity = %configured, "connection test passed");
        Ok(())
    }
}
