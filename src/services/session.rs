//! Holds the gateway for the current session.
//!
//! Reconfiguring swaps in a new gateway; calls already holding the old one
//! finish against it.

use crate::services::gateway::{GatewayError, GatewayResult, ObjectStoreGateway};
use parking_lot::RwLock;
use std::sync::Arc;
use tracing::info;

#[derive(Clone, Default)]
pub struct StoreSession {
    gateway: Arc<RwLock<Option<ObjectStoreGateway>>>,
}

impl StoreSession {
    pub fn new(gateway: ObjectStoreGateway) -> Self {
        let session = Self::default();
        session.configure(gateway);
        session
    }

    pub fn configure(&self, gateway: ObjectStoreGateway) {
        info!(identity = %gateway.identity(), "store session configured");
        *self.gateway.write() = Some(gateway);
    }

    pub fn clear(&self) {
        *self.gateway.write() = None;
    }

    pub fn is_configured(&self) -> bool {
        self.gateway.read().is_some()
    }

    /// The active gateway, or `NotConfigured`.
    pub fn current(&self) -> GatewayResult<ObjectStoreGateway> {
        self.gateway.read().clone().ok_or(GatewayError::NotConfigured)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{models::identity::StoreIdentity, services::testing::MemoryBackend};
    use std::time::Duration;

    fn gateway(bucket: &str) -> ObjectStoreGateway {
        ObjectStoreGateway::new(
            StoreIdentity::new(bucket, "eu-central-1"),
            Arc::new(MemoryBackend::default()),
            Duration::from_secs(1),
        )
    }

    #[test]
    fn empty_session_is_not_configured() {
        let session = StoreSession::default();
        assert!(!session.is_configured());
        assert_eq!(session.current().unwrap_err(), GatewayError::NotConfigured);
    }

    #[test]
    fn reconfigure_replaces_gateway() {
        let session = StoreSession::new(gateway("first"));
        session.configure(gateway("second"));
        assert_eq!(session.current().unwrap().identity().bucket_name, "second");

        session.clear();
        assert!(session.current().is_err());
    }
}
