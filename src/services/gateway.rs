//! ObjectStoreGateway: the four primitive remote operations (list, put,
//! delete, signed download URL) against one bucket.
//!
//! The gateway never retries: every failure is handed back to the caller.
//! It does bound each remote call with the configured timeout.

use crate::models::{
    entry::{ListedObject, RawListing},
    identity::StoreIdentity,
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::{future::Future, sync::Arc, time::Duration};
use thiserror::Error;
use tracing::{debug, warn};

/// Lifetime of a signed download URL.
pub const DOWNLOAD_URL_TTL: Duration = Duration::from_secs(3600);

/// Upper bound on continuation pages followed by one `list` call.
const MAX_LIST_PAGES: usize = 100;
/// Page size requested per listing round trip.
const LIST_PAGE_SIZE: i32 = 1000;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("object store is not configured; set a bucket and region first")]
    NotConfigured,
    #[error("{field} mismatch. Backend configured for: {expected} (requested: {actual})")]
    Mismatch {
        field: &'static str,
        expected: String,
        actual: String,
    },
    #[error("{operation} failed: {message}")]
    Remote { operation: String, message: String },
    #[error("invalid request: {0}")]
    Validation(String),
}

impl GatewayError {
    pub fn remote(operation: impl Into<String>, message: impl std::fmt::Display) -> Self {
        GatewayError::Remote {
            operation: operation.into(),
            message: message.to_string(),
        }
    }

    pub fn timed_out(operation: impl Into<String>, limit: Duration) -> Self {
        Self::remote(operation, format!("timed out after {}s", limit.as_secs_f32()))
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;

/// One listing round trip.
#[derive(Clone, Debug, Default)]
pub struct ListPageRequest {
    pub prefix: String,
    pub delimiter: Option<char>,
    pub max_keys: Option<i32>,
    pub continuation_token: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct ListPage {
    pub common_prefixes: Vec<String>,
    pub objects: Vec<ListedObject>,
    pub next_continuation_token: Option<String>,
}

/// Metadata returned when probing a single key.
#[derive(Clone, Debug)]
pub struct ObjectHead {
    pub size: u64,
    pub content_type: Option<String>,
    pub last_modified: Option<DateTime<Utc>>,
}

/// Called with the cumulative number of bytes the store has acknowledged.
pub type ByteProgress<'a> = &'a (dyn Fn(u64) + Send + Sync);

/// Raw store primitives. Implementations report failures as
/// [`GatewayError::Remote`] and never retry.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    async fn list_page(&self, request: ListPageRequest) -> GatewayResult<ListPage>;

    /// A put may take several round trips. Each one is bounded by
    /// `call_timeout` on its own; a transfer that keeps making progress is
    /// never cut off, and a timed-out round trip still runs cleanup before
    /// returning.
    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        call_timeout: Duration,
        progress: ByteProgress<'_>,
    ) -> GatewayResult<()>;

    /// Deleting a missing key succeeds.
    async fn delete_object(&self, key: &str) -> GatewayResult<()>;

    /// `Ok(None)` when the key does not exist.
    async fn head_object(&self, key: &str) -> GatewayResult<Option<ObjectHead>>;

    async fn presign_get(&self, key: &str, expires_in: Duration) -> GatewayResult<String>;
}

/// A signed URL plus its lifetime in seconds.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SignedUrl {
    pub url: String,
    pub expires_in_secs: u64,
}

/// Gateway bound to one [`StoreIdentity`] for its whole lifetime.
#[derive(Clone)]
pub struct ObjectStoreGateway {
    identity: StoreIdentity,
    backend: Arc<dyn StoreBackend>,
    timeout: Duration,
    delimiter: char,
}

impl std::fmt::Debug for ObjectStoreGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStoreGateway")
            .field("identity", &self.identity)
            .field("timeout", &self.timeout)
            .field("delimiter", &self.delimiter)
            .finish_non_exhaustive()
    }
}

impl ObjectStoreGateway {
    pub fn new(identity: StoreIdentity, backend: Arc<dyn StoreBackend>, timeout: Duration) -> Self {
        Self {
            identity,
            backend,
            timeout,
            delimiter: crate::DEFAULT_DELIMITER,
        }
    }

    pub fn with_delimiter(mut self, delimiter: char) -> Self {
        self.delimiter = delimiter;
        self
    }

    pub fn identity(&self) -> &StoreIdentity {
        &self.identity
    }

    pub fn delimiter(&self) -> char {
        self.delimiter
    }

    /// Run one remote call under the gateway timeout.
    async fn bounded<T, F>(&self, operation: &str, fut: F) -> GatewayResult<T>
    where
        F: Future<Output = GatewayResult<T>>,
    {
        match tokio::time::timeout(self.timeout, fut).await {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(err)) => {
                warn!(operation, error = %err, "remote call failed");
                Err(err)
            }
            Err(_) => {
                warn!(operation, timeout = ?self.timeout, "remote call timed out");
                Err(GatewayError::timed_out(operation, self.timeout))
            }
        }
    }

    /// Collect common prefixes and keys directly under `prefix`, following
    /// continuation tokens.
    pub async fn list(&self, prefix: &str) -> GatewayResult<RawListing> {
        let mut listing = RawListing {
            prefix: prefix.to_string(),
            listed_at: Utc::now(),
            ..RawListing::default()
        };

        let mut token = None;
        for page_no in 0..MAX_LIST_PAGES {
            let request = ListPageRequest {
                prefix: prefix.to_string(),
                delimiter: Some(self.delimiter),
                max_keys: Some(LIST_PAGE_SIZE),
                continuation_token: token.take(),
            };
            let page = self.bounded("list", self.backend.list_page(request)).await?;
            debug!(
                prefix,
                page = page_no,
                prefixes = page.common_prefixes.len(),
                objects = page.objects.len(),
                "listed page"
            );
            listing.common_prefixes.extend(page.common_prefixes);
            listing.objects.extend(page.objects);

            match page.next_continuation_token {
                Some(next) => token = Some(next),
                None => return Ok(listing),
            }
        }

        warn!(prefix, "listing truncated after {} pages", MAX_LIST_PAGES);
        Ok(listing)
    }

    /// Cheapest possible round trip: one key, no delimiter.
    pub async fn probe(&self) -> GatewayResult<()> {
        let request = ListPageRequest {
            max_keys: Some(1),
            ..ListPageRequest::default()
        };
        self.bounded("probe", self.backend.list_page(request)).await?;
        Ok(())
    }

    /// Store `content` at `key`, reporting percent complete through
    /// `on_progress`. Values never decrease and end at 100 on success.
    ///
    /// After a failure the destination is in an unknown state; re-issuing
    /// the put overwrites it.
    pub async fn put(
        &self,
        key: &str,
        content: Bytes,
        content_type: &str,
        on_progress: &(dyn Fn(f32) + Send + Sync),
    ) -> GatewayResult<()> {
        if key.is_empty() {
            return Err(GatewayError::Validation("object key is required".into()));
        }

        let total = content.len() as u64;
        let reported = parking_lot::Mutex::new(0.0f32);
        let report = |percent: f32| {
            let mut last = reported.lock();
            if percent > *last {
                *last = percent;
                on_progress(percent);
            }
        };
        let byte_progress = |sent: u64| {
            let percent = if total == 0 {
                100.0
            } else {
                (sent.min(total) as f64 / total as f64 * 100.0) as f32
            };
            // 100 is reserved for confirmed completion
            report(percent.min(99.9));
        };

        debug!(key, bytes = total, content_type, "put");
        self.backend
            .put_object(key, content, content_type, self.timeout, &byte_progress)
            .await
            .inspect_err(|err| warn!(operation = "put", error = %err, "remote call failed"))?;
        report(100.0);
        Ok(())
    }

    pub async fn delete(&self, key: &str) -> GatewayResult<()> {
        if key.is_empty() {
            return Err(GatewayError::Validation("object key is required".into()));
        }
        debug!(key, "delete");
        self.bounded("delete", self.backend.delete_object(key)).await
    }

    /// Time-limited GET URL for an existing key.
    pub async fn signed_download_url(&self, key: &str) -> GatewayResult<SignedUrl> {
        if key.is_empty() {
            return Err(GatewayError::Validation("object key is required".into()));
        }
        let head = self.bounded("head", self.backend.head_object(key)).await?;
        if head.is_none() {
            return Err(GatewayError::remote(
                "download",
                format!("object `{}` not found", key),
            ));
        }
        let url = self
            .bounded("presign", self.backend.presign_get(key, DOWNLOAD_URL_TTL))
            .await?;
        Ok(SignedUrl {
            url,
            expires_in_secs: DOWNLOAD_URL_TTL.as_secs(),
        })
    }
}
