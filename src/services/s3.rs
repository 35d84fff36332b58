//! `StoreBackend` over Amazon S3 (or any S3-compatible endpoint) using the
//! AWS SDK.
//!
//! Small bodies go up in a single `PutObject` carrying a `Content-MD5`
//! header; its body counts bytes as the client reads them. Larger bodies use
//! a multipart upload so progress can be reported per acknowledged part.
//!
//! Every SDK round trip is bounded on its own by the caller's timeout.

use crate::{
    config::{AuthMode, StoreConfig},
    models::entry::ListedObject,
    services::gateway::{
        ByteProgress, GatewayError, GatewayResult, ListPage, ListPageRequest, ObjectHead,
        StoreBackend,
    },
};
use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_sdk_s3::{
    Client,
    config::Credentials,
    error::{DisplayErrorContext, ProvideErrorMetadata, SdkError},
    presigning::PresigningConfig,
    primitives::{ByteStream, DateTime as SmithyDateTime},
    types::{CompletedMultipartUpload, CompletedPart},
};
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use aws_smithy_types::body::SdkBody;
use http_body::{Frame, SizeHint};
use std::{
    convert::Infallible,
    future::Future,
    pin::Pin,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    task::{Context as TaskContext, Poll},
    time::Duration,
};
use tracing::{debug, info, warn};

/// Part size for multipart uploads; also the single-put threshold.
/// S3 requires every part but the last to be at least 5 MiB.
pub const PART_SIZE: usize = 8 * 1024 * 1024;

/// Slice size handed to the HTTP client by a single-put body.
const FRAME_SIZE: usize = 64 * 1024;
/// How often a single put samples its body counter.
const PROGRESS_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Clone, Debug)]
pub struct S3Backend {
    client: Client,
    bucket: String,
}

impl S3Backend {
    /// Build an SDK client for the configured bucket, region and credentials.
    ///
    /// With [`AuthMode::Iam`] credentials come from the default provider
    /// chain (environment, profile, instance role).
    pub async fn connect(cfg: &StoreConfig) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(cfg.identity.region.clone()));

        if let AuthMode::Static {
            access_key_id,
            secret_access_key,
        } = &cfg.auth
        {
            loader = loader.credentials_provider(Credentials::new(
                access_key_id.clone(),
                secret_access_key.clone(),
                None,
                None,
                "bucket-manager",
            ));
        }

        let sdk_config = loader.load().await;
        let mut builder = aws_sdk_s3::config::Builder::from(&sdk_config);
        if let Some(endpoint) = &cfg.endpoint {
            builder = builder.endpoint_url(endpoint.clone()).force_path_style(true);
        }

        info!(
            bucket = %cfg.identity.bucket_name,
            region = %cfg.identity.region,
            endpoint = cfg.endpoint.as_deref().unwrap_or("aws"),
            "S3 client ready"
        );

        Self {
            client: Client::from_conf(builder.build()),
            bucket: cfg.identity.bucket_name.clone(),
        }
    }

    async fn put_single(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        limit: Duration,
        progress: ByteProgress<'_>,
    ) -> GatewayResult<()> {
        let len = body.len();
        let sent = Arc::new(AtomicU64::new(0));
        let request = self
            .client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .content_length(len as i64)
            .content_md5(content_md5(&body))
            .body(counting_stream(body, sent.clone()))
            .send();

        // sample the body counter while the request is in flight
        let monitored = async {
            tokio::pin!(request);
            let mut ticker = tokio::time::interval(PROGRESS_INTERVAL);
            loop {
                tokio::select! {
                    result = &mut request => break result,
                    _ = ticker.tick() => progress(sent.load(Ordering::Relaxed)),
                }
            }
        };
        call("put", limit, monitored).await?;
        progress(len as u64);
        Ok(())
    }

    async fn put_multipart(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        limit: Duration,
        progress: ByteProgress<'_>,
    ) -> GatewayResult<()> {
        let created = call(
            "put",
            limit,
            self.client
                .create_multipart_upload()
                .bucket(&self.bucket)
                .key(key)
                .content_type(content_type)
                .send(),
        )
        .await?;
        let upload_id = created
            .upload_id()
            .ok_or_else(|| GatewayError::remote("put", "store returned no multipart upload id"))?
            .to_string();

        let uploaded = async {
            let parts = self
                .upload_parts(key, &upload_id, &body, limit, progress)
                .await?;
            call(
                "put",
                limit,
                self.client
                    .complete_multipart_upload()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(&upload_id)
                    .multipart_upload(
                        CompletedMultipartUpload::builder()
                            .set_parts(Some(parts))
                            .build(),
                    )
                    .send(),
            )
            .await
        }
        .await;

        match uploaded {
            Ok(_) => Ok(()),
            Err(err) => {
                let aborted = call(
                    "abort",
                    limit,
                    self.client
                        .abort_multipart_upload()
                        .bucket(&self.bucket)
                        .key(key)
                        .upload_id(&upload_id)
                        .send(),
                )
                .await;
                if let Err(abort_err) = aborted {
                    warn!(key, upload_id, error = %abort_err, "could not abort multipart upload");
                }
                Err(err)
            }
        }
    }

    async fn upload_parts(
        &self,
        key: &str,
        upload_id: &str,
        body: &Bytes,
        limit: Duration,
        progress: ByteProgress<'_>,
    ) -> GatewayResult<Vec<CompletedPart>> {
        let mut parts = Vec::with_capacity(body.len().div_ceil(PART_SIZE));
        let mut offset = 0;
        let mut part_number = 1;

        while offset < body.len() {
            let end = (offset + PART_SIZE).min(body.len());
            let chunk = body.slice(offset..end);
            let output = call(
                "put",
                limit,
                self.client
                    .upload_part()
                    .bucket(&self.bucket)
                    .key(key)
                    .upload_id(upload_id)
                    .part_number(part_number)
                    .content_md5(content_md5(&chunk))
                    .body(ByteStream::from(chunk))
                    .send(),
            )
            .await?;

            parts.push(
                CompletedPart::builder()
                    .set_e_tag(output.e_tag().map(str::to_string))
                    .part_number(part_number)
                    .build(),
            );
            debug!(key, part_number, bytes = end - offset, "uploaded part");
            progress(end as u64);

            offset = end;
            part_number += 1;
        }

        Ok(parts)
    }
}

#[async_trait]
impl StoreBackend for S3Backend {
    async fn list_page(&self, request: ListPageRequest) -> GatewayResult<ListPage> {
        let mut call = self
            .client
            .list_objects_v2()
            .bucket(&self.bucket)
            .prefix(request.prefix);
        if let Some(delimiter) = request.delimiter {
            call = call.delimiter(delimiter.to_string());
        }
        if let Some(max_keys) = request.max_keys {
            call = call.max_keys(max_keys);
        }
        if let Some(token) = request.continuation_token {
            call = call.continuation_token(token);
        }

        let output = call.send().await.map_err(|err| sdk_failure("list", err))?;

        let common_prefixes = output
            .common_prefixes()
            .iter()
            .filter_map(|p| p.prefix().map(str::to_string))
            .collect();
        let objects = output
            .contents()
            .iter()
            .filter_map(|item| {
                Some(ListedObject {
                    key: item.key()?.to_string(),
                    size: item.size().unwrap_or(0).max(0) as u64,
                    last_modified: item.last_modified().and_then(to_chrono),
                })
            })
            .collect();
        let next_continuation_token = if output.is_truncated().unwrap_or(false) {
            output.next_continuation_token().map(str::to_string)
        } else {
            None
        };

        Ok(ListPage {
            common_prefixes,
            objects,
            next_continuation_token,
        })
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        content_type: &str,
        call_timeout: Duration,
        progress: ByteProgress<'_>,
    ) -> GatewayResult<()> {
        if body.len() <= PART_SIZE {
            self.put_single(key, body, content_type, call_timeout, progress)
                .await
        } else {
            self.put_multipart(key, body, content_type, call_timeout, progress)
                .await
        }
    }

    async fn delete_object(&self, key: &str) -> GatewayResult<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|err| sdk_failure("delete", err))?;
        Ok(())
    }

    async fn head_object(&self, key: &str) -> GatewayResult<Option<ObjectHead>> {
        match self
            .client
            .head_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
        {
            Ok(output) => Ok(Some(ObjectHead {
                size: output.content_length().unwrap_or(0).max(0) as u64,
                content_type: output.content_type().map(str::to_string),
                last_modified: output.last_modified().and_then(to_chrono),
            })),
            Err(err)
                if err
                    .as_service_error()
                    .map(|e| e.is_not_found())
                    .unwrap_or(false) =>
            {
                Ok(None)
            }
            Err(err) => Err(sdk_failure("head", err)),
        }
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> GatewayResult<String> {
        let config = PresigningConfig::expires_in(expires_in)
            .map_err(|err| GatewayError::remote("presign", err))?;
        let presigned = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .presigned(config)
            .await
            .map_err(|err| sdk_failure("presign", err))?;
        Ok(presigned.uri().to_string())
    }
}

/// Await one SDK round trip under `limit`.
async fn call<T, E, R, F>(operation: &str, limit: Duration, request: F) -> GatewayResult<T>
where
    F: Future<Output = Result<T, SdkError<E, R>>>,
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    match tokio::time::timeout(limit, request).await {
        Ok(result) => result.map_err(|err| sdk_failure(operation, err)),
        Err(_) => Err(GatewayError::timed_out(operation, limit)),
    }
}

/// Body that records how far the HTTP client has read it. The counter only
/// moves forward, so a retried request does not rewind reported progress.
struct CountingBody {
    data: Bytes,
    offset: usize,
    sent: Arc<AtomicU64>,
}

impl http_body::Body for CountingBody {
    type Data = Bytes;
    type Error = Infallible;

    fn poll_frame(
        mut self: Pin<&mut Self>,
        _cx: &mut TaskContext<'_>,
    ) -> Poll<Option<Result<Frame<Bytes>, Infallible>>> {
        if self.offset >= self.data.len() {
            return Poll::Ready(None);
        }
        let end = (self.offset + FRAME_SIZE).min(self.data.len());
        let frame = self.data.slice(self.offset..end);
        self.offset = end;
        self.sent.fetch_max(end as u64, Ordering::Relaxed);
        Poll::Ready(Some(Ok(Frame::data(frame))))
    }

    fn is_end_stream(&self) -> bool {
        self.offset >= self.data.len()
    }

    fn size_hint(&self) -> SizeHint {
        SizeHint::with_exact((self.data.len() - self.offset) as u64)
    }
}

fn counting_stream(data: Bytes, sent: Arc<AtomicU64>) -> ByteStream {
    ByteStream::new(SdkBody::retryable(move || {
        SdkBody::from_body_1_x(CountingBody {
            data: data.clone(),
            offset: 0,
            sent: sent.clone(),
        })
    }))
}

/// Flatten an SDK error into a `Remote` error, keeping the store's error
/// code when it sent one.
fn sdk_failure<E, R>(operation: &str, err: SdkError<E, R>) -> GatewayError
where
    E: ProvideErrorMetadata + std::error::Error + 'static,
    R: std::fmt::Debug,
{
    let message = match (err.code(), err.message()) {
        (Some(code), Some(message)) => format!("{}: {}", code, message),
        (Some(code), None) => code.to_string(),
        _ => DisplayErrorContext(&err).to_string(),
    };
    GatewayError::remote(operation, message)
}

fn content_md5(data: &[u8]) -> String {
    general_purpose::STANDARD.encode(md5::compute(data).0)
}

fn to_chrono(dt: &SmithyDateTime) -> Option<DateTime<Utc>> {
    dt.to_millis()
        .ok()
        .and_then(DateTime::<Utc>::from_timestamp_millis)
}
