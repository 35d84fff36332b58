//! In-memory [`StoreBackend`] for tests, with programmable failures.

use crate::{
    models::entry::ListedObject,
    services::gateway::{
        ByteProgress, GatewayError, GatewayResult, ListPage, ListPageRequest, ObjectHead,
        StoreBackend,
    },
};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use parking_lot::Mutex;
use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

#[derive(Default)]
struct FailurePlan {
    /// key -> (message, remaining failures; `None` = forever)
    puts: HashMap<String, (String, Option<usize>)>,
    /// operation name -> message
    ops: HashMap<&'static str, String>,
}

pub struct MemoryBackend {
    objects: Mutex<BTreeMap<String, Bytes>>,
    failures: Mutex<FailurePlan>,
    calls: Mutex<HashMap<&'static str, usize>>,
    delay: Mutex<Option<Duration>>,
    part_delay: Mutex<Option<Duration>>,
    page_size: usize,
    chunk_size: usize,
    in_flight_puts: AtomicUsize,
    max_in_flight_puts: AtomicUsize,
    put_order: Mutex<Vec<String>>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::with_page_size(1000)
    }
}

impl MemoryBackend {
    pub fn with_page_size(page_size: usize) -> Self {
        Self {
            objects: Mutex::new(BTreeMap::new()),
            failures: Mutex::new(FailurePlan::default()),
            calls: Mutex::new(HashMap::new()),
            delay: Mutex::new(None),
            part_delay: Mutex::new(None),
            page_size,
            chunk_size: usize::MAX,
            in_flight_puts: AtomicUsize::new(0),
            max_in_flight_puts: AtomicUsize::new(0),
            put_order: Mutex::new(Vec::new()),
        }
    }

    /// Puts acknowledge `chunk_size` bytes at a time, like multipart parts.
    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            ..Self::default()
        }
    }

    pub fn insert(&self, key: &str, data: impl Into<Bytes>) {
        self.objects.lock().insert(key.to_string(), data.into());
    }

    pub fn contains(&self, key: &str) -> bool {
        self.objects.lock().contains_key(key)
    }

    pub fn get(&self, key: &str) -> Option<Bytes> {
        self.objects.lock().get(key).cloned()
    }

    pub fn calls(&self, op: &str) -> usize {
        self.calls.lock().get(op).copied().unwrap_or(0)
    }

    pub fn fail_put(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .puts
            .insert(key.to_string(), (message.to_string(), None));
    }

    pub fn fail_put_once(&self, key: &str, message: &str) {
        self.failures
            .lock()
            .puts
            .insert(key.to_string(), (message.to_string(), Some(1)));
    }

    pub fn fail_op(&self, op: &'static str, message: &str) {
        self.failures.lock().ops.insert(op, message.to_string());
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    /// Time each acknowledged chunk of a put takes, like one `UploadPart`.
    pub fn set_part_delay(&self, delay: Duration) {
        *self.part_delay.lock() = Some(delay);
    }

    pub fn max_concurrent_puts(&self) -> usize {
        self.max_in_flight_puts.load(Ordering::SeqCst)
    }

    pub fn put_order(&self) -> Vec<String> {
        self.put_order.lock().clone()
    }

    async fn enter(&self, op: &'static str) -> GatewayResult<()> {
        self.record(op);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        let failure = self.failures.lock().ops.get(op).cloned();
        match failure {
            Some(message) => Err(GatewayError::remote(op, message)),
            None => Ok(()),
        }
    }

    fn record(&self, op: &'static str) {
        *self.calls.lock().entry(op).or_insert(0) += 1;
    }

    fn take_put_failure(&self, key: &str) -> Option<String> {
        let mut failures = self.failures.lock();
        let (message, remaining) = failures.puts.get_mut(key)?;
        let message = message.clone();
        if let Some(left) = remaining {
            *left -= 1;
            if *left == 0 {
                failures.puts.remove(key);
            }
        }
        Some(message)
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn list_page(&self, request: ListPageRequest) -> GatewayResult<ListPage> {
        self.enter("list").await?;
        let objects = self.objects.lock();
        let limit = request
            .max_keys
            .map(|m| m.max(1) as usize)
            .unwrap_or(self.page_size)
            .min(self.page_size);
        let prefix = request.prefix.as_str();
        let group = |key: &str| -> Option<String> {
            let rest = key.strip_prefix(prefix)?;
            let d = request.delimiter?;
            rest.find(d).map(|pos| format!("{}{}{}", prefix, &rest[..pos], d))
        };
        // a token inside a folder means that folder was already reported
        let resumed_group = request.continuation_token.as_deref().and_then(|t| group(t));

        let mut page = ListPage::default();
        let mut seen = BTreeSet::new();
        let mut last_key: Option<String> = None;

        for (key, data) in objects.iter() {
            if let Some(token) = &request.continuation_token {
                if key <= token {
                    continue;
                }
            }
            if !key.starts_with(prefix) {
                continue;
            }
            match group(key) {
                Some(common) => {
                    if resumed_group.as_ref() == Some(&common) || seen.contains(&common) {
                        last_key = Some(key.clone());
                        continue;
                    }
                    if seen.len() + page.objects.len() == limit {
                        page.next_continuation_token = last_key;
                        return Ok(page);
                    }
                    seen.insert(common.clone());
                    page.common_prefixes.push(common);
                }
                None => {
                    if seen.len() + page.objects.len() == limit {
                        page.next_continuation_token = last_key;
                        return Ok(page);
                    }
                    page.objects.push(ListedObject {
                        key: key.clone(),
                        size: data.len() as u64,
                        last_modified: Some(Utc::now()),
                    });
                }
            }
            last_key = Some(key.clone());
        }
        Ok(page)
    }

    async fn put_object(
        &self,
        key: &str,
        body: Bytes,
        _content_type: &str,
        call_timeout: Duration,
        progress: ByteProgress<'_>,
    ) -> GatewayResult<()> {
        let now = self.in_flight_puts.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight_puts.fetch_max(now, Ordering::SeqCst);
        self.put_order.lock().push(key.to_string());

        let result = async {
            tokio::time::timeout(call_timeout, self.enter("put"))
                .await
                .map_err(|_| GatewayError::timed_out("put", call_timeout))??;
            let total = body.len();
            let failure = self.take_put_failure(key);
            let part_delay = *self.part_delay.lock();
            let mut sent = 0;
            while sent < total {
                sent = sent.saturating_add(self.chunk_size).min(total);
                if failure.is_some() && sent * 2 >= total {
                    break;
                }
                match part_delay {
                    Some(delay) => {
                        let part = tokio::time::sleep(delay);
                        if tokio::time::timeout(call_timeout, part).await.is_err() {
                            self.record("abort");
                            return Err(GatewayError::timed_out("put", call_timeout));
                        }
                    }
                    None => tokio::task::yield_now().await,
                }
                progress(sent as u64);
            }
            if let Some(message) = failure {
                return Err(GatewayError::remote("put", message));
            }
            self.objects.lock().insert(key.to_string(), body);
            Ok(())
        }
        .await;

        self.in_flight_puts.fetch_sub(1, Ordering::SeqCst);
        result
    }

    async fn delete_object(&self, key: &str) -> GatewayResult<()> {
        self.enter("delete").await?;
        self.objects.lock().remove(key);
        Ok(())
    }

    async fn head_object(&self, key: &str) -> GatewayResult<Option<ObjectHead>> {
        self.enter("head").await?;
        Ok(self.objects.lock().get(key).map(|data| ObjectHead {
            size: data.len() as u64,
            content_type: None,
            last_modified: Some(Utc::now()),
        }))
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> GatewayResult<String> {
        self.enter("presign").await?;
        Ok(format!(
            "https://memory.invalid/{}?X-Amz-Expires={}",
            key,
            expires_in.as_secs()
        ))
    }
}
