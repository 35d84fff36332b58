//! HTTP handlers for browsing, uploading, deleting and downloading objects,
//! plus the connection test. Each handler resolves the session gateway and
//! delegates to it; projection happens here so the JSON matches the UI.

use crate::{
    errors::AppError,
    models::{entry::Entry, identity::StoreIdentity},
    services::{
        namespace::{NamespaceProjector, filter_entries},
        session::StoreSession,
        validator::ConnectivityValidator,
    },
};
use axum::{
    Json,
    extract::{Multipart, Path, Query, State},
};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Query params accepted by `GET /api/objects`.
#[derive(Debug, Default, Deserialize)]
pub struct ListObjectsQuery {
    #[serde(default)]
    pub prefix: String,
    pub search: Option<String>,
}

/// Body of `POST /api/test`. Missing fields count as a mismatch.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestConnectionReq {
    pub bucket_name: Option<String>,
    pub region: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct UploadResponse {
    pub message: String,
    pub key: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResponse {
    pub url: String,
    pub expires_in: u64,
}

/// GET `/api/objects?prefix=&search=` — immediate children of `prefix`.
pub async fn list_objects(
    State(session): State<StoreSession>,
    Query(q): Query<ListObjectsQuery>,
) -> Result<Json<Vec<Entry>>, AppError> {
    let gateway = session.current()?;
    let listing = gateway.list(&q.prefix).await?;
    let entries = NamespaceProjector::new(gateway.delimiter()).project(&listing);
    let entries = match q.search.as_deref() {
        Some(term) => filter_entries(entries, term),
        None => entries,
    };
    debug!(prefix = %q.prefix, count = entries.len(), "listed entries");
    Ok(Json(entries))
}

/// POST `/api/upload` — multipart form with a `file` part and a `key` part.
pub async fn upload_object(
    State(session): State<StoreSession>,
    mut multipart: Multipart,
) -> Result<Json<UploadResponse>, AppError> {
    let mut file: Option<(Bytes, String)> = None;
    let mut key: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| AppError::new(err.status(), err.body_text()))?
    {
        match field.name() {
            Some("file") => {
                let content_type = field
                    .content_type()
                    .map(str::to_string)
                    .or_else(|| {
                        field
                            .file_name()
                            .and_then(|n| mime_guess::from_path(n).first())
                            .map(|m| m.essence_str().to_string())
                    })
                    .unwrap_or_else(|| "application/octet-stream".into());
                let data = field
                    .bytes()
                    .await
                    .map_err(|err| AppError::new(err.status(), err.body_text()))?;
                file = Some((data, content_type));
            }
            Some("key") => {
                let text = field
                    .text()
                    .await
                    .map_err(|err| AppError::new(err.status(), err.body_text()))?;
                key = Some(text);
            }
            _ => {}
        }
    }

    let (data, content_type) = file.ok_or_else(|| AppError::bad_request("No file provided"))?;
    let key = key
        .filter(|k| !k.is_empty())
        .ok_or_else(|| AppError::bad_request("File key is required"))?;

    let gateway = session.current()?;
    let size = data.len();
    gateway
        .put(&key, data, &content_type, &|percent: f32| {
            debug!(percent, "upload progress")
        })
        .await?;

    info!(key = %key, bytes = size, "object uploaded");
    Ok(Json(UploadResponse {
        message: "File uploaded successfully".into(),
        key,
    }))
}

/// DELETE `/api/objects/{*key}` — succeeds whether or not the key exists.
pub async fn delete_object(
    State(session): State<StoreSession>,
    Path(key): Path<String>,
) -> Result<Json<MessageResponse>, AppError> {
    session.current()?.delete(&key).await?;
    info!(key = %key, "object deleted");
    Ok(Json(MessageResponse {
        message: "Object deleted successfully".into(),
    }))
}

/// GET `/api/download/{*key}` — signed URL valid for one hour.
pub async fn download_url(
    State(session): State<StoreSession>,
    Path(key): Path<String>,
) -> Result<Json<DownloadResponse>, AppError> {
    let signed = session.current()?.signed_download_url(&key).await?;
    Ok(Json(DownloadResponse {
        url: signed.url,
        expires_in: signed.expires_in_secs,
    }))
}

/// POST `/api/test` — compare the caller's bucket/region with ours, then
/// make one cheap call to the store.
pub async fn test_connection(
    State(session): State<StoreSession>,
    Json(req): Json<TestConnectionReq>,
) -> Result<Json<MessageResponse>, AppError> {
    let gateway = session.current()?;
    let candidate = StoreIdentity::new(
        req.bucket_name.unwrap_or_default(),
        req.region.unwrap_or_default(),
    );
    ConnectivityValidator::new(&gateway).validate(&candidate).await?;
    Ok(Json(MessageResponse {
        message: "Connection successful".into(),
    }))
}
