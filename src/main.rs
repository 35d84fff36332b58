use anyhow::{Context, Result};
use axum::Router;
use bucket_manager::{
    config::{AppConfig, Command},
    models::{identity::StoreIdentity, upload::UploadSource},
    routes::routes::routes,
    services::{
        gateway::ObjectStoreGateway,
        namespace::{NamespaceProjector, filter_entries, format_size},
        orchestrator::{UploadNotice, UploadOrchestrator},
        path::PathNavigator,
        s3::S3Backend,
        session::StoreSession,
        validator::ConnectivityValidator,
    },
};
use std::{io::ErrorKind, path::PathBuf, sync::Arc};
use tokio::{net::TcpListener, sync::broadcast::error::RecvError};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    // --- Logging setup ---
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // --- Parse config + command ---
    let (cfg, command) = AppConfig::from_env_and_args()?;

    tracing::info!("Starting bucket-manager with config: {:?}", cfg);

    // --- Initialize gateway ---
    let backend = S3Backend::connect(&cfg.store).await;
    let gateway = ObjectStoreGateway::new(
        cfg.store.identity.clone(),
        Arc::new(backend),
        cfg.store.request_timeout,
    );

    match command {
        Command::Serve => serve(&cfg, gateway).await,
        Command::Ls { prefix, search } => list(&gateway, &prefix, search.as_deref()).await,
        Command::Upload { files, prefix } => upload(gateway, files, &prefix).await,
        Command::Test { bucket, region } => {
            ConnectivityValidator::new(&gateway)
                .validate(&StoreIdentity::new(bucket, region))
                .await?;
            println!("Connection successful");
            Ok(())
        }
    }
}

async fn serve(cfg: &AppConfig, gateway: ObjectStoreGateway) -> Result<()> {
    // --- Build router ---
    let session = StoreSession::new(gateway);
    let app: Router = routes(cfg.max_upload_bytes).with_state(session);

    // --- Start server ---
    let addr = cfg.addr();
    let listener = match TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(err)
            if err.kind() == ErrorKind::PermissionDenied
                && matches!(cfg.host.as_str(), "0.0.0.0" | "::") =>
        {
            let fallback_addr = format!("127.0.0.1:{}", cfg.port);
            tracing::warn!(
                "Permission denied binding to {} ({}). Falling back to {}",
                addr,
                err,
                fallback_addr
            );
            TcpListener::bind(&fallback_addr).await?
        }
        Err(err) => return Err(err).with_context(|| format!("binding {}", addr)),
    };

    tracing::info!("Bucket manager API listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app).await?;

    Ok(())
}

/// Print the folders and files directly under `prefix`.
async fn list(gateway: &ObjectStoreGateway, prefix: &str, search: Option<&str>) -> Result<()> {
    let navigator = PathNavigator::new(gateway.delimiter());
    let prefix = navigator.to_prefix(&navigator.parse(prefix));

    let listing = gateway.list(&prefix).await?;
    let mut entries = NamespaceProjector::new(gateway.delimiter()).project(&listing);
    if let Some(term) = search {
        entries = filter_entries(entries, term);
    }

    println!("/{}  ({} item(s))", prefix, entries.len());
    for entry in entries {
        let size = entry.size.map(format_size).unwrap_or_default();
        let kind = if entry.is_folder() { "dir" } else { "file" };
        println!(
            "{:<5} {:>12}  {}  {}",
            kind,
            size,
            entry.last_modified.format("%Y-%m-%d %H:%M"),
            entry.name
        );
    }
    Ok(())
}

/// Upload `files` into the folder `prefix`, one at a time.
async fn upload(gateway: ObjectStoreGateway, files: Vec<PathBuf>, prefix: &str) -> Result<()> {
    let navigator = PathNavigator::new(gateway.delimiter());
    let folder = navigator.parse(prefix);
    let orchestrator = UploadOrchestrator::new(gateway);

    for file in files {
        orchestrator.enqueue_into(UploadSource::file(file), &folder)?;
    }
    let total = orchestrator.snapshot().len();

    let mut notices = orchestrator.subscribe();
    let progress_log = tokio::spawn(async move {
        loop {
            match notices.recv().await {
                Ok(UploadNotice::Started { id }) => tracing::info!(%id, "upload started"),
                Ok(UploadNotice::Progress { id, percent }) => {
                    tracing::info!(%id, "{:.1}%", percent)
                }
                Ok(UploadNotice::Failed { id, error }) => tracing::warn!(%id, %error, "failed"),
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::debug!(skipped, "progress log fell behind")
                }
                Err(RecvError::Closed) => break,
            }
        }
    });

    let report = orchestrator.dispatch().await;
    let failed: Vec<_> = orchestrator
        .snapshot()
        .into_iter()
        .filter(|t| t.error.is_some())
        .collect();
    drop(orchestrator);
    progress_log.await?;

    for task in &failed {
        eprintln!(
            "failed: {} -> {}: {}",
            task.file_name,
            task.target_key,
            task.error.as_deref().unwrap_or_default()
        );
    }
    println!(
        "{} of {} file(s) uploaded to /{}",
        report.completed,
        total,
        navigator.to_prefix(&folder)
    );

    if report.failed > 0 {
        anyhow::bail!("{} upload(s) failed", report.failed);
    }
    Ok(())
}
