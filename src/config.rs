use crate::{models::identity::StoreIdentity, services::gateway::GatewayError};
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::{env, path::PathBuf, time::Duration};

const DEFAULT_REGION: &str = "eu-central-1";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_MAX_UPLOAD_BYTES: usize = 100 * 1024 * 1024;

/// How the gateway authenticates against the store.
#[derive(Clone, PartialEq, Eq)]
pub enum AuthMode {
    /// Default AWS provider chain (instance role, env, profile).
    Iam,
    /// Explicit key pair.
    Static {
        access_key_id: String,
        secret_access_key: String,
    },
}

impl std::fmt::Debug for AuthMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuthMode::Iam => write!(f, "Iam"),
            AuthMode::Static { access_key_id, .. } => f
                .debug_struct("Static")
                .field("access_key_id", access_key_id)
                .field("secret_access_key", &"<redacted>")
                .finish(),
        }
    }
}

/// Everything needed to build a gateway. Validated once, then immutable.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub identity: StoreIdentity,
    pub auth: AuthMode,
    /// Custom S3-compatible endpoint (MinIO, R2, ...).
    pub endpoint: Option<String>,
    pub request_timeout: Duration,
}

impl StoreConfig {
    /// Reject blank identity fields and half-specified credentials.
    pub fn validate(self) -> Result<Self, GatewayError> {
        if self.identity.bucket_name.trim().is_empty() {
            return Err(GatewayError::Validation("bucket name is required".into()));
        }
        if self.identity.region.trim().is_empty() {
            return Err(GatewayError::Validation("region is required".into()));
        }
        if let AuthMode::Static {
            access_key_id,
            secret_access_key,
        } = &self.auth
        {
            if access_key_id.trim().is_empty() || secret_access_key.trim().is_empty() {
                return Err(GatewayError::Validation(
                    "static credentials need both an access key id and a secret access key"
                        .into(),
                ));
            }
        }
        if self.request_timeout.is_zero() {
            return Err(GatewayError::Validation(
                "request timeout must be greater than zero".into(),
            ));
        }
        Ok(self)
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub store: StoreConfig,
    pub max_upload_bytes: usize,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "Browse, upload and manage objects in an S3 bucket")]
pub struct Args {
    /// Host to bind to (overrides BUCKET_MANAGER_HOST)
    #[arg(long, global = true)]
    pub host: Option<String>,

    /// Port to bind to (overrides PORT)
    #[arg(long, global = true)]
    pub port: Option<u16>,

    /// Bucket to manage (overrides S3_BUCKET_NAME)
    #[arg(long, global = true)]
    pub bucket: Option<String>,

    /// Bucket region (overrides AWS_DEFAULT_REGION)
    #[arg(long, global = true)]
    pub region: Option<String>,

    /// S3-compatible endpoint URL (overrides S3_ENDPOINT_URL)
    #[arg(long, global = true)]
    pub endpoint: Option<String>,

    /// Per-request timeout in seconds (overrides S3_REQUEST_TIMEOUT_SECS)
    #[arg(long, global = true)]
    pub timeout_secs: Option<u64>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Run the HTTP API (default)
    Serve,
    /// List the folders and files under a prefix
    Ls {
        #[arg(long, default_value = "")]
        prefix: String,
        /// Only show entries whose name contains this text
        #[arg(long)]
        search: Option<String>,
    },
    /// Upload local files into a folder, one at a time
    Upload {
        #[arg(required = true)]
        files: Vec<PathBuf>,
        #[arg(long, default_value = "")]
        prefix: String,
    },
    /// Check that the given bucket/region match the configuration and that
    /// the store answers
    Test {
        #[arg(long)]
        bucket: String,
        #[arg(long)]
        region: String,
    },
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and the command.
    pub fn from_env_and_args() -> Result<(Self, Command)> {
        // Parse CLI once
        let args = Args::parse();
        let command = args.command.clone().unwrap_or(Command::Serve);
        Ok((Self::from_sources(args, |name| env::var(name))?, command))
    }

    /// Merge CLI values over environment values read through `lookup`.
    pub fn from_sources<F>(args: Args, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Result<String, env::VarError>,
    {
        let var = |name: &str| -> Result<Option<String>> {
            match lookup(name) {
                Ok(value) if value.trim().is_empty() => Ok(None),
                Ok(value) => Ok(Some(value)),
                Err(env::VarError::NotPresent) => Ok(None),
                Err(err) => Err(err).with_context(|| format!("reading {}", name)),
            }
        };

        // --- Environment fallback ---
        let env_host = var("BUCKET_MANAGER_HOST")?.unwrap_or_else(|| "0.0.0.0".into());
        let env_port = match var("PORT")? {
            Some(value) => value
                .parse::<u16>()
                .with_context(|| format!("parsing PORT value `{}`", value))?,
            None => DEFAULT_PORT,
        };
        let env_timeout = match var("S3_REQUEST_TIMEOUT_SECS")? {
            Some(value) => value
                .parse::<u64>()
                .with_context(|| format!("parsing S3_REQUEST_TIMEOUT_SECS value `{}`", value))?,
            None => DEFAULT_TIMEOUT_SECS,
        };
        let max_upload_bytes = match var("MAX_UPLOAD_BYTES")? {
            Some(value) => value
                .parse::<usize>()
                .with_context(|| format!("parsing MAX_UPLOAD_BYTES value `{}`", value))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let auth = match var("S3_AUTH_MODE")?.as_deref().unwrap_or("iam") {
            "iam" => AuthMode::Iam,
            "static" => AuthMode::Static {
                access_key_id: var("AWS_ACCESS_KEY_ID")?.unwrap_or_default(),
                secret_access_key: var("AWS_SECRET_ACCESS_KEY")?.unwrap_or_default(),
            },
            other => anyhow::bail!("S3_AUTH_MODE must be `iam` or `static`, got `{}`", other),
        };

        // --- Merge ---
        let store = StoreConfig {
            identity: StoreIdentity::new(
                args.bucket
                    .or(var("S3_BUCKET_NAME")?)
                    .unwrap_or_default(),
                args.region
                    .or(var("AWS_DEFAULT_REGION")?)
                    .unwrap_or_else(|| DEFAULT_REGION.into()),
            ),
            auth,
            endpoint: args.endpoint.or(var("S3_ENDPOINT_URL")?),
            request_timeout: Duration::from_secs(args.timeout_secs.unwrap_or(env_timeout)),
        }
        .validate()
        .context("invalid store configuration (is S3_BUCKET_NAME set?)")?;

        Ok(Self {
            host: args.host.unwrap_or(env_host),
            port: args.port.unwrap_or(env_port),
            store,
            max_upload_bytes,
        })
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
