use anyhow::{Context, Result, bail};
use clap::{Parser, ValueEnum};
use std::{env, str::FromStr, time::Duration};

use crate::services::allocator::DEFAULT_MAX_ATTEMPTS;

/// Which object store backs the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum BackendKind {
    /// SQLite rows + payloads on local disk.
    Local,
    /// Process memory; everything is lost on exit.
    Memory,
}

impl FromStr for BackendKind {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "local" => Ok(BackendKind::Local),
            "memory" => Ok(BackendKind::Memory),
            other => bail!("unknown backend `{}` (expected `local` or `memory`)", other),
        }
    }
}

/// Centralized application configuration.
/// Combines environment variables and CLI arguments.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub backend: BackendKind,
    pub storage_dir: String,
    pub database_url: String,
    /// Prefix for the `url` fields written into metadata documents.
    pub public_url: String,
    pub max_file_size: usize,
    pub stale_delay: Duration,
    pub max_id_attempts: u32,
}

/// Command-line + environment configuration.
#[derive(Parser, Debug)]
#[command(author, version, about = "File and image upload gateway")]
pub struct Args {
    /// Host to bind to (overrides UPLOAD_GATEWAY_HOST)
    #[arg(long)]
    pub host: Option<String>,

    /// Port to bind to (overrides UPLOAD_GATEWAY_PORT)
    #[arg(long)]
    pub port: Option<u16>,

    /// Object store backend (overrides UPLOAD_GATEWAY_BACKEND)
    #[arg(long, value_enum)]
    pub backend: Option<BackendKind>,

    /// Directory where payloads are stored (overrides UPLOAD_GATEWAY_STORAGE_DIR)
    #[arg(long)]
    pub storage_dir: Option<String>,

    /// Database URL (overrides UPLOAD_GATEWAY_DATABASE_URL)
    #[arg(long)]
    pub database_url: Option<String>,

    /// Public URL prefix for stored objects (overrides UPLOAD_GATEWAY_PUBLIC_URL)
    #[arg(long)]
    pub public_url: Option<String>,

    /// Largest accepted upload in bytes (overrides UPLOAD_GATEWAY_MAX_FILE_SIZE)
    #[arg(long)]
    pub max_file_size: Option<usize>,

    /// Seconds before a staled upload is deleted (overrides UPLOAD_GATEWAY_STALE_DELAY_SECS)
    #[arg(long)]
    pub stale_delay_secs: Option<u64>,

    /// Identifier allocation retry cap (overrides UPLOAD_GATEWAY_MAX_ID_ATTEMPTS)
    #[arg(long)]
    pub max_id_attempts: Option<u32>,

    /// Run migrations and exit
    #[arg(long)]
    pub migrate: bool,
}

/// Read `name` from the environment and parse it, falling back to `default`.
fn env_parsed<T>(name: &str, default: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    let raw = match env::var(name) {
        Ok(value) => value,
        Err(env::VarError::NotPresent) => default.to_string(),
        Err(err) => return Err(err).with_context(|| format!("reading {}", name)),
    };
    raw.parse::<T>()
        .map_err(|err| anyhow::anyhow!("{}", err))
        .with_context(|| format!("parsing {} value `{}`", name, raw))
}

impl AppConfig {
    /// Parse environment variables + CLI args into AppConfig and migrate flag.
    pub fn from_env_and_args() -> Result<(Self, bool)> {
        let args = Args::parse();
        let migrate = args.migrate;
        Ok((Self::merge(args)?, migrate))
    }

    /// CLI values win over environment values, which win over defaults.
    pub fn merge(args: Args) -> Result<Self> {
        let cfg = Self {
            host: match args.host {
                Some(host) => host,
                None => env_parsed("UPLOAD_GATEWAY_HOST", "0.0.0.0")?,
            },
            port: match args.port {
                Some(port) => port,
                None => env_parsed("UPLOAD_GATEWAY_PORT", "3000")?,
            },
            backend: match args.backend {
                Some(backend) => backend,
                None => env_parsed("UPLOAD_GATEWAY_BACKEND", "local")?,
            },
            storage_dir: match args.storage_dir {
                Some(dir) => dir,
                None => env_parsed("UPLOAD_GATEWAY_STORAGE_DIR", "./data/objects")?,
            },
            database_url: match args.database_url {
                Some(url) => url,
                None => env_parsed(
                    "UPLOAD_GATEWAY_DATABASE_URL",
                    "sqlite://./data/meta/upload_gateway.db",
                )?,
            },
            public_url: match args.public_url {
                Some(url) => url,
                None => env_parsed("UPLOAD_GATEWAY_PUBLIC_URL", "http://localhost:3000/objects")?,
            },
            max_file_size: match args.max_file_size {
                Some(size) => size,
                None => env_parsed("UPLOAD_GATEWAY_MAX_FILE_SIZE", "52428800")?,
            },
            stale_delay: Duration::from_secs(match args.stale_delay_secs {
                Some(secs) => secs,
                None => env_parsed("UPLOAD_GATEWAY_STALE_DELAY_SECS", "1200")?,
            }),
            max_id_attempts: match args.max_id_attempts {
                Some(attempts) => attempts,
                None => env_parsed(
                    "UPLOAD_GATEWAY_MAX_ID_ATTEMPTS",
                    &DEFAULT_MAX_ATTEMPTS.to_string(),
                )?,
            },
        };

        if cfg.max_id_attempts == 0 {
            bail!("max_id_attempts must be at least 1");
        }
        Ok(cfg)
    }

    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}
