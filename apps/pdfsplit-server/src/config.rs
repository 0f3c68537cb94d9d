//! Server configuration
//!
//! Flags fall back to environment variables (a `.env` file is loaded first),
//! then to defaults. The result is frozen into a [`ServerConfig`] at startup
//! and shared read-only by every service.

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

/// Command-line arguments for the PDF splitter server
#[derive(Parser, Debug)]
#[command(name = "pdfsplit-server")]
#[command(about = "PDF splitter API: upload, inspect, extract and split PDF pages")]
pub struct Args {
    /// Host address to bind to
    #[arg(long, env = "PDFSPLIT_HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to listen on
    #[arg(short, long, env = "PORT", default_value = "8000")]
    pub port: u16,

    /// Directory holding uploaded and generated files
    #[arg(long, env = "PDFSPLIT_STORAGE_DIR", default_value = "uploads")]
    pub storage_dir: PathBuf,

    /// Seconds a stored file stays downloadable
    #[arg(long, env = "PDFSPLIT_TTL_SECS", default_value = "3600")]
    pub ttl_secs: u64,

    /// Seconds between sweeps for expired files
    #[arg(long, env = "PDFSPLIT_SWEEP_INTERVAL_SECS", default_value = "60")]
    pub sweep_interval_secs: u64,

    /// Largest accepted upload, per file
    #[arg(long, env = "PDFSPLIT_MAX_UPLOAD_BYTES", default_value = "52428800")]
    pub max_upload_bytes: usize,

    /// Most files accepted in one batch request
    #[arg(long, env = "PDFSPLIT_MAX_BATCH_FILES", default_value = "20")]
    pub max_batch_files: usize,

    /// Batch items processed at the same time
    #[arg(long, env = "PDFSPLIT_BATCH_CONCURRENCY", default_value = "4")]
    pub batch_concurrency: usize,

    /// Leave stored files on disk when the server stops
    #[arg(long, env = "PDFSPLIT_KEEP_FILES")]
    pub keep_files_on_shutdown: bool,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} must be greater than zero")]
    Zero(&'static str),
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub storage_dir: PathBuf,
    pub ttl: Duration,
    pub sweep_interval: Duration,
    pub max_upload_bytes: usize,
    pub max_batch_files: usize,
    pub batch_concurrency: usize,
    pub purge_on_shutdown: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "0.0.0.0".to_string(),
            port: 8000,
            storage_dir: PathBuf::from("uploads"),
            ttl: Duration::from_secs(3600),
            sweep_interval: Duration::from_secs(60),
            max_upload_bytes: 50 * 1024 * 1024,
            max_batch_files: 20,
            batch_concurrency: 4,
            purge_on_shutdown: true,
        }
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Zero("max_upload_bytes"));
        }
        if self.max_batch_files == 0 {
            return Err(ConfigError::Zero("max_batch_files"));
        }
        if self.batch_concurrency == 0 {
            return Err(ConfigError::Zero("batch_concurrency"));
        }
        if self.sweep_interval.is_zero() {
            return Err(ConfigError::Zero("sweep_interval"));
        }
        Ok(())
    }

    /// Body limit for a batch request: every file at full size plus form overhead
    pub fn batch_body_limit(&self) -> usize {
        self.max_upload_bytes
            .saturating_mul(self.max_batch_files)
            .saturating_add(MULTIPART_OVERHEAD)
    }

    /// Body limit for single-file requests
    pub fn upload_body_limit(&self) -> usize {
        self.max_upload_bytes.saturating_add(MULTIPART_OVERHEAD)
    }
}

/// Room for multipart boundaries, headers and text fields
const MULTIPART_OVERHEAD: usize = 64 * 1024;

impl From<Args> for ServerConfig {
    fn from(args: Args) -> Self {
        ServerConfig {
            host: args.host,
            port: args.port,
            storage_dir: args.storage_dir,
            ttl: Duration::from_secs(args.ttl_secs),
            sweep_interval: Duration::from_secs(args.sweep_interval_secs),
            max_upload_bytes: args.max_upload_bytes,
            max_batch_files: args.max_batch_files,
            batch_concurrency: args.batch_concurrency,
            purge_on_shutdown: !args.keep_files_on_shutdown,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flags_override_defaults() {
        let args = Args::try_parse_from([
            "pdfsplit-server",
            "--port",
            "9100",
            "--storage-dir",
            "/tmp/pdfsplit",
            "--ttl-secs",
            "30",
            "--batch-concurrency",
            "2",
            "--keep-files-on-shutdown",
        ])
        .unwrap();
        let config = ServerConfig::from(args);

        assert_eq!(config.port, 9100);
        assert_eq!(config.storage_dir, PathBuf::from("/tmp/pdfsplit"));
        assert_eq!(config.ttl, Duration::from_secs(30));
        assert_eq!(config.batch_concurrency, 2);
        assert!(!config.purge_on_shutdown);
    }

    #[test]
    fn test_default_config_is_valid() {
        assert_eq!(ServerConfig::default().validate(), Ok(()));
    }

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = ServerConfig {
            batch_concurrency: 0,
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Zero("batch_concurrency"))
        );
    }

    #[test]
    fn test_batch_limit_scales_with_file_count() {
        let config = ServerConfig {
            max_upload_bytes: 1000,
            max_batch_files: 3,
            ..Default::default()
        };
        assert!(config.batch_body_limit() >= 3000);
        assert!(config.upload_body_limit() >= 1000);
    }
}
