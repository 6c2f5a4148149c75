//! Configuration module

use std::env;
use std::path::PathBuf;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Server port
    pub port: u16,

    /// Directory holding transient uploaded artifacts
    pub upload_dir: PathBuf,

    /// Directory holding per-run audit logs
    pub log_dir: PathBuf,

    /// Directory served as static assets (SPA frontend)
    pub static_dir: PathBuf,

    /// Command used to launch the classification engine
    pub engine_command: String,

    /// Arguments passed to the engine before the artifact path
    pub engine_args: Vec<String>,

    /// Maximum accepted upload size in bytes
    pub max_upload_bytes: usize,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            port: env::var("PORT")
                .ok()
                .and_then(|p| p.parse().ok())
                .unwrap_or(3000),

            upload_dir: env::var("UPLOAD_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("uploads")),

            log_dir: env::var("LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("logs")),

            static_dir: env::var("STATIC_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("public")),

            engine_command: env::var("ENGINE_COMMAND")
                .unwrap_or_else(|_| "python".to_string()),

            engine_args: env::var("ENGINE_ARGS")
                .map(|args| args.split_whitespace().map(String::from).collect())
                .unwrap_or_else(|_| vec!["train_and_predict.py".to_string()]),

            max_upload_bytes: env::var("MAX_UPLOAD_BYTES")
                .ok()
                .and_then(|n| n.parse().ok())
                .unwrap_or(100 * 1024 * 1024),
        }
    }

    /// Provision the runtime directories before first use
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.upload_dir)?;
        std::fs::create_dir_all(&self.log_dir)?;
        Ok(())
    }
}
