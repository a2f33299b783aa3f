//! Configuration module for the portal backend.
//!
//! All configuration is loaded from environment variables with sensible defaults.

use std::env;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::AppError;

/// What to do when a new tag's slug matches an existing tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TagConflictPolicy {
    /// Fail the creation with a conflict error.
    #[default]
    Reject,
    /// Hand back the existing tag untouched.
    Reuse,
}

impl FromStr for TagConflictPolicy {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "reject" => Ok(TagConflictPolicy::Reject),
            "reuse" => Ok(TagConflictPolicy::Reuse),
            other => Err(AppError::Internal(format!(
                "Invalid PORTAL_TAG_ON_CONFLICT value: {} (expected reject or reuse)",
                other
            ))),
        }
    }
}

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Ok(LogFormat::Pretty),
            "json" => Ok(LogFormat::Json),
            other => Err(AppError::Internal(format!(
                "Invalid PORTAL_LOG_FORMAT value: {}",
                other
            ))),
        }
    }
}

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Pre-shared key for API authentication (required in production)
    pub api_psk: Option<String>,
    /// Path to SQLite database file
    pub db_path: PathBuf,
    /// Directory uploaded files are written to
    pub upload_dir: PathBuf,
    /// Largest accepted upload in bytes
    pub max_upload_bytes: usize,
    /// Address to bind the server to
    pub bind_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    pub log_format: LogFormat,
    pub tag_conflict: TagConflictPolicy,
}

impl Config {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();

        let api_psk = env::var("PORTAL_API_PSK").ok().filter(|k| !k.is_empty());

        let db_path = env::var("PORTAL_DB_PATH")
            .unwrap_or_else(|_| "./data/portal.sqlite".to_string())
            .into();

        let upload_dir = env::var("PORTAL_UPLOAD_DIR")
            .unwrap_or_else(|_| "./data/uploads".to_string())
            .into();

        let max_upload_bytes = env::var("PORTAL_MAX_UPLOAD_BYTES")
            .unwrap_or_else(|_| "10485760".to_string())
            .parse()
            .map_err(|_| AppError::Internal("Invalid PORTAL_MAX_UPLOAD_BYTES format".to_string()))?;

        let bind_addr = env::var("PORTAL_BIND_ADDR")
            .unwrap_or_else(|_| "127.0.0.1:8080".to_string())
            .parse()
            .map_err(|_| AppError::Internal("Invalid PORTAL_BIND_ADDR format".to_string()))?;

        let log_level = env::var("PORTAL_LOG_LEVEL").unwrap_or_else(|_| "info".to_string());

        let log_format = match env::var("PORTAL_LOG_FORMAT") {
            Ok(value) => value.parse()?,
            Err(_) => LogFormat::default(),
        };

        let tag_conflict = match env::var("PORTAL_TAG_ON_CONFLICT") {
            Ok(value) => value.parse()?,
            Err(_) => TagConflictPolicy::default(),
        };

        Ok(Self {
            api_psk,
            db_path,
            upload_dir,
            max_upload_bytes,
            bind_addr,
            log_level,
            log_format,
            tag_conflict,
        })
    }
}
