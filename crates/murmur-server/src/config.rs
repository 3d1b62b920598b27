//! Server configuration loaded from environment variables.
//!
//! All settings have sensible defaults so the server can start with zero
//! configuration for local development.

use std::net::SocketAddr;
use std::path::PathBuf;

use chrono::{FixedOffset, Offset, Utc};
use murmur_shared::constants::{APP_NAME, DEFAULT_DISPLAY_UTC_OFFSET_MINUTES};

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Socket address for the HTTP (axum) API server.
    /// Env: `HTTP_ADDR`
    /// Default: `0.0.0.0:8080`
    pub http_addr: SocketAddr,

    /// SQLite database file.
    /// Env: `DATABASE_PATH`
    /// Default: none, i.e. the platform data directory.
    pub database_path: Option<PathBuf>,

    /// Offset used to render inbox timestamps.
    /// Env: `DISPLAY_UTC_OFFSET_MINUTES`
    /// Default: `480` (UTC+08:00)
    pub display_offset: FixedOffset,

    /// Sustained requests per second per caller.
    /// Env: `RATE_LIMIT_RPS`
    /// Default: `10`
    pub rate_limit_rps: f64,

    /// Token bucket capacity per caller.
    /// Env: `RATE_LIMIT_BURST`
    /// Default: `30`
    pub rate_limit_burst: f64,

    /// Human-readable name reported by `/health`.
    /// Env: `INSTANCE_NAME`
    /// Default: `"Murmur"`
    pub instance_name: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: ([0, 0, 0, 0], 8080).into(),
            database_path: None,
            display_offset: default_offset(),
            rate_limit_rps: 10.0,
            rate_limit_burst: 30.0,
            instance_name: APP_NAME.to_string(),
        }
    }
}

impl ServerConfig {
    /// Load configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build a configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(addr) = lookup("HTTP_ADDR") {
            if let Ok(parsed) = addr.parse::<SocketAddr>() {
                config.http_addr = parsed;
            } else {
                tracing::warn!(value = %addr, "Invalid HTTP_ADDR, using default");
            }
        }

        if let Some(path) = lookup("DATABASE_PATH") {
            if !path.is_empty() {
                config.database_path = Some(PathBuf::from(path));
            }
        }

        if let Some(val) = lookup("DISPLAY_UTC_OFFSET_MINUTES") {
            match val
                .trim()
                .parse::<i32>()
                .ok()
                .and_then(|minutes| minutes.checked_mul(60))
                .and_then(FixedOffset::east_opt)
            {
                Some(offset) => config.display_offset = offset,
                None => {
                    tracing::warn!(value = %val, "Invalid DISPLAY_UTC_OFFSET_MINUTES, using default")
                }
            }
        }

        if let Some(val) = lookup("RATE_LIMIT_RPS") {
            match val.parse::<f64>() {
                Ok(n) if n > 0.0 => config.rate_limit_rps = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_RPS, using default"),
            }
        }

        if let Some(val) = lookup("RATE_LIMIT_BURST") {
            match val.parse::<f64>() {
                Ok(n) if n >= 1.0 => config.rate_limit_burst = n,
                _ => tracing::warn!(value = %val, "Invalid RATE_LIMIT_BURST, using default"),
            }
        }

        if let Some(name) = lookup("INSTANCE_NAME") {
            config.instance_name = name;
        }

        // RUST_LOG is handled directly by tracing-subscriber's EnvFilter.

        config
    }
}

fn default_offset() -> FixedOffset {
    FixedOffset::east_opt(DEFAULT_DISPLAY_UTC_OFFSET_MINUTES * 60)
        .unwrap_or_else(|| Utc.fix())
}
