use std::net::SocketAddr;
use std::path::PathBuf;

use anyhow::{Context, Result, anyhow};
use chrono::FixedOffset;

/// 50 MB upload limit by default
const DEFAULT_MAX_UPLOAD_BYTES: usize = 50 * 1024 * 1024;

/// Server settings, read from the environment (after `.env` is loaded).
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: PathBuf,
    pub public_dir: PathBuf,
    pub upload_dir: PathBuf,
    pub max_upload_bytes: usize,
    /// Offset used when presenting message times as `h:mm AM/PM`.
    pub utc_offset: FixedOffset,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let port_raw = lookup("PARLEY_PORT")
            .or_else(|| lookup("PORT"))
            .unwrap_or_else(|| "3000".into());
        let port: u16 = port_raw
            .parse()
            .with_context(|| format!("invalid PARLEY_PORT '{}'", port_raw))?;

        let max_upload_bytes = match lookup("PARLEY_MAX_UPLOAD_BYTES") {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid PARLEY_MAX_UPLOAD_BYTES '{}'", raw))?,
            None => DEFAULT_MAX_UPLOAD_BYTES,
        };

        let offset_raw = get("PARLEY_UTC_OFFSET_MINUTES", "0");
        let offset_minutes: i32 = offset_raw
            .parse()
            .with_context(|| format!("invalid PARLEY_UTC_OFFSET_MINUTES '{}'", offset_raw))?;
        let utc_offset = FixedOffset::east_opt(offset_minutes * 60)
            .ok_or_else(|| anyhow!("PARLEY_UTC_OFFSET_MINUTES out of range: {}", offset_minutes))?;

        Ok(Self {
            host: get("PARLEY_HOST", "0.0.0.0"),
            port,
            db_path: get("PARLEY_DB_PATH", "parley.db").into(),
            public_dir: get("PARLEY_PUBLIC_DIR", "./public").into(),
            upload_dir: get("PARLEY_UPLOAD_DIR", "./uploads").into(),
            max_upload_bytes,
            utc_offset,
        })
    }

    pub fn bind_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port)
            .parse()
            .with_context(|| format!("invalid bind address {}:{}", self.host, self.port))
    }
}
