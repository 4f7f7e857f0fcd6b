use anyhow::{Context, Result};

const DEFAULT_BIND: &str = "127.0.0.1:8080";
const DEFAULT_MAX_UPLOAD_BYTES: usize = 25 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct Config {
    /// Postgres URL; files are kept in memory when unset.
    pub db_url: Option<String>,
    pub bind: String,
    pub max_upload_bytes: usize,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let max_upload_bytes = match std::env::var("MAX_UPLOAD_BYTES") {
            Ok(raw) => raw
                .parse()
                .with_context(|| format!("MAX_UPLOAD_BYTES is not a byte count: {raw}"))?,
            Err(_) => DEFAULT_MAX_UPLOAD_BYTES,
        };

        Ok(Self {
            db_url: std::env::var("DB_URL").ok().filter(|url| !url.trim().is_empty()),
            bind: std::env::var("API_BIND").unwrap_or_else(|_| DEFAULT_BIND.to_string()),
            max_upload_bytes,
        })
    }
}
