//! Configuration parsing and validation.
//!
//! libdocs is configured entirely from environment variables (no config
//! file) so that deployment is a matter of setting a handful of `KEY=value`
//! pairs. Defaults are applied where sensible, then every value is
//! validated; a malformed or out-of-range variable fails fast at startup
//! with a message naming the offending variable.

use anyhow::{bail, Context, Result};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct Config {
    pub store_path: PathBuf,
    pub embedder_model: String,
    pub embedding_dim: usize,
    pub upstream_context7_url: Option<String>,
    pub http_port: u16,
    pub fetch_timeout: Duration,
    pub max_content_bytes: u64,
    pub ingestion_concurrency: usize,
}

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parse_env<T: std::str::FromStr>(key: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.parse::<T>().map_err(|e| anyhow::anyhow!("{key}: invalid value {raw:?}: {e}")),
        Err(_) => Ok(default),
    }
}

impl Config {
    pub fn load() -> Result<Self> {
        let store_path = PathBuf::from(env_or("STORE_PATH", "./data"));
        let embedder_model = env_or("EMBEDDER_MODEL", "hash");
        let embedding_dim: usize = parse_env("EMBEDDING_DIM", 256).context("EMBEDDING_DIM")?;
        let upstream_context7_url = env::var("UPSTREAM_CONTEXT7_URL").ok().filter(|s| !s.is_empty());
        let http_port: u16 = parse_env("HTTP_PORT", 8000).context("HTTP_PORT")?;
        let fetch_timeout_secs: u64 = parse_env("FETCH_TIMEOUT_SECONDS", 30).context("FETCH_TIMEOUT_SECONDS")?;
        let max_content_bytes: u64 = parse_env("MAX_CONTENT_BYTES", 10 * 1024 * 1024).context("MAX_CONTENT_BYTES")?;
        let ingestion_concurrency: usize = parse_env("INGESTION_CONCURRENCY", 8).context("INGESTION_CONCURRENCY")?;

        let config = Config {
            store_path,
            embedder_model,
            embedding_dim,
            upstream_context7_url,
            http_port,
            fetch_timeout: Duration::from_secs(fetch_timeout_secs),
            max_content_bytes,
            ingestion_concurrency,
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.embedding_dim == 0 {
            bail!("EMBEDDING_DIM must be greater than zero");
        }
        if self.http_port == 0 {
            bail!("HTTP_PORT must be greater than zero");
        }
        if self.max_content_bytes == 0 {
            bail!("MAX_CONTENT_BYTES must be greater than zero");
        }
        if self.ingestion_concurrency == 0 {
            bail!("INGESTION_CONCURRENCY must be greater than zero");
        }
        if self.embedder_model.starts_with("openai:") && env::var("OPENAI_API_KEY").is_err() {
            bail!("EMBEDDER_MODEL={:?} requires OPENAI_API_KEY to be set", self.embedder_model);
        }
        Ok(())
    }

    pub fn sqlite_url(&self) -> String {
        format!("sqlite://{}/libdocs.db", self.store_path.display())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_env_falls_back_to_default() {
        let value: usize = parse_env("LIBDOCS_TEST_UNSET_VAR_XYZ", 42).unwrap();
        assert_eq!(value, 42);
    }

    #[test]
    fn validate_rejects_zero_dim() {
        let mut config = Config {
            store_path: PathBuf::from("./data"),
            embedder_model: "hash".to_string(),
            embedding_dim: 0,
            upstream_context7_url: None,
            http_port: 8000,
            fetch_timeout: Duration::from_secs(30),
            max_content_bytes: 1024,
            ingestion_concurrency: 1,
        };
        assert!(config.validate().is_err());
        config.embedding_dim = 256;
        assert!(config.validate().is_ok());
    }
}
