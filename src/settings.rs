//! User-editable settings persisted in the key-value store

use crate::errors::{MonitorError, Result};
use crate::store::KeyValueStore;
use reqwest::Url;
use std::path::PathBuf;
use tracing::info;

pub const BASE_URL_KEY: &str = "base_url";
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

#[derive(Debug)]
pub struct Settings {
    store: KeyValueStore,
}

impl Settings {
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Ok(Self {
            store: KeyValueStore::open(path).await?,
        })
    }

    /// Stored base URL, if the user ever set one.
    pub fn stored_base_url(&self) -> Option<&str> {
        self.store.get(BASE_URL_KEY)
    }

    pub fn base_url(&self) -> String {
        self.stored_base_url().unwrap_or(DEFAULT_BASE_URL).to_string()
    }

    /// Validate, normalize and persist a new base URL. Returns the stored value.
    pub async fn set_base_url(&mut self, raw: &str) -> Result<String> {
        let normalized = normalize_base_url(raw)?;
        self.store.set(BASE_URL_KEY, normalized.clone()).await?;
        info!("Base URL set to {}", normalized);
        Ok(normalized)
    }
}

/// Trim, drop trailing slashes and require an absolute http(s) URL.
pub fn normalize_base_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim().trim_end_matches('/');

    if trimmed.is_empty() {
        return Err(MonitorError::Config("base URL cannot be empty".to_string()));
    }

    let url = Url::parse(trimmed)
        .map_err(|e| MonitorError::Config(format!("invalid base URL {}: {}", trimmed, e)))?;

    if !matches!(url.scheme(), "http" | "https") {
        return Err(MonitorError::Config(format!(
            "base URL must use http or https, got {}",
            url.scheme()
        )));
    }

    Ok(trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_normalize_base_url() {
        assert_eq!(
            normalize_base_url("  http://192.168.1.20:3000/ ").unwrap(),
            "http://192.168.1.20:3000"
        );
        assert_eq!(
            normalize_base_url("https://sentry.example.com//").unwrap(),
            "https://sentry.example.com"
        );
        assert!(normalize_base_url("   ").is_err());
        assert!(normalize_base_url("/").is_err());
        assert!(normalize_base_url("192.168.1.20").is_err());
        assert!(normalize_base_url("ftp://example.com").is_err());
    }

    #[tokio::test]
    async fn test_base_url_defaults_then_persists() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("settings.json");

        let mut settings = Settings::open(&path).await.unwrap();
        assert_eq!(settings.base_url(), DEFAULT_BASE_URL);
        assert_eq!(settings.stored_base_url(), None);

        settings.set_base_url("http://10.0.0.7:3000/").await.unwrap();

        let reopened = Settings::open(&path).await.unwrap();
        assert_eq!(reopened.base_url(), "http://10.0.0.7:3000");
    }

    #[tokio::test]
    async fn test_blank_base_url_keeps_previous() {
        let dir = tempdir().unwrap();
        let mut settings = Settings::open(dir.path().join("settings.json")).await.unwrap();

        settings.set_base_url("http://10.0.0.7:3000").await.unwrap();
        assert!(settings.set_base_url("  ").await.is_err());
        assert_eq!(settings.base_url(), "http://10.0.0.7:3000");
    }

    #[tokio::test]
    async fn test_unsaved_base_url_is_not_reported() {
        let dir = tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        tokio::fs::create_dir(&blocker).await.unwrap();

        let mut settings = Settings::open(blocker.join("settings.json")).await.unwrap();

        tokio::fs::remove_dir(&blocker).await.unwrap();
        tokio::fs::write(&blocker, "not a directory").await.unwrap();

        assert!(settings.set_base_url("http://10.0.0.9:3000").await.is_err());
        assert_eq!(settings.stored_base_url(), None);
        assert_eq!(settings.base_url(), DEFAULT_BASE_URL);
    }
}
