//! Process-wide ingestion configuration.
//!
//! Built once at startup, lowest precedence first:
//!
//! 1. [`IngestConfig::default`] rooted at `REFRATE_HOME` (or `~/.refrate`);
//! 2. an optional JSON file;
//! 3. `REFRATE_*` environment variables;
//! 4. command-line flags, applied by the caller.

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use refrate_store::{StoreConfig, DEFAULT_FILE_PREFIX};
use serde::Deserialize;
use thiserror::Error;

use crate::extract::{VisionConfig, DEFAULT_MAX_PAGES};
use crate::fetch::FetchConfig;
use crate::retry::RetrySettings;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Everything an ingestion run needs to know.
#[derive(Debug, Clone, PartialEq)]
pub struct IngestConfig {
    /// Directory holding the per-currency series files.
    pub data_dir: PathBuf,
    pub file_prefix: String,
    /// Where fetched documents are archived; `None` disables archiving.
    pub archive_dir: Option<PathBuf>,
    pub fetch: FetchConfig,
    /// `None` disables the image fallback path.
    pub vision: Option<VisionConfig>,
    /// Leading pages read from the text layer.
    pub max_pages: usize,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self::for_home(resolve_refrate_home())
    }
}

impl IngestConfig {
    /// Defaults laid out under `home`: `csv_files/` and `pdf_files/`.
    pub fn for_home(home: impl AsRef<Path>) -> Self {
        let home = home.as_ref();
        Self {
            data_dir: home.join("csv_files"),
            file_prefix: String::from(DEFAULT_FILE_PREFIX),
            archive_dir: Some(home.join("pdf_files")),
            fetch: FetchConfig::default(),
            vision: None,
            max_pages: DEFAULT_MAX_PAGES,
        }
    }

    /// Defaults, then `file` if given, then the process environment.
    pub fn load(file: Option<&Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(path) = file {
            config.apply_file(path)?;
        }
        config.apply_env_with(|name| env::var(name).ok());
        Ok(config)
    }

    pub fn apply_file(&mut self, path: &Path) -> Result<(), ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let file: ConfigFile = serde_json::from_str(&raw).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        self.apply(file);
        Ok(())
    }

    fn apply(&mut self, file: ConfigFile) {
        if let Some(home) = file.home {
            let base = Self::for_home(home);
            self.data_dir = base.data_dir;
            self.archive_dir = base.archive_dir;
        }
        if let Some(data_dir) = file.data_dir {
            self.data_dir = data_dir;
        }
        if let Some(file_prefix) = file.file_prefix {
            self.file_prefix = file_prefix;
        }
        if let Some(archive_dir) = file.archive_dir {
            self.archive_dir = Some(archive_dir);
        }
        if file.archive == Some(false) {
            self.archive_dir = None;
        }
        if let Some(max_pages) = file.max_pages {
            self.max_pages = max_pages.max(1);
        }
        if file.vision.is_some() {
            self.vision = file.vision;
        }

        let fetch = file.fetch;
        if let Some(url) = fetch.primary_url {
            self.fetch.primary_url = url;
        }
        if let Some(url) = fetch.fallback_url {
            self.fetch.fallback_url = (!url.is_empty()).then_some(url);
        }
        if let Some(user_agent) = fetch.user_agent {
            self.fetch.user_agent = user_agent;
        }
        if let Some(timeout) = fetch.direct_timeout_ms {
            self.fetch.direct_timeout_ms = timeout;
        }
        if let Some(timeout) = fetch.proxy_timeout_ms {
            self.fetch.proxy_timeout_ms = timeout;
        }
        if let Some(attempts) = fetch.proxy_attempts {
            self.fetch.proxy_attempts = attempts;
        }
        if let Some(proxies) = fetch.proxies {
            self.fetch.proxies = proxies;
            self.fetch.dedup_proxies();
        }
        if let Some(retry) = fetch.retry {
            self.fetch.retry = retry.into();
        }
    }

    /// Applies `REFRATE_*` variables read through `lookup`.
    pub fn apply_env_with<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(url) = lookup("REFRATE_PRIMARY_URL") {
            self.fetch.primary_url = url;
        }
        if let Some(url) = lookup("REFRATE_FALLBACK_URL") {
            self.fetch.fallback_url = Some(url);
        }
        if let Some(proxies) = lookup("REFRATE_PROXIES") {
            self.fetch.proxies = proxies
                .split(',')
                .map(str::trim)
                .filter(|proxy| !proxy.is_empty())
                .map(String::from)
                .collect();
            self.fetch.dedup_proxies();
        }

        let api_key = lookup("REFRATE_VISION_API_KEY").or_else(|| lookup("OPENAI_API_KEY"));
        if let Some(api_key) = api_key {
            self.vision.get_or_insert_with(VisionConfig::default).api_key = api_key;
        }
        if let Some(vision) = self.vision.as_mut() {
            if let Some(model) = lookup("REFRATE_VISION_MODEL") {
                vision.model = model;
            }
            if let Some(endpoint) = lookup("REFRATE_VISION_ENDPOINT") {
                vision.endpoint = endpoint;
            }
        }
    }

    pub fn store_config(&self) -> StoreConfig {
        StoreConfig::new(&self.data_dir).with_file_prefix(self.file_prefix.as_str())
    }
}

/// Resolve the refrate home directory from environment or default.
pub fn resolve_refrate_home() -> PathBuf {
    if let Some(path) = env::var_os("REFRATE_HOME") {
        let path = PathBuf::from(path);
        if !path.as_os_str().is_empty() {
            return path;
        }
    }

    if let Some(home) = env::var_os("HOME") {
        return PathBuf::from(home).join(".refrate");
    }

    PathBuf::from(".refrate")
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct ConfigFile {
    home: Option<PathBuf>,
    data_dir: Option<PathBuf>,
    file_prefix: Option<String>,
    archive_dir: Option<PathBuf>,
    archive: Option<bool>,
    max_pages: Option<usize>,
    fetch: FetchSettings,
    vision: Option<VisionConfig>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct FetchSettings {
    primary_url: Option<String>,
    fallback_url: Option<String>,
    user_agent: Option<String>,
    direct_timeout_ms: Option<u64>,
    proxy_timeout_ms: Option<u64>,
    proxy_attempts: Option<u32>,
    proxies: Option<Vec<String>>,
    retry: Option<RetrySettings>,
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[test]
    fn home_lays_out_series_and_archive() {
        let config = IngestConfig::for_home("/srv/refrate");
        assert_eq!(config.data_dir, PathBuf::from("/srv/refrate/csv_files"));
        assert_eq!(config.archive_dir, Some(PathBuf::from("/srv/refrate/pdf_files")));
        assert_eq!(config.fetch.proxy_attempts, 5);
        assert_eq!(config.max_pages, 2);
        assert!(config.vision.is_none());
    }

    #[test]
    fn file_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("refrate.json");
        fs::write(
            &path,
            r#"{
                "data_dir": "/data/series",
                "archive": false,
                "fetch": {"proxies": ["http://10.0.0.1:3128"], "proxy_attempts": 2,
                          "retry": {"max_retries": 1}},
                "vision": {"model": "local-vlm", "endpoint": "http://localhost:8080/v1/chat/completions"}
            }"#,
        )
        .expect("write");

        let mut config = IngestConfig::for_home("/srv/refrate");
        config.apply_file(&path).expect("load");

        assert_eq!(config.data_dir, PathBuf::from("/data/series"));
        assert_eq!(config.archive_dir, None);
        assert_eq!(config.fetch.proxies, ["http://10.0.0.1:3128"]);
        assert_eq!(config.fetch.proxy_attempts, 2);
        assert_eq!(config.fetch.retry.total_attempts(), 2);
        assert_eq!(config.vision.as_ref().map(|v| v.model.as_str()), Some("local-vlm"));
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("refrate.json");
        fs::write(&path, r#"{"data_directory": "/x"}"#).expect("write");

        let error = IngestConfig::for_home("/srv")
            .apply_file(&path)
            .expect_err("typo must fail");
        assert!(matches!(error, ConfigError::Parse { .. }));
    }

    #[test]
    fn environment_enables_vision_and_proxies() {
        let vars: HashMap<&str, &str> = HashMap::from([
            ("OPENAI_API_KEY", "sk-env"),
            ("REFRATE_VISION_MODEL", "gpt-4o-mini"),
            ("REFRATE_PROXIES", "http://a:1, ,http://b:2,http://a:1"),
            ("REFRATE_FALLBACK_URL", ""),
        ]);
        let mut config = IngestConfig::for_home("/srv");
        config.apply_env_with(|name| vars.get(name).map(|v| (*v).to_owned()));

        let vision = config.vision.expect("vision enabled");
        assert_eq!(vision.api_key, "sk-env");
        assert_eq!(vision.model, "gpt-4o-mini");
        assert_eq!(config.fetch.proxies, ["http://a:1", "http://b:2"]);
        assert!(config.fetch.fallback_url.is_some());
    }
}
