use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use profile_integrations::ids::{
    ENV_API_TOKEN, ENV_DATA_DIR, ENV_REMOTE_TIMEOUT_MS, ENV_REMOTE_URL, ENV_RETRY_BASE_MS,
    ENV_RETRY_JITTER, ENV_STORAGE_QUOTA_BYTES,
};
use url::Url;

use crate::sync::Backoff;

const DEFAULT_DATA_DIR_NAME: &str = "profiled";
const DEFAULT_REMOTE_URL: &str = "https://profiles.example.invalid";
const DEFAULT_REMOTE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_RETRY_BASE_MS: u64 = 250;
// Same budget browsers give local storage.
const DEFAULT_STORAGE_QUOTA_BYTES: u64 = 5 * 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncConfig {
    pub data_dir: PathBuf,
    pub remote_url: String,
    pub api_token: Option<String>,
    pub remote_timeout: Duration,
    pub retry: Backoff,
    pub storage_quota_bytes: u64,
}

impl SyncConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = dirs::home_dir().context("home directory is unavailable")?;
        let data_dir = match non_empty(lookup(ENV_DATA_DIR)) {
            Some(value) => expand_with_home(&value, &home),
            None => dirs::data_dir()
                .context("data directory is unavailable")?
                .join(DEFAULT_DATA_DIR_NAME),
        };
        let remote_url =
            non_empty(lookup(ENV_REMOTE_URL)).unwrap_or_else(|| DEFAULT_REMOTE_URL.to_string());
        let parsed = Url::parse(&remote_url)
            .with_context(|| format!("{ENV_REMOTE_URL} is not an absolute URL: {remote_url}"))?;
        if parsed.cannot_be_a_base() {
            anyhow::bail!("{ENV_REMOTE_URL} cannot carry document paths: {remote_url}");
        }
        let api_token = non_empty(lookup(ENV_API_TOKEN));
        let remote_timeout = Duration::from_millis(read_u64(
            &lookup,
            ENV_REMOTE_TIMEOUT_MS,
            DEFAULT_REMOTE_TIMEOUT_MS,
        ));
        let retry = Backoff::new(
            Duration::from_millis(read_u64(&lookup, ENV_RETRY_BASE_MS, DEFAULT_RETRY_BASE_MS)),
            read_bool(&lookup, ENV_RETRY_JITTER, true),
        );
        let storage_quota_bytes =
            read_u64(&lookup, ENV_STORAGE_QUOTA_BYTES, DEFAULT_STORAGE_QUOTA_BYTES);

        Ok(Self {
            data_dir,
            remote_url,
            api_token,
            remote_timeout,
            retry,
            storage_quota_bytes,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn expand_with_home(value: &str, home: &Path) -> PathBuf {
    if value == "~" {
        return home.to_path_buf();
    }
    if let Some(rest) = value.strip_prefix("~/") {
        return home.join(rest);
    }
    PathBuf::from(value)
}

fn read_u64<F>(lookup: &F, name: &str, default: u64) -> u64
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value > 0)
        .unwrap_or(default)
}

fn read_bool<F>(lookup: &F, name: &str, default: bool) -> bool
where
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            matches!(
                value.trim().to_ascii_lowercase().as_str(),
                "1" | "true" | "yes" | "on"
            )
        })
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> anyhow::Result<SyncConfig> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        SyncConfig::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = config(&[]).unwrap();
        assert!(config.data_dir.ends_with(DEFAULT_DATA_DIR_NAME));
        assert_eq!(config.remote_url, DEFAULT_REMOTE_URL);
        assert_eq!(config.api_token, None);
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert_eq!(config.storage_quota_bytes, 5 * 1024 * 1024);
        assert_eq!(config.retry, Backoff::default());
    }

    #[test]
    fn reads_overrides() {
        let config = config(&[
            (ENV_REMOTE_URL, "http://127.0.0.1:8080"),
            (ENV_API_TOKEN, " secret "),
            (ENV_REMOTE_TIMEOUT_MS, "1500"),
            (ENV_RETRY_JITTER, "off"),
            (ENV_STORAGE_QUOTA_BYTES, "4096"),
        ])
        .unwrap();
        assert_eq!(config.remote_url, "http://127.0.0.1:8080");
        assert_eq!(config.api_token.as_deref(), Some("secret"));
        assert_eq!(config.remote_timeout, Duration::from_millis(1500));
        assert_eq!(config.storage_quota_bytes, 4096);
        assert_eq!(
            config.retry,
            Backoff::new(Duration::from_millis(250), false)
        );
    }

    #[test]
    fn zero_or_garbage_numbers_fall_back() {
        let config = config(&[
            (ENV_REMOTE_TIMEOUT_MS, "0"),
            (ENV_STORAGE_QUOTA_BYTES, "lots"),
        ])
        .unwrap();
        assert_eq!(config.remote_timeout, Duration::from_secs(10));
        assert_eq!(config.storage_quota_bytes, DEFAULT_STORAGE_QUOTA_BYTES);
    }

    #[test]
    fn expands_tilde_in_data_dir() {
        let home = PathBuf::from("/tmp/home-user");
        assert_eq!(
            expand_with_home("~/profiles", &home),
            PathBuf::from("/tmp/home-user/profiles")
        );
        assert_eq!(expand_with_home("~", &home), home);
        assert_eq!(expand_with_home("/abs", &home), PathBuf::from("/abs"));
    }

    #[test]
    fn rejects_relative_remote_url() {
        assert!(config(&[(ENV_REMOTE_URL, "profiles.local")]).is_err());
    }

    #[test]
    fn rejects_malformed_or_pathless_remote_url() {
        assert!(config(&[(ENV_REMOTE_URL, "ht tp://x")]).is_err());
        assert!(config(&[(ENV_REMOTE_URL, "http://")]).is_err());
        assert!(config(&[(ENV_REMOTE_URL, "mailto:ops@example.com")]).is_err());
        assert!(config(&[(ENV_REMOTE_URL, "https://store.example:8443/base")]).is_ok());
    }
}
