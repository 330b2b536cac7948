use anyhow::{bail, Context};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "http://127.0.0.1:8000";
pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// Backend base URL without a trailing slash.
    pub api_base_url: String,
    pub request_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            request_timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        }
    }
}

impl Config {
    /// Read `CLASSBOOKD_API_URL` and `CLASSBOOKD_TIMEOUT_SECS`.
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut cfg = Self::default();

        if let Some(url) = lookup("CLASSBOOKD_API_URL").filter(|v| !v.trim().is_empty()) {
            let url = url.trim().trim_end_matches('/').to_string();
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                bail!("CLASSBOOKD_API_URL must start with http:// or https:// (got {url})");
            }
            cfg.api_base_url = url;
        }

        if let Some(raw) = lookup("CLASSBOOKD_TIMEOUT_SECS").filter(|v| !v.trim().is_empty()) {
            let secs: u64 = raw
                .trim()
                .parse()
                .with_context(|| format!("CLASSBOOKD_TIMEOUT_SECS is not an integer: {raw}"))?;
            if secs == 0 {
                bail!("CLASSBOOKD_TIMEOUT_SECS must be positive");
            }
            cfg.request_timeout = Duration::from_secs(secs);
        }

        Ok(cfg)
    }
}
