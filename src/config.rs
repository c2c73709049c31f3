use std::env;

use anyhow::{Result, anyhow};
use chrono::{FixedOffset, Offset, Utc};
use tokio::time::Duration;
use url::Url;

use crate::gemini::{DEFAULT_GEMINI_BASE_URL, DEFAULT_GEMINI_MODEL};
use crate::quota::DEFAULT_DAILY_LIMIT;

const DEFAULT_PORT: u16 = 3000;
const DEFAULT_TIMEOUT_SECS: u64 = 120;
const DEFAULT_USER_HEADER: &str = "x-user-id";

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub bind_address: String,
    pub default_api_key: Option<String>,
    pub gemini_base_url: String,
    pub gemini_model: String,
    pub generation_timeout: Duration,
    pub default_daily_limit: u32,
    pub quota_offset: FixedOffset,
    pub user_id_header: String,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let read = |key: &str| {
            lookup(key)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        let port = read("APP_PORT")
            .and_then(|value| value.parse::<u16>().ok())
            .unwrap_or(DEFAULT_PORT);
        let gemini_base_url = match read("GEMINI_BASE_URL") {
            Some(raw) => validate_http_url(&raw)?.as_str().trim_end_matches('/').to_string(),
            None => DEFAULT_GEMINI_BASE_URL.to_string(),
        };
        let generation_timeout = read("GENERATION_TIMEOUT_SECS")
            .and_then(|value| value.parse::<u64>().ok())
            .filter(|secs| *secs > 0)
            .map(Duration::from_secs)
            .unwrap_or(Duration::from_secs(DEFAULT_TIMEOUT_SECS));
        let default_daily_limit = read("DAILY_QUOTA_LIMIT")
            .and_then(|value| value.parse::<u32>().ok())
            .filter(|limit| *limit >= 1)
            .unwrap_or(DEFAULT_DAILY_LIMIT);
        let quota_offset = match read("QUOTA_UTC_OFFSET") {
            Some(raw) => raw
                .parse::<FixedOffset>()
                .map_err(|err| anyhow!("invalid QUOTA_UTC_OFFSET {raw:?}: {err}"))?,
            None => Utc.fix(),
        };

        Ok(Self {
            bind_address: format!("0.0.0.0:{port}"),
            default_api_key: read("GOOGLE_API_KEY"),
            gemini_base_url,
            gemini_model: read("GEMINI_MODEL").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string()),
            generation_timeout,
            default_daily_limit,
            quota_offset,
            user_id_header: read("USER_ID_HEADER")
                .map(|value| value.to_lowercase())
                .unwrap_or_else(|| DEFAULT_USER_HEADER.to_string()),
        })
    }
}

fn validate_http_url(raw: &str) -> Result<Url> {
    let parsed = Url::parse(raw).map_err(|err| anyhow!("invalid GEMINI_BASE_URL {raw:?}: {err}"))?;
    match parsed.scheme() {
        "http" | "https" => Ok(parsed),
        scheme => Err(anyhow!("GEMINI_BASE_URL must use http or https, got {scheme}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(pairs: &[(&str, &str)]) -> Result<AppConfig> {
        let vars: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.default_api_key, None);
        assert_eq!(config.gemini_base_url, DEFAULT_GEMINI_BASE_URL);
        assert_eq!(config.gemini_model, DEFAULT_GEMINI_MODEL);
        assert_eq!(config.generation_timeout, Duration::from_secs(120));
        assert_eq!(config.default_daily_limit, 5);
        assert_eq!(config.quota_offset.local_minus_utc(), 0);
        assert_eq!(config.user_id_header, "x-user-id");
    }

    #[test]
    fn values_are_read_and_trimmed() {
        let config = config(&[
            ("APP_PORT", "8080"),
            ("GOOGLE_API_KEY", "  key  "),
            ("GEMINI_BASE_URL", "http://localhost:9999/"),
            ("DAILY_QUOTA_LIMIT", "12"),
            ("QUOTA_UTC_OFFSET", "+08:00"),
            ("USER_ID_HEADER", "X-Forwarded-Email"),
            ("GENERATION_TIMEOUT_SECS", "30"),
        ])
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:8080");
        assert_eq!(config.default_api_key.as_deref(), Some("key"));
        assert_eq!(config.gemini_base_url, "http://localhost:9999");
        assert_eq!(config.default_daily_limit, 12);
        assert_eq!(config.quota_offset.local_minus_utc(), 8 * 3600);
        assert_eq!(config.user_id_header, "x-forwarded-email");
        assert_eq!(config.generation_timeout, Duration::from_secs(30));
    }

    #[test]
    fn bad_numbers_fall_back_and_blank_key_is_absent() {
        let config = config(&[
            ("APP_PORT", "not-a-port"),
            ("DAILY_QUOTA_LIMIT", "0"),
            ("GOOGLE_API_KEY", "   "),
        ])
        .unwrap();
        assert_eq!(config.bind_address, "0.0.0.0:3000");
        assert_eq!(config.default_daily_limit, 5);
        assert_eq!(config.default_api_key, None);
    }

    #[test]
    fn invalid_url_or_offset_is_an_error() {
        assert!(config(&[("GEMINI_BASE_URL", "ftp://example.com")]).is_err());
        assert!(config(&[("GEMINI_BASE_URL", "not a url")]).is_err());
        assert!(config(&[("QUOTA_UTC_OFFSET", "tomorrow")]).is_err());
    }
}
