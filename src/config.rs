//! Runtime settings.
//!
//! Values come from the process environment (after loading `.env` with
//! `dotenvy`), and selected CLI flags override them in `app`.

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::data::fetch::{DEFAULT_MAX_PAGES, DEFAULT_PAGE_SIZE, FetchOptions};
use crate::error::AppError;

/// Daily mandi prices resource on the open government data platform.
pub const DEFAULT_API_URL: &str = "https://api.data.gov.in/resource/9ef84268-d588-465a-a308-a864a43d0070";
pub const DEFAULT_API_KEY_PARAM: &str = "api-key";
pub const DEFAULT_DATA_DIR: &str = "data";
pub const DEFAULT_INTERVAL_MINS: u64 = 15;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub api_url: String,
    /// Only required when fetching from the real upstream.
    pub api_key: Option<String>,
    pub api_key_param: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub http_timeout: Duration,
    pub data_dir: PathBuf,
    pub interval_mins: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            api_key: None,
            api_key_param: DEFAULT_API_KEY_PARAM.to_string(),
            page_size: DEFAULT_PAGE_SIZE,
            max_pages: DEFAULT_MAX_PAGES,
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            interval_mins: DEFAULT_INTERVAL_MINS,
        }
    }
}

impl Settings {
    /// Load `.env` (if any) and read settings from the environment.
    pub fn from_env() -> Result<Self, AppError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build settings from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, AppError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let get = |name: &str| lookup(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());

        let settings = Self {
            api_url: get("API_URL").unwrap_or(defaults.api_url),
            api_key: get("API_KEY"),
            api_key_param: get("API_KEY_PARAM").unwrap_or(defaults.api_key_param),
            page_size: parse_var(get("PAGE_SIZE"), "PAGE_SIZE")?.unwrap_or(defaults.page_size),
            max_pages: parse_var(get("MAX_PAGES"), "MAX_PAGES")?.unwrap_or(defaults.max_pages),
            http_timeout: parse_var(get("HTTP_TIMEOUT_SECS"), "HTTP_TIMEOUT_SECS")?
                .map(Duration::from_secs)
                .unwrap_or(defaults.http_timeout),
            data_dir: get("DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            interval_mins: parse_var(get("INGEST_INTERVAL_MINS"), "INGEST_INTERVAL_MINS")?
                .unwrap_or(defaults.interval_mins),
        };
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.page_size == 0 {
            return Err(AppError::new(2, "PAGE_SIZE must be > 0."));
        }
        if self.max_pages == 0 {
            return Err(AppError::new(2, "MAX_PAGES must be > 0."));
        }
        if self.interval_mins == 0 {
            return Err(AppError::new(2, "INGEST_INTERVAL_MINS must be > 0."));
        }
        if self.interval_mins.checked_mul(60).is_none() {
            return Err(AppError::new(2, "INGEST_INTERVAL_MINS is too large."));
        }
        Ok(())
    }

    pub fn fetch_options(&self) -> FetchOptions {
        FetchOptions {
            page_size: self.page_size,
            max_pages: self.max_pages,
        }
    }

    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_mins.saturating_mul(60))
    }

    pub fn log_path(&self) -> PathBuf {
        self.data_dir.join("mandi.log")
    }
}

fn parse_var<T: FromStr>(value: Option<String>, name: &str) -> Result<Option<T>, AppError> {
    match value {
        None => Ok(None),
        Some(raw) => raw
            .parse::<T>()
            .map(Some)
            .map_err(|_| AppError::new(2, format!("Invalid {name} value '{raw}' in environment (.env)."))),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn defaults_apply_when_environment_is_empty() {
        let settings = Settings::from_lookup(lookup(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.page_size, 4999);
        assert_eq!(settings.interval(), Duration::from_secs(15 * 60));
    }

    #[test]
    fn environment_overrides_defaults() {
        let settings = Settings::from_lookup(lookup(&[
            ("API_KEY", "secret"),
            ("PAGE_SIZE", "100"),
            ("MAX_PAGES", " 7 "),
            ("DATA_DIR", "/tmp/mandi"),
        ]))
        .unwrap();
        assert_eq!(settings.api_key.as_deref(), Some("secret"));
        assert_eq!(settings.fetch_options(), FetchOptions { page_size: 100, max_pages: 7 });
        assert_eq!(settings.log_path(), PathBuf::from("/tmp/mandi/mandi.log"));
    }

    #[test]
    fn blank_key_is_treated_as_unset() {
        let settings = Settings::from_lookup(lookup(&[("API_KEY", "  ")])).unwrap();
        assert_eq!(settings.api_key, None);
    }

    #[test]
    fn invalid_numbers_are_usage_errors() {
        let err = Settings::from_lookup(lookup(&[("PAGE_SIZE", "lots")])).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let err = Settings::from_lookup(lookup(&[("MAX_PAGES", "0")])).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn oversized_interval_is_rejected() {
        let huge = u64::MAX.to_string();
        let err = Settings::from_lookup(lookup(&[("INGEST_INTERVAL_MINS", huge.as_str())])).unwrap_err();
        assert_eq!(err.exit_code(), 2);

        let limit = (u64::MAX / 60).to_string();
        let settings = Settings::from_lookup(lookup(&[("INGEST_INTERVAL_MINS", limit.as_str())])).unwrap();
        assert_eq!(settings.interval(), Duration::from_secs(u64::MAX / 60 * 60));
    }
}
