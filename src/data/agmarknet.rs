//! Open-data API integration for daily mandi (market) prices.

use reqwest::blocking::Client;
use serde::Deserialize;

use crate::config::Settings;
use crate::data::fetch::PageSource;
use crate::domain::RawRecord;
use crate::error::{AppError, FetchError};

pub struct MandiClient {
    client: Client,
    api_url: String,
    api_key: String,
    api_key_param: String,
}

impl MandiClient {
    pub fn from_settings(settings: &Settings) -> Result<Self, AppError> {
        let api_key = settings
            .api_key
            .clone()
            .ok_or_else(|| AppError::new(2, "Missing API_KEY in environment (.env)."))?;
        let client = Client::builder()
            .timeout(settings.http_timeout)
            .build()
            .map_err(|e| AppError::new(2, format!("Failed to build HTTP client: {e}")))?;
        Ok(Self {
            client,
            api_url: settings.api_url.clone(),
            api_key,
            api_key_param: settings.api_key_param.clone(),
        })
    }
}

impl PageSource for MandiClient {
    fn fetch_page(&self, offset: usize, limit: usize) -> Result<Option<Vec<RawRecord>>, FetchError> {
        let failed = |reason: String| FetchError::FetchFailed { offset, reason };
        let offset_param = offset.to_string();
        let limit_param = limit.to_string();

        let resp = self
            .client
            .get(&self.api_url)
            .query(&[
                (self.api_key_param.as_str(), self.api_key.as_str()),
                ("format", "json"),
                ("offset", offset_param.as_str()),
                ("limit", limit_param.as_str()),
            ])
            .send()
            .map_err(|e| failed(format!("request failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(failed(format!("request failed with status {}", resp.status())));
        }

        let body: RecordsResponse = resp
            .json()
            .map_err(|e| failed(format!("failed to parse response: {e}")))?;

        if body.status.as_deref() == Some("error") {
            let message = body.message.unwrap_or_else(|| "upstream reported an error".to_string());
            return Err(failed(message));
        }

        Ok(body.records)
    }

    fn describe(&self) -> String {
        self.api_url.clone()
    }
}

/// Top-level response body. Only `records` matters; `status`/`message`
/// carry upstream-side failures.
#[derive(Debug, Deserialize)]
struct RecordsResponse {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    records: Option<Vec<RawRecord>>,
}
