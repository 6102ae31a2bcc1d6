pub mod auth;

pub use auth::{authorize, ClientSecrets, CredentialStore, StoredToken};

use serde_json::{json, Value};
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, instrument};

const SHEETS_API: &str = "https://sheets.googleapis.com/v4/spreadsheets";

/// Range cleared and then rewritten on every upload.
pub const TARGET_RANGE: &str = "Sheet1";

#[derive(Debug, Error)]
pub enum SheetsError {
    #[error("Failed to read file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to read CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Google API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Authorization failed: {0}")]
    Auth(String),

    #[error("Google API returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Read every row of a CSV file as literal strings. Rows may differ in width.
pub fn read_grid(path: &Path) -> Result<Vec<Vec<String>>, SheetsError> {
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .from_path(path)?;
    let mut grid = Vec::new();
    for row in reader.records() {
        grid.push(row?.iter().map(str::to_string).collect());
    }
    Ok(grid)
}

/// Pretty-printed response, or `None` when the API returned nothing.
pub fn summarize(response: &Value) -> Option<String> {
    let empty = match response {
        Value::Null => true,
        Value::Object(map) => map.is_empty(),
        Value::Array(items) => items.is_empty(),
        _ => false,
    };
    if empty {
        None
    } else {
        serde_json::to_string_pretty(response).ok()
    }
}

/// Google Sheets values client.
pub struct SheetsClient {
    http: reqwest::Client,
    access_token: String,
    base_url: String,
}

impl SheetsClient {
    pub fn new(http: reqwest::Client, access_token: String) -> Self {
        Self {
            http,
            access_token,
            base_url: SHEETS_API.to_string(),
        }
    }

    /// `{base}/{spreadsheet}/values/{segment}` with each segment percent-encoded.
    fn values_url(&self, spreadsheet: &str, segment: &str) -> Result<reqwest::Url, SheetsError> {
        let mut url = reqwest::Url::parse(&self.base_url)
            .map_err(|e| SheetsError::InvalidUrl(format!("{}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| SheetsError::InvalidUrl(self.base_url.clone()))?
            .push(spreadsheet)
            .push("values")
            .push(segment);
        Ok(url)
    }

    async fn check(response: reqwest::Response) -> Result<Value, SheetsError> {
        let status = response.status();
        let body = response.text().await?;
        if !status.is_success() {
            let message = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|v| v["error"]["message"].as_str().map(str::to_string))
                .unwrap_or(body);
            return Err(SheetsError::Api {
                status: status.as_u16(),
                message,
            });
        }
        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        Ok(serde_json::from_str(&body)?)
    }

    #[instrument(skip(self))]
    pub async fn clear(&self, spreadsheet: &str, range: &str) -> Result<Value, SheetsError> {
        let url = self.values_url(spreadsheet, &format!("{}:clear", range))?;
        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&json!({}))
            .send()
            .await?;
        Self::check(response).await
    }

    /// Write `values` from the range origin with RAW input handling.
    #[instrument(skip(self, values), fields(rows = values.len()))]
    pub async fn update(
        &self,
        spreadsheet: &str,
        range: &str,
        values: &[Vec<String>],
    ) -> Result<Value, SheetsError> {
        let body = json!({
            "range": range,
            "majorDimension": "ROWS",
            "values": values,
        });
        let response = self
            .http
            .put(self.values_url(spreadsheet, range)?)
            .bearer_auth(&self.access_token)
            .query(&[("valueInputOption", "RAW")])
            .json(&body)
            .send()
            .await?;
        Self::check(response).await
    }

    /// Clear [`TARGET_RANGE`], then write `grid` into it.
    pub async fn upload(
        &self,
        spreadsheet: &str,
        grid: &[Vec<String>],
    ) -> Result<Value, SheetsError> {
        self.clear(spreadsheet, TARGET_RANGE).await?;
        debug!(range = TARGET_RANGE, "cleared range");
        let response = self.update(spreadsheet, TARGET_RANGE, grid).await?;
        info!(rows = grid.len(), "uploaded values");
        Ok(response)
    }
}
