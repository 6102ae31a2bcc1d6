//! OAuth 2.0 credentials for the Sheets API.
//!
//! Tokens are cached in a JSON file. An expired token is refreshed with its
//! refresh token; without a usable token the user is sent through the
//! consent screen and pastes the code back on stdin.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument};

use super::SheetsError;

/// Scope requested on the consent screen.
pub const SCOPES: &str = "https://www.googleapis.com/auth/spreadsheets";

/// Tokens this close to expiry are treated as expired.
const EXPIRY_SKEW_SECS: i64 = 60;

/// A cached access token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredToken {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub token_expiry: Option<DateTime<Utc>>,
    #[serde(default)]
    pub invalid: bool,
}

impl StoredToken {
    fn from_response(response: TokenResponse, refresh_token: Option<String>, now: DateTime<Utc>) -> Self {
        Self {
            access_token: response.access_token,
            refresh_token: response.refresh_token.or(refresh_token),
            token_expiry: response.expires_in.map(|secs| now + Duration::seconds(secs)),
            invalid: false,
        }
    }

    /// Whether the token can be sent as is at `now`.
    pub fn is_usable(&self, now: DateTime<Utc>) -> bool {
        if self.invalid {
            return false;
        }
        match self.token_expiry {
            Some(expiry) => expiry - Duration::seconds(EXPIRY_SKEW_SECS) > now,
            None => true,
        }
    }
}

/// File-backed token cache.
pub struct CredentialStore {
    path: PathBuf,
}

impl CredentialStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// The cached token, or `None` when nothing has been stored yet.
    pub fn load(&self) -> Result<Option<StoredToken>, SheetsError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let raw = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&raw)?))
    }

    pub fn save(&self, token: &StoredToken) -> Result<(), SheetsError> {
        fs::write(&self.path, serde_json::to_string_pretty(token)?)?;
        debug!(path = %self.path.display(), "saved token");
        Ok(())
    }
}

#[derive(Debug, Deserialize)]
struct SecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// OAuth client registration downloaded from the Google Cloud console.
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    #[serde(default)]
    pub redirect_uris: Vec<String>,
}

fn default_auth_uri() -> String {
    "https://accounts.google.com/o/oauth2/auth".to_string()
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
}

impl ClientSecrets {
    pub fn load(path: &Path) -> Result<Self, SheetsError> {
        Self::parse(&fs::read_to_string(path)?)
    }

    /// Parse an `installed` or `web` client secrets document.
    pub fn parse(raw: &str) -> Result<Self, SheetsError> {
        let file: SecretsFile = serde_json::from_str(raw)?;
        file.installed.or(file.web).ok_or_else(|| {
            SheetsError::Auth("client secrets must contain an \"installed\" or \"web\" client".to_string())
        })
    }

    fn redirect_uri(&self) -> &str {
        self.redirect_uris
            .first()
            .map(String::as_str)
            .unwrap_or("http://localhost")
    }

    /// URL of the consent screen asking for offline access to [`SCOPES`].
    pub fn consent_url(&self) -> Result<String, SheetsError> {
        let url = reqwest::Url::parse_with_params(
            &self.auth_uri,
            &[
                ("client_id", self.client_id.as_str()),
                ("redirect_uri", self.redirect_uri()),
                ("response_type", "code"),
                ("scope", SCOPES),
                ("access_type", "offline"),
                ("prompt", "consent"),
            ],
        )
        .map_err(|e| SheetsError::Auth(format!("invalid auth_uri {}: {}", self.auth_uri, e)))?;
        Ok(url.to_string())
    }

    async fn token_request(
        &self,
        http: &reqwest::Client,
        form: &[(&str, &str)],
    ) -> Result<TokenResponse, SheetsError> {
        let response = http.post(&self.token_uri).form(form).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SheetsError::Auth(format!("token endpoint returned {}: {}", status, body)));
        }
        Ok(response.json().await?)
    }

    async fn exchange_code(
        &self,
        http: &reqwest::Client,
        code: &str,
    ) -> Result<TokenResponse, SheetsError> {
        self.token_request(
            http,
            &[
                ("grant_type", "authorization_code"),
                ("code", code),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
                ("redirect_uri", self.redirect_uri()),
            ],
        )
        .await
    }

    async fn refresh(
        &self,
        http: &reqwest::Client,
        refresh_token: &str,
    ) -> Result<TokenResponse, SheetsError> {
        self.token_request(
            http,
            &[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token),
                ("client_id", self.client_id.as_str()),
                ("client_secret", self.client_secret.as_str()),
            ],
        )
        .await
    }
}

/// Return an access token, refreshing or running the consent flow as needed.
/// Any new token is written back to `store`.
#[instrument(skip(store, http), fields(secrets = %secrets_path.display()))]
pub async fn authorize(
    store: &CredentialStore,
    secrets_path: &Path,
    http: &reqwest::Client,
) -> Result<String, SheetsError> {
    let now = Utc::now();
    if let Some(token) = store.load()? {
        if token.is_usable(now) {
            debug!("using stored token");
            return Ok(token.access_token);
        }
        if let (false, Some(refresh_token)) = (token.invalid, token.refresh_token) {
            info!("refreshing expired token");
            let secrets = ClientSecrets::load(secrets_path)?;
            let response = secrets.refresh(http, &refresh_token).await?;
            let stored = StoredToken::from_response(response, Some(refresh_token), now);
            store.save(&stored)?;
            return Ok(stored.access_token);
        }
    }

    info!("no usable token, starting consent flow");
    let secrets = ClientSecrets::load(secrets_path)?;
    let code = prompt_for_code(&secrets.consent_url()?).await?;
    let response = secrets.exchange_code(http, &code).await?;
    let stored = StoredToken::from_response(response, None, now);
    store.save(&stored)?;
    Ok(stored.access_token)
}

async fn prompt_for_code(consent_url: &str) -> Result<String, SheetsError> {
    println!("Open this URL in your browser to authorize access:\n\n    {}\n", consent_url);
    println!("Paste the authorization code or the URL you were redirected to:");
    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    extract_code(&line)
}

/// Accept either a bare code or a redirect URL carrying `?code=...`.
fn extract_code(input: &str) -> Result<String, SheetsError> {
    let input = input.trim();
    if let Ok(url) = reqwest::Url::parse(input) {
        return url
            .query_pairs()
            .find(|(key, _)| key == "code")
            .map(|(_, value)| value.into_owned())
            .ok_or_else(|| SheetsError::Auth("redirect URL has no code parameter".to_string()));
    }
    if input.is_empty() {
        return Err(SheetsError::Auth("no authorization code entered".to_string()));
    }
    Ok(input.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    const INSTALLED: &str = r#"{
        "installed": {
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "auth_uri": "https://accounts.google.com/o/oauth2/auth",
            "token_uri": "https://oauth2.googleapis.com/token",
            "redirect_uris": ["http://localhost"]
        }
    }"#;

    fn token(expiry: Option<DateTime<Utc>>) -> StoredToken {
        StoredToken {
            access_token: "ya29.token".to_string(),
            refresh_token: Some("1//refresh".to_string()),
            token_expiry: expiry,
            invalid: false,
        }
    }

    #[test]
    fn test_parse_installed_secrets() {
        let secrets = ClientSecrets::parse(INSTALLED).unwrap();
        assert_eq!(secrets.client_id, "123.apps.googleusercontent.com");
        assert_eq!(secrets.redirect_uri(), "http://localhost");
    }

    #[test]
    fn test_parse_web_secrets_with_defaults() {
        let secrets =
            ClientSecrets::parse(r#"{"web": {"client_id": "id", "client_secret": "s"}}"#).unwrap();
        assert_eq!(secrets.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_parse_secrets_without_client() {
        let err = ClientSecrets::parse("{}").unwrap_err();
        assert!(matches!(err, SheetsError::Auth(_)));
    }

    #[test]
    fn test_consent_url_requests_offline_sheets_scope() {
        let url = ClientSecrets::parse(INSTALLED).unwrap().consent_url().unwrap();
        assert!(url.starts_with("https://accounts.google.com/o/oauth2/auth?"));
        assert!(url.contains("access_type=offline"));
        assert!(url.contains("scope=https%3A%2F%2Fwww.googleapis.com%2Fauth%2Fspreadsheets"));
        assert!(url.contains("client_id=123.apps.googleusercontent.com"));
    }

    #[test]
    fn test_token_expiry() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        assert!(token(None).is_usable(now));
        assert!(token(Some(now + Duration::hours(1))).is_usable(now));
        assert!(!token(Some(now + Duration::seconds(30))).is_usable(now));
        assert!(!token(Some(now - Duration::hours(1))).is_usable(now));

        let mut revoked = token(None);
        revoked.invalid = true;
        assert!(!revoked.is_usable(now));
    }

    #[test]
    fn test_refresh_keeps_previous_refresh_token() {
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        let response = TokenResponse {
            access_token: "new".to_string(),
            expires_in: Some(3599),
            refresh_token: None,
        };
        let stored = StoredToken::from_response(response, Some("1//keep".to_string()), now);
        assert_eq!(stored.refresh_token.as_deref(), Some("1//keep"));
        assert_eq!(stored.token_expiry, Some(now + Duration::seconds(3599)));
    }

    #[test]
    fn test_store_round_trip_and_missing_file() {
        let path = std::env::temp_dir().join("sheet_upload_token_store.json");
        std::fs::remove_file(&path).ok();
        let store = CredentialStore::new(&path);
        assert!(store.load().unwrap().is_none());

        let saved = token(Some(Utc.with_ymd_and_hms(2024, 3, 1, 13, 0, 0).unwrap()));
        store.save(&saved).unwrap();
        assert_eq!(store.load().unwrap(), Some(saved));
        std::fs::remove_file(&path).ok();
    }

    #[test]
    fn test_loads_oauth2client_token_file() {
        let raw = r#"{
            "access_token": "ya29.a0",
            "client_id": "123.apps.googleusercontent.com",
            "client_secret": "shh",
            "refresh_token": "1//0g",
            "token_expiry": "2024-03-01T13:00:00Z",
            "token_uri": "https://oauth2.googleapis.com/token",
            "invalid": false,
            "_class": "OAuth2Credentials"
        }"#;
        let stored: StoredToken = serde_json::from_str(raw).unwrap();
        assert_eq!(stored.refresh_token.as_deref(), Some("1//0g"));
        assert!(stored.token_expiry.is_some());
    }

    #[test]
    fn test_extract_code() {
        assert_eq!(extract_code("4/0AbCd\n").unwrap(), "4/0AbCd");
        assert_eq!(
            extract_code("http://localhost/?code=4/0AbCd&scope=x").unwrap(),
            "4/0AbCd"
        );
        assert!(extract_code("   \n").is_err());
        assert!(extract_code("http://localhost/?error=access_denied").is_err());
    }
}
