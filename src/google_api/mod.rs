//! Native Google API client.
//!
//! Direct HTTP via reqwest. Token format is compatible with the
//! token.json written by Google's Python OAuth library, so an existing
//! authorized token can be dropped into ~/.slotdesk/google/token.json.
//!
//! Modules:
//! - calendar: Google Calendar API v3 (create, lookup, patch, delete)
//! - gmail: Gmail API v1 (send, list replies from a sender)

pub mod calendar;
pub mod gmail;

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::SlotdeskError;

pub use calendar::GoogleCalendarService;
pub use gmail::GmailService;

// ============================================================================
// Token types (compatible with Python's google-auth token format)
// ============================================================================

/// OAuth2 token payload persisted in the token file.
///
/// Both `token` and `access_token` are accepted on read for compat.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GoogleToken {
    #[serde(alias = "access_token")]
    pub token: String,
    pub refresh_token: Option<String>,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Token expiry time (ISO 8601)
    #[serde(default)]
    pub expiry: Option<String>,
}

fn default_token_uri() -> String {
    "https://oauth2.googleapis.com/token".to_string()
}

// ============================================================================
// Error type
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum GoogleApiError {
    #[error("HTTP: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Token expired or revoked")]
    AuthExpired,
    #[error("Token not found at {0}")]
    TokenNotFound(PathBuf),
    #[error("Token refresh failed: {0}")]
    RefreshFailed(String),
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },
    #[error("IO: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl From<GoogleApiError> for SlotdeskError {
    fn from(err: GoogleApiError) -> Self {
        match err {
            GoogleApiError::TokenNotFound(_) => SlotdeskError::Configuration(err.to_string()),
            other => SlotdeskError::Transport(other.to_string()),
        }
    }
}

/// Map a non-success response to an error, 401 meaning an expired token.
pub(crate) async fn check_status(
    resp: reqwest::Response,
) -> Result<reqwest::Response, GoogleApiError> {
    let status = resp.status();
    if status == reqwest::StatusCode::UNAUTHORIZED {
        return Err(GoogleApiError::AuthExpired);
    }
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(GoogleApiError::ApiError {
            status: status.as_u16(),
            message: body,
        });
    }
    Ok(resp)
}

// ============================================================================
// Retry
// ============================================================================

#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_backoff_ms: 250,
            max_backoff_ms: 2_000,
        }
    }
}

fn is_retryable_status(status: reqwest::StatusCode) -> bool {
    status == reqwest::StatusCode::TOO_MANY_REQUESTS
        || status == reqwest::StatusCode::REQUEST_TIMEOUT
        || status.is_server_error()
}

fn retry_delay(
    attempt: u32,
    policy: &RetryPolicy,
    retry_after: Option<&reqwest::header::HeaderValue>,
) -> Duration {
    if let Some(secs) = retry_after
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
    {
        return Duration::from_secs(secs.min(30));
    }

    let exponent = 2u64.saturating_pow(attempt.saturating_sub(1));
    let base = policy
        .initial_backoff_ms
        .saturating_mul(exponent)
        .min(policy.max_backoff_ms);
    let jitter = (std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos() as u64)
        .unwrap_or(0))
        % 150;
    Duration::from_millis(base.saturating_add(jitter))
}

/// Send a request, retrying throttling, 5xx and connect/timeout failures
/// with exponential backoff. Other statuses are returned to the caller.
pub async fn send_with_retry(
    request: reqwest::RequestBuilder,
    policy: &RetryPolicy,
) -> Result<reqwest::Response, GoogleApiError> {
    let attempts = policy.max_attempts.max(1);
    let mut last_error = None;
    for attempt in 1..=attempts {
        let Some(cloned) = request.try_clone() else {
            return request.send().await.map_err(GoogleApiError::Http);
        };

        match cloned.send().await {
            Ok(response) => {
                let status = response.status();
                if is_retryable_status(status) && attempt < attempts {
                    let delay = retry_delay(
                        attempt,
                        policy,
                        response.headers().get(reqwest::header::RETRY_AFTER),
                    );
                    log::warn!(
                        "google_api retry {}/{} after status {} (sleep {:?})",
                        attempt,
                        attempts,
                        status,
                        delay
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Ok(response);
            }
            Err(err) => {
                let retryable_transport = err.is_timeout() || err.is_connect();
                if retryable_transport && attempt < attempts {
                    let delay = retry_delay(attempt, policy, None);
                    log::warn!(
                        "google_api retry {}/{} after transport error: {} (sleep {:?})",
                        attempt,
                        attempts,
                        err,
                        delay
                    );
                    last_error = Some(err);
                    tokio::time::sleep(delay).await;
                    continue;
                }
                return Err(GoogleApiError::Http(err));
            }
        }
    }

    Err(match last_error {
        Some(err) => GoogleApiError::Http(err),
        None => GoogleApiError::ApiError {
            status: 0,
            message: "request exhausted retries".to_string(),
        },
    })
}

// ============================================================================
// Token I/O and refresh
// ============================================================================

/// Default token file location.
pub fn default_token_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_default()
        .join(".slotdesk")
        .join("google")
        .join("token.json")
}

/// Check if a token is expired (or within 60 seconds of expiry).
pub fn is_token_expired(token: &GoogleToken) -> bool {
    let Some(expiry_str) = &token.expiry else {
        return true;
    };
    match chrono::DateTime::parse_from_rfc3339(expiry_str) {
        Ok(expiry) => expiry <= chrono::Utc::now() + chrono::Duration::seconds(60),
        Err(_) => true,
    }
}

fn map_refresh_error(status: u16, body: &str) -> GoogleApiError {
    let lowered = body.to_lowercase();
    if (status == 400 || status == 401)
        && (lowered.contains("invalid_grant") || lowered.contains("token has been expired"))
    {
        return GoogleApiError::AuthExpired;
    }
    GoogleApiError::RefreshFailed(format!("HTTP {}: {}", status, body))
}

/// Token file shared by the Gmail and Calendar adapters.
///
/// Refreshes are serialized so concurrent callers never race on the file.
pub struct TokenSource {
    path: PathBuf,
    client: reqwest::Client,
    refresh_lock: Mutex<()>,
}

impl TokenSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            client: reqwest::Client::new(),
            refresh_lock: Mutex::new(()),
        }
    }

    pub fn load(&self) -> Result<GoogleToken, GoogleApiError> {
        if !self.path.exists() {
            return Err(GoogleApiError::TokenNotFound(self.path.clone()));
        }
        let content = std::fs::read_to_string(&self.path)?;
        Ok(serde_json::from_str(&content)?)
    }

    fn save(&self, token: &GoogleToken) -> Result<(), GoogleApiError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(token)?;
        std::fs::write(&self.path, content)?;
        Ok(())
    }

    /// Get a valid access token, refreshing if expired.
    pub async fn access_token(&self) -> Result<String, GoogleApiError> {
        let token = self.load()?;
        if !is_token_expired(&token) {
            return Ok(token.token);
        }

        let _guard = self.refresh_lock.lock().await;
        // Another caller may have refreshed while we waited.
        let token = self.load()?;
        if !is_token_expired(&token) {
            return Ok(token.token);
        }
        let refreshed = self.refresh(&token).await?;
        Ok(refreshed.token)
    }

    async fn refresh(&self, token: &GoogleToken) -> Result<GoogleToken, GoogleApiError> {
        let refresh_token = token
            .refresh_token
            .as_deref()
            .ok_or(GoogleApiError::AuthExpired)?;

        let mut form = vec![
            ("client_id", token.client_id.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];
        if let Some(secret) = token.client_secret.as_deref() {
            form.push(("client_secret", secret));
        }

        let resp = self.client.post(&token.token_uri).form(&form).send().await?;
        let status = resp.status();
        let body_text = resp.text().await.unwrap_or_default();
        if !status.is_success() {
            return Err(map_refresh_error(status.as_u16(), &body_text));
        }

        let body: serde_json::Value = serde_json::from_str(&body_text)?;
        let access_token = body["access_token"]
            .as_str()
            .ok_or_else(|| GoogleApiError::RefreshFailed("No access_token in response".into()))?;
        let expires_in = body["expires_in"].as_u64().unwrap_or(3600);
        let expiry = chrono::Utc::now() + chrono::Duration::seconds(expires_in as i64);

        let mut new_token = token.clone();
        new_token.token = access_token.to_string();
        new_token.expiry = Some(expiry.to_rfc3339());
        self.save(&new_token)?;
        log::info!("Google token refreshed, expires {}", expiry);

        Ok(new_token)
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn token_with_expiry(expiry: Option<String>) -> GoogleToken {
        GoogleToken {
            token: "test".to_string(),
            refresh_token: None,
            token_uri: default_token_uri(),
            client_id: "c".to_string(),
            client_secret: None,
            scopes: vec![],
            expiry,
        }
    }

    #[test]
    fn test_google_token_python_compat() {
        let python_json = r#"{
            "token": "ya29.python-token",
            "refresh_token": "1//python-refresh",
            "token_uri": "https://oauth2.googleapis.com/token",
            "client_id": "client.apps.googleusercontent.com",
            "client_secret": "secret",
            "scopes": [
                "https://www.googleapis.com/auth/calendar",
                "https://www.googleapis.com/auth/gmail.modify"
            ],
            "expiry": "2026-02-08T12:00:00.000000Z",
            "account": "user@company.com",
            "universe_domain": "googleapis.com"
        }"#;

        let token: GoogleToken = serde_json::from_str(python_json).unwrap();
        assert_eq!(token.token, "ya29.python-token");
        assert_eq!(token.scopes.len(), 2);
    }

    #[test]
    fn test_google_token_access_token_alias() {
        let json = r#"{
            "access_token": "ya29.alias-token",
            "refresh_token": "1//refresh",
            "client_id": "client"
        }"#;

        let token: GoogleToken = serde_json::from_str(json).unwrap();
        assert_eq!(token.token, "ya29.alias-token");
        assert_eq!(token.token_uri, "https://oauth2.googleapis.com/token");
    }

    #[test]
    fn test_is_token_expired() {
        assert!(is_token_expired(&token_with_expiry(None)));
        assert!(is_token_expired(&token_with_expiry(Some("garbage".into()))));

        let past = chrono::Utc::now() - chrono::Duration::hours(1);
        assert!(is_token_expired(&token_with_expiry(Some(past.to_rfc3339()))));

        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        assert!(!is_token_expired(&token_with_expiry(Some(future.to_rfc3339()))));
    }

    #[test]
    fn test_map_refresh_error() {
        assert!(matches!(
            map_refresh_error(400, r#"{"error": "invalid_grant"}"#),
            GoogleApiError::AuthExpired
        ));
        assert!(matches!(
            map_refresh_error(500, "boom"),
            GoogleApiError::RefreshFailed(_)
        ));
    }

    #[test]
    fn test_token_source_missing_file() {
        let dir = tempfile::TempDir::new().unwrap();
        let source = TokenSource::new(dir.path().join("token.json"));
        assert!(matches!(source.load(), Err(GoogleApiError::TokenNotFound(_))));

        let err: SlotdeskError = source.load().unwrap_err().into();
        assert!(matches!(err, SlotdeskError::Configuration(_)));
    }

    #[tokio::test]
    async fn test_token_source_valid_token_skips_refresh() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        let future = chrono::Utc::now() + chrono::Duration::hours(1);
        let mut token = token_with_expiry(Some(future.to_rfc3339()));
        token.token = "ya29.fresh".to_string();
        std::fs::write(&path, serde_json::to_string(&token).unwrap()).unwrap();

        let source = TokenSource::new(&path);
        assert_eq!(source.access_token().await.unwrap(), "ya29.fresh");
    }

    #[tokio::test]
    async fn test_token_source_expired_without_refresh_token() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("token.json");
        std::fs::write(&path, serde_json::to_string(&token_with_expiry(None)).unwrap()).unwrap();

        let source = TokenSource::new(&path);
        assert!(matches!(
            source.access_token().await,
            Err(GoogleApiError::AuthExpired)
        ));
    }

    #[test]
    fn test_retry_delay_honours_retry_after_and_caps_backoff() {
        let policy = RetryPolicy::default();
        let header = reqwest::header::HeaderValue::from_static("120");
        assert_eq!(retry_delay(1, &policy, Some(&header)), Duration::from_secs(30));

        let first = retry_delay(1, &policy, None);
        assert!(first >= Duration::from_millis(250) && first < Duration::from_millis(400));
        let late = retry_delay(10, &policy, None);
        assert!(late >= Duration::from_millis(2_000) && late < Duration::from_millis(2_150));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(is_retryable_status(reqwest::StatusCode::TOO_MANY_REQUESTS));
        assert!(is_retryable_status(reqwest::StatusCode::BAD_GATEWAY));
        assert!(!is_retryable_status(reqwest::StatusCode::NOT_FOUND));
    }

    #[test]
    fn test_google_error_maps_to_transport() {
        let err: SlotdeskError = GoogleApiError::AuthExpired.into();
        assert!(err.is_retryable());
    }
}
