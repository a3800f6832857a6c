//! Xtream Codes API Client
//!
//! HTTP client for the Xtream Codes Player API v2 endpoints used by the
//! login and browse flows.

use super::catalog::{decode_episodes, decode_items, CategoryAction};
use super::types::{Credentials, XtreamAuthResponse, XtreamCategory};
use crate::models::{ContentItem, ContentKind};
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

/// Default request timeout
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Default user agent; many panels block unknown clients
pub const DEFAULT_USER_AGENT: &str = "VLC/3.0.20 LibVLC/3.0.20";

/// Xtream API Error types
///
/// Every variant is a "network error" from the caller's point of view: the
/// panel could not be reached or did not answer with usable JSON.
#[derive(Debug, Error)]
pub enum XtreamError {
    /// Network/connection error, timeouts included
    #[error("Network error: {0}")]
    Network(String),
    /// HTTP error (non-2xx status)
    #[error("HTTP error: {0}")]
    Http(u16),
    /// JSON parsing error
    #[error("Parse error: {0}")]
    Parse(String),
    /// Empty response from server
    #[error("Empty response")]
    EmptyResponse,
}

impl From<reqwest::Error> for XtreamError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            XtreamError::Network("Connection timeout - server did not respond".to_string())
        } else if e.is_connect() {
            XtreamError::Network("Connection failed - server unreachable".to_string())
        } else {
            // The request URL carries the credentials in its query string
            XtreamError::Network(e.without_url().to_string())
        }
    }
}

/// Outcome of a failed credential probe
#[derive(Debug, Error)]
pub enum AuthError {
    /// Well-formed answer, but the auth flag was not set
    #[error("Authentication failed{}", reason_suffix(.message))]
    Rejected { message: Option<String> },
    #[error(transparent)]
    Network(#[from] XtreamError),
}

fn reason_suffix(message: &Option<String>) -> String {
    message.as_deref().map(|m| format!(": {}", m)).unwrap_or_default()
}

/// Xtream API Client
pub struct XtreamClient {
    http: Client,
    creds: Credentials,
}

impl XtreamClient {
    /// Create a new Xtream client
    pub fn new(creds: Credentials, user_agent: &str, timeout: Duration) -> Result<Self, XtreamError> {
        let http = Client::builder()
            .user_agent(user_agent)
            .timeout(timeout)
            .gzip(true)
            // Many Xtream servers have self-signed certs
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(|e| XtreamError::Network(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self { http, creds })
    }

    /// Create with default user agent and timeout
    pub fn from_credentials(creds: &Credentials) -> Result<Self, XtreamError> {
        Self::new(
            creds.clone(),
            DEFAULT_USER_AGENT,
            Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        )
    }

    pub fn credentials(&self) -> &Credentials {
        &self.creds
    }

    /// GET player_api.php with optional action and extra query parameters
    async fn get_text(&self, action: Option<&str>, extra: &[(&str, &str)]) -> Result<String, XtreamError> {
        let mut query: Vec<(&str, &str)> = vec![
            ("username", self.creds.username.as_str()),
            ("password", self.creds.password.as_str()),
        ];
        if let Some(action) = action {
            query.push(("action", action));
        }
        query.extend_from_slice(extra);

        debug!("Xtream API request: {}", action.unwrap_or("auth"));

        let response = self
            .http
            .get(self.creds.api_url())
            .query(&query)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(XtreamError::Http(status.as_u16()));
        }

        let text = response.text().await?;
        if text.trim().is_empty() {
            return Err(XtreamError::EmptyResponse);
        }

        Ok(text)
    }

    async fn get_json(&self, action: Option<&str>, extra: &[(&str, &str)]) -> Result<Value, XtreamError> {
        let text = self.get_text(action, extra).await?;

        serde_json::from_str(&text).map_err(|e| {
            error!(
                "Failed to parse Xtream response for action '{}': {}",
                action.unwrap_or("auth"),
                e
            );
            debug!("Response text: {}", truncate(&text, 500));
            XtreamError::Parse(e.to_string())
        })
    }

    /// Like `get_json`, but an unparseable or empty body becomes `Null`
    async fn get_json_lenient(&self, action: &str, extra: &[(&str, &str)]) -> Result<Value, XtreamError> {
        match self.get_json(Some(action), extra).await {
            Ok(value) => Ok(value),
            Err(XtreamError::Parse(_)) | Err(XtreamError::EmptyResponse) => {
                warn!("Xtream action '{}' returned no usable JSON, treating as empty", action);
                Ok(Value::Null)
            }
            Err(e) => Err(e),
        }
    }

    // ========================================================================
    // Authentication
    // ========================================================================

    /// Probe the panel with the stored credentials.
    ///
    /// Succeeds only if `user_info.auth` is `1`.
    pub async fn authenticate(&self) -> Result<XtreamAuthResponse, AuthError> {
        let body = self.get_json(None, &[]).await?;

        // Some panels answer a bad login with `[]`; that is a rejection, not a fault
        let auth: XtreamAuthResponse = if body.is_object() {
            serde_json::from_value(body).map_err(|e| XtreamError::Parse(e.to_string()))?
        } else {
            XtreamAuthResponse::default()
        };

        if !auth.is_authenticated() {
            warn!("Xtream login rejected for server {}", self.creds.server);
            return Err(AuthError::Rejected {
                message: auth.user_info.rejection_reason(),
            });
        }

        info!(
            "Xtream credentials validated. Server: {}, Status: {:?}, Expires: {:?}",
            self.creds.server,
            auth.user_info.status,
            auth.user_info.exp_date
        );

        Ok(auth)
    }

    // ========================================================================
    // Categories
    // ========================================================================

    /// Get categories for a content kind
    pub async fn categories(&self, kind: ContentKind) -> Result<Vec<XtreamCategory>, XtreamError> {
        let action = match kind {
            ContentKind::Live => "get_live_categories",
            ContentKind::Movie => "get_vod_categories",
            ContentKind::Series => "get_series_categories",
        };

        let body = self.get_json_lenient(action, &[]).await?;
        let Value::Array(entries) = body else {
            return Ok(Vec::new());
        };

        Ok(entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect())
    }

    // ========================================================================
    // Listings
    // ========================================================================

    /// List catalog items, optionally restricted to one category.
    ///
    /// Transport failures are errors; a malformed body is an empty list.
    pub async fn list(
        &self,
        action: CategoryAction,
        category_id: Option<&str>,
    ) -> Result<Vec<ContentItem>, XtreamError> {
        let extra: Vec<(&str, &str)> = category_id.map(|id| ("category_id", id)).into_iter().collect();

        let body = self.get_json_lenient(action.action(), &extra).await?;
        let items = decode_items(&body, action);

        debug!("Xtream {} returned {} items", action.action(), items.len());
        Ok(items)
    }

    /// Episodes of a series, flattened across seasons
    pub async fn series_episodes(&self, series_id: &str) -> Result<Vec<ContentItem>, XtreamError> {
        let body = self
            .get_json_lenient("get_series_info", &[("series_id", series_id)])
            .await?;
        Ok(decode_episodes(&body))
    }
}

fn truncate(text: &str, max: usize) -> &str {
    match text.char_indices().nth(max) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}
