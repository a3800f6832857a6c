//! Xtream Codes API Types
//!
//! Credentials plus the response shapes of the Player API v2 that this crate
//! consumes. Panels disagree on whether numeric fields are sent as numbers or
//! strings, so most fields go through the lenient deserializers below.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use url::Url;

/// Scheme prepended when the user types a bare host
const DEFAULT_SCHEME: &str = "http://";

/// Invalid login input
#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),
}

/// Normalized panel credentials
///
/// Downstream code treats this as an opaque capability: it is only ever used
/// to build API and playback URLs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    /// Server base URL, scheme included, no trailing slash (e.g. "http://example.com:8080")
    pub server: String,
    pub username: String,
    pub password: String,
}

impl Credentials {
    /// Validate and normalize raw login input
    pub fn new(raw_url: &str, username: &str, password: &str) -> Result<Self, CredentialsError> {
        let raw_url = raw_url.trim();
        let username = username.trim();

        if raw_url.is_empty() {
            return Err(CredentialsError::MissingField("url"));
        }
        if username.is_empty() {
            return Err(CredentialsError::MissingField("username"));
        }
        if password.is_empty() {
            return Err(CredentialsError::MissingField("password"));
        }

        Ok(Self {
            server: normalize_server(raw_url)?,
            username: username.to_string(),
            password: password.to_string(),
        })
    }

    /// Player API endpoint; credentials go in the query string
    pub fn api_url(&self) -> String {
        format!("{}/player_api.php", self.server)
    }

    /// Build EPG XML URL
    pub fn epg_url(&self) -> String {
        format!(
            "{}/xmltv.php?username={}&password={}",
            self.server,
            urlencoding::encode(&self.username),
            urlencoding::encode(&self.password)
        )
    }
}

/// Prepend a scheme when missing and strip trailing slashes
fn normalize_server(raw: &str) -> Result<String, CredentialsError> {
    let with_scheme = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("{}{}", DEFAULT_SCHEME, raw)
    };

    let server = with_scheme.trim_end_matches('/').to_string();

    let parsed = Url::parse(&server).map_err(|e| CredentialsError::InvalidUrl(e.to_string()))?;
    if parsed.host_str().is_none() {
        return Err(CredentialsError::InvalidUrl(format!("no host in {}", raw)));
    }

    Ok(server)
}

// ============================================================================
// Lenient field decoding
// ============================================================================

/// Accept a string, number or bool and keep it as a string; null becomes None
pub(crate) fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value: Value = Deserialize::deserialize(deserializer)?;
    Ok(value_as_string(&value))
}

pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        _ => None,
    }
}

// ============================================================================
// Authentication Response Types
// ============================================================================

/// Main authentication response from player_api.php (no action)
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamAuthResponse {
    #[serde(default)]
    pub user_info: XtreamUserInfo,
}

impl XtreamAuthResponse {
    /// The panel accepted the credentials: `user_info.auth` is `1` or `"1"`
    pub fn is_authenticated(&self) -> bool {
        match &self.user_info.auth {
            Value::Number(n) => n.as_u64() == Some(1),
            Value::String(s) => s == "1",
            _ => false,
        }
    }
}

/// User account information
#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct XtreamUserInfo {
    #[serde(default)]
    pub auth: Value,
    #[serde(default, deserialize_with = "string_or_number")]
    pub status: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub message: Option<String>,
    #[serde(default, deserialize_with = "string_or_number")]
    pub exp_date: Option<String>,
}

impl XtreamUserInfo {
    /// Parse expiration timestamp to Unix timestamp
    pub fn exp_timestamp(&self) -> Option<i64> {
        self.exp_date.as_ref()?.parse().ok()
    }

    /// Human readable rejection reason, if the panel gave one
    pub fn rejection_reason(&self) -> Option<String> {
        self.message.clone().or_else(|| self.status.clone())
    }
}

// ============================================================================
// Category Types
// ============================================================================

/// Category for live, VOD, or series
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct XtreamCategory {
    #[serde(deserialize_with = "required_string")]
    pub category_id: String,
    pub category_name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}

fn required_string<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    use serde::de::Error;

    string_or_number(deserializer)?.ok_or_else(|| D::Error::custom("expected string or number"))
}
