//! Panel login session
//!
//! Glues credential validation, the auth probe and persistence together:
//! credentials are saved only after the panel accepted them, and stay saved
//! until `logout`.

use std::time::Duration;
use thiserror::Error;
use tracing::info;

use super::client::{AuthError, XtreamClient, XtreamError};
use super::types::{Credentials, CredentialsError, XtreamAuthResponse};
use crate::services::store::{CredentialStore, KeyValueStore, StoreError};

#[derive(Debug, Error)]
pub enum LoginError {
    #[error(transparent)]
    InvalidInput(#[from] CredentialsError),
    #[error(transparent)]
    Auth(#[from] AuthError),
    #[error("Failed to persist credentials: {0}")]
    Store(#[from] StoreError),
}

impl From<XtreamError> for LoginError {
    fn from(e: XtreamError) -> Self {
        LoginError::Auth(AuthError::Network(e))
    }
}

/// HTTP settings for panel clients
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub user_agent: String,
    pub timeout: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            user_agent: super::client::DEFAULT_USER_AGENT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Authenticated panel session
pub struct PanelSession {
    client: XtreamClient,
    account: Option<XtreamAuthResponse>,
}

impl PanelSession {
    /// Validate input, probe the panel, and persist the credentials on success
    pub async fn login<S: KeyValueStore>(
        raw_url: &str,
        username: &str,
        password: &str,
        store: &CredentialStore<S>,
        options: &ClientOptions,
    ) -> Result<Self, LoginError> {
        let creds = Credentials::new(raw_url, username, password)?;
        Self::login_with(creds, store, options).await
    }

    /// Same as `login` for already-normalized credentials (e.g. from a playlist link)
    pub async fn login_with<S: KeyValueStore>(
        creds: Credentials,
        store: &CredentialStore<S>,
        options: &ClientOptions,
    ) -> Result<Self, LoginError> {
        let client = XtreamClient::new(creds, &options.user_agent, options.timeout)?;
        let account = client.authenticate().await?;

        store.save(client.credentials()).await?;
        info!("Logged in to {}", client.credentials().server);

        Ok(Self {
            client,
            account: Some(account),
        })
    }

    /// Session from previously saved credentials, without contacting the panel
    pub async fn restore<S: KeyValueStore>(
        store: &CredentialStore<S>,
        options: &ClientOptions,
    ) -> Result<Option<Self>, LoginError> {
        let Some(creds) = store.load().await? else {
            return Ok(None);
        };

        let client = XtreamClient::new(creds, &options.user_agent, options.timeout)?;
        info!("Restored session for {}", client.credentials().server);

        Ok(Some(Self {
            client,
            account: None,
        }))
    }

    /// Forget the saved credentials
    pub async fn logout<S: KeyValueStore>(self, store: &CredentialStore<S>) -> Result<(), LoginError> {
        store.clear().await?;
        info!("Logged out of {}", self.client.credentials().server);
        Ok(())
    }

    pub fn client(&self) -> &XtreamClient {
        &self.client
    }

    pub fn credentials(&self) -> &Credentials {
        self.client.credentials()
    }

    /// Account info from the login probe; `None` for restored sessions
    pub fn account(&self) -> Option<&XtreamAuthResponse> {
        self.account.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::store::MemoryStore;
    use axum::{extract::Query, routing::get, Router};
    use std::collections::HashMap;

    async fn spawn_panel() -> String {
        let app = Router::new().route(
            "/player_api.php",
            get(|Query(q): Query<HashMap<String, String>>| async move {
                if q.get("password").map(String::as_str) == Some("good") {
                    r#"{"user_info":{"auth":1,"status":"Active"}}"#
                } else {
                    r#"{"user_info":{"auth":0}}"#
                }
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        // No scheme on purpose: login must add it
        addr.to_string()
    }

    #[tokio::test]
    async fn test_login_persists_credentials() {
        let server = spawn_panel().await;
        let store = CredentialStore::new(MemoryStore::new());

        let session = PanelSession::login(&server, "user", "good", &store, &ClientOptions::default())
            .await
            .unwrap();

        assert!(session.account().is_some());
        let saved = store.load().await.unwrap().unwrap();
        assert_eq!(saved.server, format!("http://{}", server));
        assert_eq!(&saved, session.credentials());

        let restored = PanelSession::restore(&store, &ClientOptions::default())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(restored.credentials(), &saved);
        assert!(restored.account().is_none());

        restored.logout(&store).await.unwrap();
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rejected_login_not_persisted() {
        let server = spawn_panel().await;
        let store = CredentialStore::new(MemoryStore::new());

        let result = PanelSession::login(&server, "user", "bad", &store, &ClientOptions::default()).await;

        assert!(matches!(result, Err(LoginError::Auth(AuthError::Rejected { .. }))));
        assert!(store.load().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_login_requires_all_fields() {
        let store = CredentialStore::new(MemoryStore::new());
        let result = PanelSession::login("host", "", "pw", &store, &ClientOptions::default()).await;
        assert!(matches!(
            result,
            Err(LoginError::InvalidInput(CredentialsError::MissingField("username")))
        ));
    }

    #[tokio::test]
    async fn test_restore_without_saved_session() {
        let store = CredentialStore::new(MemoryStore::new());
        assert!(PanelSession::restore(&store, &ClientOptions::default())
            .await
            .unwrap()
            .is_none());
    }
}
