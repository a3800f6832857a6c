//! Xtream Codes Integration
//!
//! Client side of the Xtream Codes Player API v2.
//!
//! # Overview
//!
//! - **Login**: normalize user input, probe `player_api.php`, persist on success
//! - **Browse**: category listings decoded permissively into [`ContentItem`]s
//! - **Resolve**: build ordered playback URL candidates for an item
//!
//! # Usage
//!
//! ```rust,ignore
//! use panelcast::services::xtream::{build_candidates, CategoryAction, PanelSession};
//!
//! let session = PanelSession::login("host:8080", "user", "pass", &store, &options).await?;
//! let channels = session.client().list(CategoryAction::LiveStreams, None).await?;
//! let candidates = build_candidates(session.credentials(), &channels[0], platform, &policy);
//! ```
//!
//! [`ContentItem`]: crate::models::ContentItem

pub mod candidates;
pub mod catalog;
pub mod client;
pub mod detector;
pub mod session;
pub mod types;

// Re-exports for convenience
pub use candidates::{build_candidates, redact_url, ExtensionPolicy, SegmentedFirst};
pub use catalog::CategoryAction;
pub use client::{AuthError, XtreamClient, XtreamError};
pub use detector::extract_credentials;
pub use session::{ClientOptions, LoginError, PanelSession};
pub use types::{Credentials, CredentialsError, XtreamAuthResponse, XtreamCategory, XtreamUserInfo};
