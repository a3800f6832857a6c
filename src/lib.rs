//! Panelcast
//!
//! Two independent client flows:
//!
//! - **IPTV**: log in to an Xtream Codes panel, browse its catalog, build
//!   ordered playback URL candidates and fall back through them on error.
//! - **Price ticker**: poll a price feed on a fixed interval and publish the
//!   latest good snapshot.

pub mod config;
pub mod models;
pub mod services;
