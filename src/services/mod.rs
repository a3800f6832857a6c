pub mod playback;
pub mod price_feed;
pub mod store;
pub mod xtream;
