pub mod content;
pub mod price;

pub use content::{ContentItem, ContentKind, Platform, StreamCandidate};
pub use price::{Direction, PriceRecord, PriceSnapshot, TickerState};
