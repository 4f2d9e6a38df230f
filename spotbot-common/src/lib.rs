pub mod format;
pub mod types;

pub use format::{escape_html, format_frequency, format_spot};
pub use types::{DisplayFields, SourceKind, Spot, SpotTime, parse_timestamp};
