pub mod config;
pub mod delivery;
pub mod frontend;
pub mod utils;

pub use config::{DeliveryConfig, TelegramConfig};
pub use delivery::{DeliveryOutcome, DeliverySender};
pub use frontend::TelegramSink;
pub use utils::{Disposition, MessageSink, SinkError};
