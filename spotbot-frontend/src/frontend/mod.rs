pub mod telegram;

pub use telegram::TelegramSink;
