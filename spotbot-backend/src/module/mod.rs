pub mod detector;
pub mod scheduled;
pub mod source;
pub mod stream;
pub mod tracker;
