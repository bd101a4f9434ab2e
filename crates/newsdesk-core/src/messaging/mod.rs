//! Transport abstractions (Telegram today, anything with text + photos later).

pub mod port;
pub mod throttled;
pub mod types;
