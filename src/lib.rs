//! Xiaozhi voice-dialogue server library.
//!
//! A WebSocket server that accepts embedded-device voice connections,
//! pipes audio through a VAD gate and a pluggable ASR provider, drives a
//! streaming dialogue model, and speaks the reply back through a pluggable
//! TTS provider — with barge-in, wake-word short-circuit, and both manual
//! and automatic listening modes.
//!
//! # Example
//!
//! ```ignore
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     my_agent::server::start("0.0.0.0", 8000).await
//! }
//! ```

pub mod types;
pub mod agent;
pub mod config;
pub mod server;
pub mod voice;
pub mod cli;

pub use config::Config;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Library name
pub const NAME: &str = env!("CARGO_PKG_NAME");

/// Get the library info
pub fn info() -> String {
    format!("{} v{} - Xiaozhi voice-dialogue server", NAME, VERSION)
}

/// Truncate a string to at most `max_chars` characters, appending an
/// ellipsis marker when truncated. Used to keep error/debug logging from
/// dumping entire provider response bodies.
pub fn truncate_safe(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let truncated: String = s.chars().take(max_chars).collect();
    format!("{truncated}... [truncated]")
}
