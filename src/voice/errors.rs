//! Closed error classification for the voice pipeline.
//!
//! A closed enum plus a classifier, rather than a generic
//! `anyhow::Error` everywhere a retry or a client-facing error code
//! decision is needed.

use thiserror::Error;

/// A closed classification of everything that can go wrong while a
/// session is running. Distinct from `anyhow::Error`, which remains
/// the currency for CLI/config-layer failures that never reach a
/// device.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("audio codec error: {0}")]
    Codec(String),

    #[error("ASR provider error: {0}")]
    Asr(String),

    #[error("TTS provider error: {0}")]
    Tts(String),

    #[error("dialogue model error: {0}")]
    Dialogue(String),

    #[error("device not bound (bind code: {bind_code})")]
    DeviceNotBound { bind_code: String },

    #[error("device not found: {mac_address}")]
    DeviceNotFound { mac_address: String },

    #[error("provider connection error: {0}")]
    Connection(#[from] std::io::Error),

    #[error("protocol error: {0}")]
    Protocol(String),
}

impl PipelineError {
    pub fn codec(msg: impl Into<String>) -> Self {
        Self::Codec(msg.into())
    }

    pub fn asr(msg: impl Into<String>) -> Self {
        Self::Asr(msg.into())
    }

    pub fn tts(msg: impl Into<String>) -> Self {
        Self::Tts(msg.into())
    }

    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}

/// Classification used to decide whether an outbound provider call
/// (ASR, TTS, or the control-plane REST client) should be retried.
/// Grounded on `manage_api_client.py::_should_retry`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryClass {
    Retryable,
    BusinessError,
    Fatal,
}

/// Classify an HTTP status code the way the control-plane client and
/// every streaming provider connection attempt do. Status codes
/// `{408, 429, 500, 502, 503, 504}` are retryable; everything else
/// that isn't a recognized business error is fatal.
pub fn classify_status(status: u16) -> RetryClass {
    match status {
        408 | 429 | 500 | 502 | 503 | 504 => RetryClass::Retryable,
        10041 | 10042 => RetryClass::BusinessError,
        _ => RetryClass::Fatal,
    }
}

/// Classify a lower-level transport error (connect refused, timeout,
/// DNS failure) the way `httpx.ConnectError` / `TimeoutException` /
/// `NetworkError` are treated in the original control-plane client:
/// always retryable.
pub fn classify_transport_error(_err: &anyhow::Error) -> RetryClass {
    RetryClass::Retryable
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_status_codes() {
        for code in [408, 429, 500, 502, 503, 504] {
            assert_eq!(classify_status(code), RetryClass::Retryable);
        }
    }

    #[test]
    fn business_error_codes_are_not_retried() {
        assert_eq!(classify_status(10041), RetryClass::BusinessError);
        assert_eq!(classify_status(10042), RetryClass::BusinessError);
    }

    #[test]
    fn unknown_status_is_fatal() {
        assert_eq!(classify_status(404), RetryClass::Fatal);
    }
}
