//! ASR provider abstraction.
//!
//! Trait shape grounded on `core/providers/asr/base.py::ASRProviderBase`
//! (`open_audio_channels`/`receive_audio`/`handle_voice_stop`/
//! `speech_to_text`/`close`), but reworked around message passing
//! instead of an object the orchestrator calls methods on directly:
//! `open()` spawns the provider's own worker task and hands back a
//! channel pair, the same shape `server/realtime_voice.rs` uses to
//! bridge its sender task to the outbound WebSocket. This sidesteps
//! the dyn-compatibility problems of `async fn` in traits for
//! long-lived streaming connections.

pub mod http_oneshot;
pub mod local;
pub mod streaming_ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::voice::errors::PipelineError;
use crate::voice::session::ListenMode;

/// Events the orchestrator feeds into an open ASR stream.
#[derive(Debug, Clone)]
pub enum AsrInputEvent {
    /// One decoded 60ms PCM frame, voice-gated (VAD already
    /// classified it as speech or pre-roll).
    Frame(Vec<i16>),
    /// Pre-roll frames to replay once the provider's recognition
    /// task is ready, so the syllable that triggered VAD onset isn't
    /// lost. Grounded on `aliyunbl_stream.py::_forward_results`'s
    /// replay of `conn.asr_audio[-10:]` on `task-started`.
    Preroll(Vec<Vec<i16>>),
    /// The device (manual mode) or VAD (auto mode) has signaled
    /// end-of-utterance.
    VoiceStop,
}

/// A result emitted by a streaming ASR provider.
#[derive(Debug, Clone)]
pub struct AsrResult {
    pub text: String,
    pub is_final: bool,
}

/// Handle to one open ASR turn: feed audio in, read transcripts out.
/// Dropping `input` (or sending nothing further) lets the provider's
/// worker task tear itself down.
pub struct AsrHandle {
    pub input: mpsc::Sender<AsrInputEvent>,
    pub output: mpsc::Receiver<AsrResult>,
}

#[async_trait]
pub trait AsrProvider: Send + Sync {
    /// Open a new recognition turn. `mode` decides the
    /// `max_sentence_silence`-equivalent dispatch policy: in
    /// [`ListenMode::Manual`] the provider accumulates every final
    /// result it observes and emits exactly one combined final once
    /// `VoiceStop` arrives; in [`ListenMode::Auto`] the first final
    /// result is emitted and dispatched immediately and any further
    /// finals for this turn are dropped by the provider.
    async fn open(&self, mode: ListenMode) -> Result<AsrHandle, PipelineError>;

    fn name(&self) -> &str;
}

/// Strip punctuation (full- and half-width) and surrounding
/// whitespace, returning `(char_count, cleaned_text)`. A literal
/// "Yeah" is special-cased to an empty result, matching
/// `util.py::remove_punctuation_and_length`'s handling of a common
/// ASR filler-word false positive.
pub fn remove_punctuation_and_length(text: &str) -> (usize, String) {
    if text.trim() == "Yeah" {
        return (0, String::new());
    }
    let cleaned: String = text
        .chars()
        .filter(|c| !c.is_whitespace() && !is_punctuation(*c))
        .collect();
    (cleaned.chars().count(), cleaned)
}

fn is_punctuation(c: char) -> bool {
    const HALF_WIDTH: &str = ",.!?;:\"'()[]{}<>-_=+*&^%$#@~`|\\/";
    const FULL_WIDTH: &str = "，。！？；：“”‘’（）【】《》、·…—";
    HALF_WIDTH.contains(c) || FULL_WIDTH.contains(c)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_punctuation_and_counts_chars() {
        let (len, cleaned) = remove_punctuation_and_length("你好，世界！");
        assert_eq!(cleaned, "你好世界");
        assert_eq!(len, 4);
    }

    #[test]
    fn yeah_filler_is_discarded() {
        let (len, cleaned) = remove_punctuation_and_length("Yeah");
        assert_eq!(len, 0);
        assert!(cleaned.is_empty());
    }
}
