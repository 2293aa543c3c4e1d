//! TTS provider abstraction, the outbound mirror of `voice::asr`.
//!
//! Grounded on `core/providers/tts/base.py::TTSProviderBase`'s
//! text-to-speech-stream contract, again reworked around message
//! passing: `open()` spawns the provider's worker and hands back a
//! sender for sentence text plus a receiver of Opus-encoded frame
//! batches, one batch per sentence, bracketed the same way
//! `server/realtime_voice.rs` brackets its outbound audio sends.

pub mod http_chunked;
pub mod streaming_ws;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::voice::errors::PipelineError;

/// One sentence of assistant text to synthesize, already split at a
/// sentence boundary by the orchestrator's streaming LLM consumer.
#[derive(Debug, Clone)]
pub struct TtsInput {
    pub sentence_id: String,
    pub text: String,
}

/// Synthesized Opus frames for one sentence, in playback order.
#[derive(Debug, Clone)]
pub struct TtsOutput {
    pub sentence_id: String,
    pub opus_frames: Vec<Vec<u8>>,
}

pub struct TtsHandle {
    pub input: mpsc::Sender<TtsInput>,
    pub output: mpsc::Receiver<TtsOutput>,
}

#[async_trait]
pub trait TtsProvider: Send + Sync {
    async fn open(&self) -> Result<TtsHandle, PipelineError>;

    fn name(&self) -> &str;
}

/// Split assistant text into sentences at terminal punctuation, after
/// stripping Markdown emphasis/heading/list markers the dialogue model
/// may have produced — text meant to be spoken should never contain
/// `**`, `#`, or bullet dashes. Grounded on
/// `util.py::get_string_no_punctuation_or_emoji` combined with the
/// streaming sentence-splitter `dialogue.py` drives its TTS queue from.
pub fn split_into_spoken_sentences(text: &str) -> Vec<String> {
    let stripped = strip_markdown(text);
    let mut sentences = Vec::new();
    let mut current = String::new();
    for c in stripped.chars() {
        current.push(c);
        if matches!(c, '。' | '！' | '？' | '.' | '!' | '?' | '\n') {
            let trimmed = current.trim();
            if !trimmed.is_empty() {
                sentences.push(trimmed.to_string());
            }
            current.clear();
        }
    }
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    sentences
}

fn strip_markdown(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '*' | '_' | '`' => continue,
            '#' => {
                while chars.peek() == Some(&'#') {
                    chars.next();
                }
                if chars.peek() == Some(&' ') {
                    chars.next();
                }
            }
            '-' if out.ends_with('\n') || out.is_empty() => {
                if chars.peek() == Some(&' ') {
                    chars.next();
                }
            }
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_on_terminal_punctuation() {
        let sentences = split_into_spoken_sentences("Hello there. How are you? Fine!");
        assert_eq!(sentences, vec!["Hello there.", "How are you?", "Fine!"]);
    }

    #[test]
    fn strips_markdown_before_splitting() {
        let sentences = split_into_spoken_sentences("**Bold** statement. # Heading here.");
        assert_eq!(sentences, vec!["Bold statement.", "Heading here."]);
    }

    #[test]
    fn handles_cjk_terminal_punctuation() {
        let sentences = split_into_spoken_sentences("你好。今天天气怎么样？");
        assert_eq!(sentences, vec!["你好。", "今天天气怎么样？"]);
    }
}
