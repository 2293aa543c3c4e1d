//! Per-connection session data model (spec data model section).
//!
//! Grounded on `core/providers/asr/base.py`'s `conn` object (the
//! catch-all per-connection state the Python server threads through
//! every handler) and the teacher's atomic-state-machine style for
//! session lifecycle (`server/device.rs`'s device handle pattern).

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::Arc;
use std::time::Instant;

use uuid::Uuid;

use crate::voice::dialogue::DialogueHistory;

/// Ring buffer of the last N inbound PCM frames, used both as ASR
/// pre-roll (replayed once the provider's recognition task is ready,
/// so the syllable that triggered VAD onset isn't lost) and as the
/// source for concurrent voiceprint identification. Capacity 10
/// frames (600ms), grounded on
/// `asr/base.py::receive_audio`'s `conn.asr_audio[-10:]`.
pub struct AsrAudioRing {
    capacity: usize,
    buf: VecDeque<Vec<i16>>,
}

impl AsrAudioRing {
    pub fn new(capacity: usize) -> Self {
        Self { capacity, buf: VecDeque::with_capacity(capacity) }
    }

    pub fn push(&mut self, frame: Vec<i16>) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(frame);
    }

    pub fn snapshot(&self) -> Vec<Vec<i16>> {
        self.buf.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }
}

impl Default for AsrAudioRing {
    fn default() -> Self {
        Self::new(10)
    }
}

/// How the device is currently gating end-of-utterance detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenMode {
    /// Server-side VAD decides when the utterance ends.
    Auto,
    /// The device itself sends an explicit stop-listening message;
    /// hangover is widened to avoid cutting off mid-thought pauses.
    Manual,
}

impl ListenMode {
    /// VAD hangover / `max_sentence_silence` in milliseconds for this
    /// mode. Grounded on `aliyunbl_stream.py::_start_recognition`
    /// (`max_sentence_silence=6000` in manual mode) and spec's default
    /// auto-mode silence window.
    pub fn hangover_ms(self) -> u64 {
        match self {
            ListenMode::Auto => 600,
            ListenMode::Manual => 6000,
        }
    }
}

/// The orchestrator's coarse-grained state machine (spec §4.1 table).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Listening = 1,
    Recognizing = 2,
    Dispatching = 3,
    Speaking = 4,
    Terminated = 5,
}

impl SessionState {
    fn from_u8(v: u8) -> Self {
        match v {
            1 => SessionState::Listening,
            2 => SessionState::Recognizing,
            3 => SessionState::Dispatching,
            4 => SessionState::Speaking,
            5 => SessionState::Terminated,
            _ => SessionState::Idle,
        }
    }
}

/// Lock-free atomic holder for [`SessionState`], read from multiple
/// workers (inbound reader, TTS output worker) without a mutex.
pub struct SessionStateCell(AtomicU8);

impl SessionStateCell {
    pub fn new(state: SessionState) -> Self {
        Self(AtomicU8::new(state as u8))
    }

    pub fn load(&self) -> SessionState {
        SessionState::from_u8(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, state: SessionState) {
        self.0.store(state as u8, Ordering::SeqCst);
    }

    /// Atomically swap to `new` only if currently `expected`. Used to
    /// fence barge-in against a turn that is already transitioning.
    pub fn compare_exchange(&self, expected: SessionState, new: SessionState) -> bool {
        self.0
            .compare_exchange(expected as u8, new as u8, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }
}

/// A monotonically increasing fence for the current turn. Every
/// worker that produces output for a turn captures the epoch at
/// start; if the epoch has since advanced (new wake word, barge-in,
/// or a fresh listen cycle) the worker silently drops its output
/// instead of racing it onto the wire.
#[derive(Clone)]
pub struct SentenceEpoch(Arc<AtomicU8>);

impl SentenceEpoch {
    pub fn new() -> Self {
        Self(Arc::new(AtomicU8::new(0)))
    }

    pub fn current(&self) -> u8 {
        self.0.load(Ordering::SeqCst)
    }

    pub fn advance(&self) -> u8 {
        self.0.fetch_add(1, Ordering::SeqCst).wrapping_add(1)
    }

    pub fn is_current(&self, epoch: u8) -> bool {
        self.current() == epoch
    }
}

impl Default for SentenceEpoch {
    fn default() -> Self {
        Self::new()
    }
}

/// Per-device session state, owned by the Session Orchestrator and
/// shared (via `Arc`) with its workers.
pub struct Session {
    pub session_id: String,
    pub device_id: String,
    pub client_id: String,
    pub state: SessionStateCell,
    pub listen_mode: std::sync::Mutex<ListenMode>,
    pub sentence_epoch: SentenceEpoch,
    pub history: tokio::sync::Mutex<DialogueHistory>,
    pub asr_audio_ring: std::sync::Mutex<AsrAudioRing>,
    pub asr_audio_for_voiceprint: std::sync::Mutex<Vec<Vec<i16>>>,
    pub created_at: Instant,
    pub last_active: std::sync::Mutex<Instant>,
    /// Set for the few seconds after a wake word short-circuits
    /// straight to a cached TTS response, per `helloHandle.py`'s
    /// 3-second post-wake grace window.
    pub just_woken_up: std::sync::atomic::AtomicBool,
}

impl Session {
    pub fn new(device_id: impl Into<String>, client_id: impl Into<String>) -> Self {
        let now = Instant::now();
        Self {
            session_id: Uuid::new_v4().to_string(),
            device_id: device_id.into(),
            client_id: client_id.into(),
            state: SessionStateCell::new(SessionState::Idle),
            listen_mode: std::sync::Mutex::new(ListenMode::Auto),
            sentence_epoch: SentenceEpoch::new(),
            history: tokio::sync::Mutex::new(DialogueHistory::new(50)),
            asr_audio_ring: std::sync::Mutex::new(AsrAudioRing::default()),
            asr_audio_for_voiceprint: std::sync::Mutex::new(Vec::new()),
            created_at: now,
            last_active: std::sync::Mutex::new(now),
            just_woken_up: std::sync::atomic::AtomicBool::new(false),
        }
    }

    /// Re-mint the sentence_id epoch for a fresh turn, grounded on
    /// `helloHandle.py`'s `conn.sentence_id = str(uuid4().hex)` before
    /// a wake-word reply.
    pub fn new_sentence_id(&self) -> String {
        Uuid::new_v4().simple().to_string()
    }

    pub fn touch(&self) {
        *self.last_active.lock().unwrap() = Instant::now();
    }

    pub fn idle_duration(&self) -> std::time::Duration {
        self.last_active.lock().unwrap().elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_respects_capacity() {
        let mut ring = AsrAudioRing::new(3);
        for i in 0..5 {
            ring.push(vec![i as i16]);
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 3);
        assert_eq!(snap[0], vec![2]);
        assert_eq!(snap[2], vec![4]);
    }

    #[test]
    fn listen_mode_hangover_differs() {
        assert_eq!(ListenMode::Auto.hangover_ms(), 600);
        assert_eq!(ListenMode::Manual.hangover_ms(), 6000);
    }

    #[test]
    fn sentence_epoch_fences_stale_workers() {
        let epoch = SentenceEpoch::new();
        let captured = epoch.current();
        assert!(epoch.is_current(captured));
        epoch.advance();
        assert!(!epoch.is_current(captured));
    }

    #[test]
    fn state_cell_compare_exchange() {
        let cell = SessionStateCell::new(SessionState::Idle);
        assert!(cell.compare_exchange(SessionState::Idle, SessionState::Listening));
        assert!(!cell.compare_exchange(SessionState::Idle, SessionState::Speaking));
        assert_eq!(cell.load(), SessionState::Listening);
    }
}
