//! Session Orchestrator: the per-connection state machine wiring VAD,
//! ASR, dialogue, TTS and outbound audio framing together.
//!
//! Generalizes `server/realtime_voice.rs`'s connection-handling loop
//! (inbound reader task + outbound sender task bridged by channels) to
//! the five-stage pipeline spec.md describes, with the barge-in and
//! wake-word short-circuit behavior grounded on `helloHandle.py` and
//! the auto-mode "drop a second final" behavior fenced by
//! [`crate::voice::session::SentenceEpoch`] instead of a boolean flag
//! threaded through every callback.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, Mutex};

use crate::voice::asr::{AsrInputEvent, AsrProvider};
use crate::voice::audio_codec::{OpusDecoder, OpusEncoder, FRAME_SAMPLES};
use crate::voice::dialogue::DialogueMessage;
use crate::voice::errors::PipelineError;
use crate::voice::llm::DialogueModel;
use crate::voice::protocol::{AudioParams, ServerMessage, TtsState};
use crate::voice::report::{ReportSink, TurnReport};
use crate::voice::session::{ListenMode, Session, SessionState};
use crate::voice::tools::ToolRegistry;
use crate::voice::tts::{split_into_spoken_sentences, TtsInput, TtsProvider};
use crate::voice::vad::{Vad, VadConfig};
use crate::voice::wakeword::WakeWordCache;

/// One outbound item the WebSocket sender task writes to the device:
/// either a JSON control message or a raw Opus frame. Binary frames
/// carry the sentence epoch they were produced under so the writer can
/// fence a barge-in: frames already queued for an aborted turn are
/// skipped instead of trickling out after the device has moved on.
pub enum OutboundEvent {
    Json(ServerMessage),
    Binary { epoch: u8, frame: Vec<u8> },
}

/// Floor below which an auto-mode utterance is treated as a false VAD
/// trigger and discarded rather than dispatched, grounded on
/// `asr/base.py::ASRProviderBase.receive_audio`'s `if len(asr_audio_task) > 15`.
const MIN_UTTERANCE_FRAMES: u32 = 15;

/// Fixed set of wake-word replies, grounded on `helloHandle.py`'s
/// `WAKEUP_CONFIG["reply"]` list of canned greetings picked at random
/// rather than always answering with the same phrase.
const WAKE_GREETINGS: &[&str] = &["我在", "在的", "我在呢", "哎，我在"];

fn pick_wake_greeting() -> &'static str {
    use rand::Rng;
    let idx = rand::rng().random_range(0..WAKE_GREETINGS.len());
    WAKE_GREETINGS[idx]
}

pub struct Orchestrator {
    session: Arc<Session>,
    asr_provider: Arc<dyn AsrProvider>,
    tts_provider: Arc<dyn TtsProvider>,
    dialogue_model: Arc<dyn DialogueModel>,
    tools: Arc<ToolRegistry>,
    report_sink: Arc<dyn ReportSink>,
    wake_cache: Arc<WakeWordCache>,
    /// Configured wake phrases, pre-cleaned the same way ASR finals
    /// are before comparison (see [`crate::voice::asr::remove_punctuation_and_length`]).
    wake_words: Vec<String>,
    outbound: mpsc::Sender<OutboundEvent>,
    decoder: Mutex<OpusDecoder>,
    vad: Mutex<Vad>,
    /// Sender half of the currently open ASR turn's input channel, if
    /// any. Replaced (dropping the previous one, which tears down that
    /// provider worker) every time a new turn opens.
    current_turn: Mutex<Option<mpsc::Sender<AsrInputEvent>>>,
    /// Frames forwarded to the ASR provider so far this turn, and
    /// whether any speech has been observed yet — together these gate
    /// the auto-mode silence-triggered finalize against the
    /// minimum-utterance floor.
    turn_frame_count: Mutex<u32>,
    turn_had_speech: Mutex<bool>,
}

impl Orchestrator {
    pub fn new(
        session: Arc<Session>,
        asr_provider: Arc<dyn AsrProvider>,
        tts_provider: Arc<dyn TtsProvider>,
        dialogue_model: Arc<dyn DialogueModel>,
        tools: Arc<ToolRegistry>,
        report_sink: Arc<dyn ReportSink>,
        wake_cache: Arc<WakeWordCache>,
        wake_words: Vec<String>,
        outbound: mpsc::Sender<OutboundEvent>,
    ) -> Result<Self, PipelineError> {
        let wake_words = wake_words
            .iter()
            .map(|w| crate::voice::asr::remove_punctuation_and_length(w).1)
            .collect();
        Ok(Self {
            decoder: Mutex::new(OpusDecoder::new()?),
            vad: Mutex::new(Vad::with_config(VadConfig::for_listen_mode(ListenMode::Auto))),
            session,
            asr_provider,
            tts_provider,
            dialogue_model,
            tools,
            report_sink,
            wake_cache,
            wake_words,
            current_turn: Mutex::new(None),
            turn_frame_count: Mutex::new(0),
            turn_had_speech: Mutex::new(false),
        })
    }

    pub fn session_id(&self) -> &str {
        &self.session.session_id
    }

    pub async fn send_hello(self: &Arc<Self>) {
        let _ = self
            .outbound
            .send(OutboundEvent::Json(ServerMessage::Hello {
                session_id: self.session.session_id.clone(),
                audio_params: AudioParams::default(),
            }))
            .await;
    }

    /// Start a fresh listening turn: resets VAD/decoder state, opens a
    /// new ASR handle, and spawns the worker that drains its results.
    /// Used for an explicit `listen.start`; an auto-mode VAD voice_start
    /// edge with no prior `listen.start` opens a turn via [`Self::open_turn`]
    /// directly instead, since it must not reset VAD mid-onset.
    pub async fn start_listening(self: &Arc<Self>, mode: ListenMode) -> Result<(), PipelineError> {
        *self.session.listen_mode.lock().unwrap() = mode;
        self.session.asr_audio_ring.lock().unwrap().clear();
        *self.vad.lock().await = Vad::with_config(VadConfig::for_listen_mode(mode));
        self.open_turn(mode).await
    }

    /// Open a new ASR turn without touching VAD/decoder/pre-roll
    /// state. Shared by [`Self::start_listening`] (explicit
    /// `listen.start`) and the auto-mode VAD voice_start edge in
    /// [`Self::handle_inbound_opus`], which must open ASR mid-stream
    /// without resetting the VAD that just detected the onset.
    async fn open_turn(self: &Arc<Self>, mode: ListenMode) -> Result<(), PipelineError> {
        self.session.state.store(SessionState::Listening);
        *self.turn_frame_count.lock().await = 0;
        *self.turn_had_speech.lock().await = false;

        let epoch = self.session.sentence_epoch.current();
        let handle = self.asr_provider.open(mode).await?;
        *self.current_turn.lock().await = Some(handle.input.clone());

        self.spawn_result_drain(handle.output, epoch, mode);
        Ok(())
    }

    /// Device-initiated end of utterance (manual mode `listen.stop`).
    /// State flips to `Recognizing` before `VoiceStop` is sent so the
    /// result drain never observes a final for this turn while the
    /// state still reads `Listening`.
    pub async fn stop_listening(self: &Arc<Self>) {
        self.session.state.store(SessionState::Recognizing);
        if let Some(tx) = self.current_turn.lock().await.as_ref() {
            let _ = tx.send(AsrInputEvent::VoiceStop).await;
        }
    }

    /// Abort the current turn: bump the epoch so any in-flight worker
    /// silently drops its output, drop the ASR handle, and return to
    /// idle. Used for explicit `abort` messages and barge-in. Queued
    /// outbound frames of the aborted epoch are fenced at the writer
    /// (see [`OutboundEvent::Binary`]), not drained here.
    pub async fn abort(self: &Arc<Self>) {
        self.session.sentence_epoch.advance();
        *self.current_turn.lock().await = None;
        self.session.state.store(SessionState::Idle);
    }

    /// Feed one decoded-from-the-wire Opus packet through VAD-gated
    /// ASR forwarding. Pushes every frame into the pre-roll ring
    /// regardless of voice activity so a late VAD onset doesn't clip
    /// the first syllable.
    pub async fn handle_inbound_opus(self: &Arc<Self>, packet: &[u8]) -> Result<(), PipelineError> {
        let pcm = {
            let mut decoder = self.decoder.lock().await;
            match decoder.decode(packet) {
                Ok(pcm) => pcm,
                Err(e) => {
                    tracing::warn!(error = %e, "dropping malformed opus packet");
                    return Ok(());
                }
            }
        };

        // Barge-in: speech arriving while the device is being spoken
        // to interrupts the current turn before anything else happens.
        if self.session.state.load() == SessionState::Speaking {
            self.abort().await;
            let mode = *self.session.listen_mode.lock().unwrap();
            self.start_listening(mode).await?;
        }

        let is_speech = self.feed_vad(&pcm).await?;
        let mode = *self.session.listen_mode.lock().unwrap();

        // Auto-mode VAD voice_start edge: a device that never sent an
        // explicit `listen.start` still gets a turn opened the instant
        // VAD detects speech, mirroring `receive_audio`'s implicit
        // turn start (spec §4.1's audio-path state entry). The ring
        // snapshot is taken before this frame is pushed below, so the
        // replayed pre-roll and the frame sent just after it don't
        // overlap.
        if mode == ListenMode::Auto && is_speech && self.current_turn.lock().await.is_none() {
            let preroll = self.session.asr_audio_ring.lock().unwrap().snapshot();
            self.open_turn(mode).await?;
            if let Some(tx) = self.current_turn.lock().await.as_ref() {
                let _ = tx.send(AsrInputEvent::Preroll(preroll)).await;
            }
        }

        self.session.asr_audio_ring.lock().unwrap().push(pcm.clone());

        let turn = self.current_turn.lock().await;
        let Some(tx) = turn.as_ref() else { return Ok(()) };

        if is_speech {
            *self.turn_had_speech.lock().await = true;
            *self.turn_frame_count.lock().await += 1;
            let _ = tx.send(AsrInputEvent::Frame(pcm)).await;
        } else if mode == ListenMode::Auto
            && self.vad.lock().await.current_state() == crate::voice::vad::VadState::Silence
            && self.session.state.load() == SessionState::Listening
        {
            // Hangover elapsed: end this utterance if it ever contained
            // speech, per the auto-mode voice_stop edge (§4.1).
            let had_speech = std::mem::replace(&mut *self.turn_had_speech.lock().await, false);
            if had_speech {
                let frame_count = *self.turn_frame_count.lock().await;
                if frame_count > MIN_UTTERANCE_FRAMES {
                    let _ = tx.send(AsrInputEvent::VoiceStop).await;
                    self.session.state.store(SessionState::Recognizing);
                } else {
                    tracing::debug!(frame_count, "discarding short utterance below minimum-utterance gate");
                    drop(turn);
                    self.abort().await;
                }
            }
        }
        Ok(())
    }

    async fn feed_vad(&self, pcm: &[i16]) -> Result<bool, PipelineError> {
        let vad = self.vad.lock().await;
        let mut any_speech = false;
        for chunk in pcm.chunks(crate::voice::vad::DEFAULT_FRAME_SIZE) {
            if chunk.len() < crate::voice::vad::DEFAULT_FRAME_SIZE {
                break;
            }
            let samples: Vec<f32> = chunk.iter().map(|s| *s as f32 / i16::MAX as f32).collect();
            if vad
                .process_frame(&samples)
                .map_err(|e| PipelineError::protocol(format!("vad error: {e}")))?
            {
                any_speech = true;
            }
        }
        let _ = FRAME_SAMPLES;
        Ok(any_speech || vad.is_speech())
    }

    /// Device-reported wake-word detection (`listen.state = "detect_wakeword"`),
    /// e.g. from an on-device keyword spotter rather than a cloud ASR
    /// final. Short-circuits straight to the cached greeting.
    pub async fn trigger_wake_word(self: &Arc<Self>) {
        let device_id = self.session.device_id.clone();
        let epoch = self.session.sentence_epoch.current();
        self.handle_wake_word(&device_id, String::new(), epoch).await;
    }

    /// Wake-word short circuit: bypass dialogue/LLM entirely, answer
    /// with a cached greeting, and still record the exchange in
    /// history and the turn report, per `helloHandle.py`. `epoch` fences
    /// the reply's outbound frames the same way a dispatched turn's
    /// TTS output is fenced, so a barge-in arriving mid-greeting drops
    /// the rest of it at the writer.
    async fn handle_wake_word(self: &Arc<Self>, voice_id: &str, asr_text: String, epoch: u8) {
        let started_at = Utc::now();
        if self.session.just_woken_up.swap(true, std::sync::atomic::Ordering::SeqCst) {
            self.session.state.store(SessionState::Idle);
            return;
        }
        let sentence_id = self.session.new_sentence_id();
        let tts_provider = self.tts_provider.clone();
        let (text, wav) = self
            .wake_cache
            .get_or_refresh(voice_id, move |voice_id| {
                let tts_provider = tts_provider.clone();
                async move {
                    let greeting = pick_wake_greeting().to_string();
                    let handle = tts_provider
                        .open()
                        .await
                        .map_err(|e| anyhow::anyhow!(e.to_string()))?;
                    let mut input = handle.input;
                    let mut output = handle.output;
                    input
                        .send(TtsInput { sentence_id: voice_id.clone(), text: greeting.clone() })
                        .await
                        .map_err(|_| anyhow::anyhow!("tts channel closed"))?;
                    drop(input);
                    let result = output.recv().await.ok_or_else(|| anyhow::anyhow!("tts produced no audio"))?;
                    Ok((greeting, result.opus_frames))
                }
            })
            .await;
        let cached_frames = wav;

        if !self.session.sentence_epoch.is_current(epoch) {
            return;
        }

        let _ = self
            .outbound
            .send(OutboundEvent::Json(ServerMessage::Tts {
                state: TtsState::Start,
                sentence_id: sentence_id.clone(),
                text: Some(text.clone()),
            }))
            .await;
        for frame in cached_frames {
            let _ = self.outbound.send(OutboundEvent::Binary { epoch, frame }).await;
        }
        let _ = self
            .outbound
            .send(OutboundEvent::Json(ServerMessage::Tts {
                state: TtsState::Stop,
                sentence_id,
                text: None,
            }))
            .await;

        {
            let mut history = self.session.history.lock().await;
            if !asr_text.is_empty() {
                history.push(DialogueMessage::user(asr_text.clone(), None));
            }
            history.push(DialogueMessage::assistant(text.clone()));
        }
        self.session.touch();
        self.session.state.store(SessionState::Idle);

        self.report_sink
            .report(TurnReport {
                session_id: self.session.session_id.clone(),
                device_id: self.session.device_id.clone(),
                asr_text,
                reply_text: text,
                started_at,
                finished_at: Utc::now(),
            })
            .await;

        let grace = crate::voice::wakeword::WAKE_GRACE_PERIOD;
        let session = self.session.clone();
        tokio::spawn(async move {
            tokio::time::sleep(grace).await;
            session.just_woken_up.store(false, std::sync::atomic::Ordering::SeqCst);
        });
    }

    /// Drain ASR results for one turn. In auto mode the first final
    /// result dispatches immediately. In manual mode a final arriving
    /// before `listen.stop` (state still `Listening`) is accumulated
    /// rather than dispatched or dropped, since manual mode's only
    /// finalize signal is `listen.stop` itself (spec §4.2); dispatch
    /// happens on the first final observed once state has flipped to
    /// `Recognizing`. Whichever way the loop ends, the turn slot is
    /// released so a later VAD voice_start edge or `listen.start` can
    /// open a fresh stream — including the ASR-transport-flap case,
    /// where the channel closes without ever producing a final.
    fn spawn_result_drain(self: &Arc<Self>, mut output: mpsc::Receiver<crate::voice::asr::AsrResult>, epoch: u8, mode: ListenMode) {
        let this = self.clone();
        tokio::spawn(async move {
            let mut accumulated = String::new();
            let mut dispatched = false;
            while let Some(result) = output.recv().await {
                if !this.session.sentence_epoch.is_current(epoch) {
                    return;
                }
                if result.is_final {
                    accumulated.push_str(&result.text);
                    let ready = mode == ListenMode::Auto || this.session.state.load() == SessionState::Recognizing;
                    if ready {
                        dispatched = true;
                        this.clone().dispatch_turn(accumulated, epoch).await;
                        break;
                    }
                    // Manual mode, still listening: keep draining for
                    // more finals until `listen.stop` flips the state.
                } else {
                    let _ = this
                        .outbound
                        .send(OutboundEvent::Json(ServerMessage::Stt { text: result.text }))
                        .await;
                }
            }
            if this.session.sentence_epoch.is_current(epoch) {
                *this.current_turn.lock().await = None;
                if !dispatched {
                    this.session.state.store(SessionState::Idle);
                }
            }
        });
    }

    /// Run dialogue + TTS for one finished ASR turn, streaming
    /// sentence-by-sentence so the device starts hearing a reply
    /// before the full completion has arrived.
    async fn dispatch_turn(self: Arc<Self>, asr_text: String, epoch: u8) {
        if !self.session.sentence_epoch.is_current(epoch) {
            return;
        }
        self.session.state.store(SessionState::Dispatching);
        let started_at = Utc::now();

        let (_len, cleaned) = crate::voice::asr::remove_punctuation_and_length(&asr_text);
        if cleaned.is_empty() {
            self.session.state.store(SessionState::Idle);
            return;
        }

        if self.wake_words.iter().any(|w| w == &cleaned) {
            self.handle_wake_word(&self.session.device_id.clone(), asr_text, epoch).await;
            return;
        }

        {
            let mut history = self.session.history.lock().await;
            history.push(DialogueMessage::user(asr_text.clone(), None));
        }

        let Ok(mut token_rx) = self
            .dialogue_model
            .stream_reply(self.session.history.lock().await.messages())
            .await
        else {
            self.session.state.store(SessionState::Idle);
            return;
        };

        self.session.state.store(SessionState::Speaking);
        let Ok(tts_handle) = self.tts_provider.open().await else {
            self.session.state.store(SessionState::Idle);
            return;
        };
        let mut tts_input = tts_handle.input;
        let mut tts_output = tts_handle.output;

        let mut buffer = String::new();
        let mut full_reply = String::new();
        let mut sentence_index = 0u32;

        let _ = self
            .outbound
            .send(OutboundEvent::Json(ServerMessage::Tts {
                state: TtsState::Start,
                sentence_id: self.session.session_id.clone(),
                text: None,
            }))
            .await;

        while let Some(chunk) = token_rx.recv().await {
            if !self.session.sentence_epoch.is_current(epoch) {
                return;
            }
            buffer.push_str(&chunk);
            full_reply.push_str(&chunk);
            let sentences = split_into_spoken_sentences(&buffer);
            if sentences.len() > 1 {
                for sentence in &sentences[..sentences.len() - 1] {
                    sentence_index += 1;
                    let sentence_id = format!("{}-{sentence_index}", self.session.session_id);
                    let _ = tts_input
                        .send(TtsInput { sentence_id, text: sentence.clone() })
                        .await;
                }
                buffer = sentences.last().cloned().unwrap_or_default();
            }
        }
        if !buffer.trim().is_empty() {
            sentence_index += 1;
            let sentence_id = format!("{}-{sentence_index}", self.session.session_id);
            let _ = tts_input.send(TtsInput { sentence_id, text: buffer.clone() }).await;
        }
        drop(tts_input);

        while let Some(output) = tts_output.recv().await {
            if !self.session.sentence_epoch.is_current(epoch) {
                return;
            }
            let _ = self
                .outbound
                .send(OutboundEvent::Json(ServerMessage::Tts {
                    state: TtsState::SentenceStart,
                    sentence_id: output.sentence_id.clone(),
                    text: None,
                }))
                .await;
            for frame in output.opus_frames {
                let _ = self.outbound.send(OutboundEvent::Binary { epoch, frame }).await;
            }
            let _ = self
                .outbound
                .send(OutboundEvent::Json(ServerMessage::Tts {
                    state: TtsState::SentenceEnd,
                    sentence_id: output.sentence_id,
                    text: None,
                }))
                .await;
        }

        let _ = self
            .outbound
            .send(OutboundEvent::Json(ServerMessage::Tts {
                state: TtsState::Stop,
                sentence_id: self.session.session_id.clone(),
                text: None,
            }))
            .await;

        {
            let mut history = self.session.history.lock().await;
            history.push(DialogueMessage::assistant(full_reply.clone()));
        }
        self.session.touch();
        self.session.state.store(SessionState::Idle);

        self.report_sink
            .report(TurnReport {
                session_id: self.session.session_id.clone(),
                device_id: self.session.device_id.clone(),
                asr_text,
                reply_text: full_reply,
                started_at,
                finished_at: Utc::now(),
            })
            .await;
    }

}

/// Encode a batch of PCM frames for tests without going through a
/// provider connection.
#[allow(dead_code)]
fn encode_for_test(encoder: &mut OpusEncoder, pcm: &[i16]) -> Vec<u8> {
    encoder.encode_frame(pcm).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vad_frame_chunking_matches_opus_frame_size() {
        assert_eq!(FRAME_SAMPLES % crate::voice::vad::DEFAULT_FRAME_SIZE, 0);
    }
}
