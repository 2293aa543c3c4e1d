//! Opus <-> PCM framing.
//!
//! The wire format is always mono 16kHz 16-bit PCM chunked into
//! 60ms (960-sample) frames, each frame individually Opus-encoded.
//! Grounded on `core/utils/util.py::audio_to_data`/`pcm_to_data_stream`
//! (frame size, zero-padding the final partial frame) and
//! `core/providers/asr/base.py`'s per-packet decode loop (a single bad
//! Opus packet is logged and dropped, not fatal to the session).

use crate::voice::errors::PipelineError;

pub const SAMPLE_RATE: u32 = 16_000;
pub const CHANNELS: u32 = 1;
pub const FRAME_DURATION_MS: u32 = 60;
pub const FRAME_SAMPLES: usize = (SAMPLE_RATE as usize * FRAME_DURATION_MS as usize) / 1000;

/// Stateful Opus decoder for one session's inbound audio. Not
/// `Send`-shared; owned by the single worker that reads frames off
/// the device WebSocket.
pub struct OpusDecoder {
    inner: audiopus::coder::Decoder,
}

impl OpusDecoder {
    pub fn new() -> Result<Self, PipelineError> {
        let inner = audiopus::coder::Decoder::new(
            audiopus::SampleRate::Hz16000,
            audiopus::Channels::Mono,
        )
        .map_err(|e| PipelineError::codec(format!("failed to create opus decoder: {e}")))?;
        Ok(Self { inner })
    }

    /// Decode one Opus packet into 16-bit PCM samples. Per
    /// `asr/base.py`'s decode loop, a malformed packet yields an
    /// error the caller should log and skip rather than treat as
    /// fatal to the session.
    pub fn decode(&mut self, packet: &[u8]) -> Result<Vec<i16>, PipelineError> {
        let mut pcm = vec![0i16; FRAME_SAMPLES];
        let decoded = self
            .inner
            .decode(Some(packet.try_into().map_err(|_| PipelineError::codec("empty opus packet"))?), &mut pcm, false)
            .map_err(|e| PipelineError::codec(format!("opus decode failed: {e}")))?;
        pcm.truncate(decoded);
        Ok(pcm)
    }
}

/// Stateful Opus encoder for one session's outbound TTS audio.
pub struct OpusEncoder {
    inner: audiopus::coder::Encoder,
}

impl OpusEncoder {
    pub fn new() -> Result<Self, PipelineError> {
        let inner = audiopus::coder::Encoder::new(
            audiopus::SampleRate::Hz16000,
            audiopus::Channels::Mono,
            audiopus::Application::Voip,
        )
        .map_err(|e| PipelineError::codec(format!("failed to create opus encoder: {e}")))?;
        Ok(Self { inner })
    }

    /// Encode a single 960-sample (60ms) frame. The caller is
    /// responsible for zero-padding the final partial frame before
    /// calling this, per `audio_to_data`'s framing rule.
    pub fn encode_frame(&mut self, pcm: &[i16]) -> Result<Vec<u8>, PipelineError> {
        debug_assert_eq!(pcm.len(), FRAME_SAMPLES);
        let mut out = vec![0u8; 4000];
        let n = self
            .inner
            .encode(pcm, &mut out)
            .map_err(|e| PipelineError::codec(format!("opus encode failed: {e}")))?;
        out.truncate(n);
        Ok(out)
    }
}

/// Split raw little-endian 16-bit PCM into 960-sample frames,
/// zero-padding only the final partial frame. Mirrors
/// `util.py::pcm_to_data_stream`.
pub fn chunk_pcm_frames(pcm: &[i16]) -> Vec<Vec<i16>> {
    let mut frames: Vec<Vec<i16>> = pcm.chunks(FRAME_SAMPLES).map(|c| c.to_vec()).collect();
    if let Some(last) = frames.last_mut() {
        if last.len() < FRAME_SAMPLES {
            last.resize(FRAME_SAMPLES, 0);
        }
    }
    frames
}

/// Encode a full PCM buffer into a sequence of Opus packets, one per
/// 60ms frame.
pub fn pcm_to_opus_frames(encoder: &mut OpusEncoder, pcm: &[i16]) -> Result<Vec<Vec<u8>>, PipelineError> {
    chunk_pcm_frames(pcm)
        .iter()
        .map(|frame| encoder.encode_frame(frame))
        .collect()
}

/// Wrap mono 16-bit/16kHz PCM as a WAV byte buffer (manual RIFF
/// header construction). Grounded on
/// `util.py::opus_datas_to_wav_bytes`/`asr/base.py::_pcm_to_wav` —
/// used only for the wake-word cache's persisted audio and for
/// reporting a turn's audio to the control plane.
pub fn pcm_to_wav_bytes(pcm: &[i16]) -> Vec<u8> {
    let data_len = pcm.len() * 2;
    let byte_rate = SAMPLE_RATE * CHANNELS * 2;
    let block_align = (CHANNELS * 2) as u16;

    let mut buf = Vec::with_capacity(44 + data_len);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&((36 + data_len) as u32).to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&(CHANNELS as u16).to_le_bytes());
    buf.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&16u16.to_le_bytes()); // bits per sample
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&(data_len as u32).to_le_bytes());
    for sample in pcm {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

/// Read the PCM payload back out of a WAV buffer produced by
/// [`pcm_to_wav_bytes`] (used when replaying a cached wake-word
/// response file).
pub fn wav_bytes_to_pcm(wav: &[u8]) -> Result<Vec<i16>, PipelineError> {
    if wav.len() < 44 || &wav[0..4] != b"RIFF" || &wav[8..12] != b"WAVE" {
        return Err(PipelineError::codec("not a valid WAV buffer"));
    }
    let data = &wav[44..];
    Ok(data
        .chunks_exact(2)
        .map(|b| i16::from_le_bytes([b[0], b[1]]))
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_pcm_frames_pads_final_frame() {
        let pcm = vec![1i16; FRAME_SAMPLES + 10];
        let frames = chunk_pcm_frames(&pcm);
        assert_eq!(frames.len(), 2);
        assert_eq!(frames[0].len(), FRAME_SAMPLES);
        assert_eq!(frames[1].len(), FRAME_SAMPLES);
        assert_eq!(frames[1][10], 0);
    }

    #[test]
    fn wav_round_trip() {
        let pcm: Vec<i16> = (0..FRAME_SAMPLES as i16).collect();
        let wav = pcm_to_wav_bytes(&pcm);
        let recovered = wav_bytes_to_pcm(&wav).unwrap();
        assert_eq!(recovered, pcm);
    }

    #[test]
    fn wav_bytes_rejects_non_wav_input() {
        assert!(wav_bytes_to_pcm(b"not a wav file").is_err());
    }
}
