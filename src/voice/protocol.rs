//! Device <-> server WebSocket JSON message protocol.
//!
//! Tagged-enum style grounded on `server/realtime_voice.rs`'s
//! `ClientMessage`/`ServerMessage`, generalized to the field names
//! spec §6 gives for the Xiaozhi device protocol: `hello`/`listen`/
//! `abort`/`tts`/`iot`/`mcp` text frames plus raw binary Opus frames
//! (never wrapped in JSON — the device sends/receives those directly
//! over the WebSocket as binary messages).

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    Hello {
        #[serde(default)]
        device_id: Option<String>,
        #[serde(default)]
        audio_params: Option<AudioParams>,
    },
    Listen {
        state: ListenState,
        #[serde(default)]
        mode: Option<String>,
    },
    Abort {
        #[serde(default)]
        reason: Option<String>,
    },
    Iot {
        #[serde(default)]
        descriptors: Option<serde_json::Value>,
        #[serde(default)]
        states: Option<serde_json::Value>,
    },
    Mcp {
        payload: serde_json::Value,
    },
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ListenState {
    Start,
    Stop,
    /// Wake-word or push-to-talk detection payload arriving inline
    /// with a listen message.
    DetectWakeword,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AudioParams {
    pub format: String,
    pub sample_rate: u32,
    pub channels: u32,
    pub frame_duration: u32,
}

impl Default for AudioParams {
    fn default() -> Self {
        Self {
            format: "opus".to_string(),
            sample_rate: crate::voice::audio_codec::SAMPLE_RATE,
            channels: crate::voice::audio_codec::CHANNELS,
            frame_duration: crate::voice::audio_codec::FRAME_DURATION_MS,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Hello {
        session_id: String,
        audio_params: AudioParams,
    },
    Stt {
        text: String,
    },
    /// Marks the start/continuation/end of a TTS audio sequence for
    /// one `sentence_id`. Binary Opus frames follow out-of-band on
    /// the same socket between `Start` and `Stop`.
    Tts {
        state: TtsState,
        sentence_id: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Error {
        message: String,
    },
}

#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TtsState {
    Start,
    SentenceStart,
    SentenceEnd,
    Stop,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_hello_message() {
        let json = r#"{"type":"hello","device_id":"aa:bb:cc"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        matches!(msg, ClientMessage::Hello { .. });
    }

    #[test]
    fn parses_listen_message() {
        let json = r#"{"type":"listen","state":"start","mode":"auto"}"#;
        let msg: ClientMessage = serde_json::from_str(json).unwrap();
        match msg {
            ClientMessage::Listen { state, mode } => {
                assert_eq!(state, ListenState::Start);
                assert_eq!(mode.as_deref(), Some("auto"));
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn serializes_tts_server_message() {
        let msg = ServerMessage::Tts { state: TtsState::SentenceStart, sentence_id: "abc".into(), text: Some("hi".into()) };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"type\":\"tts\""));
        assert!(json.contains("\"sentence_start\""));
    }
}
