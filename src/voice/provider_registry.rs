//! Selects concrete ASR/TTS provider implementations from
//! configuration. Grounded on `voice-core`'s `create_stt_engine`/
//! `create_tts_engine` factory functions (from the reference pack,
//! not the teacher): a small tagged config enum per provider family,
//! matched once at startup into a trait object the rest of the server
//! only ever sees through [`crate::voice::asr::AsrProvider`]/
//! [`crate::voice::tts::TtsProvider`].

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::voice::asr::http_oneshot::{HttpOneshotAsrConfig, HttpOneshotAsrProvider};
use crate::voice::asr::local::LocalAsrProvider;
use crate::voice::asr::streaming_ws::{StreamingWsAsrConfig, StreamingWsAsrProvider};
use crate::voice::asr::AsrProvider;
use crate::voice::errors::PipelineError;
use crate::voice::tts::http_chunked::{HttpChunkedTtsConfig, HttpChunkedTtsProvider};
use crate::voice::tts::streaming_ws::{StreamingWsTtsConfig, StreamingWsTtsProvider};
use crate::voice::tts::TtsProvider;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AsrProviderConfig {
    StreamingWs { endpoint: String, api_key: String, model: String },
    HttpOneshot { endpoint: String, api_key: String },
    Local,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TtsProviderConfig {
    StreamingWs { endpoint: String, api_key: String, voice: String },
    HttpChunked { endpoint: String, api_key: String, voice: String },
}

impl Default for AsrProviderConfig {
    fn default() -> Self {
        AsrProviderConfig::Local
    }
}

impl Default for TtsProviderConfig {
    fn default() -> Self {
        TtsProviderConfig::HttpChunked {
            endpoint: String::new(),
            api_key: String::new(),
            voice: "default".to_string(),
        }
    }
}

pub struct ProviderRegistry {
    asr: Arc<dyn AsrProvider>,
    tts: Arc<dyn TtsProvider>,
}

impl ProviderRegistry {
    pub fn build(
        asr_config: &AsrProviderConfig,
        tts_config: &TtsProviderConfig,
        http_client: reqwest::Client,
    ) -> Result<Self, PipelineError> {
        let asr: Arc<dyn AsrProvider> = match asr_config {
            AsrProviderConfig::StreamingWs { endpoint, api_key, model } => {
                Arc::new(StreamingWsAsrProvider::new(StreamingWsAsrConfig {
                    endpoint: endpoint.clone(),
                    api_key: api_key.clone(),
                    model: model.clone(),
                }))
            }
            AsrProviderConfig::HttpOneshot { endpoint, api_key } => {
                Arc::new(HttpOneshotAsrProvider::new(
                    http_client.clone(),
                    HttpOneshotAsrConfig { endpoint: endpoint.clone(), api_key: api_key.clone() },
                ))
            }
            AsrProviderConfig::Local => Arc::new(LocalAsrProvider),
        };

        let tts: Arc<dyn TtsProvider> = match tts_config {
            TtsProviderConfig::StreamingWs { endpoint, api_key, voice } => {
                Arc::new(StreamingWsTtsProvider::new(StreamingWsTtsConfig {
                    endpoint: endpoint.clone(),
                    api_key: api_key.clone(),
                    voice: voice.clone(),
                }))
            }
            TtsProviderConfig::HttpChunked { endpoint, api_key, voice } => {
                Arc::new(HttpChunkedTtsProvider::new(
                    http_client.clone(),
                    HttpChunkedTtsConfig {
                        endpoint: endpoint.clone(),
                        api_key: api_key.clone(),
                        voice: voice.clone(),
                    },
                ))
            }
        };

        Ok(Self { asr, tts })
    }

    pub fn asr(&self) -> Arc<dyn AsrProvider> {
        self.asr.clone()
    }

    pub fn tts(&self) -> Arc<dyn TtsProvider> {
        self.tts.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builds_local_and_http_chunked_by_default() {
        let registry = ProviderRegistry::build(
            &AsrProviderConfig::default(),
            &TtsProviderConfig::default(),
            reqwest::Client::new(),
        )
        .unwrap();
        assert_eq!(registry.asr().name(), "local");
        assert_eq!(registry.tts().name(), "http_chunked");
    }
}
