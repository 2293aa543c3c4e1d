//! One-shot HTTP TTS: POST the full sentence text, receive a WAV
//! response body, chunk and re-encode it to Opus locally. Grounded on
//! `voice-core/src/tts/cloud.rs`'s HTTP-synthesis shape, reusing
//! [`crate::voice::retry::RetryPolicy`] the same way
//! `voice::asr::http_oneshot` does.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::voice::audio_codec::{pcm_to_opus_frames, wav_bytes_to_pcm, OpusEncoder};
use crate::voice::errors::{classify_transport_error, PipelineError};
use crate::voice::retry::RetryPolicy;
use crate::voice::tts::{TtsHandle, TtsInput, TtsOutput, TtsProvider};

#[derive(Debug, Clone)]
pub struct HttpChunkedTtsConfig {
    pub endpoint: String,
    pub api_key: String,
    pub voice: String,
}

pub struct HttpChunkedTtsProvider {
    client: reqwest::Client,
    config: HttpChunkedTtsConfig,
    retry: RetryPolicy,
}

impl HttpChunkedTtsProvider {
    pub fn new(client: reqwest::Client, config: HttpChunkedTtsConfig) -> Self {
        Self { client, config, retry: RetryPolicy::default() }
    }

    async fn synthesize(&self, text: &str) -> Result<Vec<u8>, PipelineError> {
        let endpoint = self.config.endpoint.clone();
        let api_key = self.config.api_key.clone();
        let voice = self.config.voice.clone();
        let text = text.to_string();
        let client = self.client.clone();
        self.retry
            .run("tts.http_chunked", |e| classify_transport_error(e), move || {
                let endpoint = endpoint.clone();
                let api_key = api_key.clone();
                let voice = voice.clone();
                let text = text.clone();
                let client = client.clone();
                async move {
                    let resp = client
                        .post(&endpoint)
                        .bearer_auth(&api_key)
                        .json(&serde_json::json!({ "text": text, "voice": voice }))
                        .send()
                        .await?;
                    if !resp.status().is_success() {
                        anyhow::bail!("tts http status {}", resp.status());
                    }
                    Ok(resp.bytes().await?.to_vec())
                }
            })
            .await
            .map_err(|e| PipelineError::tts(e.to_string()))
    }
}

#[async_trait]
impl TtsProvider for HttpChunkedTtsProvider {
    async fn open(&self) -> Result<TtsHandle, PipelineError> {
        let (input_tx, mut input_rx) = mpsc::channel::<TtsInput>(16);
        let (output_tx, output_rx) = mpsc::channel::<TtsOutput>(16);

        let client = self.client.clone();
        let config = self.config.clone();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            let provider = HttpChunkedTtsProvider { client, config, retry };
            while let Some(TtsInput { sentence_id, text }) = input_rx.recv().await {
                let opus_frames = match provider.synthesize(&text).await {
                    Ok(wav) => match wav_bytes_to_pcm(&wav).and_then(|pcm| {
                        let mut encoder = OpusEncoder::new()?;
                        pcm_to_opus_frames(&mut encoder, &pcm)
                    }) {
                        Ok(frames) => frames,
                        Err(e) => {
                            tracing::warn!(error = %e, "tts decode/re-encode failed");
                            Vec::new()
                        }
                    },
                    Err(e) => {
                        tracing::warn!(error = %e, "tts synthesis failed");
                        Vec::new()
                    }
                };
                if output_tx.send(TtsOutput { sentence_id, opus_frames }).await.is_err() {
                    break;
                }
            }
        });

        Ok(TtsHandle { input: input_tx, output: output_rx })
    }

    fn name(&self) -> &str {
        "http_chunked"
    }
}
