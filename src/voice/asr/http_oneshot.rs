//! One-shot HTTP ASR: accumulate an entire utterance as PCM, then
//! issue a single multipart POST once `VoiceStop` arrives. Grounded on
//! `voice-core/src/stt/cloud.rs`'s cloud-STT-over-HTTP shape (accumulate
//! then `reqwest::multipart::Form`), reusing [`crate::voice::retry::RetryPolicy`]
//! for the request itself rather than hand-rolling a second backoff loop.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::voice::asr::{AsrHandle, AsrInputEvent, AsrProvider, AsrResult};
use crate::voice::audio_codec::pcm_to_wav_bytes;
use crate::voice::errors::{classify_transport_error, PipelineError};
use crate::voice::retry::RetryPolicy;
use crate::voice::session::ListenMode;

#[derive(Debug, Clone)]
pub struct HttpOneshotAsrConfig {
    pub endpoint: String,
    pub api_key: String,
}

pub struct HttpOneshotAsrProvider {
    client: reqwest::Client,
    config: HttpOneshotAsrConfig,
    retry: RetryPolicy,
}

impl HttpOneshotAsrProvider {
    pub fn new(client: reqwest::Client, config: HttpOneshotAsrConfig) -> Self {
        Self { client, config, retry: RetryPolicy::default() }
    }

    async fn transcribe(&self, pcm_samples: &[i16]) -> Result<String, PipelineError> {
        let wav = pcm_to_wav_bytes(pcm_samples);
        let endpoint = self.config.endpoint.clone();
        let api_key = self.config.api_key.clone();
        let client = self.client.clone();
        let result = self
            .retry
            .run("asr.http_oneshot", |e| classify_transport_error(e), move || {
                let wav = wav.clone();
                let endpoint = endpoint.clone();
                let api_key = api_key.clone();
                let client = client.clone();
                async move {
                    let part = reqwest::multipart::Part::bytes(wav)
                        .file_name("utterance.wav")
                        .mime_str("audio/wav")?;
                    let form = reqwest::multipart::Form::new().part("audio", part);
                    let resp = client
                        .post(&endpoint)
                        .bearer_auth(&api_key)
                        .multipart(form)
                        .send()
                        .await?;
                    if !resp.status().is_success() {
                        anyhow::bail!("asr http status {}", resp.status());
                    }
                    let body: serde_json::Value = resp.json().await?;
                    Ok(body.get("text").and_then(|t| t.as_str()).unwrap_or_default().to_string())
                }
            })
            .await
            .map_err(|e| PipelineError::asr(e.to_string()))?;
        Ok(result)
    }
}

#[async_trait]
impl AsrProvider for HttpOneshotAsrProvider {
    async fn open(&self, _mode: ListenMode) -> Result<AsrHandle, PipelineError> {
        let (input_tx, mut input_rx) = mpsc::channel::<AsrInputEvent>(64);
        let (output_tx, output_rx) = mpsc::channel::<AsrResult>(1);

        let client = self.client.clone();
        let config = self.config.clone();
        let retry = self.retry.clone();
        tokio::spawn(async move {
            let provider = HttpOneshotAsrProvider { client, config, retry };
            let mut pcm: Vec<i16> = Vec::new();
            while let Some(event) = input_rx.recv().await {
                match event {
                    AsrInputEvent::Frame(frame) => pcm.extend(frame),
                    AsrInputEvent::Preroll(frames) => {
                        for f in frames {
                            pcm.extend(f);
                        }
                    }
                    AsrInputEvent::VoiceStop => break,
                }
            }
            let text = provider.transcribe(&pcm).await.unwrap_or_default();
            let _ = output_tx.send(AsrResult { text, is_final: true }).await;
        });

        Ok(AsrHandle { input: input_tx, output: output_rx })
    }

    fn name(&self) -> &str {
        "http_oneshot"
    }
}
