//! Streaming TTS over a cloud WebSocket, grounded on
//! `alibl_stream.py`'s run-task / result-generated (binary audio
//! frames) / task-finished envelope — the synthesis-side mirror of
//! `voice::asr::streaming_ws`.

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use serde::Serialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message as WsMessage;

use crate::voice::errors::PipelineError;
use crate::voice::tts::{TtsHandle, TtsInput, TtsOutput, TtsProvider};

#[derive(Debug, Clone)]
pub struct StreamingWsTtsConfig {
    pub endpoint: String,
    pub api_key: String,
    pub voice: String,
}

pub struct StreamingWsTtsProvider {
    config: StreamingWsTtsConfig,
}

impl StreamingWsTtsProvider {
    pub fn new(config: StreamingWsTtsConfig) -> Self {
        Self { config }
    }
}

#[derive(Serialize)]
struct RunTaskHeader<'a> {
    action: &'a str,
    task_id: String,
}

#[derive(Serialize)]
struct RunTaskPayload<'a> {
    header: RunTaskHeader<'a>,
    payload: serde_json::Value,
}

#[async_trait]
impl TtsProvider for StreamingWsTtsProvider {
    async fn open(&self) -> Result<TtsHandle, PipelineError> {
        let (ws_stream, _resp) = tokio_tungstenite::connect_async(&self.config.endpoint)
            .await
            .map_err(|e| PipelineError::tts(format!("connect failed: {e}")))?;
        let (mut write, mut read) = ws_stream.split();

        let (input_tx, mut input_rx) = mpsc::channel::<TtsInput>(16);
        let (output_tx, output_rx) = mpsc::channel::<TtsOutput>(16);

        let voice = self.config.voice.clone();
        tokio::spawn(async move {
            while let Some(TtsInput { sentence_id, text }) = input_rx.recv().await {
                let task_id = uuid::Uuid::new_v4().simple().to_string();
                let run_task = RunTaskPayload {
                    header: RunTaskHeader { action: "run-task", task_id: task_id.clone() },
                    payload: json!({
                        "voice": voice,
                        "task_group": "audio",
                        "task": "tts",
                        "function": "synthesis",
                        "input": { "text": text },
                    }),
                };
                let Ok(frame) = serde_json::to_string(&run_task) else { continue };
                if write.send(WsMessage::Text(frame.into())).await.is_err() {
                    break;
                }

                let mut opus_frames = Vec::new();
                loop {
                    match read.next().await {
                        Some(Ok(WsMessage::Binary(bytes))) => opus_frames.push(bytes.to_vec()),
                        Some(Ok(WsMessage::Text(text))) => {
                            if text.contains("task-finished") || text.contains("task-failed") {
                                break;
                            }
                        }
                        Some(Ok(_)) => continue,
                        Some(Err(_)) | None => break,
                    }
                }
                if output_tx.send(TtsOutput { sentence_id, opus_frames }).await.is_err() {
                    break;
                }
            }
            let _ = write.close().await;
        });

        Ok(TtsHandle { input: input_tx, output: output_rx })
    }

    fn name(&self) -> &str {
        "streaming_ws"
    }
}
