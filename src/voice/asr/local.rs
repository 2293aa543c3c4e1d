//! Local/on-device ASR stub. No offline ASR engine ships with this
//! server (the teacher's `voice/whisper.rs` local-inference path is
//! dropped in the final trim — see DESIGN.md); this implementation
//! exists so `ProviderRegistry` has a `local` variant to select in
//! configuration and development environments without a cloud ASR
//! subscription still get a predictable (if useless) response instead
//! of a config error.

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::voice::asr::{AsrHandle, AsrInputEvent, AsrProvider, AsrResult};
use crate::voice::errors::PipelineError;
use crate::voice::session::ListenMode;

pub struct LocalAsrProvider;

#[async_trait]
impl AsrProvider for LocalAsrProvider {
    async fn open(&self, _mode: ListenMode) -> Result<AsrHandle, PipelineError> {
        let (input_tx, mut input_rx) = mpsc::channel::<AsrInputEvent>(64);
        let (output_tx, output_rx) = mpsc::channel::<AsrResult>(1);

        tokio::spawn(async move {
            while let Some(event) = input_rx.recv().await {
                if matches!(event, AsrInputEvent::VoiceStop) {
                    break;
                }
            }
            let _ = output_tx
                .send(AsrResult { text: String::new(), is_final: true })
                .await;
        });

        Ok(AsrHandle { input: input_tx, output: output_rx })
    }

    fn name(&self) -> &str {
        "local"
    }
}
