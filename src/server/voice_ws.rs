//! Device WebSocket handler: the bridge between the axum socket and
//! the [`crate::voice::orchestrator::Orchestrator`] state machine.
//!
//! Grounded on `server/realtime_voice.rs`'s connection-handling shape
//! (split socket, inbound reader loop, outbound sender task bridged by
//! a channel) generalized to the Xiaozhi device protocol: a device's
//! first frame must be `hello`, which is what selects the per-device
//! providers before anything else is built.

use std::sync::Arc;
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;

use crate::agent::llm::OpenRouterClient;
use crate::server::ServerState;
use crate::voice::llm::{DialogueModel, OpenRouterDialogueModel};
use crate::voice::orchestrator::{Orchestrator, OutboundEvent};
use crate::voice::protocol::{ClientMessage, ListenState, ServerMessage};
use crate::voice::provider_registry::ProviderRegistry;
use crate::voice::report::{ReportSink, TracingReportSink};
use crate::voice::session::{ListenMode, Session};
use crate::voice::tools::ToolRegistry;

pub async fn handle_socket(socket: WebSocket, state: ServerState) {
    let (sink, mut stream) = socket.split();

    let device_id = loop {
        match stream.next().await {
            Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(ClientMessage::Hello { device_id, .. }) => break device_id,
                Ok(_) => continue,
                Err(e) => {
                    tracing::warn!(error = %e, "malformed hello, closing connection");
                    return;
                }
            },
            Some(Ok(Message::Close(_))) | None => return,
            Some(Err(e)) => {
                tracing::warn!(error = %e, "websocket error before hello");
                return;
            }
            _ => continue,
        }
    };
    let device_id = device_id.unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let session = Arc::new(Session::new(device_id.clone(), uuid::Uuid::new_v4().to_string()));

    let (outbound_tx, outbound_rx) = mpsc::channel::<OutboundEvent>(64);
    let writer = tokio::spawn(run_outbound_writer(sink, outbound_rx, session.sentence_epoch.clone()));

    let orchestrator = match build_orchestrator(&state, session.clone(), &device_id, outbound_tx.clone()).await {
        Ok(orchestrator) => orchestrator,
        Err(e) => {
            tracing::warn!(error = %e, device_id = %device_id, "rejecting session at setup");
            let _ = outbound_tx.send(OutboundEvent::Json(ServerMessage::Error { message: e.to_string() })).await;
            drop(outbound_tx);
            let _ = writer.await;
            return;
        }
    };

    orchestrator.send_hello().await;
    tracing::info!(device_id = %device_id, session_id = %orchestrator.session_id(), "device session started");

    while let Some(msg) = stream.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if let Err(e) = dispatch_client_message(&orchestrator, &text).await {
                    tracing::warn!(error = %e, "failed to dispatch client message");
                }
            }
            Ok(Message::Binary(bytes)) => {
                if let Err(e) = orchestrator.handle_inbound_opus(&bytes).await {
                    tracing::warn!(error = %e, "failed to handle inbound audio frame");
                }
            }
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                tracing::warn!(error = %e, "websocket read error");
                break;
            }
        }
    }

    drop(outbound_tx);
    let _ = writer.await;
    tracing::info!(device_id = %device_id, "device session ended");
}

async fn dispatch_client_message(orchestrator: &Arc<Orchestrator>, text: &str) -> anyhow::Result<()> {
    let message: ClientMessage = serde_json::from_str(text)?;
    match message {
        ClientMessage::Hello { .. } => {
            // Only the connection's first message is treated as the
            // handshake; a repeat is harmless and ignored.
        }
        ClientMessage::Listen { state, mode } => match state {
            ListenState::Start => {
                let mode = match mode.as_deref() {
                    Some("manual") => ListenMode::Manual,
                    _ => ListenMode::Auto,
                };
                orchestrator.start_listening(mode).await?;
            }
            ListenState::Stop => orchestrator.stop_listening().await,
            ListenState::DetectWakeword => orchestrator.trigger_wake_word().await,
        },
        ClientMessage::Abort { .. } => orchestrator.abort().await,
        ClientMessage::Iot { .. } | ClientMessage::Mcp { .. } => {
            // Tool-plane passthrough: registration/invocation of
            // per-device tools is handled by `voice::tools::ToolRegistry`
            // once a device actually advertises callable descriptors.
        }
    }
    Ok(())
}

/// Writes outbound events to the device at roughly one audio frame
/// per `FRAME_DURATION_MS`, per the pacing a real device's jitter
/// buffer expects (JSON control messages are never delayed, only
/// binary frames). A binary frame tagged with an epoch that is no
/// longer current (the turn it belongs to was aborted by a barge-in
/// or an explicit `abort`) is dropped instead of written, so a queue
/// already full of a stale turn's frames doesn't keep trickling out
/// after the device has moved on.
async fn run_outbound_writer(
    mut sink: futures_util::stream::SplitSink<WebSocket, Message>,
    mut rx: mpsc::Receiver<OutboundEvent>,
    epoch: crate::voice::session::SentenceEpoch,
) {
    let frame_interval = Duration::from_millis(crate::voice::audio_codec::FRAME_DURATION_MS as u64);
    while let Some(event) = rx.recv().await {
        let result = match event {
            OutboundEvent::Json(message) => match serde_json::to_string(&message) {
                Ok(text) => sink.send(Message::Text(text.into())).await,
                Err(e) => {
                    tracing::warn!(error = %e, "failed to encode outbound message");
                    continue;
                }
            },
            OutboundEvent::Binary { epoch: frame_epoch, frame } => {
                if !epoch.is_current(frame_epoch) {
                    continue;
                }
                tokio::time::sleep(frame_interval).await;
                sink.send(Message::Binary(frame.into())).await
            }
        };
        if result.is_err() {
            break;
        }
    }
}

/// Resolve per-device provider configuration (from the control plane
/// if one is configured, falling back to the server's local config)
/// and build the orchestrator for one connection.
async fn build_orchestrator(
    state: &ServerState,
    session: Arc<Session>,
    device_id: &str,
    outbound: mpsc::Sender<OutboundEvent>,
) -> anyhow::Result<Arc<Orchestrator>> {
    let mut config = (*state.config).clone();

    if let Some(control_plane) = &state.control_plane {
        match control_plane.fetch_device_config(device_id).await {
            Ok(device_config) => {
                config.selected_module = device_config.selected_module;
                config.asr = device_config.asr;
                config.tts = device_config.tts;
                config.llm = device_config.llm;
            }
            Err(crate::voice::errors::PipelineError::DeviceNotBound { bind_code }) => {
                anyhow::bail!("device not bound: visit the companion app with code {bind_code}");
            }
            Err(crate::voice::errors::PipelineError::DeviceNotFound { .. }) => {
                anyhow::bail!("device {device_id} is not registered");
            }
            Err(e) => {
                tracing::warn!(error = %e, device_id, "control-plane config fetch failed, using local defaults");
            }
        }
    }

    let asr_config = config.asr.to_provider_config(&config.selected_module.asr);
    let tts_config = config.tts.to_provider_config(&config.selected_module.tts);
    let registry = ProviderRegistry::build(&asr_config, &tts_config, state.http_client.clone())?;

    let llm_client = OpenRouterClient::from_config(&config)?;
    let dialogue_model: Arc<dyn DialogueModel> =
        Arc::new(OpenRouterDialogueModel::new(llm_client, config.llm.model.clone(), Some(config.llm.max_tokens)));

    let report_sink: Arc<dyn ReportSink> = match &state.control_plane {
        Some(control_plane) => control_plane.clone(),
        None => Arc::new(TracingReportSink),
    };

    let orchestrator = Orchestrator::new(
        session,
        registry.asr(),
        registry.tts(),
        dialogue_model,
        Arc::new(ToolRegistry::new()),
        report_sink,
        state.wake_cache.clone(),
        config.wakeup_words.words.clone(),
        outbound,
    )?;

    Ok(Arc::new(orchestrator))
}
