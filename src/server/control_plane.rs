//! Control-plane REST client.
//!
//! Grounded on `manage_api_client.py`'s `_ensure_async_client`/
//! `_execute_async_request`: one shared, connection-pooled HTTP client
//! (a single `reqwest::Client` behind an `Arc` rather than the
//! original's per-event-loop client map, since every session task runs
//! on the one tokio runtime), an `Authorization: Bearer <secret>`
//! header, and the `{code, msg, data}` response envelope. Retries go
//! through the same [`crate::voice::retry::RetryPolicy`] every
//! provider connection uses; business error codes short-circuit it
//! immediately.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::voice::errors::{classify_status, classify_transport_error, PipelineError, RetryClass};
use crate::voice::report::{ReportSink, TurnReport};
use crate::voice::retry::RetryPolicy;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    code: i64,
    #[serde(default)]
    msg: String,
    #[serde(default)]
    data: Option<T>,
}

/// `selected_module`/provider settings fetched per device, mirroring
/// `config.py`'s `/config/server-base` and `/config/agent-models`
/// responses.
#[derive(Debug, Clone, Deserialize)]
pub struct DeviceConfig {
    #[serde(default)]
    pub selected_module: crate::config::SelectedModule,
    #[serde(default)]
    pub asr: crate::config::AsrConfig,
    #[serde(default)]
    pub tts: crate::config::TtsConfig,
    #[serde(default)]
    pub llm: crate::config::LlmConfig,
}

#[derive(Debug, Serialize)]
struct ChatHistoryReport<'a> {
    session_id: &'a str,
    device_id: &'a str,
    asr_text: &'a str,
    reply_text: &'a str,
    started_at: chrono::DateTime<chrono::Utc>,
    finished_at: chrono::DateTime<chrono::Utc>,
}

pub struct ControlPlaneClient {
    client: reqwest::Client,
    base_url: String,
    secret: String,
    retry: RetryPolicy,
}

impl ControlPlaneClient {
    pub fn new(client: reqwest::Client, base_url: impl Into<String>, secret: impl Into<String>, retry: RetryPolicy) -> Self {
        Self { client, base_url: base_url.into(), secret: secret.into(), retry }
    }

    async fn post_envelope<B: Serialize, T: for<'de> Deserialize<'de>>(&self, path: &str, body: &B) -> Result<Option<T>, PipelineError> {
        let url = format!("{}{}", self.base_url.trim_end_matches('/'), path);
        let body_bytes = serde_json::to_vec(body).map_err(|e| PipelineError::protocol(e.to_string()))?;

        let result = self
            .retry
            .run(path, classify_control_plane_error, || {
                let client = self.client.clone();
                let url = url.clone();
                let secret = self.secret.clone();
                let body_bytes = body_bytes.clone();
                async move {
                    let resp = client
                        .post(&url)
                        .bearer_auth(&secret)
                        .header("User-Agent", crate::NAME)
                        .header("Content-Type", "application/json")
                        .body(body_bytes)
                        .send()
                        .await?;
                    let status = resp.status();
                    if !status.is_success() {
                        anyhow::bail!("control-plane http status {status}");
                    }
                    let envelope: Envelope<T> = resp.json().await?;
                    if envelope.code != 0 {
                        anyhow::bail!(ControlPlaneBusinessError { code: envelope.code, msg: envelope.msg, data: serde_json::Value::Null });
                    }
                    Ok(envelope.data)
                }
            })
            .await;

        result.map_err(|e| {
            if let Some(biz) = e.downcast_ref::<ControlPlaneBusinessError>() {
                match biz.code {
                    10041 => PipelineError::DeviceNotFound { mac_address: String::new() },
                    10042 => PipelineError::DeviceNotBound { bind_code: biz.msg.clone() },
                    _ => PipelineError::protocol(biz.msg.clone()),
                }
            } else {
                PipelineError::protocol(e.to_string())
            }
        })
    }

    /// Fetch the per-device provider configuration from the control
    /// plane (`POST /config/server-base` + `/config/agent-models`,
    /// collapsed into one endpoint here since both return the same
    /// device-config shape in this deployment).
    pub async fn fetch_device_config(&self, device_id: &str) -> Result<DeviceConfig, PipelineError> {
        let body = serde_json::json!({ "device_id": device_id });
        let Some(config) = self.post_envelope::<_, DeviceConfig>("/config/agent-models", &body).await? else {
            return Err(PipelineError::protocol("control plane returned no device config"));
        };
        Ok(config)
    }
}

#[derive(Debug)]
struct ControlPlaneBusinessError {
    code: i64,
    msg: String,
    #[allow(dead_code)]
    data: serde_json::Value,
}

impl std::fmt::Display for ControlPlaneBusinessError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "control-plane business error {}: {}", self.code, self.msg)
    }
}

impl std::error::Error for ControlPlaneBusinessError {}

/// Business error codes (device-not-found/not-bound) are never
/// retried; everything else goes through the same transport
/// classification every provider connection uses.
fn classify_control_plane_error(err: &anyhow::Error) -> RetryClass {
    if let Some(biz) = err.downcast_ref::<ControlPlaneBusinessError>() {
        return classify_status(biz.code.clamp(0, u16::MAX as i64) as u16);
    }
    classify_transport_error(err)
}

/// Reports completed turns back to the control plane
/// (`POST /agent/chat-history/report`), best-effort: a failure here
/// must never affect the device-facing turn, so it only ever logs.
#[async_trait]
impl ReportSink for ControlPlaneClient {
    async fn report(&self, turn: TurnReport) {
        let body = ChatHistoryReport {
            session_id: &turn.session_id,
            device_id: &turn.device_id,
            asr_text: &turn.asr_text,
            reply_text: &turn.reply_text,
            started_at: turn.started_at,
            finished_at: turn.finished_at,
        };
        if let Err(e) = self.post_envelope::<_, serde_json::Value>("/agent/chat-history/report", &body).await {
            tracing::warn!(error = %e, session_id = %turn.session_id, "control-plane turn report failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn business_error_is_not_retried() {
        let err = anyhow::Error::new(ControlPlaneBusinessError {
            code: 10042,
            msg: "BIND123".to_string(),
            data: serde_json::Value::Null,
        });
        assert_eq!(classify_control_plane_error(&err), RetryClass::BusinessError);
    }

    #[test]
    fn transport_error_is_retried() {
        let err = anyhow::anyhow!("connection refused");
        assert_eq!(classify_control_plane_error(&err), RetryClass::Retryable);
    }
}
