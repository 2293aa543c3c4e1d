//! Turn reporting sink.
//!
//! Grounded on `reportHandle.py`/`manage_api_client.py::report`: after
//! a dialogue turn completes the original fires a best-effort,
//! non-blocking report of the transcript and timing back to the
//! control plane for analytics — failures there must never affect the
//! device-facing turn. The trait exists so a no-op implementation can
//! stand in during tests and local development without a control
//! plane reachable.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[derive(Debug, Clone)]
pub struct TurnReport {
    pub session_id: String,
    pub device_id: String,
    pub asr_text: String,
    pub reply_text: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn report(&self, turn: TurnReport);
}

/// Logs the turn via `tracing` instead of sending it anywhere. Used
/// whenever no control-plane report endpoint is configured.
pub struct TracingReportSink;

#[async_trait]
impl ReportSink for TracingReportSink {
    async fn report(&self, turn: TurnReport) {
        let duration_ms = (turn.finished_at - turn.started_at).num_milliseconds();
        tracing::info!(
            session_id = %turn.session_id,
            device_id = %turn.device_id,
            duration_ms,
            asr_chars = turn.asr_text.chars().count(),
            reply_chars = turn.reply_text.chars().count(),
            "dialogue turn complete"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn tracing_sink_does_not_panic() {
        let sink = TracingReportSink;
        let now = Utc::now();
        sink.report(TurnReport {
            session_id: "s1".into(),
            device_id: "aa:bb".into(),
            asr_text: "hello".into(),
            reply_text: "hi there".into(),
            started_at: now,
            finished_at: now,
        })
        .await;
    }
}
