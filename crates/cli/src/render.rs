//! Terminal rendering of job events.

use tokio::sync::broadcast;
use upscale_client::events::{JobEvent, JobEventKind};

/// Print events until the orchestrator goes away.
pub async fn render_events(mut rx: broadcast::Receiver<JobEvent>, json: bool) {
    loop {
        match rx.recv().await {
            Ok(event) if json => match serde_json::to_string(&event) {
                Ok(line) => println!("{line}"),
                Err(e) => tracing::warn!(error = %e, "Failed to encode event"),
            },
            Ok(event) => {
                if let Some(line) = describe(&event.kind) {
                    eprintln!("{line}");
                }
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::debug!(skipped, "Event renderer lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

fn describe(kind: &JobEventKind) -> Option<String> {
    match kind {
        JobEventKind::PhaseChanged { .. } => None,
        JobEventKind::ChannelReady => Some("Connected to progress channel".to_string()),
        JobEventKind::ChannelDegraded { reason } => {
            Some(format!("Live progress unavailable ({reason}), polling status"))
        }
        JobEventKind::Progress {
            percent,
            message,
            current_stage,
            total_stages,
        } => Some(format!(
            "[{percent:>3}%] stage {current_stage}/{total_stages}  {message}"
        )),
        JobEventKind::Completed { filename, bytes } => {
            Some(format!("Completed: {filename} ({bytes} bytes)"))
        }
        JobEventKind::Failed { message } => Some(format!("Failed: {message}")),
        JobEventKind::CleanedUp => Some("Server-side job removed".to_string()),
    }
}
