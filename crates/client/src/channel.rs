//! Per-job progress channel over WebSocket.
//!
//! [`ProgressChannel`] owns the push channel bound to one job id. It moves
//! through `Unopened -> Connecting -> Open -> Terminated`; the current state
//! lives in a [`watch`] channel so that readiness can be awaited with a
//! bound. Parsed frames are forwarded to the owner as [`ChannelSignal`]s in
//! arrival order. The channel never closes itself on a completion frame;
//! the owner decides when the job is really done and calls
//! [`close`](ProgressChannel::close).

use std::time::Duration;

use futures::StreamExt;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tokio_util::sync::CancellationToken;
use upscale_core::job::ProgressEvent;
use upscale_core::types::JobId;

use crate::messages::parse_progress;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Lifecycle of one progress channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Unopened,
    Connecting,
    Open,
    Terminated,
}

/// What the channel reports to its owner.
#[derive(Debug, Clone, PartialEq)]
pub enum ChannelSignal {
    /// A valid progress frame for `job_id`.
    Progress { job_id: JobId, event: ProgressEvent },

    /// The transport failed or the server closed the channel.
    Closed { job_id: JobId, reason: String },
}

/// Errors on the progress channel. These degrade the job's progress
/// display but never fail the job.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Failed to establish the WebSocket connection.
    #[error("Connection error: {0}")]
    Connection(String),

    /// A protocol-level error on an established connection.
    #[error("Protocol error: {0}")]
    Protocol(String),
}

/// Halves handed to the reader task on connect.
struct PendingTask {
    state_tx: watch::Sender<ChannelState>,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
}

/// Push channel delivering progress for a single job.
pub struct ProgressChannel {
    job_id: JobId,
    url: String,
    state: watch::Receiver<ChannelState>,
    signals: mpsc::UnboundedReceiver<ChannelSignal>,
    pending: Option<PendingTask>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl ProgressChannel {
    /// Create an unopened channel for `job_id` against `ws_url`
    /// (e.g. `ws://127.0.0.1:8000`).
    pub fn new(ws_url: &str, job_id: JobId) -> Self {
        let url = format!("{}/ws/{}", ws_url.trim_end_matches('/'), job_id);
        let (state_tx, state) = watch::channel(ChannelState::Unopened);
        let (signal_tx, signals) = mpsc::unbounded_channel();

        Self {
            job_id,
            url,
            state,
            signals,
            pending: Some(PendingTask {
                state_tx,
                signal_tx,
            }),
            cancel: CancellationToken::new(),
            task: None,
        }
    }

    /// Create the channel and start connecting immediately.
    pub fn open(ws_url: &str, job_id: JobId) -> Self {
        let mut channel = Self::new(ws_url, job_id);
        channel.connect();
        channel
    }

    pub fn job_id(&self) -> &JobId {
        &self.job_id
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn state(&self) -> ChannelState {
        *self.state.borrow()
    }

    /// Start connecting in the background. Only the first call has an
    /// effect.
    pub fn connect(&mut self) {
        let Some(pending) = self.pending.take() else {
            return;
        };
        pending.state_tx.send_replace(ChannelState::Connecting);

        tracing::debug!(job_id = %self.job_id, url = %self.url, "Opening progress channel");

        self.task = Some(tokio::spawn(run_channel(
            self.url.clone(),
            self.job_id.clone(),
            pending.state_tx,
            pending.signal_tx,
            self.cancel.clone(),
        )));
    }

    /// Wait until the channel is open, at most `timeout`.
    ///
    /// Returns `true` once the channel is open and `false` if it terminated
    /// first, was never connected, or the bound elapsed. Never errors.
    pub async fn wait_ready(&self, timeout: Duration) -> bool {
        if self.state() == ChannelState::Unopened {
            return false;
        }

        let mut state = self.state.clone();
        let settled = tokio::time::timeout(
            timeout,
            state.wait_for(|s| matches!(s, ChannelState::Open | ChannelState::Terminated)),
        )
        .await;

        match settled {
            Ok(Ok(current)) => *current == ChannelState::Open,
            Ok(Err(_)) | Err(_) => false,
        }
    }

    /// Next signal from the channel, in arrival order.
    ///
    /// Returns `None` once the reader task has finished and every signal
    /// has been consumed, or immediately if the channel was never
    /// connected.
    pub async fn recv(&mut self) -> Option<ChannelSignal> {
        if self.pending.is_some() {
            return None;
        }
        self.signals.recv().await
    }

    /// Close the channel and wait for the reader task to exit. Idempotent.
    pub async fn close(&mut self) {
        self.cancel.cancel();
        self.pending = None;
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(job_id = %self.job_id, error = %e, "Progress channel task panicked");
            }
        }
        tracing::debug!(job_id = %self.job_id, "Progress channel closed");
    }
}

impl Drop for ProgressChannel {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

// ---- reader task ----

/// Connect, then forward frames until the socket ends or `cancel` fires.
async fn run_channel(
    url: String,
    job_id: JobId,
    state_tx: watch::Sender<ChannelState>,
    signal_tx: mpsc::UnboundedSender<ChannelSignal>,
    cancel: CancellationToken,
) {
    let connected = tokio::select! {
        _ = cancel.cancelled() => None,
        result = connect_async(url.as_str()) => Some(result),
    };

    let mut ws_stream = match connected {
        None => {
            state_tx.send_replace(ChannelState::Terminated);
            return;
        }
        Some(Err(e)) => {
            let err = ChannelError::Connection(format!("Failed to connect to {url}: {e}"));
            tracing::warn!(job_id = %job_id, error = %err, "Progress channel unavailable");
            state_tx.send_replace(ChannelState::Terminated);
            let _ = signal_tx.send(ChannelSignal::Closed {
                job_id,
                reason: err.to_string(),
            });
            return;
        }
        Some(Ok((ws_stream, _response))) => ws_stream,
    };

    state_tx.send_replace(ChannelState::Open);
    tracing::info!(job_id = %job_id, "Progress channel connected");

    let closed_by_transport = forward_frames(&mut ws_stream, &job_id, &signal_tx, &cancel).await;

    state_tx.send_replace(ChannelState::Terminated);
    match closed_by_transport {
        Some(reason) => {
            let _ = signal_tx.send(ChannelSignal::Closed { job_id, reason });
        }
        None => {
            // Closed on request; say goodbye politely.
            let _ = ws_stream.close(None).await;
        }
    }
}

/// Read frames until the transport ends (returns the reason) or the
/// channel is cancelled (returns `None`).
async fn forward_frames(
    ws_stream: &mut WsStream,
    job_id: &JobId,
    signal_tx: &mpsc::UnboundedSender<ChannelSignal>,
    cancel: &CancellationToken,
) -> Option<String> {
    loop {
        let msg = tokio::select! {
            _ = cancel.cancelled() => return None,
            msg = ws_stream.next() => msg,
        };

        match msg {
            Some(Ok(Message::Text(text))) => {
                let Some(event) = handle_text_frame(&text, job_id) else {
                    continue;
                };
                let signal = ChannelSignal::Progress {
                    job_id: job_id.clone(),
                    event,
                };
                if signal_tx.send(signal).is_err() {
                    // Owner went away.
                    return None;
                }
            }
            Some(Ok(Message::Binary(_))) => {
                tracing::trace!(job_id = %job_id, "Ignoring binary frame");
            }
            Some(Ok(Message::Ping(_) | Message::Pong(_))) => {
                // Handled automatically by tungstenite.
            }
            Some(Ok(Message::Close(frame))) => {
                tracing::info!(job_id = %job_id, ?frame, "Progress channel closed by server");
                return Some("closed by server".to_string());
            }
            Some(Ok(Message::Frame(_))) => {}
            Some(Err(e)) => {
                let err = ChannelError::Protocol(e.to_string());
                tracing::warn!(job_id = %job_id, error = %err, "Progress channel receive error");
                return Some(err.to_string());
            }
            None => {
                tracing::info!(job_id = %job_id, "Progress channel stream exhausted");
                return Some("stream exhausted".to_string());
            }
        }
    }
}

/// Parse one text frame. Rejected frames are logged and dropped.
fn handle_text_frame(text: &str, job_id: &JobId) -> Option<ProgressEvent> {
    match parse_progress(text) {
        Ok(event) => {
            tracing::debug!(
                job_id = %job_id,
                progress = event.progress,
                message = %event.message,
                "Progress update",
            );
            Some(event)
        }
        Err(e) => {
            tracing::warn!(
                job_id = %job_id,
                error = %e,
                raw_message = %text,
                "Dropping progress frame",
            );
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn url_is_scoped_to_job() {
        let channel = ProgressChannel::new("ws://host:8000/", JobId::from("abc"));
        assert_eq!(channel.url(), "ws://host:8000/ws/abc");
        assert_eq!(channel.state(), ChannelState::Unopened);
    }

    #[tokio::test]
    async fn unopened_channel_is_never_ready() {
        let mut channel = ProgressChannel::new("ws://127.0.0.1:9", JobId::from("abc"));
        assert!(!channel.wait_ready(Duration::from_millis(10)).await);
        assert!(channel.recv().await.is_none());
    }

    #[tokio::test]
    async fn refused_connection_terminates_and_reports() {
        // Bind then drop a listener to obtain a port with nothing behind it.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let mut channel = ProgressChannel::open(&format!("ws://{addr}"), JobId::from("abc"));
        assert!(!channel.wait_ready(Duration::from_secs(5)).await);
        assert_eq!(channel.state(), ChannelState::Terminated);
        assert!(matches!(
            channel.recv().await,
            Some(ChannelSignal::Closed { job_id, .. }) if job_id.as_str() == "abc"
        ));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let mut channel = ProgressChannel::open("ws://127.0.0.1:9", JobId::from("abc"));
        channel.close().await;
        channel.close().await;
        assert_eq!(channel.state(), ChannelState::Terminated);
    }

    #[test]
    fn rejected_frames_are_dropped() {
        let id = JobId::from("abc");
        assert!(handle_text_frame("garbage", &id).is_none());
        assert!(handle_text_frame(r#"{"progress":2.0,"message":"x"}"#, &id).is_none());
        assert!(handle_text_frame(r#"{"progress":0.3,"message":"x"}"#, &id).is_some());
    }
}
