//! Host notification sinks.
//!
//! All sinks are fire-and-forget: a sink that cannot deliver logs a warning
//! and drops the message.

use async_trait::async_trait;
use tokio::sync::mpsc;

use quizplay_core::completion::HostNotification;
use quizplay_core::traits::HostNotifier;

/// Bridge to an embedding host over an in-process channel, in the manner
/// of a `postMessage` call. The host end owns the receiver.
#[derive(Debug, Clone)]
pub struct ChannelNotifier {
    tx: mpsc::UnboundedSender<HostNotification>,
}

impl ChannelNotifier {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<HostNotification>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl HostNotifier for ChannelNotifier {
    fn name(&self) -> &str {
        "channel"
    }

    async fn notify(&self, notification: &HostNotification) {
        if self.tx.send(notification.clone()).is_err() {
            tracing::warn!("host channel closed, dropping {notification:?}");
        }
    }
}

/// Writes each notification to stdout as one JSON line.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutNotifier;

#[async_trait]
impl HostNotifier for StdoutNotifier {
    fn name(&self) -> &str {
        "stdout"
    }

    async fn notify(&self, notification: &HostNotification) {
        match serde_json::to_string(notification) {
            Ok(line) => println!("{line}"),
            Err(e) => tracing::warn!("failed to encode host notification: {e}"),
        }
    }
}

/// Records notifications through `tracing` only.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

#[async_trait]
impl HostNotifier for LogNotifier {
    fn name(&self) -> &str {
        "log"
    }

    async fn notify(&self, notification: &HostNotification) {
        match notification {
            HostNotification::Incomplete => tracing::info!(target: "quizplay::host", "INCOMPLETE"),
            HostNotification::Complete { grade } => {
                tracing::info!(target: "quizplay::host", score = grade.score, "COMPLETE")
            }
        }
    }
}
