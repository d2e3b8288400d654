//! Deferred completion evaluation.
//!
//! Grade changes are signalled through a [`GradeChanges`] handle. The
//! watcher waits one scheduler tick before reading the grade store so the
//! state that triggered the signal has settled, and a burst of signals
//! collapses into a single evaluation.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::completion::CompletionDetector;
use crate::traits::{GradeStore, HostNotifier};

/// Sender side: call [`GradeChanges::signal`] whenever grades may have moved.
#[derive(Debug, Clone)]
pub struct GradeChanges {
    tx: Arc<watch::Sender<u64>>,
    evaluated: watch::Receiver<u64>,
}

impl GradeChanges {
    /// Flag a grade change and return its generation number.
    pub fn signal(&self) -> u64 {
        let mut signalled = 0;
        self.tx.send_modify(|generation| {
            *generation += 1;
            signalled = *generation;
        });
        signalled
    }

    /// Wait until the watcher has evaluated `generation` or a later one.
    /// Returns `false` if the watcher stopped first.
    pub async fn settled(&mut self, generation: u64) -> bool {
        self.evaluated
            .wait_for(|done| *done >= generation)
            .await
            .is_ok()
    }
}

/// Runs a [`CompletionDetector`] against a grade store on every change.
pub struct CompletionWatcher {
    learner_id: String,
    detector: CompletionDetector,
    store: Arc<dyn GradeStore>,
    notifier: Arc<dyn HostNotifier>,
    changes: watch::Receiver<u64>,
    evaluated: watch::Sender<u64>,
}

impl CompletionWatcher {
    pub fn new(
        learner_id: impl Into<String>,
        store: Arc<dyn GradeStore>,
        notifier: Arc<dyn HostNotifier>,
    ) -> (Self, GradeChanges) {
        let (tx, rx) = watch::channel(0u64);
        let (evaluated_tx, evaluated_rx) = watch::channel(0u64);
        let watcher = Self {
            learner_id: learner_id.into(),
            detector: CompletionDetector::new(),
            store,
            notifier,
            changes: rx,
            evaluated: evaluated_tx,
        };
        let changes = GradeChanges {
            tx: Arc::new(tx),
            evaluated: evaluated_rx,
        };
        (watcher, changes)
    }

    /// Evaluate on every change until all [`GradeChanges`] handles are
    /// dropped, then hand the detector back.
    pub async fn run(mut self) -> CompletionDetector {
        while self.changes.changed().await.is_ok() {
            tokio::task::yield_now().await;
            let generation = *self.changes.borrow_and_update();
            self.evaluate(generation).await;
            self.evaluated.send_replace(generation);
        }
        tracing::debug!(learner = %self.learner_id, "completion watcher stopped");
        self.detector
    }

    pub fn spawn(self) -> JoinHandle<CompletionDetector> {
        tokio::spawn(self.run())
    }

    async fn evaluate(&mut self, generation: u64) {
        let snapshot = match self.store.snapshot(&self.learner_id).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(
                    learner = %self.learner_id,
                    "grade store unavailable, skipping completion check #{generation}: {e:#}"
                );
                return;
            }
        };
        if let Some(notification) = self.detector.evaluate(&snapshot) {
            tracing::info!(
                sink = self.notifier.name(),
                ?notification,
                "posting completion notification"
            );
            self.notifier.notify(&notification).await;
        }
    }
}
