//! The `quizplay completion` command.

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use async_trait::async_trait;

use quizplay_core::completion::HostNotification;
use quizplay_core::traits::HostNotifier;
use quizplay_core::watcher::CompletionWatcher;
use quizplay_services::config::{create_notifier, load_config_from};
use quizplay_services::{read_snapshots, MemoryGradeStore};

pub async fn execute(
    snapshots_path: PathBuf,
    learner: Option<String>,
    config_path: Option<PathBuf>,
) -> Result<()> {
    let config = load_config_from(config_path.as_deref())?;
    let learner_id = learner.unwrap_or(config.learner_id);

    let snapshots: Vec<_> = read_snapshots(&snapshots_path)?
        .into_iter()
        .enumerate()
        .filter(|(_, s)| s.learner_id == learner_id)
        .collect();
    if snapshots.is_empty() {
        anyhow::bail!("no grade snapshots for learner '{learner_id}'");
    }

    let store = Arc::new(MemoryGradeStore::new());
    let tally = Arc::new(Tally::new(create_notifier(&config.notifier)));
    let (watcher, mut changes) = CompletionWatcher::new(&learner_id, store.clone(), tally.clone());
    let handle = watcher.spawn();

    // Each snapshot stands for one grade change, settled before the next.
    for (i, snapshot) in snapshots.iter().cloned() {
        let ungraded = snapshot.ungraded_items().len();
        let before = tally.count();
        store.set_snapshot(snapshot);
        let generation = changes.signal();
        if !changes.settled(generation).await {
            anyhow::bail!("completion watcher stopped before snapshot {}", i + 1);
        }
        match tally.posted_since(before) {
            Some(notification) => eprintln!(
                "  snapshot {}: {ungraded} ungraded -> {}",
                i + 1,
                describe(&notification)
            ),
            None => eprintln!("  snapshot {}: {ungraded} ungraded -> nothing to post", i + 1),
        }
    }

    drop(changes);
    let detector = handle.await.context("completion watcher failed")?;
    let state = detector.state();

    eprintln!(
        "\n{} snapshot(s) for {learner_id}, {} notification(s) sent via {}",
        snapshots.len(),
        tally.count(),
        tally.name()
    );
    match &state.last_posted_grade {
        Some(grade) => eprintln!("Course complete at grade {}", grade.score),
        None if state.incomplete_posted => eprintln!("Course incomplete"),
        None => eprintln!("Course not evaluated as complete"),
    }

    Ok(())
}

/// Forwards to the configured sink and keeps what was posted.
struct Tally {
    inner: Arc<dyn HostNotifier>,
    posted: Mutex<Vec<HostNotification>>,
}

impl Tally {
    fn new(inner: Arc<dyn HostNotifier>) -> Self {
        Self {
            inner,
            posted: Mutex::new(Vec::new()),
        }
    }

    fn count(&self) -> usize {
        self.posted.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn posted_since(&self, count: usize) -> Option<HostNotification> {
        let posted = self.posted.lock().unwrap_or_else(|e| e.into_inner());
        posted.get(count..).and_then(|new| new.last()).cloned()
    }
}

#[async_trait]
impl HostNotifier for Tally {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn notify(&self, notification: &HostNotification) {
        self.inner.notify(notification).await;
        self.posted
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(notification.clone());
    }
}

fn describe(notification: &HostNotification) -> String {
    match notification {
        HostNotification::Incomplete => "INCOMPLETE".to_string(),
        HostNotification::Complete { grade } => format!("COMPLETE ({})", grade.score),
    }
}
