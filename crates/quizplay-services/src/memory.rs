//! In-memory persistence with failure injection.

use std::collections::{BTreeMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use quizplay_core::error::EngineError;
use quizplay_core::model::Response;
use quizplay_core::traits::{PersistenceService, SaveAllRequest, SaveRequest};

/// A persistence service that keeps committed responses in memory.
///
/// Saves for any index in `fail_indices` are rejected, as is every save while
/// `fail_all` is set. Rejections carry an [`EngineError`] so callers can tell
/// they are transient.
#[derive(Default)]
pub struct InMemoryPersistence {
    stored: Mutex<BTreeMap<(Uuid, usize), Response>>,
    fail_indices: HashSet<usize>,
    fail_all: AtomicBool,
    call_count: AtomicU32,
}

impl InMemoryPersistence {
    pub fn new() -> Self {
        Self::default()
    }

    /// Reject every save for the given question indices.
    pub fn with_failures(indices: impl IntoIterator<Item = usize>) -> Self {
        Self {
            fail_indices: indices.into_iter().collect(),
            ..Self::default()
        }
    }

    pub fn set_fail_all(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::Relaxed);
    }

    /// Number of save calls received, bulk saves included.
    pub fn call_count(&self) -> u32 {
        self.call_count.load(Ordering::Relaxed)
    }

    /// The committed response for one question, if any.
    pub fn stored(&self, attempt_id: Uuid, question_index: usize) -> Option<Response> {
        self.lock()
            .get(&(attempt_id, question_index))
            .cloned()
    }

    /// Number of committed responses across all attempts.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn rejects(&self, index: usize) -> bool {
        self.fail_all.load(Ordering::Relaxed) || self.fail_indices.contains(&index)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BTreeMap<(Uuid, usize), Response>> {
        // A panic while holding the lock cannot leave the map half-written.
        self.stored.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self, attempt_id: Uuid, index: usize, response: Option<&Response>) {
        let mut stored = self.lock();
        match response {
            Some(r) => {
                stored.insert((attempt_id, index), r.clone());
            }
            None => {
                stored.remove(&(attempt_id, index));
            }
        }
    }
}

#[async_trait]
impl PersistenceService for InMemoryPersistence {
    async fn save_response(&self, request: &SaveRequest) -> anyhow::Result<()> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if self.rejects(request.question_index) {
            return Err(EngineError::SaveFailed {
                index: request.question_index,
                reason: "rejected by in-memory store".into(),
            }
            .into());
        }
        self.write(
            request.attempt_id,
            request.question_index,
            request.response.as_ref(),
        );
        tracing::debug!(
            attempt = %request.attempt_id,
            "stored response for question {}",
            request.question_index
        );
        Ok(())
    }

    async fn save_all(&self, request: &SaveAllRequest) -> anyhow::Result<()> {
        self.call_count.fetch_add(1, Ordering::Relaxed);
        if let Some(index) = request.responses.keys().find(|&&i| self.rejects(i)) {
            return Err(EngineError::Persistence(format!(
                "bulk save rejected at question {index}"
            ))
            .into());
        }
        for (index, response) in &request.responses {
            self.write(request.attempt_id, *index, response.as_ref());
        }
        tracing::debug!(
            attempt = %request.attempt_id,
            count = request.responses.len(),
            "stored all responses"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quizplay_core::model::Selection;

    fn request(attempt_id: Uuid, index: usize, text: &str) -> SaveRequest {
        SaveRequest {
            attempt_id,
            question_index: index,
            response: Some(Response::selected(Selection::Essay { text: text.into() })),
        }
    }

    #[tokio::test]
    async fn stores_and_clears() {
        let store = InMemoryPersistence::new();
        let id = Uuid::new_v4();
        store.save_response(&request(id, 0, "hello")).await.unwrap();
        assert!(store.stored(id, 0).is_some());

        store
            .save_response(&SaveRequest {
                attempt_id: id,
                question_index: 0,
                response: None,
            })
            .await
            .unwrap();
        assert!(store.stored(id, 0).is_none());
        assert_eq!(store.call_count(), 2);
    }

    #[tokio::test]
    async fn injected_failures_are_transient() {
        let store = InMemoryPersistence::with_failures([1]);
        let id = Uuid::new_v4();
        store.save_response(&request(id, 0, "ok")).await.unwrap();

        let err = store.save_response(&request(id, 1, "no")).await.unwrap_err();
        let engine = err.downcast_ref::<EngineError>().unwrap();
        assert!(engine.is_transient());
        assert!(store.stored(id, 1).is_none());

        store.set_fail_all(true);
        assert!(store.save_response(&request(id, 0, "again")).await.is_err());
        store.set_fail_all(false);
        assert!(store.save_response(&request(id, 0, "again")).await.is_ok());
    }

    #[tokio::test]
    async fn bulk_save_is_all_or_nothing() {
        let store = InMemoryPersistence::with_failures([2]);
        let id = Uuid::new_v4();
        let responses = (0..3)
            .map(|i| (i, request(id, i, "x").response))
            .collect::<BTreeMap<_, _>>();

        let result = store
            .save_all(&SaveAllRequest {
                attempt_id: id,
                responses: responses.clone(),
            })
            .await;
        assert!(result.is_err());
        assert!(store.is_empty());

        let ok = InMemoryPersistence::new();
        ok.save_all(&SaveAllRequest {
            attempt_id: id,
            responses,
        })
        .await
        .unwrap();
        assert_eq!(ok.len(), 3);
    }
}
