//! Background extraction worker.
//!
//! Runs one extraction on its own thread so callers stay responsive.
//! Progress events arrive on a channel; the channel closes when the run
//! ends. The worker holds the inference session for the whole run.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver};
use std::sync::Arc;
use std::thread::JoinHandle;

use super::ner::NerModel;
use super::orchestrator::run_extraction;
use super::types::ProgressEvent;
use super::ExtractionError;
use crate::config::ExtractionConfig;
use crate::inference_service::{InferenceService, OperationKind};
use crate::models::EntityStore;

/// Handle for a running extraction.
///
/// Dropping the handle cancels the run and waits for the thread.
pub struct ExtractionHandle {
    cancel: Arc<AtomicBool>,
    events: Receiver<ProgressEvent>,
    handle: Option<JoinHandle<Result<EntityStore, ExtractionError>>>,
}

impl ExtractionHandle {
    /// Request cancellation. The current batch finishes; nothing is written.
    pub fn cancel(&self) {
        self.cancel.store(true, Ordering::Relaxed);
    }

    /// Progress events. Iterating ends once the run has finished.
    pub fn events(&self) -> &Receiver<ProgressEvent> {
        &self.events
    }

    /// Wait for the run and return its outcome.
    pub fn join(mut self) -> Result<EntityStore, ExtractionError> {
        match self.handle.take() {
            Some(handle) => handle.join().unwrap_or(Err(ExtractionError::WorkerPanicked)),
            None => Err(ExtractionError::WorkerPanicked),
        }
    }
}

impl Drop for ExtractionHandle {
    fn drop(&mut self) {
        if let Some(h) = self.handle.take() {
            self.cancel();
            let _ = h.join();
        }
    }
}

/// Start an extraction on a worker thread.
///
/// Blocks inside the worker (not here) until `service` is free.
pub fn spawn_extraction<M>(
    config: ExtractionConfig,
    service: Arc<InferenceService<M>>,
) -> ExtractionHandle
where
    M: NerModel + Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let flag = cancel.clone();
    let (tx, rx) = mpsc::channel();

    let handle = std::thread::spawn(move || {
        let progress_fn = move |event: ProgressEvent| {
            // receiver gone means nobody is listening; keep running
            let _ = tx.send(event);
        };

        let mut session = match service.acquire(OperationKind::Extraction) {
            Ok(session) => session,
            Err(e) => {
                tracing::error!(error = %e, "Could not acquire inference session");
                progress_fn(ProgressEvent::Failed {
                    error: e.to_string(),
                });
                return Err(e.into());
            }
        };

        run_extraction(&config, &mut *session, Some(&progress_fn), Some(&flag))
    });

    ExtractionHandle {
        cancel,
        events: rx,
        handle: Some(handle),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::extraction::MockNerModel;

    fn service() -> Arc<InferenceService<MockNerModel>> {
        Arc::new(InferenceService::new(
            MockNerModel::new().with_term("Ada", "PER", 0.9),
        ))
    }

    #[test]
    fn events_end_with_completed_and_join_returns_store() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Ada wrote.").unwrap();
        let config = ExtractionConfig::new(dir.path(), dir.path().join("entities.json"));

        let handle = spawn_extraction(config, service());
        let events: Vec<_> = handle.events().iter().collect();
        let store = handle.join().unwrap();

        assert!(matches!(events.first(), Some(ProgressEvent::Started { .. })));
        assert!(matches!(events.last(), Some(ProgressEvent::Completed { .. })));
        assert_eq!(events.iter().filter(|e| e.is_terminal()).count(), 1);
        assert_eq!(store.entities[0].canonical_word, "Ada");
    }

    #[test]
    fn failure_is_reported_on_channel_and_join() {
        let dir = tempfile::tempdir().unwrap();
        let config = ExtractionConfig::new(dir.path().join("missing"), dir.path().join("e.json"));

        let handle = spawn_extraction(config, service());
        let events: Vec<_> = handle.events().iter().collect();

        assert!(matches!(events.last(), Some(ProgressEvent::Failed { .. })));
        assert!(matches!(handle.join(), Err(ExtractionError::Config(_))));
    }

    #[test]
    fn session_is_released_after_run() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Ada").unwrap();
        let config = ExtractionConfig::new(dir.path(), dir.path().join("entities.json"));
        let service = service();

        spawn_extraction(config, service.clone()).join().unwrap();
        assert!(!service.is_busy());
        assert!(service.current_operation().is_none());
    }

    #[test]
    fn waits_for_busy_session() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Ada").unwrap();
        let config = ExtractionConfig::new(dir.path(), dir.path().join("entities.json"));
        let service = service();

        let guard = service.acquire(OperationKind::HealthCheck).unwrap();
        let handle = spawn_extraction(config, service.clone());
        std::thread::sleep(std::time::Duration::from_millis(50));
        assert!(handle.events().try_recv().is_err());

        drop(guard);
        assert!(handle.join().is_ok());
    }

    #[test]
    fn poisoned_session_is_reported_as_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.md"), "Ada").unwrap();
        let output = dir.path().join("entities.json");
        let config = ExtractionConfig::new(dir.path(), &output);
        let service = service();

        let holder = service.clone();
        let crashed = std::thread::spawn(move || {
            let _session = holder.acquire(OperationKind::Extraction).unwrap();
            panic!("model crashed mid-run");
        })
        .join();
        assert!(crashed.is_err());

        let handle = spawn_extraction(config, service);
        let events: Vec<_> = handle.events().iter().collect();

        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], ProgressEvent::Failed { .. }));
        assert!(matches!(handle.join(), Err(ExtractionError::SessionUnavailable(_))));
        assert!(!output.exists());
    }
}
