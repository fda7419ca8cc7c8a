//! Single point of access to the NER inference session.
//!
//! An inference session (model weights on an accelerator, or one server
//! connection) is stateful and not safe to call concurrently. This service
//! owns it and hands out exclusive access:
//! - `acquire()` blocks until the session is free (extraction runs)
//! - `try_acquire()` skips if busy (health checks; a running extraction
//!   already proves the model works)
//! - `current_operation()` reports what holds the session and since when

use std::ops::{Deref, DerefMut};
use std::sync::{Mutex, MutexGuard};

use serde::Serialize;

use crate::pipeline::extraction::NerModel;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

/// What kind of operation holds the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    /// Full extraction run over a notes folder
    Extraction,
    /// One-off reachability check of the model
    HealthCheck,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Extraction => write!(f, "Extraction"),
            Self::HealthCheck => write!(f, "Health check"),
        }
    }
}

/// Snapshot of the operation currently holding the session.
#[derive(Debug, Clone, Serialize)]
pub struct ActiveOperation {
    pub kind: OperationKind,
    pub model: String,
    /// RFC 3339 timestamp.
    pub started_at: String,
}

#[derive(Debug, thiserror::Error)]
pub enum InferenceServiceError {
    #[error("Inference session lock poisoned")]
    LockPoisoned,
}

// ═══════════════════════════════════════════════════════════
// InferenceService
// ═══════════════════════════════════════════════════════════

pub struct InferenceService<M> {
    session: Mutex<M>,
    current_op: Mutex<Option<ActiveOperation>>,
    model_name: String,
}

impl<M: NerModel> InferenceService<M> {
    pub fn new(model: M) -> Self {
        let model_name = model.name().to_string();
        Self {
            session: Mutex::new(model),
            current_op: Mutex::new(None),
            model_name,
        }
    }

    pub fn model_name(&self) -> &str {
        &self.model_name
    }

    /// Block until the session is free and take it.
    ///
    /// Hold the guard for the whole operation; dropping it releases the
    /// session and clears the current operation.
    pub fn acquire(
        &self,
        kind: OperationKind,
    ) -> Result<InferenceGuard<'_, M>, InferenceServiceError> {
        let session = self
            .session
            .lock()
            .map_err(|_| InferenceServiceError::LockPoisoned)?;
        self.set_current_op(kind);
        Ok(InferenceGuard {
            session,
            service: self,
        })
    }

    /// Take the session only if nobody holds it.
    pub fn try_acquire(&self, kind: OperationKind) -> Option<InferenceGuard<'_, M>> {
        let session = self.session.try_lock().ok()?;
        self.set_current_op(kind);
        Some(InferenceGuard {
            session,
            service: self,
        })
    }

    pub fn current_operation(&self) -> Option<ActiveOperation> {
        self.current_op.lock().ok()?.clone()
    }

    pub fn is_busy(&self) -> bool {
        self.session.try_lock().is_err()
    }

    // ── Internal ────────────────────────────────────────────

    fn set_current_op(&self, kind: OperationKind) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = Some(ActiveOperation {
                kind,
                model: self.model_name.clone(),
                started_at: chrono::Utc::now().to_rfc3339(),
            });
        }
    }
}

impl<M> InferenceService<M> {
    fn clear_current_op(&self) {
        if let Ok(mut current) = self.current_op.lock() {
            *current = None;
        }
    }
}

// ═══════════════════════════════════════════════════════════
// InferenceGuard: RAII exclusive access token
// ═══════════════════════════════════════════════════════════

/// Exclusive access to the session; derefs to the model.
pub struct InferenceGuard<'a, M> {
    session: MutexGuard<'a, M>,
    service: &'a InferenceService<M>,
}

impl<M> Deref for InferenceGuard<'_, M> {
    type Target = M;

    fn deref(&self) -> &M {
        &self.session
    }
}

impl<M> DerefMut for InferenceGuard<'_, M> {
    fn deref_mut(&mut self) -> &mut M {
        &mut self.session
    }
}

impl<M> Drop for InferenceGuard<'_, M> {
    fn drop(&mut self) {
        self.service.clear_current_op();
    }
}

// ═══════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════
