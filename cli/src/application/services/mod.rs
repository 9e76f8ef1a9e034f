//! Application services — use-case orchestration.
//!
//! Each service module implements a single use-case by composing domain logic
//! with port trait calls. Services import only from `crate::domain` and
//! `crate::application::ports` — never from `crate::infra`, `crate::commands`,
//! or `crate::output`.

pub mod executor;
pub mod install;
pub mod lifecycle;
pub mod orchestrator;
pub mod session;
pub mod transfer;
pub mod upload;

use std::sync::Arc;

use crate::application::ports::{ProgressReporter, TransferProgress};

/// Prefixes every message with a task tag, e.g. `[install]`, so output from
/// the two concurrent tasks stays attributable.
pub struct TaggedReporter<R> {
    tag: &'static str,
    inner: Arc<R>,
}

impl<R> TaggedReporter<R> {
    #[must_use]
    pub fn new(tag: &'static str, inner: Arc<R>) -> Self {
        Self { tag, inner }
    }

    fn tagged(&self, message: &str) -> String {
        format!("[{}] {message}", self.tag)
    }
}

impl<R: ProgressReporter> ProgressReporter for TaggedReporter<R> {
    fn step(&self, message: &str) {
        self.inner.step(&self.tagged(message));
    }

    fn success(&self, message: &str) {
        self.inner.success(&self.tagged(message));
    }

    fn warn(&self, message: &str) {
        self.inner.warn(&self.tagged(message));
    }

    fn transfer(&self, label: &str) -> Box<dyn TransferProgress> {
        self.inner.transfer(&self.tagged(label))
    }
}
