//! Internal disposal bag for managing cleanup hooks.

use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::{BoxError, SharedError};

pub(crate) type DisposeResult = Result<(), BoxError>;

enum Disposer {
    Sync(Box<dyn FnOnce() -> DisposeResult + Send>),
    Async(Box<dyn FnOnce() -> BoxFuture<'static, DisposeResult> + Send>),
}

/// Cleanup callbacks in registration order, run strictly in reverse.
///
/// Sync and async disposers share one ordering: the last one registered
/// runs first regardless of kind.
#[derive(Default)]
pub(crate) struct DisposeBag {
    entries: Vec<Disposer>,
}

impl DisposeBag {
    pub(crate) fn push_sync(&mut self, f: Box<dyn FnOnce() -> DisposeResult + Send>) {
        self.entries.push(Disposer::Sync(f));
    }

    pub(crate) fn push_async(&mut self, f: Box<dyn FnOnce() -> BoxFuture<'static, DisposeResult> + Send>) {
        self.entries.push(Disposer::Async(f));
    }

    /// Runs every disposer LIFO and collects the failures.
    ///
    /// A failing disposer never stops the ones registered before it.
    pub(crate) async fn run_all_reverse(mut self) -> Vec<SharedError> {
        let mut errors = Vec::new();
        while let Some(disposer) = self.entries.pop() {
            let result = match disposer {
                Disposer::Sync(f) => f(),
                Disposer::Async(f) => f().await,
            };
            if let Err(err) = result {
                tracing::warn!(error = %err, "disposer failed");
                errors.push(Arc::from(err));
            }
        }
        errors
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }
}
