//! Error types for the dependency injection container.

use std::error::Error as StdError;
use std::sync::Arc;
use std::time::Duration;

/// Boxed error returned by factory bodies and disposers.
///
/// Any error type converts into it with `?`, including [`DiError`], so a
/// factory can propagate failures from nested resolutions unchanged.
pub type BoxError = Box<dyn StdError + Send + Sync>;

/// Shared error cause. `DiError` must be `Clone` because a single async
/// resolution hands its outcome to every concurrent waiter.
pub type SharedError = Arc<dyn StdError + Send + Sync>;

/// Dependency injection errors
///
/// Represents the various error conditions that can occur while resolving
/// factories, disposing a container or calling through a circuit breaker.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::DiError;
///
/// let circular = DiError::Circular { chain: vec!["A".into(), "B".into(), "A".into()] };
/// assert_eq!(circular.to_string(), "Circular dependency detected: A -> B -> A");
///
/// let frozen = DiError::Frozen { factory: "Database".into() };
/// assert!(frozen.to_string().contains("frozen"));
/// ```
#[derive(Debug, Clone, thiserror::Error)]
pub enum DiError {
    /// A factory was requested while it was already being resolved on the
    /// same chain. `chain` ends with the factory that closed the loop.
    #[error("Circular dependency detected: {}", .chain.join(" -> "))]
    Circular { chain: Vec<String> },

    /// A factory body failed. The original error is kept as `source`.
    #[error("Failed to resolve {factory}: {source}")]
    Resolution {
        factory: String,
        chain: Vec<String>,
        #[source]
        source: SharedError,
    },

    /// A factory did not settle before its deadline.
    #[error("Factory {factory} timed out after {}ms", .timeout.as_millis())]
    Timeout { factory: String, timeout: Duration },

    /// The container is frozen and the factory was not cached yet.
    #[error("Cannot resolve {factory}: container is frozen")]
    Frozen { factory: String },

    /// A circuit breaker rejected the call without running the factory.
    #[error("Circuit {name} is open after {failures} failures")]
    CircuitOpen { name: String, failures: u32 },

    /// One or more disposers failed. Every disposer still ran.
    #[error("{} disposer(s) failed during dispose: {}", .errors.len(), join_errors(.errors))]
    Dispose { errors: Vec<SharedError> },

    /// Synchronous `get` reached a factory that must be awaited.
    #[error("Factory {factory} resolves asynchronously; use get_async")]
    AsyncRequired { factory: String },

    /// Maximum resolution depth exceeded
    #[error("Max depth {0} exceeded")]
    DepthExceeded(usize),

    /// A cached value did not have the type the factory declares.
    #[error("Type mismatch for: {0}")]
    TypeMismatch(String),

    /// The container was disposed.
    #[error("Container has been disposed")]
    Disposed,
}

fn join_errors(errors: &[SharedError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl DiError {
    /// Wraps a failure from a factory body.
    ///
    /// Errors that already are [`DiError`] (a nested `get` that failed) pass
    /// through unchanged so a cycle deep in the graph still surfaces as
    /// [`DiError::Circular`] at the top.
    pub(crate) fn from_factory(factory: &str, chain: &[String], err: BoxError) -> Self {
        match err.downcast::<DiError>() {
            Ok(di) => *di,
            Err(source) => DiError::Resolution {
                factory: factory.to_string(),
                chain: chain.to_vec(),
                source: Arc::from(source),
            },
        }
    }

    /// Returns `true` for errors that must never be retried.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            DiError::Circular { .. } | DiError::Frozen { .. } | DiError::Disposed | DiError::DepthExceeded(_)
        )
    }

    /// Suggested fixes for a circular dependency.
    ///
    /// Empty for every other variant.
    pub fn suggestions(&self) -> Vec<String> {
        let DiError::Circular { chain } = self else {
            return Vec::new();
        };
        let mut fixes = vec![
            "Defer one side of the cycle with `resolver(&factory)` and resolve it lazily after construction".to_string(),
            "Extract the state both factories need into a third factory they can both depend on".to_string(),
        ];
        if let (Some(first), Some(last)) = (chain.first(), chain.iter().rev().nth(1)) {
            fixes.push(format!("Remove the dependency of {last} on {first}"));
        }
        fixes
    }
}

/// Result type for DI operations
///
/// A convenience type alias for `Result<T, DiError>` used throughout
/// ferrous-container.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{DiResult, DiError};
///
/// fn failing_operation() -> DiResult<()> {
///     Err(DiError::Disposed)
/// }
///
/// assert!(failing_operation().is_err());
/// ```
pub type DiResult<T> = Result<T, DiError>;
