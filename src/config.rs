//! Configuration for containers and circuit breakers.
//!
//! Both option structs have code defaults and builder-style setters.
//! `ContainerOptions` can additionally be read from the environment:
//!
//! | Variable | Field | Default |
//! |---|---|---|
//! | `FERROUS_CONTAINER_DETECT_CIRCULAR` | `detect_circular` | `true` |
//! | `FERROUS_CONTAINER_MAX_DEPTH` | `max_depth` | `256` |

use std::env;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::circuit_breaker::CircuitState;

pub const DETECT_CIRCULAR_VAR: &str = "FERROUS_CONTAINER_DETECT_CIRCULAR";
pub const MAX_DEPTH_VAR: &str = "FERROUS_CONTAINER_MAX_DEPTH";

/// Maximum resolution depth. Each level costs a few KiB of stack, so this
/// stays well inside a default 2 MiB thread even in debug builds.
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Options for [`Container::with_options`](crate::Container::with_options).
///
/// # Examples
///
/// ```
/// use ferrous_container::{Container, ContainerOptions};
///
/// let container = Container::with_options(ContainerOptions::default().max_depth(64));
/// assert_eq!(container.options().max_depth, 64);
/// assert!(container.options().detect_circular);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ContainerOptions {
    /// Fail with `DiError::Circular` when a factory re-enters its own chain.
    pub detect_circular: bool,
    /// Longest resolution chain before `DiError::DepthExceeded`. Applies
    /// even with `detect_circular` off, so at the default a cycle cannot
    /// overflow the stack. Raising it needs a correspondingly larger stack.
    pub max_depth: usize,
}

impl Default for ContainerOptions {
    fn default() -> Self {
        Self {
            detect_circular: true,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl ContainerOptions {
    pub fn detect_circular(mut self, enabled: bool) -> Self {
        self.detect_circular = enabled;
        self
    }

    pub fn max_depth(mut self, depth: usize) -> Self {
        self.max_depth = depth;
        self
    }

    /// Defaults overridden by the process environment.
    pub fn from_env() -> Self {
        Self::from_env_with(|key| env::var(key).ok())
    }

    /// Defaults overridden by values from `lookup`.
    ///
    /// Unparseable values are ignored with a warning and the default is kept.
    pub fn from_env_with(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut options = Self::default();

        if let Some(raw) = lookup(DETECT_CIRCULAR_VAR) {
            match parse_bool(&raw) {
                Some(value) => options.detect_circular = value,
                None => tracing::warn!(var = DETECT_CIRCULAR_VAR, value = %raw, "ignoring invalid boolean"),
            }
        }

        if let Some(raw) = lookup(MAX_DEPTH_VAR) {
            match raw.trim().parse::<usize>() {
                Ok(value) if value > 0 => options.max_depth = value,
                _ => tracing::warn!(var = MAX_DEPTH_VAR, value = %raw, "ignoring invalid depth"),
            }
        }

        options
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Called with `(circuit name, old state, new state)` on every transition.
pub type StateChangeHook = Arc<dyn Fn(&str, CircuitState, CircuitState) + Send + Sync>;

/// Options for [`circuit_breaker`](crate::circuit_breaker()).
///
/// A circuit keeps the options it was created with; later call sites that
/// reuse its name share the existing state and options.
#[derive(Clone)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitBreakerOptions {
    /// Consecutive failures in CLOSED that open the circuit.
    pub failure_threshold: u32,
    /// Successes in HALF_OPEN that close it again.
    pub success_threshold: u32,
    /// How long OPEN rejects calls after the last failure.
    pub reset_timeout: Duration,
    #[cfg_attr(feature = "serde", serde(skip))]
    pub on_state_change: Option<StateChangeHook>,
}

impl Default for CircuitBreakerOptions {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 3,
            reset_timeout: Duration::from_secs(60),
            on_state_change: None,
        }
    }
}

impl CircuitBreakerOptions {
    pub fn failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    pub fn success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self
    }

    pub fn reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    pub fn on_state_change(mut self, hook: impl Fn(&str, CircuitState, CircuitState) + Send + Sync + 'static) -> Self {
        self.on_state_change = Some(Arc::new(hook));
        self
    }
}

impl fmt::Debug for CircuitBreakerOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CircuitBreakerOptions")
            .field("failure_threshold", &self.failure_threshold)
            .field("success_threshold", &self.success_threshold)
            .field("reset_timeout", &self.reset_timeout)
            .field("on_state_change", &self.on_state_change.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn env_values_override_defaults() {
        let options = ContainerOptions::from_env_with(lookup(&[(DETECT_CIRCULAR_VAR, "off"), (MAX_DEPTH_VAR, "32")]));
        assert!(!options.detect_circular);
        assert_eq!(options.max_depth, 32);
    }

    #[test]
    fn invalid_env_values_keep_defaults() {
        let options = ContainerOptions::from_env_with(lookup(&[(DETECT_CIRCULAR_VAR, "maybe"), (MAX_DEPTH_VAR, "0")]));
        assert_eq!(options, ContainerOptions::default());
    }

    #[test]
    fn circuit_options_builders() {
        let options = CircuitBreakerOptions::default()
            .failure_threshold(2)
            .success_threshold(1)
            .reset_timeout(Duration::from_millis(50))
            .on_state_change(|_, _, _| {});
        assert_eq!(options.failure_threshold, 2);
        assert_eq!(options.success_threshold, 1);
        assert_eq!(options.reset_timeout, Duration::from_millis(50));
        assert!(format!("{options:?}").contains("on_state_change: true"));
    }
}
