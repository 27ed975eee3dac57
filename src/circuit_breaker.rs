//! Circuit breaker for protecting against cascading failures.
//!
//! A circuit counts failures of the factories wrapped with its name. Past
//! `failure_threshold` consecutive failures it opens and rejects calls
//! without running them until `reset_timeout` has passed since the last
//! failure. Then it lets calls through in HALF_OPEN; `success_threshold`
//! successes close it again, any failure reopens it.
//!
//! | From | Trigger | To |
//! |---|---|---|
//! | CLOSED | failures reach the threshold | OPEN |
//! | OPEN | reset timeout elapsed, on the next call | HALF_OPEN |
//! | HALF_OPEN | successes reach the threshold | CLOSED |
//! | HALF_OPEN | any failure | OPEN |
//!
//! Circuits live in a process-wide registry keyed by name. Every wrapper
//! created with the same name, from anywhere, shares one circuit.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::Lazy;
use parking_lot::Mutex;

use crate::plugin::{define_plugin, FnPlugin, Internals};
use crate::{BoxError, CircuitBreakerOptions, Container, DiError, DiResult, Factory};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CircuitState {
    Closed,
    Open,
    HalfOpen,
}

impl fmt::Display for CircuitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            CircuitState::Closed => "CLOSED",
            CircuitState::Open => "OPEN",
            CircuitState::HalfOpen => "HALF_OPEN",
        })
    }
}

/// Point-in-time view of a circuit.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CircuitSnapshot {
    pub name: String,
    pub state: CircuitState,
    pub failures: u32,
    /// Successes so far in HALF_OPEN.
    pub successes: u32,
    pub last_error: Option<String>,
    /// Time since the last failure, if there was one.
    pub since_last_failure: Option<Duration>,
}

#[derive(Debug)]
struct CircuitInner {
    state: CircuitState,
    failures: u32,
    successes: u32,
    last_failure: Option<Instant>,
    last_error: Option<String>,
}

impl CircuitInner {
    fn new() -> Self {
        Self {
            state: CircuitState::Closed,
            failures: 0,
            successes: 0,
            last_failure: None,
            last_error: None,
        }
    }
}

type Transition = Option<(CircuitState, CircuitState)>;

/// One named circuit.
pub struct Circuit {
    name: String,
    options: CircuitBreakerOptions,
    inner: Mutex<CircuitInner>,
}

impl Circuit {
    pub fn new(name: impl Into<String>, options: CircuitBreakerOptions) -> Self {
        Self {
            name: name.into(),
            options,
            inner: Mutex::new(CircuitInner::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn options(&self) -> &CircuitBreakerOptions {
        &self.options
    }

    pub fn state(&self) -> CircuitState {
        self.inner.lock().state
    }

    pub fn snapshot(&self) -> CircuitSnapshot {
        let inner = self.inner.lock();
        CircuitSnapshot {
            name: self.name.clone(),
            state: inner.state,
            failures: inner.failures,
            successes: inner.successes,
            last_error: inner.last_error.clone(),
            since_last_failure: inner.last_failure.map(|at| at.elapsed()),
        }
    }

    /// Admits a call or rejects it with [`DiError::CircuitOpen`].
    ///
    /// An OPEN circuit whose reset timeout has elapsed moves to HALF_OPEN
    /// here, before the admitted call runs.
    pub fn try_acquire(&self) -> DiResult<()> {
        let transition = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed | CircuitState::HalfOpen => None,
                CircuitState::Open => {
                    let cooled = inner
                        .last_failure
                        .map_or(true, |at| at.elapsed() >= self.options.reset_timeout);
                    if !cooled {
                        return Err(DiError::CircuitOpen {
                            name: self.name.clone(),
                            failures: inner.failures,
                        });
                    }
                    inner.state = CircuitState::HalfOpen;
                    inner.successes = 0;
                    Some((CircuitState::Open, CircuitState::HalfOpen))
                }
            }
        };
        self.notify(transition);
        Ok(())
    }

    pub fn record_success(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            match inner.state {
                CircuitState::Closed => {
                    inner.failures = 0;
                    None
                }
                CircuitState::HalfOpen => {
                    inner.successes += 1;
                    if inner.successes >= self.options.success_threshold {
                        inner.state = CircuitState::Closed;
                        inner.failures = 0;
                        inner.successes = 0;
                        inner.last_error = None;
                        Some((CircuitState::HalfOpen, CircuitState::Closed))
                    } else {
                        None
                    }
                }
                // Admitted before a concurrent failure reopened the circuit.
                CircuitState::Open => None,
            }
        };
        self.notify(transition);
    }

    pub fn record_failure(&self, error: impl fmt::Display) {
        let transition = {
            let mut inner = self.inner.lock();
            inner.failures += 1;
            inner.last_failure = Some(Instant::now());
            inner.last_error = Some(error.to_string());
            match inner.state {
                CircuitState::Closed if inner.failures >= self.options.failure_threshold => {
                    inner.state = CircuitState::Open;
                    Some((CircuitState::Closed, CircuitState::Open))
                }
                CircuitState::HalfOpen => {
                    inner.state = CircuitState::Open;
                    inner.successes = 0;
                    Some((CircuitState::HalfOpen, CircuitState::Open))
                }
                _ => None,
            }
        };
        self.notify(transition);
    }

    /// Forces CLOSED with zeroed counters.
    pub fn reset(&self) {
        let transition = {
            let mut inner = self.inner.lock();
            let old = inner.state;
            *inner = CircuitInner::new();
            (old != CircuitState::Closed).then_some((old, CircuitState::Closed))
        };
        self.notify(transition);
    }

    /// Runs `operation` under this circuit.
    pub async fn call<T, F, Fut>(&self, operation: F) -> DiResult<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = DiResult<T>>,
    {
        self.try_acquire()?;
        match operation().await {
            Ok(value) => {
                self.record_success();
                Ok(value)
            }
            Err(err) => {
                self.record_failure(&err);
                Err(err)
            }
        }
    }

    // Runs outside the lock so a callback may inspect the circuit.
    fn notify(&self, transition: Transition) {
        let Some((from, to)) = transition else {
            return;
        };
        if to == CircuitState::Open {
            tracing::warn!(circuit = %self.name, %from, %to, "circuit opened");
        } else {
            tracing::info!(circuit = %self.name, %from, %to, "circuit state changed");
        }
        if let Some(hook) = &self.options.on_state_change {
            hook(&self.name, from, to);
        }
    }
}

impl fmt::Debug for Circuit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Circuit")
            .field("name", &self.name)
            .field("state", &self.state())
            .finish()
    }
}

static REGISTRY: Lazy<Mutex<HashMap<String, Arc<Circuit>>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Returns the circuit called `name`, creating it with `options` if needed.
///
/// An existing circuit keeps the options it was created with.
pub fn get_or_create_circuit(name: &str, options: &CircuitBreakerOptions) -> Arc<Circuit> {
    REGISTRY
        .lock()
        .entry(name.to_string())
        .or_insert_with(|| Arc::new(Circuit::new(name, options.clone())))
        .clone()
}

pub fn get_circuit(name: &str) -> Option<Arc<Circuit>> {
    REGISTRY.lock().get(name).cloned()
}

/// Every registered circuit, sorted by name.
pub fn all_circuits() -> Vec<Arc<Circuit>> {
    let mut circuits: Vec<_> = REGISTRY.lock().values().cloned().collect();
    circuits.sort_by(|a, b| a.name.cmp(&b.name));
    circuits
}

pub fn reset_all_circuits() {
    for circuit in all_circuits() {
        circuit.reset();
    }
}

/// Forgets every circuit. Wrappers recreate theirs on their next call.
pub fn clear_circuit_registry() {
    REGISTRY.lock().clear();
}

/// Builds circuit-protected factories. See [`circuit_breaker`].
#[derive(Debug, Clone)]
pub struct CircuitBreaker {
    name: String,
    options: CircuitBreakerOptions,
}

/// Creates a breaker for the circuit called `name`.
///
/// # Examples
///
/// ```
/// use ferrous_container::{circuit_breaker, factory, BoxError, CircuitBreakerOptions, Container, DiError, Resolver};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let breaker = circuit_breaker("payments-doc", CircuitBreakerOptions::default().failure_threshold(1));
/// let client = breaker.wrap(
///     &factory("PaymentsClient", |_| -> Result<u8, BoxError> { Err("connection refused".into()) }).transient(),
/// );
///
/// let container = Container::new();
/// assert!(matches!(container.get_async(&client).await, Err(DiError::Resolution { .. })));
/// assert!(matches!(container.get_async(&client).await, Err(DiError::CircuitOpen { .. })));
/// # }
/// ```
pub fn circuit_breaker(name: impl Into<String>, options: CircuitBreakerOptions) -> CircuitBreaker {
    CircuitBreaker {
        name: name.into(),
        options,
    }
}

impl CircuitBreaker {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared circuit, created on first use.
    pub fn circuit(&self) -> Arc<Circuit> {
        get_or_create_circuit(&self.name, &self.options)
    }

    /// Wraps `factory` so every invocation goes through the circuit.
    ///
    /// The result keeps the inner factory's name and lifetime but always
    /// resolves asynchronously. Wrap a transient factory to have the circuit
    /// consulted on every resolution; a singleton is only invoked until it
    /// first succeeds.
    pub fn wrap<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Factory<T> {
        let breaker = self.clone();
        let inner = factory.erased().clone();
        factory.decorate(move |ctx| {
            let circuit = breaker.circuit();
            let inner = inner.clone();
            Box::pin(async move {
                circuit.try_acquire().map_err(BoxError::from)?;
                match inner.invoke(ctx).await {
                    Ok(value) => {
                        circuit.record_success();
                        Ok(value)
                    }
                    Err(err) => {
                        circuit.record_failure(&err);
                        Err(err)
                    }
                }
            })
        })
    }
}

/// Methods added by the [`circuits`] plugin.
#[derive(Debug, Clone, Copy, Default)]
pub struct CircuitMethods;

impl CircuitMethods {
    pub fn get_circuit(&self, name: &str) -> Option<CircuitSnapshot> {
        get_circuit(name).map(|circuit| circuit.snapshot())
    }

    pub fn get_all_circuits(&self) -> Vec<CircuitSnapshot> {
        all_circuits().iter().map(|circuit| circuit.snapshot()).collect()
    }

    pub fn reset_all_circuits(&self) {
        reset_all_circuits();
    }

    pub fn clear_circuit_registry(&self) {
        clear_circuit_registry();
    }
}

/// Plugin exposing the process-wide circuit registry.
pub fn circuits() -> FnPlugin<impl FnOnce(&Container, &Internals) -> CircuitMethods, CircuitMethods> {
    define_plugin("circuits", |_: &Container, _: &Internals| CircuitMethods)
}
