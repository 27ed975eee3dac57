//! Factory decorators: deadlines, retries and time-bounded caching.
//!
//! Every decorator returns a new factory that records the original as its
//! [`inner`](crate::Factory::inner). The original is never changed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::factory::BodyResult;
use crate::{AnyArc, BoxError, DiError, Factory, Lifetime, ResolverContext};

/// Runs `work` on its own task and waits at most `timeout` for it.
///
/// On expiry the task is detached, not aborted: it runs to completion and
/// its result is dropped. Requires a Tokio runtime.
pub(crate) async fn race_deadline(name: Arc<str>, timeout: Duration, work: BoxFuture<'static, BodyResult>) -> BodyResult {
    let handle = tokio::spawn(work);
    match tokio::time::timeout(timeout, handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(Box::new(join_error)),
        Err(_) => {
            tracing::debug!(factory = %name, timeout_ms = timeout.as_millis() as u64, "factory abandoned after deadline");
            Err(Box::new(DiError::Timeout {
                factory: name.to_string(),
                timeout,
            }))
        }
    }
}

/// Fails with [`DiError::Timeout`] when `factory` takes longer than
/// `timeout`.
///
/// The result always resolves asynchronously. The abandoned body keeps
/// running in the background.
///
/// # Examples
///
/// ```
/// use ferrous_container::{async_factory, decoration, BoxError, Container, DiError, Resolver};
/// use std::time::Duration;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let slow = async_factory("Slow", |_| async {
///     tokio::time::sleep(Duration::from_secs(5)).await;
///     Ok::<_, BoxError>(1u8)
/// });
/// let bounded = decoration::timeout(&slow, Duration::from_millis(10));
///
/// let container = Container::new();
/// assert!(matches!(container.get_async(&bounded).await, Err(DiError::Timeout { .. })));
/// # }
/// ```
pub fn timeout<T: Send + Sync + 'static>(factory: &Factory<T>, timeout: Duration) -> Factory<T> {
    factory.decorate_deadline(timeout)
}

/// Retry schedule with exponential backoff.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub backoff_multiplier: f64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryPolicy {
    /// `attempts` tries with the same `delay` between them.
    pub fn fixed(attempts: u32, delay: Duration) -> Self {
        Self {
            max_attempts: attempts,
            initial_delay: delay,
            max_delay: delay,
            backoff_multiplier: 1.0,
        }
    }

    /// Delay after the failed attempt number `attempt` (zero-based).
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let base = self.initial_delay.as_secs_f64();
        let exponential = base * self.backoff_multiplier.powi(attempt as i32);
        let capped = exponential.min(self.max_delay.as_secs_f64());
        Duration::from_secs_f64(capped.max(0.0))
    }
}

fn is_retryable(err: &BoxError) -> bool {
    match err.downcast_ref::<DiError>() {
        Some(di) => !di.is_fatal() && !matches!(di, DiError::CircuitOpen { .. }),
        None => true,
    }
}

/// Re-runs a failing body according to `policy`, then surfaces the last
/// error.
///
/// Circular dependencies, frozen or disposed containers and open circuits
/// fail immediately; retrying cannot fix them. The result always resolves
/// asynchronously.
pub fn retry<T: Send + Sync + 'static>(factory: &Factory<T>, policy: RetryPolicy) -> Factory<T> {
    let inner = factory.erased().clone();
    factory.decorate(move |ctx| {
        let inner = inner.clone();
        let policy = policy.clone();
        Box::pin(async move {
            let mut attempt = 0;
            loop {
                attempt += 1;
                match inner.invoke(ctx.clone()).await {
                    Ok(value) => return Ok(value),
                    Err(err) if attempt < policy.max_attempts && is_retryable(&err) => {
                        let delay = policy.delay_for(attempt - 1);
                        tracing::debug!(
                            factory = inner.name(),
                            attempt,
                            delay_ms = delay.as_millis() as u64,
                            error = %err,
                            "retrying factory"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Err(err) => return Err(err),
                }
            }
        })
    })
}

type Slot = Arc<Mutex<Option<(Instant, AnyArc)>>>;

/// A transient factory that reuses its last value for a fixed time.
///
/// The cached value lives in the wrapper, not in any container, so every
/// container resolving the wrapper shares it.
///
/// # Examples
///
/// ```
/// use ferrous_container::{decoration, factory, Container, Resolver};
/// use std::sync::atomic::{AtomicUsize, Ordering};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// let calls = Arc::new(AtomicUsize::new(0));
/// let counter = calls.clone();
/// let rates = factory("ExchangeRates", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)));
/// let cached = decoration::ttl(&rates, Duration::from_secs(60));
///
/// let container = Container::new();
/// container.get(cached.factory()).unwrap();
/// container.get(cached.factory()).unwrap();
/// assert_eq!(calls.load(Ordering::SeqCst), 1);
///
/// cached.invalidate();
/// container.get(cached.factory()).unwrap();
/// assert_eq!(calls.load(Ordering::SeqCst), 2);
/// ```
pub struct TtlFactory<T> {
    factory: Factory<T>,
    slot: Slot,
    ttl: Duration,
}

impl<T: Send + Sync + 'static> TtlFactory<T> {
    /// The wrapped factory to resolve.
    pub fn factory(&self) -> &Factory<T> {
        &self.factory
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Forces the next resolution to recompute.
    pub fn invalidate(&self) {
        self.slot.lock().take();
    }

    /// Age of the held value, if any.
    pub fn age(&self) -> Option<Duration> {
        self.slot.lock().as_ref().map(|(at, _)| at.elapsed())
    }
}

impl<T> Clone for TtlFactory<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            slot: self.slot.clone(),
            ttl: self.ttl,
        }
    }
}

fn fresh(slot: &Slot, ttl: Duration) -> Option<AnyArc> {
    match &*slot.lock() {
        Some((at, value)) if at.elapsed() < ttl => Some(value.clone()),
        _ => None,
    }
}

fn remember(slot: &Slot, result: &BodyResult) {
    if let Ok(value) = result {
        *slot.lock() = Some((Instant::now(), value.clone()));
    }
}

/// Caches the value of `factory` for `ttl`, then recomputes it.
///
/// Synchronous factories stay synchronous.
pub fn ttl<T: Send + Sync + 'static>(factory: &Factory<T>, ttl: Duration) -> TtlFactory<T> {
    let slot: Slot = Arc::new(Mutex::new(None));
    let inner = factory.erased().clone();

    let wrapped = if inner.is_async() {
        let slot = slot.clone();
        factory.decorate_with_lifetime(Lifetime::Transient, move |ctx: ResolverContext| {
            let inner = inner.clone();
            let slot = slot.clone();
            Box::pin(async move {
                if let Some(value) = fresh(&slot, ttl) {
                    return Ok(value);
                }
                let result = inner.invoke(ctx).await;
                remember(&slot, &result);
                result
            })
        })
    } else {
        let slot = slot.clone();
        factory.decorate_sync(Lifetime::Transient, move |ctx: &ResolverContext| {
            if let Some(value) = fresh(&slot, ttl) {
                return Ok(value);
            }
            let result = inner
                .invoke_sync(ctx)
                .unwrap_or_else(|| Err(Box::new(DiError::AsyncRequired { factory: inner.name().to_string() }) as BoxError));
            remember(&slot, &result);
            result
        })
    };

    TtlFactory {
        factory: wrapped,
        slot,
        ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{async_factory, factory, Container, Resolver};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn flaky(fail_times: u32, calls: &Arc<AtomicU32>) -> Factory<u32> {
        let calls = calls.clone();
        factory("Flaky", move |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n < fail_times {
                Err(format!("attempt {n} failed").into())
            } else {
                Ok(n)
            }
        })
        .transient()
    }

    #[test]
    fn delays_grow_and_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(25),
            backoff_multiplier: 2.0,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(10));
        assert_eq!(policy.delay_for(1), Duration::from_millis(20));
        assert_eq!(policy.delay_for(2), Duration::from_millis(25));
        assert_eq!(RetryPolicy::fixed(3, Duration::from_millis(7)).delay_for(4), Duration::from_millis(7));
    }

    #[tokio::test]
    async fn retry_succeeds_within_budget() {
        let calls = Arc::new(AtomicU32::new(0));
        let retried = retry(&flaky(2, &calls), RetryPolicy::fixed(3, Duration::from_millis(1)));
        let container = Container::new();
        assert_eq!(*container.get_async(&retried).await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(retried.inner().map(|f| f.name()), Some("Flaky"));
    }

    #[tokio::test]
    async fn retry_surfaces_the_last_error() {
        let calls = Arc::new(AtomicU32::new(0));
        let retried = retry(&flaky(10, &calls), RetryPolicy::fixed(2, Duration::from_millis(1)));
        let container = Container::new();
        let err = container.get_async(&retried).await.unwrap_err();
        assert!(err.to_string().contains("attempt 1 failed"), "{err}");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn fatal_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let frozen = factory("Frozen", move |_| -> Result<u8, BoxError> {
            counter.fetch_add(1, Ordering::SeqCst);
            Err(Box::new(DiError::Frozen { factory: "Other".into() }))
        });
        let retried = retry(&frozen, RetryPolicy::fixed(5, Duration::from_millis(1)));
        let container = Container::new();
        assert!(matches!(container.get_async(&retried).await, Err(DiError::Frozen { .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn deadline_abandons_but_does_not_cancel() {
        let finished = Arc::new(AtomicU32::new(0));
        let done = finished.clone();
        let slow = async_factory("Slow", move |_| {
            let done = done.clone();
            async move {
                tokio::time::sleep(Duration::from_millis(40)).await;
                done.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(1u8)
            }
        });
        let bounded = timeout(&slow, Duration::from_millis(5));

        let container = Container::new();
        match container.get_async(&bounded).await {
            Err(DiError::Timeout { factory, timeout }) => {
                assert_eq!(factory, "Slow");
                assert_eq!(timeout, Duration::from_millis(5));
            }
            other => panic!("expected timeout, got {other:?}"),
        }
        assert!(!container.has(&bounded));

        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(finished.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn with_options_timeout_applies_to_own_body() {
        let slow = async_factory("Slow", |_| async {
            tokio::time::sleep(Duration::from_millis(200)).await;
            Ok::<_, BoxError>(1u8)
        })
        .with_options(crate::FactoryOptions {
            transient: true,
            timeout: Some(Duration::from_millis(5)),
        });
        let container = Container::new();
        assert!(matches!(container.get_async(&slow).await, Err(DiError::Timeout { .. })));
    }

    #[tokio::test]
    async fn ttl_recomputes_after_expiry() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let source = async_factory("Source", move |_| {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            async move { Ok::<_, BoxError>(n) }
        });
        let cached = ttl(&source, Duration::from_millis(20));
        assert!(cached.factory().is_async());
        assert_eq!(cached.factory().lifetime(), Lifetime::Transient);

        let container = Container::new();
        assert_eq!(*container.get_async(cached.factory()).await.unwrap(), 0);
        assert_eq!(*container.get_async(cached.factory()).await.unwrap(), 0);
        tokio::time::sleep(Duration::from_millis(30)).await;
        assert_eq!(*container.get_async(cached.factory()).await.unwrap(), 1);
        assert!(cached.age().is_some());
    }
}
