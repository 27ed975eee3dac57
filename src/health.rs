//! Health checks over a container.
//!
//! The [`health`] plugin keeps a list of named checks and runs them all
//! concurrently on [`HealthMethods::check`]. Each check has a deadline and a
//! criticality: a failing critical check makes the container
//! [`Unhealthy`](HealthStatus::Unhealthy), a failing non-critical one only
//! [`Degraded`](HealthStatus::Degraded).

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::future::join_all;
use parking_lot::RwLock;

use crate::plugin::{define_plugin, FnPlugin, Internals};
use crate::traits::ResolverCore;
use crate::{AnyFactory, BoxError, Container, DiError, Factory};

/// Health of one check or of the whole container. Ordered from best to
/// worst.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    /// Check if the status indicates health
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    /// Get a numeric score (0-100) for the health status
    pub fn score(&self) -> u8 {
        match self {
            HealthStatus::Healthy => 100,
            HealthStatus::Degraded => 50,
            HealthStatus::Unhealthy => 0,
        }
    }
}

/// A health probe.
///
/// # Examples
///
/// ```
/// use ferrous_container::{health, BoxError, Container, HealthCheck, HealthStatus};
/// use async_trait::async_trait;
///
/// struct DiskSpace;
///
/// #[async_trait]
/// impl HealthCheck for DiskSpace {
///     async fn check(&self, _container: &Container) -> Result<(), BoxError> {
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let container = Container::new().with(health());
/// container.methods().register("disk", DiskSpace);
/// let report = container.methods().check().await;
/// assert_eq!(report.status, HealthStatus::Healthy);
/// # }
/// ```
#[async_trait]
pub trait HealthCheck: Send + Sync + 'static {
    async fn check(&self, container: &Container) -> Result<(), BoxError>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthCheckOptions {
    /// Whether a failure makes the container unhealthy rather than degraded.
    pub critical: bool,
    /// A check still running after this long counts as failed.
    pub timeout: Duration,
}

impl Default for HealthCheckOptions {
    fn default() -> Self {
        Self {
            critical: true,
            timeout: Duration::from_secs(5),
        }
    }
}

impl HealthCheckOptions {
    pub fn non_critical() -> Self {
        Self {
            critical: false,
            ..Self::default()
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthCheckResult {
    pub name: String,
    pub status: HealthStatus,
    pub critical: bool,
    pub duration: Duration,
    pub error: Option<String>,
}

/// Outcome of running every registered check.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct HealthReport {
    pub status: HealthStatus,
    /// Results in registration order.
    pub checks: Vec<HealthCheckResult>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn is_healthy(&self) -> bool {
        self.status.is_healthy()
    }

    pub fn score(&self) -> u8 {
        self.status.score()
    }

    pub fn failing(&self) -> impl Iterator<Item = &HealthCheckResult> {
        self.checks.iter().filter(|check| !check.status.is_healthy())
    }

    /// Renders the report as JSON, e.g. for a readiness endpoint.
    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

struct FnCheck<F>(F);

#[async_trait]
impl<F, Fut> HealthCheck for FnCheck<F>
where
    F: Fn(Container) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
{
    async fn check(&self, container: &Container) -> Result<(), BoxError> {
        (self.0)(container.clone()).await
    }
}

struct FactoryCheck(AnyFactory);

#[async_trait]
impl HealthCheck for FactoryCheck {
    async fn check(&self, container: &Container) -> Result<(), BoxError> {
        container.resolve_erased_async(&self.0).await?;
        Ok(())
    }
}

struct Registered {
    name: String,
    check: Arc<dyn HealthCheck>,
    options: HealthCheckOptions,
}

/// Methods added by the [`health`] plugin.
#[derive(Clone)]
pub struct HealthMethods {
    container: Container,
    checks: Arc<RwLock<Vec<Registered>>>,
}

impl HealthMethods {
    /// Registers a critical check with the default timeout. A check
    /// registered under an existing name replaces it.
    pub fn register(&self, name: impl Into<String>, check: impl HealthCheck) {
        self.register_with(name, check, HealthCheckOptions::default());
    }

    pub fn register_with(&self, name: impl Into<String>, check: impl HealthCheck, options: HealthCheckOptions) {
        let name = name.into();
        let mut checks = self.checks.write();
        checks.retain(|registered| registered.name != name);
        checks.push(Registered {
            name,
            check: Arc::new(check),
            options,
        });
    }

    /// Registers an async closure as a critical check.
    pub fn register_fn<F, Fut>(&self, name: impl Into<String>, check: F)
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register(name, FnCheck(check));
    }

    pub fn register_fn_with<F, Fut>(&self, name: impl Into<String>, check: F, options: HealthCheckOptions)
    where
        F: Fn(Container) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.register_with(name, FnCheck(check), options);
    }

    /// A check that passes iff `factory` resolves, named after the factory.
    pub fn register_factory<T: Send + Sync + 'static>(&self, factory: &Factory<T>, options: HealthCheckOptions) {
        self.register_with(factory.name(), FactoryCheck(factory.erased().clone()), options);
    }

    pub fn unregister(&self, name: &str) -> bool {
        let mut checks = self.checks.write();
        let before = checks.len();
        checks.retain(|registered| registered.name != name);
        checks.len() != before
    }

    pub fn names(&self) -> Vec<String> {
        self.checks.read().iter().map(|registered| registered.name.clone()).collect()
    }

    /// Runs every check concurrently and aggregates the results.
    pub async fn check(&self) -> HealthReport {
        let snapshot: Vec<(String, Arc<dyn HealthCheck>, HealthCheckOptions)> = self
            .checks
            .read()
            .iter()
            .map(|registered| (registered.name.clone(), registered.check.clone(), registered.options))
            .collect();

        let container = &self.container;
        let checks = join_all(snapshot.into_iter().map(|(name, check, options)| async move {
            let started = Instant::now();
            let outcome = match tokio::time::timeout(options.timeout, check.check(container)).await {
                Ok(result) => result,
                Err(_) => Err(Box::new(DiError::Timeout {
                    factory: name.clone(),
                    timeout: options.timeout,
                }) as BoxError),
            };
            let (status, error) = match outcome {
                Ok(()) => (HealthStatus::Healthy, None),
                Err(err) if options.critical => (HealthStatus::Unhealthy, Some(err.to_string())),
                Err(err) => (HealthStatus::Degraded, Some(err.to_string())),
            };
            HealthCheckResult {
                name,
                status,
                critical: options.critical,
                duration: started.elapsed(),
                error,
            }
        }))
        .await;

        let status = checks
            .iter()
            .map(|check| check.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        if !status.is_healthy() {
            tracing::warn!(
                score = status.score(),
                failing = checks.iter().filter(|c| !c.status.is_healthy()).count(),
                "health check failed"
            );
        }

        HealthReport {
            status,
            checks,
            checked_at: Utc::now(),
        }
    }
}

/// Plugin adding health checks.
pub fn health() -> FnPlugin<impl FnOnce(&Container, &Internals) -> HealthMethods, HealthMethods> {
    define_plugin("health", |container: &Container, _: &Internals| HealthMethods {
        container: container.clone(),
        checks: Arc::new(RwLock::new(Vec::new())),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::factory;

    #[tokio::test]
    async fn empty_registry_is_healthy() {
        let container = Container::new().with(health());
        let report = container.methods().check().await;
        assert!(report.is_healthy());
        assert_eq!(report.score(), 100);
        assert!(report.checks.is_empty());
    }

    #[tokio::test]
    async fn non_critical_failure_degrades() {
        let container = Container::new().with(health());
        let methods = container.methods();
        methods.register_fn("db", |_| async { Ok(()) });
        methods.register_fn_with(
            "cache",
            |_| async { Err::<(), BoxError>("cache offline".into()) },
            HealthCheckOptions::non_critical(),
        );

        let report = methods.check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(report.score(), 50);
        let failing: Vec<_> = report.failing().map(|c| c.name.as_str()).collect();
        assert_eq!(failing, ["cache"]);
        assert_eq!(report.checks[1].error.as_deref(), Some("cache offline"));
    }

    #[tokio::test]
    async fn slow_critical_check_is_unhealthy() {
        let container = Container::new().with(health());
        container.methods().register_with(
            "slow",
            FnCheck(|_| async {
                tokio::time::sleep(Duration::from_millis(200)).await;
                Ok(())
            }),
            HealthCheckOptions::default().timeout(Duration::from_millis(5)),
        );
        let report = container.methods().check().await;
        assert_eq!(report.status, HealthStatus::Unhealthy);
        assert!(report.checks[0].error.as_deref().unwrap_or_default().contains("timed out"));
    }

    #[tokio::test]
    async fn factory_checks_resolve_in_the_container() {
        let container = Container::new().with(health());
        let ok = factory("Ok", |_| Ok(1u8));
        let broken = factory("Broken", |_| -> Result<u8, BoxError> { Err("no config".into()) });
        container.methods().register_factory(&ok, HealthCheckOptions::default());
        container.methods().register_factory(&broken, HealthCheckOptions::non_critical());

        let report = container.methods().check().await;
        assert_eq!(report.status, HealthStatus::Degraded);
        assert_eq!(container.methods().names(), ["Ok", "Broken"]);
    }

    #[test]
    fn re_registering_replaces() {
        let container = Container::new().with(health());
        container.methods().register_fn("db", |_| async { Ok(()) });
        container.methods().register_fn("db", |_| async { Ok(()) });
        assert_eq!(container.methods().names().len(), 1);
        assert!(container.methods().unregister("db"));
        assert!(!container.methods().unregister("db"));
    }
}
