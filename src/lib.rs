//! # ferrous-container
//!
//! Lazy, factory-driven dependency injection for Rust.
//!
//! There is no registry and no type map. A service is described by a
//! [`Factory`] value; the [`Container`] resolves it on demand, caches it
//! according to its [`Lifetime`] and hands back an `Arc`.
//!
//! ## Features
//!
//! - **Factories as values**: identities, not type names, key the cache
//! - **Sync and async**: concurrent async resolutions of a singleton share one computation
//! - **Circular dependency detection**: cycles fail with the full chain instead of overflowing the stack
//! - **Hierarchical containers**: children inherit cached values and keep their own
//! - **Overrides and freezing**: swap implementations per container, lock a warmed-up container
//! - **Lifecycle hooks and plugins**: metrics, spans, logging, health checks, test helpers
//! - **Resilience**: circuit breakers, retries, deadlines and TTL caching as factory decorators
//!
//! ## Quick Start
//!
//! ```rust
//! use ferrous_container::{factory, Container, Resolver};
//! use std::sync::Arc;
//!
//! struct Database {
//!     url: String,
//! }
//!
//! struct UserService {
//!     db: Arc<Database>,
//! }
//!
//! let database = factory("Database", |_| {
//!     Ok(Database { url: "postgres://localhost".to_string() })
//! });
//! let db = database.clone();
//! let users = factory("UserService", move |ctx| Ok(UserService { db: ctx.get(&db)? }));
//!
//! let container = Container::new();
//! let service = container.get(&users).unwrap();
//! assert_eq!(service.db.url, "postgres://localhost");
//! assert!(Arc::ptr_eq(&service.db, &container.get(&database).unwrap()));
//! ```
//!
//! ## Child Containers
//!
//! ```rust
//! use ferrous_container::{factory, Container, Resolver};
//! use std::sync::atomic::{AtomicU32, Ordering};
//! use std::sync::Arc;
//!
//! let counter = Arc::new(AtomicU32::new(0));
//! let c = counter.clone();
//! let request_id = factory("RequestId", move |_| Ok(c.fetch_add(1, Ordering::SeqCst)));
//!
//! let root = Container::new();
//! let first = root.child();
//! let second = root.child();
//!
//! // Resolved in a child, so each child gets its own
//! assert_eq!(*first.get(&request_id).unwrap(), 0);
//! assert_eq!(*second.get(&request_id).unwrap(), 1);
//! assert!(!root.has(&request_id));
//! ```
//!
//! ## Plugins
//!
//! ```rust
//! use ferrous_container::{factory, metrics, pipe, testing, Container, Resolver};
//!
//! let port = factory("Port", |_| Ok(8080u16));
//! let container = Container::new().with(pipe(metrics(), testing()));
//! let (metrics, testing) = container.methods();
//!
//! testing.mock(&port, 0);
//! assert_eq!(*container.get(&port).unwrap(), 0);
//! assert_eq!(metrics.snapshot().overrides, 1);
//! ```

pub mod error;
pub mod key;
pub mod lifetime;
pub mod factory;
pub mod container;
pub mod hooks;
pub mod plugin;
pub mod config;
pub mod traits;

pub mod circuit_breaker;
pub mod decoration;
pub mod health;
pub mod metrics;
pub mod spans;
pub mod observability;
pub mod testing;
pub mod batch;

mod internal;

pub use error::{BoxError, DiError, DiResult, SharedError};
pub use key::FactoryId;
pub use lifetime::Lifetime;
pub use factory::{async_factory, factory, value, AnyArc, AnyFactory, Factory, FactoryOptions};
pub use container::{Container, Lazy, ReadOnlyContainer, ResolverContext};
pub use hooks::{Hooks, OverrideInfo, ResolveInfo};
pub use plugin::{define_plugin, pipe, Extended, FnPlugin, Internals, Pipe, Plugin};
pub use config::{CircuitBreakerOptions, ContainerOptions};
pub use traits::{AsyncDispose, Dispose, Resolver, ResolverCore};

pub use circuit_breaker::{circuit_breaker, circuits, Circuit, CircuitBreaker, CircuitMethods, CircuitSnapshot, CircuitState};
pub use decoration::{RetryPolicy, TtlFactory};
pub use health::{health, HealthCheck, HealthCheckOptions, HealthCheckResult, HealthMethods, HealthReport, HealthStatus};
pub use metrics::{metrics, MetricsMethods, MetricsSnapshot, TimingStats};
pub use spans::{tracing_spans, tracing_spans_with_capacity, SpanMethods, SpanRecord, SpanStatus};
pub use observability::{logging, logging_with, LoggingMethods, LoggingOptions};
pub use testing::{create_test_container, testing, Spy, TestingMethods};
pub use batch::{batch, BatchMethods};
