//! Disposal traits for resource cleanup.

use crate::BoxError;

/// Trait for synchronous resource disposal.
///
/// Implement this trait for services that need structured teardown (e.g., flushing caches,
/// closing connections). Disposers run in LIFO order when `dispose()` is awaited.
///
/// # Examples
///
/// ```
/// use ferrous_container::{factory, BoxError, Container, Dispose, Resolver};
/// use std::sync::Arc;
///
/// struct Cache {
///     name: String,
/// }
///
/// impl Dispose for Cache {
///     fn dispose(&self) -> Result<(), BoxError> {
///         println!("Flushing cache: {}", self.name);
///         Ok(())
///     }
/// }
///
/// let cache = factory("Cache", |ctx| {
///     let cache = Arc::new(Cache { name: "user_cache".to_string() });
///     ctx.register_disposer(cache.clone());
///     Ok(cache)
/// });
///
/// let container = Container::new();
/// let _ = container.get(&cache).unwrap();
/// ```
pub trait Dispose: Send + Sync + 'static {
    /// Perform synchronous cleanup of resources.
    fn dispose(&self) -> Result<(), BoxError>;
}

/// Trait for asynchronous resource disposal.
///
/// Implement this trait for services that require async teardown (e.g., graceful connection
/// shutdown, async I/O cleanup). Async disposers share one LIFO order with sync ones.
///
/// # Examples
///
/// ```
/// use ferrous_container::{async_factory, AsyncDispose, BoxError, Container, Resolver};
/// use async_trait::async_trait;
/// use std::sync::Arc;
///
/// struct DatabaseClient {
///     connection_id: String,
/// }
///
/// #[async_trait]
/// impl AsyncDispose for DatabaseClient {
///     async fn dispose(&self) -> Result<(), BoxError> {
///         println!("Closing database connection: {}", self.connection_id);
///         Ok(())
///     }
/// }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let client = async_factory("DatabaseClient", |ctx| async move {
///     let client = Arc::new(DatabaseClient { connection_id: "conn_123".to_string() });
///     ctx.register_async_disposer(client.clone());
///     Ok::<_, BoxError>(client)
/// });
///
/// let container = Container::new();
/// let _ = container.get_async(&client).await.unwrap();
/// container.dispose().await.unwrap();
/// # }
/// ```
#[async_trait::async_trait]
pub trait AsyncDispose: Send + Sync + 'static {
    /// Perform asynchronous cleanup of resources.
    async fn dispose(&self) -> Result<(), BoxError>;
}
