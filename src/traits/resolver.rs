//! Resolver traits for factory resolution.

use std::future::Future;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::factory::downcast;
use crate::traits::{AsyncDispose, Dispose};
use crate::{AnyArc, AnyFactory, BoxError, DiResult, Factory, FactoryId};

/// Core resolver trait for object-safe factory resolution.
///
/// This trait provides the type-erased resolution entry points. It is
/// object-safe, so plugins and tooling can hold a `&dyn ResolverCore`.
///
/// Most users should use the [`Resolver`] trait instead, which provides
/// typed generic methods built on top of this trait.
pub trait ResolverCore: Send + Sync {
    /// Resolves a factory synchronously.
    ///
    /// Fails with [`DiError::AsyncRequired`](crate::DiError::AsyncRequired)
    /// if any step of the resolution would have to await.
    fn resolve_erased(&self, factory: &AnyFactory) -> DiResult<AnyArc>;

    /// Resolves a factory, awaiting async bodies and in-flight entries.
    ///
    /// The returned future owns everything it needs and may be spawned.
    fn resolve_erased_async(&self, factory: &AnyFactory) -> BoxFuture<'static, DiResult<AnyArc>>;

    /// Whether this container or any ancestor has a cached value for `id`.
    fn contains(&self, id: FactoryId) -> bool;

    /// Registers a synchronous disposal hook.
    ///
    /// Runs when the container that owns the resolution is disposed.
    fn push_sync_disposer(&self, f: Box<dyn FnOnce() -> Result<(), BoxError> + Send>);

    /// Registers an asynchronous disposal hook.
    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>);
}

/// High-level resolver interface with generic methods for typed resolution.
///
/// `Container` and the `ResolverContext` handed to factory bodies both
/// implement this trait, so code that resolves dependencies can be written
/// once against either. `ReadOnlyContainer` exposes the same lookups as
/// inherent methods.
///
/// # Examples
///
/// ```
/// use ferrous_container::{factory, Container, Resolver};
///
/// let port = factory("Port", |_| Ok(8080u16));
/// let missing = factory("Missing", |_| -> Result<u16, ferrous_container::BoxError> {
///     Err("not configured".into())
/// });
///
/// let container = Container::new();
/// assert!(!container.has(&port));
/// assert_eq!(*container.get(&port).unwrap(), 8080);
/// assert!(container.has(&port));
/// assert!(container.try_get(&missing).is_none());
/// ```
pub trait Resolver: ResolverCore {
    /// Resolves `factory`, failing if it needs to await.
    fn get<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> DiResult<Arc<T>> {
        let value = self.resolve_erased(factory.erased())?;
        factory.downcast(value)
    }

    /// Resolves `factory`, sync or async.
    fn get_async<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> BoxFuture<'static, DiResult<Arc<T>>> {
        let pending = self.resolve_erased_async(factory.erased());
        let name = factory.erased().name_arc().clone();
        Box::pin(async move { downcast::<T>(pending.await?, &name) })
    }

    /// Resolves an optional dependency: any failure becomes `None`.
    fn try_get<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Option<Arc<T>> {
        self.get(factory).ok()
    }

    /// Async counterpart of [`try_get`](Self::try_get).
    fn try_get_async<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> BoxFuture<'static, Option<Arc<T>>> {
        let pending = self.get_async(factory);
        Box::pin(async move { pending.await.ok() })
    }

    /// Whether the value is cached here or in any ancestor.
    ///
    /// Overrides do not count: an override only takes effect once resolved.
    fn has<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> bool {
        self.contains(factory.id())
    }

    /// Registers a cleanup callback. Callbacks run LIFO on `dispose()`.
    fn on_dispose<F>(&self, f: F)
    where
        F: FnOnce() -> Result<(), BoxError> + Send + 'static,
    {
        self.push_sync_disposer(Box::new(f));
    }

    /// Registers an async cleanup callback, ordered with the sync ones.
    fn on_dispose_async<F, Fut>(&self, f: F)
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), BoxError>> + Send + 'static,
    {
        self.push_async_disposer(Box::new(move || -> BoxFuture<'static, Result<(), BoxError>> { Box::pin(f()) }));
    }

    /// Registers a service for synchronous disposal.
    fn register_disposer<T>(&self, service: Arc<T>)
    where
        T: Dispose + 'static,
    {
        self.push_sync_disposer(Box::new(move || service.dispose()));
    }

    /// Registers a service for asynchronous disposal.
    fn register_async_disposer<T>(&self, service: Arc<T>)
    where
        T: AsyncDispose + 'static,
    {
        self.push_async_disposer(Box::new(move || -> BoxFuture<'static, Result<(), BoxError>> {
            Box::pin(async move { service.dispose().await })
        }));
    }
}
