//! Factory values: deferred constructors plus their metadata.
//!
//! A factory is an immutable value. Changing its lifetime or wrapping it in
//! a decorator produces a *new* factory with its own identity; the original
//! is never mutated. Decorated factories keep a back-reference to what they
//! wrap (see [`AnyFactory::inner`]) so tooling can unwrap them.

use std::any::Any;
use std::fmt;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;

use crate::container::ResolverContext;
use crate::decoration::race_deadline;
use crate::{BoxError, DiError, DiResult, FactoryId, Lifetime};

/// Type-erased shared service instance.
pub type AnyArc = Arc<dyn Any + Send + Sync>;

pub(crate) type BodyResult = Result<AnyArc, BoxError>;
pub(crate) type SyncBody = dyn Fn(&ResolverContext) -> BodyResult + Send + Sync;
pub(crate) type AsyncBody = dyn Fn(ResolverContext) -> BoxFuture<'static, BodyResult> + Send + Sync;

#[derive(Clone)]
pub(crate) enum Body {
    Sync(Arc<SyncBody>),
    Async(Arc<AsyncBody>),
}

pub(crate) struct FactoryMeta {
    pub(crate) id: FactoryId,
    pub(crate) name: Arc<str>,
    pub(crate) lifetime: Lifetime,
    pub(crate) timeout: Option<Duration>,
    pub(crate) inner: Option<AnyFactory>,
    pub(crate) body: Body,
}

/// Options accepted by [`Factory::with_options`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FactoryOptions {
    /// Never cache; run the body on every resolution.
    pub transient: bool,
    /// Deadline for the body. A factory with a deadline always resolves
    /// asynchronously; on expiry the work is abandoned, not cancelled.
    pub timeout: Option<Duration>,
}

/// A factory with its result type erased.
///
/// Used wherever factories of different types travel together, such as
/// [`Container::warmup`](crate::Container::warmup) and the batch plugin.
#[derive(Clone)]
pub struct AnyFactory {
    pub(crate) meta: Arc<FactoryMeta>,
}

impl AnyFactory {
    /// Identity of this factory.
    #[inline]
    pub fn id(&self) -> FactoryId {
        self.meta.id
    }

    /// Diagnostic name.
    #[inline]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    pub(crate) fn name_arc(&self) -> &Arc<str> {
        &self.meta.name
    }

    /// Caching behavior.
    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.meta.lifetime
    }

    /// Whether resolving this factory requires awaiting.
    pub fn is_async(&self) -> bool {
        matches!(self.meta.body, Body::Async(_))
    }

    /// The factory this one decorates, if any.
    pub fn inner(&self) -> Option<&AnyFactory> {
        self.meta.inner.as_ref()
    }

    /// Follows [`inner`](Self::inner) links down to the undecorated factory.
    pub fn innermost(&self) -> &AnyFactory {
        let mut current = self;
        while let Some(inner) = current.inner() {
            current = inner;
        }
        current
    }

    /// Runs the body synchronously. `None` for async bodies.
    pub(crate) fn invoke_sync(&self, ctx: &ResolverContext) -> Option<BodyResult> {
        match &self.meta.body {
            Body::Sync(body) => Some(body(ctx)),
            Body::Async(_) => None,
        }
    }

    /// Runs the body, awaiting it if needed. Does not touch any cache.
    pub(crate) fn invoke(&self, ctx: ResolverContext) -> BoxFuture<'static, BodyResult> {
        match &self.meta.body {
            Body::Sync(body) => {
                let result = body(&ctx);
                Box::pin(async move { result })
            }
            Body::Async(body) => body(ctx),
        }
    }
}

impl fmt::Debug for AnyFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AnyFactory")
            .field("id", &self.meta.id)
            .field("name", &self.meta.name)
            .field("lifetime", &self.meta.lifetime)
            .field("async", &self.is_async())
            .finish()
    }
}

/// A deferred constructor for a `T`.
///
/// Cloning a factory is cheap and keeps its identity: every clone hits the
/// same cache entry.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{factory, Container, Resolver};
/// use std::sync::Arc;
///
/// struct Config { url: String }
/// struct Database { url: String }
///
/// let config = factory("Config", |_| Ok(Config { url: "postgres://localhost".into() }));
/// let database = {
///     let config = config.clone();
///     factory("Database", move |ctx| {
///         let config = ctx.get(&config)?;
///         Ok(Database { url: config.url.clone() })
///     })
/// };
///
/// let container = Container::new();
/// let db = container.get(&database).unwrap();
/// assert_eq!(db.url, "postgres://localhost");
/// assert!(Arc::ptr_eq(&db, &container.get(&database).unwrap()));
/// ```
pub struct Factory<T> {
    erased: AnyFactory,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Clone for Factory<T> {
    fn clone(&self) -> Self {
        Self {
            erased: self.erased.clone(),
            _marker: PhantomData,
        }
    }
}

impl<T> fmt::Debug for Factory<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("id", &self.erased.id())
            .field("name", &self.erased.name())
            .field("type", &std::any::type_name::<T>())
            .field("lifetime", &self.erased.lifetime())
            .finish()
    }
}

impl<T: Send + Sync + 'static> Factory<T> {
    fn from_parts(name: Arc<str>, lifetime: Lifetime, timeout: Option<Duration>, inner: Option<AnyFactory>, body: Body) -> Self {
        Self {
            erased: AnyFactory {
                meta: Arc::new(FactoryMeta {
                    id: FactoryId::next(),
                    name,
                    lifetime,
                    timeout,
                    inner,
                    body,
                }),
            },
            _marker: PhantomData,
        }
    }

    /// Identity of this factory.
    #[inline]
    pub fn id(&self) -> FactoryId {
        self.erased.id()
    }

    /// Diagnostic name.
    #[inline]
    pub fn name(&self) -> &str {
        self.erased.name()
    }

    /// Caching behavior.
    #[inline]
    pub fn lifetime(&self) -> Lifetime {
        self.erased.lifetime()
    }

    /// Whether resolving this factory requires awaiting.
    pub fn is_async(&self) -> bool {
        self.erased.is_async()
    }

    /// The erased view of this factory.
    #[inline]
    pub fn erased(&self) -> &AnyFactory {
        &self.erased
    }

    /// The factory this one decorates, if any.
    pub fn inner(&self) -> Option<&AnyFactory> {
        self.erased.inner()
    }

    /// A new transient factory with the same body.
    ///
    /// The result is a distinct factory (new identity); `self` is consumed
    /// because a factory is normally marked transient where it is defined.
    pub fn transient(self) -> Self {
        let meta = &self.erased.meta;
        Self::from_parts(meta.name.clone(), Lifetime::Transient, meta.timeout, meta.inner.clone(), meta.body.clone())
    }

    /// A new factory with the same body and the given options.
    ///
    /// A deadline given here wraps the body as defined, so one already
    /// applied to `self` keeps applying as well.
    pub fn with_options(self, options: FactoryOptions) -> Self {
        let meta = &self.erased.meta;
        let lifetime = if options.transient {
            Lifetime::Transient
        } else {
            Lifetime::Singleton
        };
        let body = match (options.timeout, &meta.body) {
            (None, body) => body.clone(),
            (Some(timeout), body) => deadline_body(meta.name.clone(), timeout, body.clone()),
        };
        Self::from_parts(meta.name.clone(), lifetime, options.timeout, meta.inner.clone(), body)
    }

    /// Builds a decorator around this factory with an async body.
    ///
    /// The new factory keeps this factory's name and lifetime and records it
    /// as its `inner`.
    pub(crate) fn decorate<F>(&self, body: F) -> Factory<T>
    where
        F: Fn(ResolverContext) -> BoxFuture<'static, BodyResult> + Send + Sync + 'static,
    {
        Self::from_parts(
            self.erased.meta.name.clone(),
            self.lifetime(),
            None,
            Some(self.erased.clone()),
            Body::Async(Arc::new(body)),
        )
    }

    /// Like [`decorate`](Self::decorate) but keeps a synchronous body.
    pub(crate) fn decorate_sync<F>(&self, lifetime: Lifetime, body: F) -> Factory<T>
    where
        F: Fn(&ResolverContext) -> BodyResult + Send + Sync + 'static,
    {
        Self::from_parts(
            self.erased.meta.name.clone(),
            lifetime,
            None,
            Some(self.erased.clone()),
            Body::Sync(Arc::new(body)),
        )
    }

    /// Same as [`decorate`](Self::decorate) with an explicit lifetime.
    pub(crate) fn decorate_with_lifetime<F>(&self, lifetime: Lifetime, body: F) -> Factory<T>
    where
        F: Fn(ResolverContext) -> BoxFuture<'static, BodyResult> + Send + Sync + 'static,
    {
        Self::from_parts(
            self.erased.meta.name.clone(),
            lifetime,
            None,
            Some(self.erased.clone()),
            Body::Async(Arc::new(body)),
        )
    }

    /// A decorator running this factory's body under a deadline.
    pub(crate) fn decorate_deadline(&self, timeout: Duration) -> Factory<T> {
        let meta = &self.erased.meta;
        Self::from_parts(
            meta.name.clone(),
            meta.lifetime,
            Some(timeout),
            Some(self.erased.clone()),
            deadline_body(meta.name.clone(), timeout, meta.body.clone()),
        )
    }

    /// Recovers the typed value from an erased one.
    pub(crate) fn downcast(&self, value: AnyArc) -> DiResult<Arc<T>> {
        downcast::<T>(value, self.name())
    }
}

pub(crate) fn downcast<T: Send + Sync + 'static>(value: AnyArc, name: &str) -> DiResult<Arc<T>> {
    value
        .downcast::<T>()
        .map_err(|_| DiError::TypeMismatch(format!("{} (expected {})", name, std::any::type_name::<T>())))
}

fn deadline_body(name: Arc<str>, timeout: Duration, body: Body) -> Body {
    Body::Async(Arc::new(move |ctx: ResolverContext| -> BoxFuture<'static, BodyResult> {
        let work: BoxFuture<'static, BodyResult> = match &body {
            Body::Sync(sync) => {
                let sync = sync.clone();
                Box::pin(async move { sync(&ctx) })
            }
            Body::Async(body) => body(ctx),
        };
        Box::pin(race_deadline(name.clone(), timeout, work))
    }))
}

impl<T> From<Factory<T>> for AnyFactory {
    fn from(factory: Factory<T>) -> Self {
        factory.erased
    }
}

impl<T> From<&Factory<T>> for AnyFactory {
    fn from(factory: &Factory<T>) -> Self {
        factory.erased.clone()
    }
}

/// Creates a singleton factory from a synchronous constructor.
///
/// The closure receives the [`ResolverContext`] of the container the
/// resolution started on; use it to resolve dependencies.
pub fn factory<T, F>(name: impl Into<Arc<str>>, body: F) -> Factory<T>
where
    T: Send + Sync + 'static,
    F: Fn(&ResolverContext) -> Result<T, BoxError> + Send + Sync + 'static,
{
    let body: Arc<SyncBody> = Arc::new(move |ctx: &ResolverContext| body(ctx).map(|value| Arc::new(value) as AnyArc));
    Factory::from_parts(name.into(), Lifetime::Singleton, None, None, Body::Sync(body))
}

/// Creates a singleton factory from an asynchronous constructor.
///
/// Concurrent resolutions of the same factory on one container share a
/// single in-flight computation.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{async_factory, Container, Resolver};
///
/// struct Pool { size: usize }
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let pool = async_factory("Pool", |_ctx| async move {
///     tokio::time::sleep(std::time::Duration::from_millis(5)).await;
///     Ok(Pool { size: 8 })
/// });
///
/// let container = Container::new();
/// let pool = container.get_async(&pool).await.unwrap();
/// assert_eq!(pool.size, 8);
/// # }
/// ```
pub fn async_factory<T, F, Fut>(name: impl Into<Arc<str>>, body: F) -> Factory<T>
where
    T: Send + Sync + 'static,
    F: Fn(ResolverContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<T, BoxError>> + Send + 'static,
{
    let body: Arc<AsyncBody> = Arc::new(move |ctx: ResolverContext| -> BoxFuture<'static, BodyResult> {
        let fut = body(ctx);
        Box::pin(async move { fut.await.map(|value| Arc::new(value) as AnyArc) })
    });
    Factory::from_parts(name.into(), Lifetime::Singleton, None, None, Body::Async(body))
}

/// Creates a factory that always yields the same instance.
pub fn value<T>(name: impl Into<Arc<str>>, value: T) -> Factory<T>
where
    T: Send + Sync + 'static,
{
    let shared: AnyArc = Arc::new(value);
    let body: Arc<SyncBody> = Arc::new(move |_: &ResolverContext| Ok(shared.clone()));
    Factory::from_parts(name.into(), Lifetime::Singleton, None, None, Body::Sync(body))
}

/// Builds a factory that resolves each dependency and passes them, in
/// order, to a constructor taking `Arc`s.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{factory, inject, Container, Resolver};
/// use std::sync::Arc;
///
/// struct Config { port: u16 }
/// struct Server { config: Arc<Config> }
///
/// impl Server {
///     fn new(config: Arc<Config>) -> Self { Self { config } }
/// }
///
/// let config = factory("Config", |_| Ok(Config { port: 8080 }));
/// let server = inject!(Server::new, config);
///
/// let container = Container::new();
/// assert_eq!(container.get(&server).unwrap().config.port, 8080);
/// ```
#[macro_export]
macro_rules! inject {
    ($ctor:expr $(, $dep:expr)* $(,)?) => {
        $crate::factory(stringify!($ctor), move |ctx: &$crate::ResolverContext| {
            Ok($ctor($($crate::Resolver::get(ctx, &$dep)?),*))
        })
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Container, Resolver};

    #[test]
    fn transient_creates_a_new_identity() {
        let base = factory("Thing", |_| Ok(1u8));
        let base_id = base.id();
        let transient = base.transient();
        assert_ne!(transient.id(), base_id);
        assert_eq!(transient.lifetime(), Lifetime::Transient);
        assert_eq!(transient.name(), "Thing");
    }

    #[test]
    fn decorators_record_inner() {
        let base = factory("Thing", |_| Ok(1u8));
        let wrapped = base.decorate(|ctx| {
            Box::pin(async move {
                drop(ctx);
                Ok(Arc::new(2u8) as AnyArc)
            })
        });
        assert_eq!(wrapped.inner().map(|f| f.id()), Some(base.id()));
        assert_eq!(wrapped.erased().innermost().id(), base.id());
        assert!(wrapped.is_async());
    }

    #[test]
    fn value_factory_returns_the_same_instance() {
        let shared = value("Answer", 42u32);
        let c1 = Container::new();
        let c2 = Container::new();
        let a = c1.get(&shared).unwrap();
        let b = c2.get(&shared).unwrap();
        assert!(Arc::ptr_eq(&a, &b));
    }

    #[test]
    fn inject_resolves_dependencies_in_order() {
        struct Pair(Arc<u32>, Arc<String>);
        let number = value("Number", 7u32);
        let text = factory("Text", |_| Ok("seven".to_string()));
        let pair = inject!(Pair, number, text);

        let container = Container::new();
        let resolved = container.get(&pair).unwrap();
        assert_eq!(*resolved.0, 7);
        assert_eq!(*resolved.1, "seven");
    }

    #[test]
    fn downcast_reports_mismatch() {
        let err = downcast::<u32>(Arc::new("text"), "Text").unwrap_err();
        assert!(matches!(err, DiError::TypeMismatch(msg) if msg.contains("Text")));
    }
}
