//! Container module for dependency injection.
//!
//! This module contains the [`Container`] type, which lazily resolves
//! factories into shared instances, and its companions: the
//! [`ResolverContext`] handed to factory bodies, and the restricted
//! [`ReadOnlyContainer`] façade with its [`Lazy`] handles.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Instant;

use futures::future::{self, BoxFuture, FutureExt};
use parking_lot::Mutex;

use crate::factory::BodyResult;
use crate::hooks::{Hooks, OverrideInfo, ResolveInfo};
use crate::internal::{CacheEntry, Cached, DisposeBag, ResolutionChain};
use crate::traits::{Resolver, ResolverCore};
use crate::{AnyArc, AnyFactory, BoxError, ContainerOptions, DiError, DiResult, Factory, FactoryId};

mod context;
mod read_only;

pub use context::ResolverContext;
pub use read_only::{Lazy, ReadOnlyContainer};

/// Lazily resolves factories and owns the resulting instances.
///
/// A container starts empty. Each singleton factory runs at most once per
/// container, the first time something asks for it; transient factories run
/// on every request. Cloning a `Container` is cheap and yields another
/// handle to the same container.
///
/// # Thread Safety
///
/// `Container` is `Send + Sync`. Cache and override tables sit behind short
/// critical sections that are never held while a factory body runs, so
/// bodies may freely resolve other factories.
///
/// # Examples
///
/// ```
/// use ferrous_container::{factory, Container, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct UserService { db: Arc<Database> }
///
/// let database = factory("Database", |_| Ok(Database { url: "postgres://localhost".to_string() }));
/// let users = {
///     let database = database.clone();
///     factory("UserService", move |ctx| Ok(UserService { db: ctx.get(&database)? })).transient()
/// };
///
/// let container = Container::new();
/// let service = container.get(&users).unwrap();
/// assert_eq!(service.db.url, "postgres://localhost");
/// assert!(Arc::ptr_eq(&service.db, &container.get(&database).unwrap()));
/// ```
#[derive(Clone)]
pub struct Container {
    pub(crate) inner: Arc<ContainerInner>,
}

pub(crate) struct ContainerInner {
    pub(crate) options: ContainerOptions,
    pub(crate) state: Mutex<State>,
    pub(crate) hooks: Hooks,
    pub(crate) disposers: Mutex<DisposeBag>,
    pub(crate) parent: Option<Container>,
    frozen: AtomicBool,
    disposed: AtomicBool,
    next_ticket: AtomicU64,
}

#[derive(Default)]
pub(crate) struct State {
    pub(crate) cache: HashMap<FactoryId, Cached>,
    pub(crate) overrides: HashMap<FactoryId, AnyFactory>,
}

/// Everything needed to run one resolution once the cache has missed.
struct Plan {
    target: AnyFactory,
    chain: ResolutionChain,
    info: ResolveInfo,
}

enum AsyncStep {
    Ready(AnyArc),
    Run(BoxFuture<'static, DiResult<AnyArc>>),
}

/// Where a settled value goes.
#[derive(Clone, Copy)]
enum Store {
    Nowhere,
    Cache,
    /// Swap the pending entry holding this ticket, if it is still there.
    Pending(u64),
}

impl Container {
    /// Creates an empty container with default options.
    pub fn new() -> Self {
        Self::with_options(ContainerOptions::default())
    }

    /// Creates an empty container with the given options.
    pub fn with_options(options: ContainerOptions) -> Self {
        Self::build(options, None)
    }

    fn build(options: ContainerOptions, parent: Option<Container>) -> Self {
        Self {
            inner: Arc::new(ContainerInner {
                options,
                state: Mutex::new(State::default()),
                hooks: Hooks::default(),
                disposers: Mutex::new(DisposeBag::default()),
                parent,
                frozen: AtomicBool::new(false),
                disposed: AtomicBool::new(false),
                next_ticket: AtomicU64::new(1),
            }),
        }
    }

    /// Creates a child container that inherits this container's options.
    ///
    /// The child reads through to values already cached here (and in any
    /// ancestor) without copying them. Everything the child resolves itself
    /// stays in the child, and its overrides are its own.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_container::{factory, Container, Resolver};
    /// use std::sync::Arc;
    ///
    /// let config = factory("Config", |_| Ok(String::from("prod")));
    /// let request = factory("Request", |_| Ok(42u64));
    ///
    /// let root = Container::new();
    /// let shared = root.get(&config).unwrap();
    ///
    /// let child = root.child();
    /// assert!(Arc::ptr_eq(&shared, &child.get(&config).unwrap()));
    ///
    /// child.get(&request).unwrap();
    /// assert!(child.has(&request));
    /// assert!(!root.has(&request));
    /// ```
    pub fn child(&self) -> Container {
        self.child_with_options(self.inner.options)
    }

    /// Creates a child container with its own options.
    pub fn child_with_options(&self, options: ContainerOptions) -> Container {
        tracing::debug!(depth = self.ancestry_len() + 1, "creating child container");
        Self::build(options, Some(self.clone()))
    }

    /// Options this container was created with.
    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    /// The parent container, if this is a child.
    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// Lifecycle hooks of this container.
    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    /// Returns a handle that resolves `factory` on demand.
    ///
    /// The handle does not keep the container alive, so it can be stored
    /// inside services the container owns, which is the usual way to break a
    /// construction-time cycle.
    pub fn resolver<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Lazy<T> {
        Lazy::new(Arc::downgrade(&self.inner), factory.clone())
    }

    /// Replaces `factory` with `replacement` in this container.
    ///
    /// The replacement resolves under the original's identity and lifetime.
    /// A value already cached in this container is not invalidated; call
    /// [`clear_cache`](Self::clear_cache) to see the replacement. Values
    /// cached by ancestors are shadowed right away.
    pub fn override_with<T: Send + Sync + 'static>(&self, factory: &Factory<T>, replacement: Factory<T>) {
        self.set_override(factory.erased(), replacement.erased().clone());
    }

    pub(crate) fn set_override(&self, original: &AnyFactory, replacement: AnyFactory) {
        let info = OverrideInfo {
            original: original.id(),
            original_name: original.name_arc().clone(),
            replacement: replacement.id(),
            replacement_name: replacement.name_arc().clone(),
        };
        self.inner.state.lock().overrides.insert(original.id(), replacement);
        tracing::debug!(factory = %info.original_name, replacement = %info.replacement_name, "override set");
        self.inner.hooks.fire_on_override(&info);
    }

    /// Removes every override set on this container.
    pub fn clear_overrides(&self) {
        self.inner.state.lock().overrides.clear();
    }

    /// Drops every cached value, including in-flight async entries.
    ///
    /// Ancestors are untouched. An async resolution still running when its
    /// entry is cleared completes for its callers but is not cached.
    pub fn clear_cache(&self) {
        let cleared = {
            let mut state = self.inner.state.lock();
            let len = state.cache.len();
            state.cache.clear();
            len
        };
        tracing::debug!(cleared, "cache cleared");
    }

    /// Forbids resolving anything that is not cached yet. Irreversible.
    pub fn freeze(&self) {
        if !self.inner.frozen.swap(true, Ordering::SeqCst) {
            tracing::debug!(cached = self.inner.state.lock().cache.len(), "container frozen");
        }
    }

    pub fn is_frozen(&self) -> bool {
        self.inner.frozen.load(Ordering::SeqCst)
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    /// Resolves every factory concurrently so children created afterwards
    /// inherit the values. Fails with the first error in input order.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_container::{async_factory, factory, AnyFactory, BoxError, Container, Resolver};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let config = factory("Config", |_| Ok(1u8));
    /// let pool = async_factory("Pool", |_| async { Ok::<_, BoxError>(4usize) });
    ///
    /// let root = Container::new();
    /// root.warmup([AnyFactory::from(&config), AnyFactory::from(&pool)]).await.unwrap();
    ///
    /// let child = root.child();
    /// assert!(child.has(&config) && child.has(&pool));
    /// # }
    /// ```
    pub async fn warmup<I>(&self, factories: I) -> DiResult<()>
    where
        I: IntoIterator,
        I::Item: Into<AnyFactory>,
    {
        let pending: Vec<_> = factories
            .into_iter()
            .map(|f| self.resolve_erased_async(&f.into()))
            .collect();
        let count = pending.len();
        for result in future::join_all(pending).await {
            result?;
        }
        tracing::debug!(count, "warmup complete");
        Ok(())
    }

    /// A view exposing only resolution.
    pub fn as_read_only(&self) -> ReadOnlyContainer {
        ReadOnlyContainer::new(self.clone())
    }

    /// Runs every disposer in reverse registration order, then clears the
    /// cache.
    ///
    /// Every disposer runs even when some fail; the failures come back
    /// together as [`DiError::Dispose`]. Resolving afterwards fails with
    /// [`DiError::Disposed`]. Disposing twice is a no-op.
    ///
    /// # Examples
    ///
    /// ```
    /// use ferrous_container::{Container, Resolver};
    /// use std::sync::{Arc, Mutex};
    ///
    /// # #[tokio::main(flavor = "current_thread")]
    /// # async fn main() {
    /// let order = Arc::new(Mutex::new(Vec::new()));
    /// let container = Container::new();
    /// for name in ["first", "second"] {
    ///     let order = order.clone();
    ///     container.on_dispose(move || {
    ///         order.lock().unwrap().push(name);
    ///         Ok(())
    ///     });
    /// }
    ///
    /// container.dispose().await.unwrap();
    /// assert_eq!(*order.lock().unwrap(), vec!["second", "first"]);
    /// # }
    /// ```
    pub async fn dispose(&self) -> DiResult<()> {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        self.inner.hooks.fire_on_dispose();
        let bag = std::mem::take(&mut *self.inner.disposers.lock());
        let registered = bag.len();
        let errors = bag.run_all_reverse().await;
        self.inner.state.lock().cache.clear();
        tracing::debug!(registered, failed = errors.len(), "container disposed");

        if errors.is_empty() {
            Ok(())
        } else {
            Err(DiError::Dispose { errors })
        }
    }

    #[cfg(feature = "diagnostics")]
    pub fn to_debug_string(&self) -> String {
        let state = self.inner.state.lock();
        let mut s = String::new();
        s.push_str("=== Container Debug ===\n");
        s.push_str(&format!(
            "frozen: {}, disposed: {}, depth: {}\n",
            self.is_frozen(),
            self.is_disposed(),
            self.ancestry_len()
        ));
        s.push_str("Cache:\n");
        for (id, cached) in &state.cache {
            let kind = if cached.is_pending() { "pending" } else { "resolved" };
            s.push_str(&format!("  {} {}: {}\n", id, cached.name, kind));
        }
        s.push_str("Overrides:\n");
        for (id, replacement) in &state.overrides {
            s.push_str(&format!("  {} -> {}\n", id, replacement.name()));
        }
        s
    }

    fn ancestry_len(&self) -> usize {
        std::iter::successors(self.parent(), |c| c.parent()).count()
    }

    /// Finds a cache entry here or in the nearest ancestor holding one.
    ///
    /// A local override hides the ancestors' entries, so the replacement is
    /// resolved here even when a parent already cached the original.
    fn lookup(&self, id: FactoryId) -> Option<CacheEntry> {
        {
            let state = self.inner.state.lock();
            if let Some(cached) = state.cache.get(&id) {
                return Some(cached.entry.clone());
            }
            if state.overrides.contains_key(&id) {
                return None;
            }
        }
        let mut current = self.parent();
        while let Some(container) = current {
            if let Some(cached) = container.inner.state.lock().cache.get(&id) {
                return Some(cached.entry.clone());
            }
            current = container.parent();
        }
        None
    }

    fn check_disposed(&self) -> DiResult<()> {
        if self.is_disposed() {
            Err(DiError::Disposed)
        } else {
            Ok(())
        }
    }

    /// Frozen gate, override lookup and cycle detection, in that order.
    fn plan(&self, factory: &AnyFactory, chain: &ResolutionChain) -> DiResult<Plan> {
        if self.is_frozen() {
            return Err(DiError::Frozen { factory: factory.name().to_string() });
        }

        let replacement = self.inner.state.lock().overrides.get(&factory.id()).cloned();
        let overridden = replacement.is_some();
        let target = replacement.unwrap_or_else(|| factory.clone());

        let options = &self.inner.options;
        let next = chain.enter(factory, options.detect_circular, options.max_depth)?;
        let info = ResolveInfo::new(
            factory.id(),
            factory.name_arc().clone(),
            factory.lifetime(),
            chain.depth(),
            chain.current().cloned(),
            overridden,
        );

        Ok(Plan { target, chain: next, info })
    }

    pub(crate) fn resolve_in(&self, factory: &AnyFactory, chain: &ResolutionChain) -> DiResult<AnyArc> {
        self.check_disposed()?;

        match self.lookup(factory.id()) {
            Some(CacheEntry::Resolved(value)) => return Ok(value),
            Some(CacheEntry::Pending { .. }) if chain.contains(factory.id()) => {
                return Err(chain.cycle_error(factory));
            }
            Some(CacheEntry::Pending { .. }) => {
                return Err(DiError::AsyncRequired { factory: factory.name().to_string() });
            }
            None => {}
        }

        let plan = self.plan(factory, chain)?;
        if plan.target.is_async() {
            return Err(DiError::AsyncRequired { factory: factory.name().to_string() });
        }
        self.run_sync(factory, plan)
    }

    fn run_sync(&self, factory: &AnyFactory, plan: Plan) -> DiResult<AnyArc> {
        self.inner.hooks.fire_before_resolve(&plan.info);
        let started = Instant::now();
        let ctx = ResolverContext::new(self.clone(), plan.chain.clone());
        let result = plan.target.invoke_sync(&ctx).unwrap_or_else(|| {
            Err(Box::new(DiError::AsyncRequired { factory: factory.name().to_string() }) as BoxError)
        });
        let store = if factory.lifetime().is_cached() { Store::Cache } else { Store::Nowhere };
        self.settle(factory, &plan, result, started, store)
    }

    /// Resolves `factory`, awaiting if needed.
    ///
    /// Everything up to the first suspension point runs before this returns,
    /// so a pending entry is visible to other callers as soon as the first
    /// caller has asked, whether or not it has polled yet.
    pub(crate) fn resolve_async_in(&self, factory: &AnyFactory, chain: &ResolutionChain) -> BoxFuture<'static, DiResult<AnyArc>> {
        match self.begin_async(factory, chain) {
            Ok(AsyncStep::Ready(value)) => future::ready(Ok(value)).boxed(),
            Ok(AsyncStep::Run(pending)) => pending,
            Err(err) => future::ready(Err(err)).boxed(),
        }
    }

    fn begin_async(&self, factory: &AnyFactory, chain: &ResolutionChain) -> DiResult<AsyncStep> {
        self.check_disposed()?;

        match self.lookup(factory.id()) {
            Some(CacheEntry::Resolved(value)) => return Ok(AsyncStep::Ready(value)),
            // Joining our own in-flight entry would wait forever.
            Some(CacheEntry::Pending { .. }) if chain.contains(factory.id()) => {
                return Err(chain.cycle_error(factory));
            }
            Some(CacheEntry::Pending { future, .. }) => return Ok(AsyncStep::Run(future.boxed())),
            None => {}
        }

        let plan = self.plan(factory, chain)?;
        if !plan.target.is_async() {
            return self.run_sync(factory, plan).map(AsyncStep::Ready);
        }

        if !factory.lifetime().is_cached() {
            let container = self.clone();
            let factory = factory.clone();
            return Ok(AsyncStep::Run(Box::pin(async move {
                container.inner.hooks.fire_before_resolve(&plan.info);
                let started = Instant::now();
                let ctx = ResolverContext::new(container.clone(), plan.chain.clone());
                let result = plan.target.invoke(ctx).await;
                container.settle(&factory, &plan, result, started, Store::Nowhere)
            })));
        }

        self.start_single_flight(factory, plan)
    }

    /// Inserts a pending entry for an async singleton and returns a future
    /// joined to it.
    fn start_single_flight(&self, factory: &AnyFactory, plan: Plan) -> DiResult<AsyncStep> {
        let mut state = self.inner.state.lock();

        // Another caller may have started (or finished) since the lookup.
        if let Some(cached) = state.cache.get(&factory.id()) {
            return Ok(match &cached.entry {
                CacheEntry::Resolved(value) => AsyncStep::Ready(value.clone()),
                CacheEntry::Pending { future, .. } => AsyncStep::Run(future.clone().boxed()),
            });
        }

        let ticket = self.inner.next_ticket.fetch_add(1, Ordering::Relaxed);
        // The cache holds this future, so it must not keep the container alive.
        let weak: Weak<ContainerInner> = Arc::downgrade(&self.inner);
        let original = factory.clone();
        let work: BoxFuture<'static, DiResult<AnyArc>> = Box::pin(async move {
            let container = match weak.upgrade() {
                Some(inner) => Container { inner },
                None => return Err(DiError::Disposed),
            };
            container.inner.hooks.fire_before_resolve(&plan.info);
            let started = Instant::now();
            let ctx = ResolverContext::new(container.clone(), plan.chain.clone());
            let result = plan.target.invoke(ctx).await;
            container.settle(&original, &plan, result, started, Store::Pending(ticket))
        });
        let shared = work.shared();

        state.cache.insert(
            factory.id(),
            Cached::pending(factory.name_arc().clone(), ticket, shared.clone()),
        );
        drop(state);

        Ok(AsyncStep::Run(shared.boxed()))
    }

    /// Stores the outcome of a body run and fires the closing hook.
    fn settle(&self, factory: &AnyFactory, plan: &Plan, result: BodyResult, started: Instant, store: Store) -> DiResult<AnyArc> {
        let elapsed = started.elapsed();
        let outcome = match result {
            Ok(value) => self.store(factory, value, store),
            Err(err) => {
                if let Store::Pending(ticket) = store {
                    self.remove_pending(factory.id(), ticket);
                }
                Err(DiError::from_factory(factory.name(), &plan.chain.names(), err))
            }
        };

        match &outcome {
            Ok(value) => self.inner.hooks.fire_after_resolve(&plan.info, value, elapsed),
            Err(err) => self.inner.hooks.fire_resolve_error(&plan.info, err, elapsed),
        }
        outcome
    }

    fn store(&self, factory: &AnyFactory, value: AnyArc, store: Store) -> DiResult<AnyArc> {
        let id = factory.id();
        match store {
            Store::Nowhere => Ok(value),
            Store::Cache => {
                let mut state = self.inner.state.lock();
                if let Some(Cached { entry: CacheEntry::Resolved(existing), .. }) = state.cache.get(&id) {
                    // Lost a race with another thread resolving the same singleton.
                    return Ok(existing.clone());
                }
                if self.is_disposed() {
                    return Err(DiError::Disposed);
                }
                if self.is_frozen() {
                    return Err(DiError::Frozen { factory: factory.name().to_string() });
                }
                state.cache.insert(id, Cached::resolved(factory.name_arc().clone(), value.clone()));
                Ok(value)
            }
            Store::Pending(ticket) => {
                let mut state = self.inner.state.lock();
                let ours = matches!(
                    state.cache.get(&id),
                    Some(Cached { entry: CacheEntry::Pending { ticket: current, .. }, .. }) if *current == ticket
                );
                if ours {
                    state.cache.insert(id, Cached::resolved(factory.name_arc().clone(), value.clone()));
                }
                Ok(value)
            }
        }
    }

    fn remove_pending(&self, id: FactoryId, ticket: u64) {
        let mut state = self.inner.state.lock();
        let ours = matches!(
            state.cache.get(&id),
            Some(Cached { entry: CacheEntry::Pending { ticket: current, .. }, .. }) if *current == ticket
        );
        if ours {
            state.cache.remove(&id);
        }
    }
}

impl Default for Container {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Container {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.inner.state.lock();
        f.debug_struct("Container")
            .field("cached", &state.cache.len())
            .field("overrides", &state.overrides.len())
            .field("has_parent", &self.inner.parent.is_some())
            .field("frozen", &self.is_frozen())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

impl Drop for ContainerInner {
    fn drop(&mut self) {
        if !self.disposed.load(Ordering::SeqCst) {
            let pending = self.disposers.get_mut().len();
            if pending > 0 {
                tracing::warn!(pending, "container dropped with undisposed resources; call dispose().await before dropping");
            }
        }
    }
}

impl ResolverCore for Container {
    fn resolve_erased(&self, factory: &AnyFactory) -> DiResult<AnyArc> {
        self.resolve_in(factory, &ResolutionChain::default())
    }

    fn resolve_erased_async(&self, factory: &AnyFactory) -> BoxFuture<'static, DiResult<AnyArc>> {
        self.resolve_async_in(factory, &ResolutionChain::default())
    }

    fn contains(&self, id: FactoryId) -> bool {
        std::iter::successors(Some(self), |c| c.parent()).any(|c| c.inner.state.lock().cache.contains_key(&id))
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() -> Result<(), BoxError> + Send>) {
        self.inner.disposers.lock().push_sync(f);
    }

    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>) {
        self.inner.disposers.lock().push_async(f);
    }
}

impl Resolver for Container {}
