//! Lifecycle hook lists.
//!
//! The container fires these at fixed points of its lifecycle so plugins
//! can observe resolution, overrides and disposal without taking part in
//! control flow. A hook cannot change a resolution's outcome.
//!
//! Hooks run synchronously on the resolving task. Keep them lightweight;
//! anything expensive should be queued and processed elsewhere.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::{AnyArc, DiError, FactoryId, Lifetime};

static NEXT_SEQ: AtomicU64 = AtomicU64::new(1);

/// Describes one resolution attempt.
///
/// The same `seq` is passed to `before_resolve` and to whichever of
/// `after_resolve`/`resolve_error` closes the attempt, so plugins can pair
/// them up even when async resolutions interleave.
#[derive(Debug, Clone)]
pub struct ResolveInfo {
    /// Identity of the factory the caller asked for.
    pub id: FactoryId,
    /// Its diagnostic name.
    pub name: Arc<str>,
    /// Lifetime of the requested factory. An override resolves under it.
    pub lifetime: Lifetime,
    /// Number of factories already on the chain when this one started.
    pub depth: usize,
    /// The factory whose body requested this one, if any.
    pub parent: Option<Arc<str>>,
    /// Unique sequence number of this attempt.
    pub seq: u64,
    /// Whether an override supplied the value.
    pub overridden: bool,
}

impl ResolveInfo {
    pub(crate) fn new(id: FactoryId, name: Arc<str>, lifetime: Lifetime, depth: usize, parent: Option<Arc<str>>, overridden: bool) -> Self {
        Self {
            id,
            name,
            lifetime,
            depth,
            parent,
            seq: NEXT_SEQ.fetch_add(1, Ordering::Relaxed),
            overridden,
        }
    }
}

/// Passed to `on_override` hooks.
#[derive(Debug, Clone)]
pub struct OverrideInfo {
    pub original: FactoryId,
    pub original_name: Arc<str>,
    pub replacement: FactoryId,
    pub replacement_name: Arc<str>,
}

pub type BeforeResolveHook = Arc<dyn Fn(&ResolveInfo) + Send + Sync>;
pub type AfterResolveHook = Arc<dyn Fn(&ResolveInfo, &AnyArc, Duration) + Send + Sync>;
pub type ResolveErrorHook = Arc<dyn Fn(&ResolveInfo, &DiError, Duration) + Send + Sync>;
pub type DisposeHook = Arc<dyn Fn() + Send + Sync>;
pub type OverrideHook = Arc<dyn Fn(&OverrideInfo) + Send + Sync>;

/// The hook lists of one container.
///
/// Cache hits do not fire resolution hooks; only a body actually running
/// (or an in-flight async entry being created) does.
#[derive(Default)]
pub struct Hooks {
    before_resolve: RwLock<Vec<BeforeResolveHook>>,
    after_resolve: RwLock<Vec<AfterResolveHook>>,
    resolve_error: RwLock<Vec<ResolveErrorHook>>,
    on_dispose: RwLock<Vec<DisposeHook>>,
    on_override: RwLock<Vec<OverrideHook>>,
}

impl Hooks {
    /// Called right before a factory body runs.
    pub fn before_resolve(&self, hook: impl Fn(&ResolveInfo) + Send + Sync + 'static) {
        self.before_resolve.write().push(Arc::new(hook));
    }

    /// Called with the value and elapsed time once a body succeeds.
    pub fn after_resolve(&self, hook: impl Fn(&ResolveInfo, &AnyArc, Duration) + Send + Sync + 'static) {
        self.after_resolve.write().push(Arc::new(hook));
    }

    /// Called with the error and elapsed time when a body fails.
    pub fn resolve_error(&self, hook: impl Fn(&ResolveInfo, &DiError, Duration) + Send + Sync + 'static) {
        self.resolve_error.write().push(Arc::new(hook));
    }

    /// Called once when `dispose()` starts, before any disposer runs.
    pub fn on_dispose(&self, hook: impl Fn() + Send + Sync + 'static) {
        self.on_dispose.write().push(Arc::new(hook));
    }

    /// Called whenever an override is set. Clearing overrides does not fire.
    pub fn on_override(&self, hook: impl Fn(&OverrideInfo) + Send + Sync + 'static) {
        self.on_override.write().push(Arc::new(hook));
    }

    /// Total number of subscribed hooks across all lists.
    pub fn len(&self) -> usize {
        self.before_resolve.read().len()
            + self.after_resolve.read().len()
            + self.resolve_error.read().len()
            + self.on_dispose.read().len()
            + self.on_override.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    // Each fire_* snapshots its list first so a hook may subscribe more
    // hooks without deadlocking.

    pub(crate) fn fire_before_resolve(&self, info: &ResolveInfo) {
        for hook in snapshot(&self.before_resolve) {
            hook(info);
        }
    }

    pub(crate) fn fire_after_resolve(&self, info: &ResolveInfo, value: &AnyArc, elapsed: Duration) {
        for hook in snapshot(&self.after_resolve) {
            hook(info, value, elapsed);
        }
    }

    pub(crate) fn fire_resolve_error(&self, info: &ResolveInfo, error: &DiError, elapsed: Duration) {
        for hook in snapshot(&self.resolve_error) {
            hook(info, error, elapsed);
        }
    }

    pub(crate) fn fire_on_dispose(&self) {
        for hook in snapshot(&self.on_dispose) {
            hook();
        }
    }

    pub(crate) fn fire_on_override(&self, info: &OverrideInfo) {
        for hook in snapshot(&self.on_override) {
            hook(info);
        }
    }
}

fn snapshot<H: Clone>(list: &RwLock<Vec<H>>) -> Vec<H> {
    let guard = list.read();
    if guard.is_empty() {
        Vec::new()
    } else {
        guard.clone()
    }
}
