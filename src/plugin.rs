//! Plugin mechanism.
//!
//! A plugin contributes a typed methods object to a container. Applying one
//! with [`Container::with`] hands it the live container plus an
//! [`Internals`] handle onto the container's cache, overrides, hooks and
//! parent, and returns an [`Extended`] wrapper that derefs to the container
//! and exposes the methods.
//!
//! Method sets never collide: each plugin's methods live in their own value,
//! and composing plugins with [`pipe`] or [`Extended::with`] pairs them up
//! in a tuple.
//!
//! # Examples
//!
//! ```
//! use ferrous_container::{define_plugin, factory, Container, Resolver};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//! use std::sync::Arc;
//!
//! struct Counter(Arc<AtomicUsize>);
//!
//! impl Counter {
//!     fn resolutions(&self) -> usize {
//!         self.0.load(Ordering::SeqCst)
//!     }
//! }
//!
//! let counting = define_plugin("counting", |_container, internals| {
//!     let count = Arc::new(AtomicUsize::new(0));
//!     let hook_count = count.clone();
//!     internals.hooks().after_resolve(move |_, _, _| {
//!         hook_count.fetch_add(1, Ordering::SeqCst);
//!     });
//!     Counter(count)
//! });
//!
//! let container = Container::new().with(counting);
//! let number = factory("Number", |_| Ok(1u8));
//! container.get(&number).unwrap();
//! container.get(&number).unwrap();
//! assert_eq!(container.methods().resolutions(), 1);
//! assert_eq!(container.plugin_names(), ["counting"]);
//! ```

use std::borrow::Cow;
use std::fmt;
use std::marker::PhantomData;
use std::ops::Deref;
use std::sync::Arc;

use crate::container::ContainerInner;
use crate::hooks::Hooks;
use crate::{AnyFactory, Container, ContainerOptions, FactoryId};

/// Extends a container with a typed methods object.
pub trait Plugin {
    /// What the plugin adds to the container.
    type Methods;

    /// Name reported by [`Extended::plugin_names`].
    fn name(&self) -> Cow<'static, str>;

    /// Subscribes hooks, captures state and builds the methods object.
    fn apply(self, container: &Container, internals: &Internals) -> Self::Methods;
}

/// Trusted access to a container's mutable state.
///
/// This is an open extension point. Nothing stops a plugin from evicting
/// entries another plugin relies on; plugins are expected to cooperate.
///
/// Do not capture an `Internals` (or the container) in a hook closure: the
/// hooks are owned by the container, so the container would keep itself
/// alive.
#[derive(Clone)]
pub struct Internals {
    inner: Arc<ContainerInner>,
}

impl Internals {
    pub(crate) fn new(container: &Container) -> Self {
        Self { inner: container.inner.clone() }
    }

    pub fn hooks(&self) -> &Hooks {
        &self.inner.hooks
    }

    pub fn options(&self) -> &ContainerOptions {
        &self.inner.options
    }

    pub fn parent(&self) -> Option<&Container> {
        self.inner.parent.as_ref()
    }

    /// Identities with a local cache entry, resolved or in flight.
    pub fn cached_ids(&self) -> Vec<FactoryId> {
        self.inner.state.lock().cache.keys().copied().collect()
    }

    /// Names of the local cache entries, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .state
            .lock()
            .cache
            .values()
            .map(|cached| cached.name.to_string())
            .collect();
        names.sort();
        names
    }

    pub fn cache_len(&self) -> usize {
        self.inner.state.lock().cache.len()
    }

    pub fn is_cached(&self, id: FactoryId) -> bool {
        self.inner.state.lock().cache.contains_key(&id)
    }

    /// Whether the local entry for `id` is still in flight.
    pub fn is_pending(&self, id: FactoryId) -> bool {
        self.inner.state.lock().cache.get(&id).is_some_and(|cached| cached.is_pending())
    }

    /// Drops the local entry for `id`. Returns whether one existed.
    pub fn evict(&self, id: FactoryId) -> bool {
        self.inner.state.lock().cache.remove(&id).is_some()
    }

    pub fn clear_cache(&self) {
        self.inner.state.lock().cache.clear();
    }

    pub fn override_ids(&self) -> Vec<FactoryId> {
        self.inner.state.lock().overrides.keys().copied().collect()
    }

    /// The replacement currently registered for `id`.
    pub fn override_for(&self, id: FactoryId) -> Option<AnyFactory> {
        self.inner.state.lock().overrides.get(&id).cloned()
    }

    /// Sets an override without a type check. Fires `on_override`.
    ///
    /// The replacement must produce the same type as `original`, or typed
    /// resolution of `original` fails with `DiError::TypeMismatch`.
    pub fn set_override(&self, original: &AnyFactory, replacement: AnyFactory) {
        Container { inner: self.inner.clone() }.set_override(original, replacement);
    }

    pub fn remove_override(&self, id: FactoryId) -> Option<AnyFactory> {
        self.inner.state.lock().overrides.remove(&id)
    }
}

impl fmt::Debug for Internals {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Internals").field("cached", &self.cache_len()).finish()
    }
}

/// A container extended with plugin methods.
///
/// Derefs to the [`Container`], so every container method stays available.
pub struct Extended<M> {
    container: Container,
    methods: M,
    names: Vec<Cow<'static, str>>,
}

impl<M> Extended<M> {
    /// The methods contributed by the applied plugins.
    pub fn methods(&self) -> &M {
        &self.methods
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Names of the applied plugins, in application order.
    pub fn plugin_names(&self) -> Vec<&str> {
        self.names.iter().map(|name| name.as_ref()).collect()
    }

    pub fn into_parts(self) -> (Container, M) {
        (self.container, self.methods)
    }

    /// Applies another plugin on top of this one.
    pub fn with<P: Plugin>(self, plugin: P) -> Extended<(M, P::Methods)> {
        let mut names = self.names;
        names.push(plugin.name());
        let methods = plugin.apply(&self.container, &Internals::new(&self.container));
        Extended {
            container: self.container,
            methods: (self.methods, methods),
            names,
        }
    }
}

impl<M> Deref for Extended<M> {
    type Target = Container;

    fn deref(&self) -> &Container {
        &self.container
    }
}

impl<M> fmt::Debug for Extended<M> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Extended")
            .field("container", &self.container)
            .field("plugins", &self.names)
            .finish()
    }
}

impl Container {
    /// Applies `plugin` to this container.
    ///
    /// The plugin acts on this container itself, not a copy: hooks it
    /// subscribes fire for every handle to the container.
    pub fn with<P: Plugin>(&self, plugin: P) -> Extended<P::Methods> {
        let name = plugin.name();
        tracing::debug!(plugin = %name, "applying plugin");
        let methods = plugin.apply(self, &Internals::new(self));
        Extended {
            container: self.clone(),
            methods,
            names: vec![name],
        }
    }
}

/// A plugin built from a closure. See [`define_plugin`].
pub struct FnPlugin<F, M> {
    name: Cow<'static, str>,
    apply: F,
    _methods: PhantomData<fn() -> M>,
}

/// Defines a plugin from a name and an apply function.
pub fn define_plugin<M, F>(name: impl Into<Cow<'static, str>>, apply: F) -> FnPlugin<F, M>
where
    F: FnOnce(&Container, &Internals) -> M,
{
    FnPlugin {
        name: name.into(),
        apply,
        _methods: PhantomData,
    }
}

impl<F, M> Plugin for FnPlugin<F, M>
where
    F: FnOnce(&Container, &Internals) -> M,
{
    type Methods = M;

    fn name(&self) -> Cow<'static, str> {
        self.name.clone()
    }

    fn apply(self, container: &Container, internals: &Internals) -> M {
        (self.apply)(container, internals)
    }
}

/// Two plugins applied in order as one. See [`pipe`].
pub struct Pipe<A, B> {
    first: A,
    second: B,
}

/// Composes two plugins. The result is named `"first+second"` and its
/// methods are the pair of both method objects.
///
/// Use the [`pipe!`](crate::pipe!) macro for more than two.
pub fn pipe<A: Plugin, B: Plugin>(first: A, second: B) -> Pipe<A, B> {
    Pipe { first, second }
}

impl<A: Plugin, B: Plugin> Plugin for Pipe<A, B> {
    type Methods = (A::Methods, B::Methods);

    fn name(&self) -> Cow<'static, str> {
        Cow::Owned(format!("{}+{}", self.first.name(), self.second.name()))
    }

    fn apply(self, container: &Container, internals: &Internals) -> Self::Methods {
        let first = self.first.apply(container, internals);
        let second = self.second.apply(container, internals);
        (first, second)
    }
}

/// Composes any number of plugins left to right.
///
/// `pipe!(a, b, c)` is `pipe(pipe(a, b), c)`; its methods are
/// `((a, b), c)`.
#[macro_export]
macro_rules! pipe {
    ($first:expr $(,)?) => { $first };
    ($first:expr, $second:expr $(, $rest:expr)* $(,)?) => {
        $crate::pipe!($crate::pipe($first, $second) $(, $rest)*)
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{factory, value, Resolver};

    struct Tag(&'static str);

    fn tag(name: &'static str) -> FnPlugin<impl FnOnce(&Container, &Internals) -> Tag, Tag> {
        define_plugin(name, move |_, _| Tag(name))
    }

    #[test]
    fn pipe_joins_names_and_pairs_methods() {
        let plugin = pipe(tag("a"), tag("b"));
        assert_eq!(plugin.name(), "a+b");

        let container = Container::new().with(plugin);
        let (a, b) = container.methods();
        assert_eq!((a.0, b.0), ("a", "b"));
        assert_eq!(container.plugin_names(), ["a+b"]);
    }

    #[test]
    fn pipe_macro_nests_left() {
        let plugin = crate::pipe!(tag("a"), tag("b"), tag("c"));
        assert_eq!(plugin.name(), "a+b+c");
        let container = Container::new().with(plugin);
        let ((a, b), c) = container.methods();
        assert_eq!((a.0, b.0, c.0), ("a", "b", "c"));
    }

    #[test]
    fn chained_with_keeps_every_method_set() {
        let container = Container::new().with(tag("first")).with(tag("second"));
        let (first, second) = container.methods();
        assert_eq!((first.0, second.0), ("first", "second"));
        assert_eq!(container.plugin_names(), ["first", "second"]);
    }

    #[test]
    fn internals_see_and_mutate_state() {
        let container = Container::new();
        let internals = Internals::new(&container);
        let number = factory("Number", |_| Ok(5u8));

        container.get(&number).unwrap();
        assert!(internals.is_cached(number.id()));
        assert_eq!(internals.cached_names(), ["Number"]);

        assert!(internals.evict(number.id()));
        assert!(!container.has(&number));

        internals.set_override(number.erased(), value("Six", 6u8).into());
        assert_eq!(internals.override_ids(), vec![number.id()]);
        assert_eq!(*container.get(&number).unwrap(), 6);
    }
}
