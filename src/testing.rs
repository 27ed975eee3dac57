//! Test helpers: mocks, spies and throwaway containers.
//!
//! Everything here works through overrides, so production factories stay
//! untouched and a [`reset`](TestingMethods::reset) restores them.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use parking_lot::Mutex;

use crate::factory::{downcast, BodyResult};
use crate::plugin::{define_plugin, Extended, FnPlugin, Internals};
use crate::{value, AnyArc, AnyFactory, BoxError, Container, DiError, Factory, ResolverContext};

/// Records calls to a spied factory.
pub struct Spy<T> {
    factory: Factory<T>,
    calls: Arc<AtomicUsize>,
    last: Arc<Mutex<Option<AnyArc>>>,
}

impl<T: Send + Sync + 'static> Spy<T> {
    /// How many times the body ran. Cache hits are not calls.
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn was_called(&self) -> bool {
        self.call_count() > 0
    }

    /// The value the most recent successful call produced.
    pub fn last_value(&self) -> Option<Arc<T>> {
        let last = self.last.lock().clone()?;
        downcast::<T>(last, self.factory.name()).ok()
    }

    /// The spied factory.
    pub fn factory(&self) -> &Factory<T> {
        &self.factory
    }
}

impl<T> Clone for Spy<T> {
    fn clone(&self) -> Self {
        Self {
            factory: self.factory.clone(),
            calls: self.calls.clone(),
            last: self.last.clone(),
        }
    }
}

impl<T> std::fmt::Debug for Spy<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Spy")
            .field("factory", &self.factory)
            .field("calls", &self.calls.load(Ordering::SeqCst))
            .finish()
    }
}

/// Methods added by the [`testing`] plugin.
#[derive(Clone)]
pub struct TestingMethods {
    container: Container,
    internals: Internals,
}

impl TestingMethods {
    /// Makes `factory` resolve to `instance`.
    pub fn mock<T: Send + Sync + 'static>(&self, factory: &Factory<T>, instance: T) {
        let name = format!("mock({})", factory.name());
        self.container.override_with(factory, value(name, instance));
    }

    /// Makes `factory` resolve through `replacement`.
    pub fn mock_with<T: Send + Sync + 'static>(&self, factory: &Factory<T>, replacement: Factory<T>) {
        self.container.override_with(factory, replacement);
    }

    /// Wraps `factory` so every run of its body is counted.
    ///
    /// The spy keeps the factory's lifetime: a spied singleton is still
    /// built once per container.
    pub fn spy<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Spy<T> {
        let calls = Arc::new(AtomicUsize::new(0));
        let last: Arc<Mutex<Option<AnyArc>>> = Arc::new(Mutex::new(None));
        let original = factory.erased().clone();

        let wrapper = if factory.is_async() {
            let (calls, last) = (calls.clone(), last.clone());
            factory.decorate(move |ctx: ResolverContext| -> BoxFuture<'static, BodyResult> {
                calls.fetch_add(1, Ordering::SeqCst);
                let (last, work) = (last.clone(), original.invoke(ctx));
                Box::pin(async move { record(&last, work.await) })
            })
        } else {
            let (calls, last) = (calls.clone(), last.clone());
            factory.decorate_sync(factory.lifetime(), move |ctx: &ResolverContext| {
                calls.fetch_add(1, Ordering::SeqCst);
                let result = run_sync(&original, ctx);
                record(&last, result)
            })
        };

        self.container.override_with(factory, wrapper);
        Spy {
            factory: factory.clone(),
            calls,
            last,
        }
    }

    /// Drops every cached value and override on this container.
    pub fn reset(&self) {
        for id in self.internals.override_ids() {
            self.internals.remove_override(id);
        }
        self.internals.clear_cache();
    }

    /// Names of the factories cached on this container, sorted.
    pub fn cached_names(&self) -> Vec<String> {
        self.internals.cached_names()
    }
}

fn run_sync(factory: &AnyFactory, ctx: &ResolverContext) -> BodyResult {
    factory.invoke_sync(ctx).unwrap_or_else(|| {
        Err(Box::new(DiError::AsyncRequired {
            factory: factory.name().to_string(),
        }) as BoxError)
    })
}

fn record(last: &Mutex<Option<AnyArc>>, result: BodyResult) -> BodyResult {
    if let Ok(value) = &result {
        *last.lock() = Some(value.clone());
    }
    result
}

/// Plugin with mocking and spying helpers.
pub fn testing() -> FnPlugin<impl FnOnce(&Container, &Internals) -> TestingMethods, TestingMethods> {
    define_plugin("testing", |container: &Container, internals: &Internals| TestingMethods {
        container: container.clone(),
        internals: internals.clone(),
    })
}

/// A fresh container with the [`testing`] plugin applied, handed to
/// `configure` before it is returned.
///
/// ```
/// use ferrous_container::{create_test_container, factory, Resolver};
///
/// let port = factory("Port", |_| Ok(8080u16));
/// let container = create_test_container(|c| c.methods().mock(&port, 0));
/// assert_eq!(*container.get(&port).unwrap(), 0);
/// ```
pub fn create_test_container(configure: impl FnOnce(&Extended<TestingMethods>)) -> Extended<TestingMethods> {
    let container = Container::new().with(testing());
    configure(&container);
    container
}
