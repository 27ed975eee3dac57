//! Read-only container façade and lazy handles.

use std::fmt;
use std::sync::{Arc, Weak};

use futures::future::BoxFuture;

use super::{Container, ContainerInner};
use crate::traits::{Resolver, ResolverCore};
use crate::{DiError, DiResult, Factory};

/// A view of a [`Container`] that can resolve but not mutate.
///
/// No overrides, cache control, freezing, disposal or disposer
/// registration. Hand this to code that should consume services without
/// managing them.
///
/// # Examples
///
/// ```
/// use ferrous_container::{factory, Container};
///
/// let greeting = factory("Greeting", |_| Ok("hello"));
/// let container = Container::new();
/// let view = container.as_read_only();
///
/// assert_eq!(*view.get(&greeting).unwrap(), "hello");
/// assert!(view.has(&greeting));
/// ```
#[derive(Clone)]
pub struct ReadOnlyContainer {
    container: Container,
}

impl ReadOnlyContainer {
    pub(crate) fn new(container: Container) -> Self {
        Self { container }
    }

    pub fn get<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> DiResult<Arc<T>> {
        self.container.get(factory)
    }

    pub fn get_async<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> BoxFuture<'static, DiResult<Arc<T>>> {
        self.container.get_async(factory)
    }

    pub fn try_get<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Option<Arc<T>> {
        self.container.try_get(factory)
    }

    pub fn try_get_async<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> BoxFuture<'static, Option<Arc<T>>> {
        self.container.try_get_async(factory)
    }

    pub fn has<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> bool {
        self.container.contains(factory.id())
    }

    pub fn resolver<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Lazy<T> {
        self.container.resolver(factory)
    }
}

impl fmt::Debug for ReadOnlyContainer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ReadOnlyContainer").field(&self.container).finish()
    }
}

/// Resolves a factory on demand.
///
/// Holds the container weakly: once every `Container` handle is gone the
/// lazy handle fails with [`DiError::Disposed`].
///
/// # Examples
///
/// ```
/// use ferrous_container::{factory, Container, Resolver};
///
/// let answer = factory("Answer", |_| Ok(42u32));
/// let container = Container::new();
/// let lazy = container.resolver(&answer);
///
/// assert!(!container.has(&answer));
/// assert_eq!(*lazy.get().unwrap(), 42);
/// assert!(container.has(&answer));
/// ```
pub struct Lazy<T> {
    container: Weak<ContainerInner>,
    factory: Factory<T>,
}

impl<T: Send + Sync + 'static> Lazy<T> {
    pub(crate) fn new(container: Weak<ContainerInner>, factory: Factory<T>) -> Self {
        Self { container, factory }
    }

    fn container(&self) -> DiResult<Container> {
        self.container
            .upgrade()
            .map(|inner| Container { inner })
            .ok_or(DiError::Disposed)
    }

    pub fn get(&self) -> DiResult<Arc<T>> {
        self.container()?.get(&self.factory)
    }

    pub fn get_async(&self) -> BoxFuture<'static, DiResult<Arc<T>>> {
        match self.container() {
            Ok(container) => container.get_async(&self.factory),
            Err(err) => Box::pin(futures::future::ready(Err(err))),
        }
    }

    pub fn try_get(&self) -> Option<Arc<T>> {
        self.get().ok()
    }

    pub fn factory(&self) -> &Factory<T> {
        &self.factory
    }
}

impl<T> Clone for Lazy<T> {
    fn clone(&self) -> Self {
        Self {
            container: self.container.clone(),
            factory: self.factory.clone(),
        }
    }
}

impl<T> fmt::Debug for Lazy<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Lazy").field("factory", &self.factory).finish()
    }
}
