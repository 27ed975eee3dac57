//! Resolver context for factory bodies.

use futures::future::BoxFuture;

use super::{Container, Lazy};
use crate::internal::ResolutionChain;
use crate::traits::{Resolver, ResolverCore};
use crate::{AnyArc, AnyFactory, BoxError, DiResult, Factory, FactoryId};

/// Context passed to factory bodies for resolving dependencies.
///
/// Wraps the container the outer resolution was started on, so nested
/// lookups from a child container's factory stay in that child, together
/// with the chain of factories currently being resolved. The chain is what
/// turns `A -> B -> A` into a [`DiError::Circular`](crate::DiError::Circular)
/// instead of unbounded recursion.
///
/// The context is cheap to clone and can be moved into async bodies.
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
///     factory("UserService", move |ctx| {
///         // ctx is a ResolverContext scoped to this resolution
///         Ok(UserService { db: ctx.get(&database)? })
///     })
/// };
///
/// let container = Container::new();
/// assert_eq!(container.get(&users).unwrap().db.url, "postgres://localhost");
/// ```
#[derive(Clone)]
pub struct ResolverContext {
    container: Container,
    chain: ResolutionChain,
}

impl ResolverContext {
    pub(crate) fn new(container: Container, chain: ResolutionChain) -> Self {
        Self { container, chain }
    }

    /// The container this resolution runs on.
    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Names of the factories on the current chain, outermost first. The
    /// last one is the factory whose body received this context.
    pub fn chain(&self) -> Vec<String> {
        self.chain.names()
    }

    pub fn depth(&self) -> usize {
        self.chain.depth()
    }

    /// Like [`Container::resolver`], for use inside a body.
    pub fn resolver<T: Send + Sync + 'static>(&self, factory: &Factory<T>) -> Lazy<T> {
        self.container.resolver(factory)
    }
}

impl ResolverCore for ResolverContext {
    fn resolve_erased(&self, factory: &AnyFactory) -> DiResult<AnyArc> {
        self.container.resolve_in(factory, &self.chain)
    }

    fn resolve_erased_async(&self, factory: &AnyFactory) -> BoxFuture<'static, DiResult<AnyArc>> {
        self.container.resolve_async_in(factory, &self.chain)
    }

    fn contains(&self, id: FactoryId) -> bool {
        self.container.contains(id)
    }

    fn push_sync_disposer(&self, f: Box<dyn FnOnce() -> Result<(), BoxError> + Send>) {
        self.container.push_sync_disposer(f);
    }

    fn push_async_disposer(&self, f: Box<dyn FnOnce() -> BoxFuture<'static, Result<(), BoxError>> + Send>) {
        self.container.push_async_disposer(f);
    }
}

impl Resolver for ResolverContext {}
