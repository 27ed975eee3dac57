//! Concurrent resolution of many factories.

use std::sync::Arc;

use futures::future::join_all;

use crate::plugin::{define_plugin, FnPlugin, Internals};
use crate::traits::ResolverCore;
use crate::{AnyArc, AnyFactory, Container, DiResult, Factory};

/// Methods added by the [`batch`] plugin.
#[derive(Debug, Clone)]
pub struct BatchMethods {
    container: Container,
}

impl BatchMethods {
    /// Resolves every factory concurrently. Results come back in input
    /// order, one per factory.
    pub async fn resolve_all<I>(&self, factories: I) -> Vec<DiResult<AnyArc>>
    where
        I: IntoIterator,
        I::Item: Into<AnyFactory>,
    {
        let pending: Vec<_> = factories
            .into_iter()
            .map(|factory| self.container.resolve_erased_async(&factory.into()))
            .collect();
        join_all(pending).await
    }

    /// Like [`resolve_all`](Self::resolve_all) but fails with the first
    /// error in input order. Every resolution still runs to completion.
    pub async fn resolve_all_strict<I>(&self, factories: I) -> DiResult<Vec<AnyArc>>
    where
        I: IntoIterator,
        I::Item: Into<AnyFactory>,
    {
        self.resolve_all(factories).await.into_iter().collect()
    }

    /// Resolves factories of one type concurrently.
    pub async fn get_many<T: Send + Sync + 'static>(&self, factories: &[Factory<T>]) -> DiResult<Vec<Arc<T>>> {
        let pending: Vec<_> = factories
            .iter()
            .map(|factory| self.container.resolve_erased_async(factory.erased()))
            .collect();
        join_all(pending)
            .await
            .into_iter()
            .zip(factories)
            .map(|(result, factory)| result.and_then(|value| factory.downcast(value)))
            .collect()
    }
}

/// Plugin for resolving factories in bulk.
pub fn batch() -> FnPlugin<impl FnOnce(&Container, &Internals) -> BatchMethods, BatchMethods> {
    define_plugin("batch", |container: &Container, _: &Internals| BatchMethods {
        container: container.clone(),
    })
}
