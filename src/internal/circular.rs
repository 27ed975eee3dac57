//! Circular dependency detection infrastructure.
//!
//! Each logical resolution carries its own chain of the factories it is
//! currently inside of. The chain travels with the [`ResolverContext`]
//! handed to factory bodies, so concurrent async resolutions on the same
//! container never observe each other's entries, and the chain is gone as
//! soon as the top-level call returns or fails.
//!
//! [`ResolverContext`]: crate::ResolverContext

use std::sync::Arc;

use crate::{AnyFactory, DiError, DiResult, FactoryId};

#[derive(Clone, Default)]
pub(crate) struct ResolutionChain {
    links: Vec<(FactoryId, Arc<str>)>,
}

impl ResolutionChain {
    /// Extends the chain with `factory`.
    ///
    /// Fails with [`DiError::Circular`] if the factory is already on the
    /// chain (when detection is enabled) and with [`DiError::DepthExceeded`]
    /// once the chain reaches `max_depth`, which bounds recursion even with
    /// detection turned off.
    pub(crate) fn enter(&self, factory: &AnyFactory, detect_circular: bool, max_depth: usize) -> DiResult<ResolutionChain> {
        if detect_circular && self.contains(factory.id()) {
            return Err(self.cycle_error(factory));
        }

        if self.links.len() >= max_depth {
            return Err(DiError::DepthExceeded(self.links.len()));
        }

        let mut links = Vec::with_capacity(self.links.len() + 1);
        links.extend(self.links.iter().cloned());
        links.push((factory.id(), factory.name_arc().clone()));
        Ok(Self { links })
    }

    pub(crate) fn contains(&self, id: FactoryId) -> bool {
        self.links.iter().any(|(link, _)| *link == id)
    }

    /// The error reported when `factory` closes a loop on this chain.
    pub(crate) fn cycle_error(&self, factory: &AnyFactory) -> DiError {
        let mut chain = self.names();
        chain.push(factory.name().to_string());
        DiError::Circular { chain }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.links.iter().map(|(_, name)| name.to_string()).collect()
    }

    pub(crate) fn depth(&self) -> usize {
        self.links.len()
    }

    /// The factory currently being resolved on this chain.
    pub(crate) fn current(&self) -> Option<&Arc<str>> {
        self.links.last().map(|(_, name)| name)
    }
}
