//! Per-container cache entries.

use std::sync::Arc;

use futures::future::{BoxFuture, Shared};

use crate::{AnyArc, DiResult};

/// An in-flight async resolution that every concurrent caller awaits.
pub(crate) type SharedResolution = Shared<BoxFuture<'static, DiResult<AnyArc>>>;

#[derive(Clone)]
pub(crate) enum CacheEntry {
    Resolved(AnyArc),
    /// `ticket` tells the settling future whether the entry it created is
    /// still the one in the map (a `clear_cache()` may have dropped it).
    Pending { ticket: u64, future: SharedResolution },
}

#[derive(Clone)]
pub(crate) struct Cached {
    pub(crate) name: Arc<str>,
    pub(crate) entry: CacheEntry,
}

impl Cached {
    pub(crate) fn resolved(name: Arc<str>, value: AnyArc) -> Self {
        Self { name, entry: CacheEntry::Resolved(value) }
    }

    pub(crate) fn pending(name: Arc<str>, ticket: u64, future: SharedResolution) -> Self {
        Self { name, entry: CacheEntry::Pending { ticket, future } }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(self.entry, CacheEntry::Pending { .. })
    }
}
