//! Internal implementation details.

pub(crate) mod cache;
pub(crate) mod circular;
pub(crate) mod dispose_bag;

pub(crate) use cache::{CacheEntry, Cached};
pub(crate) use circular::ResolutionChain;
pub(crate) use dispose_bag::DisposeBag;
