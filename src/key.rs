//! Identity keys for factories.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Opaque identity of a factory.
///
/// Issued once when a factory value is constructed and shared by every clone
/// of it. Caches and override tables are keyed by `FactoryId`, never by
/// display name, so two factories called `"Database"` are still two
/// distinct entries.
///
/// # Examples
///
/// ```rust
/// use ferrous_container::factory;
///
/// let a = factory("Database", |_| Ok(1u32));
/// let b = factory("Database", |_| Ok(1u32));
/// assert_ne!(a.id(), b.id());
/// assert_eq!(a.id(), a.clone().id());
/// ```
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct FactoryId(u64);

impl FactoryId {
    pub(crate) fn next() -> Self {
        FactoryId(NEXT_ID.fetch_add(1, Ordering::Relaxed))
    }

    /// Raw numeric value, useful as a stable label in logs.
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Debug for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FactoryId({})", self.0)
    }
}

impl fmt::Display for FactoryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}
