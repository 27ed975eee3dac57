//! Factory lifetime definitions.

/// Lifetimes controlling instance caching behavior
///
/// # Examples
///
/// ```rust
/// use ferrous_container::{factory, Container, Lifetime, Resolver};
/// use std::sync::Arc;
///
/// struct Database { url: String }
/// struct RequestModel { id: u32 }
///
/// let db = factory("Database", |_| Ok(Database { url: "postgres://localhost".to_string() }));
/// let model = factory("RequestModel", |_| Ok(RequestModel { id: 12345 })).transient();
/// assert_eq!(model.lifetime(), Lifetime::Transient);
///
/// let container = Container::new();
///
/// // Singleton: same instance for the life of the container
/// let db1 = container.get(&db).unwrap();
/// let db2 = container.get(&db).unwrap();
/// assert!(Arc::ptr_eq(&db1, &db2));
///
/// // Transient: always different instances
/// let m1 = container.get(&model).unwrap();
/// let m2 = container.get(&model).unwrap();
/// assert!(!Arc::ptr_eq(&m1, &m2));
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum Lifetime {
    /// One instance per container, cached until `clear_cache()` or `dispose()`.
    ///
    /// Child containers see an instance their ancestors already hold; one
    /// resolved first in a child stays in that child.
    #[default]
    Singleton,
    /// New instance per resolution, never cached
    Transient,
}

impl Lifetime {
    /// Whether resolved values are stored in the container cache.
    #[inline]
    pub fn is_cached(self) -> bool {
        matches!(self, Lifetime::Singleton)
    }
}
