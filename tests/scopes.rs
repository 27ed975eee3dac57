use ferrous_container::{factory, value, Container, Factory, Resolver};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn counted(name: &'static str) -> (Factory<usize>, Arc<AtomicUsize>) {
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    (factory(name, move |_| Ok(counter.fetch_add(1, Ordering::SeqCst))), calls)
}

#[test]
fn test_child_inherits_parent_cache() {
    let (config, calls) = counted("Config");
    let root = Container::new();
    let from_root = root.get(&config).unwrap();

    let child = root.child();
    let grandchild = child.child();
    assert!(child.has(&config));
    assert!(Arc::ptr_eq(&from_root, &grandchild.get(&config).unwrap()));
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_child_resolution_stays_in_child() {
    let (session, calls) = counted("Session");
    let root = Container::new();
    let a = root.child();
    let b = root.child();

    let in_a = a.get(&session).unwrap();
    let in_b = b.get(&session).unwrap();
    assert!(!Arc::ptr_eq(&in_a, &in_b));
    assert!(!root.has(&session));
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_parent_resolution_after_child_is_independent() {
    let (config, calls) = counted("Config");
    let root = Container::new();
    let child = root.child();
    child.get(&config).unwrap();
    root.get(&config).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_overrides_are_local() {
    let port = factory("Port", |_| Ok(8080u16));
    let root = Container::new();
    let test = root.child();
    test.override_with(&port, value("TestPort", 0));

    assert_eq!(*test.get(&port).unwrap(), 0);
    assert_eq!(*root.get(&port).unwrap(), 8080);
    // The child now holds its own entry and shadows the parent.
    assert_eq!(*test.get(&port).unwrap(), 0);
}

#[test]
fn test_child_override_shadows_parent_cache() {
    let port = factory("Port", |_| Ok(8080u16));
    let root = Container::new();
    assert_eq!(*root.get(&port).unwrap(), 8080);

    let child = root.child();
    child.override_with(&port, value("TestPort", 0));
    assert_eq!(*child.get(&port).unwrap(), 0);
    assert_eq!(*root.get(&port).unwrap(), 8080);

    // Siblings without the override still inherit the parent's value.
    assert_eq!(*root.child().get(&port).unwrap(), 8080);
}

#[tokio::test]
async fn test_child_override_shadows_parent_cache_async() {
    let port = factory("Port", |_| Ok(8080u16));
    let root = Container::new();
    root.get_async(&port).await.unwrap();

    let child = root.child();
    child.override_with(&port, value("TestPort", 0));
    assert_eq!(*child.get_async(&port).await.unwrap(), 0);
}

#[test]
fn test_parent_override_not_seen_by_child() {
    let port = factory("Port", |_| Ok(8080u16));
    let root = Container::new();
    let child = root.child();
    root.override_with(&port, value("Mock", 1));

    assert_eq!(*child.get(&port).unwrap(), 8080);
    assert_eq!(*root.get(&port).unwrap(), 1);
}

#[test]
fn test_clear_cache_is_local() {
    let (config, calls) = counted("Config");
    let root = Container::new();
    root.get(&config).unwrap();
    let child = root.child();
    child.clear_cache();

    assert!(child.has(&config));
    root.clear_cache();
    assert!(!child.has(&config));
    child.get(&config).unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 2);
}

#[test]
fn test_child_resolves_dependencies_in_child() {
    let (dep, dep_calls) = counted("Dep");
    let d = dep.clone();
    let service = factory("Service", move |ctx| Ok(*ctx.get(&d)? + 100));

    let root = Container::new();
    let child = root.child();
    assert_eq!(*child.get(&service).unwrap(), 100);
    assert!(child.has(&dep));
    assert!(!root.has(&dep));
    assert_eq!(dep_calls.load(Ordering::SeqCst), 1);
    assert_eq!(child.parent().map(|p| p.has(&service)), Some(false));
}
