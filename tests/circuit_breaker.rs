use ferrous_container::circuit_breaker::{clear_circuit_registry, get_circuit};
use ferrous_container::{
    circuit_breaker, circuits, factory, BoxError, CircuitBreakerOptions, CircuitState, Container, DiError, Factory,
    Resolver,
};
use serial_test::serial;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// A transient factory that fails while `healthy` is false.
fn upstream(healthy: &Arc<AtomicBool>, calls: &Arc<AtomicUsize>) -> Factory<u32> {
    let (healthy, calls) = (healthy.clone(), calls.clone());
    factory("Upstream", move |_| -> Result<u32, BoxError> {
        calls.fetch_add(1, Ordering::SeqCst);
        if healthy.load(Ordering::SeqCst) {
            Ok(200)
        } else {
            Err("503 service unavailable".into())
        }
    })
    .transient()
}

fn options() -> CircuitBreakerOptions {
    CircuitBreakerOptions::default()
        .failure_threshold(2)
        .success_threshold(2)
        .reset_timeout(Duration::from_millis(50))
}

#[tokio::test]
#[serial]
async fn test_full_circuit_lifecycle() {
    clear_circuit_registry();
    let transitions = Arc::new(Mutex::new(Vec::new()));
    let t = transitions.clone();
    let breaker = circuit_breaker(
        "upstream-lifecycle",
        options().on_state_change(move |_, from, to| t.lock().unwrap().push((from, to))),
    );

    let healthy = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let guarded = breaker.wrap(&upstream(&healthy, &calls));
    let container = Container::new();

    for _ in 0..2 {
        assert!(matches!(container.get_async(&guarded).await, Err(DiError::Resolution { .. })));
    }
    assert_eq!(breaker.circuit().state(), CircuitState::Open);

    // Open: rejected without running the body.
    match container.get_async(&guarded).await {
        Err(DiError::CircuitOpen { name, failures }) => {
            assert_eq!(name, "upstream-lifecycle");
            assert_eq!(failures, 2);
        }
        other => panic!("expected open circuit, got {other:?}"),
    }
    assert_eq!(calls.load(Ordering::SeqCst), 2);

    tokio::time::sleep(Duration::from_millis(60)).await;
    healthy.store(true, Ordering::SeqCst);

    assert_eq!(*container.get_async(&guarded).await.unwrap(), 200);
    assert_eq!(breaker.circuit().state(), CircuitState::HalfOpen);
    assert_eq!(*container.get_async(&guarded).await.unwrap(), 200);
    assert_eq!(breaker.circuit().state(), CircuitState::Closed);

    assert_eq!(
        *transitions.lock().unwrap(),
        [
            (CircuitState::Closed, CircuitState::Open),
            (CircuitState::Open, CircuitState::HalfOpen),
            (CircuitState::HalfOpen, CircuitState::Closed),
        ]
    );
}

#[tokio::test]
#[serial]
async fn test_half_open_failure_reopens() {
    clear_circuit_registry();
    let breaker = circuit_breaker("upstream-reopen", options());
    let healthy = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let guarded = breaker.wrap(&upstream(&healthy, &calls));
    let container = Container::new();

    for _ in 0..2 {
        let _ = container.get_async(&guarded).await;
    }
    tokio::time::sleep(Duration::from_millis(60)).await;

    assert!(matches!(container.get_async(&guarded).await, Err(DiError::Resolution { .. })));
    assert_eq!(breaker.circuit().state(), CircuitState::Open);
    assert!(matches!(container.get_async(&guarded).await, Err(DiError::CircuitOpen { .. })));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
#[serial]
async fn test_wrappers_with_one_name_share_a_circuit() {
    clear_circuit_registry();
    let healthy = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let first = circuit_breaker("shared-upstream", options()).wrap(&upstream(&healthy, &calls));
    let second = circuit_breaker("shared-upstream", options()).wrap(&upstream(&healthy, &calls));

    let container = Container::new();
    let _ = container.get_async(&first).await;
    let _ = container.get_async(&second).await;

    assert!(matches!(container.get_async(&first).await, Err(DiError::CircuitOpen { .. })));
    assert_eq!(get_circuit("shared-upstream").map(|c| c.state()), Some(CircuitState::Open));
}

#[tokio::test]
#[serial]
async fn test_circuits_plugin_reports_and_resets() {
    clear_circuit_registry();
    let healthy = Arc::new(AtomicBool::new(false));
    let calls = Arc::new(AtomicUsize::new(0));
    let guarded = circuit_breaker("plugin-upstream", options()).wrap(&upstream(&healthy, &calls));

    let container = Container::new().with(circuits());
    for _ in 0..2 {
        let _ = container.get_async(&guarded).await;
    }

    let snapshot = container.methods().get_circuit("plugin-upstream").unwrap();
    assert_eq!(snapshot.state, CircuitState::Open);
    assert_eq!(snapshot.failures, 2);
    assert!(snapshot.last_error.as_deref().unwrap_or_default().contains("503"));
    assert_eq!(container.methods().get_all_circuits().len(), 1);

    container.methods().reset_all_circuits();
    assert_eq!(container.methods().get_circuit("plugin-upstream").unwrap().state, CircuitState::Closed);

    container.methods().clear_circuit_registry();
    assert!(container.methods().get_all_circuits().is_empty());
}

#[tokio::test]
#[serial]
async fn test_singleton_behind_breaker_is_cached() {
    clear_circuit_registry();
    let calls = Arc::new(AtomicUsize::new(0));
    let counter = calls.clone();
    let client = factory("Client", move |_| Ok(counter.fetch_add(1, Ordering::SeqCst)));
    let guarded = circuit_breaker("singleton-upstream", options()).wrap(&client);

    let container = Container::new();
    container.get_async(&guarded).await.unwrap();
    container.get_async(&guarded).await.unwrap();
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(container.get(&guarded).is_ok());
}
