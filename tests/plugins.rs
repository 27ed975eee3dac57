use ferrous_container::{
    batch, create_test_container, define_plugin, factory, health, logging_with, metrics, pipe, testing, tracing_spans,
    value, BoxError, Container, HealthCheckOptions, HealthStatus, LoggingOptions, Plugin, Resolver,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct Audit {
    resolved: Arc<AtomicUsize>,
    failed: Arc<AtomicUsize>,
}

fn audit() -> impl Plugin<Methods = Audit> {
    define_plugin("audit", |_, internals| {
        let resolved = Arc::new(AtomicUsize::new(0));
        let failed = Arc::new(AtomicUsize::new(0));
        let r = resolved.clone();
        internals.hooks().after_resolve(move |_, _, _| {
            r.fetch_add(1, Ordering::SeqCst);
        });
        let f = failed.clone();
        internals.hooks().resolve_error(move |_, _, _| {
            f.fetch_add(1, Ordering::SeqCst);
        });
        Audit { resolved, failed }
    })
}

#[test]
fn test_custom_plugin_observes_resolutions() {
    let container = Container::new().with(audit());
    let ok = factory("Ok", |_| Ok(1u8)).transient();
    let broken = factory("Broken", |_| -> Result<u8, BoxError> { Err("nope".into()) });

    container.get(&ok).unwrap();
    container.get(&ok).unwrap();
    let _ = container.get(&broken);

    assert_eq!(container.methods().resolved.load(Ordering::SeqCst), 2);
    assert_eq!(container.methods().failed.load(Ordering::SeqCst), 1);
}

#[test]
fn test_plugins_act_on_the_same_container() {
    let container = Container::new();
    let extended = container.with(metrics());
    let number = value("Number", 1u8);

    // Resolving through the plain handle still reaches the plugin's hooks.
    container.get(&number).unwrap();
    assert_eq!(extended.methods().snapshot().total_resolutions, 1);
}

#[test]
fn test_plugins_are_not_inherited_by_children() {
    let root = Container::new().with(metrics());
    let child = root.child();
    child.get(&value("Number", 1u8)).unwrap();
    assert_eq!(root.methods().snapshot().total_resolutions, 0);
}

#[test]
fn test_pipe_and_chain_compose() {
    let container = Container::new().with(pipe(metrics(), tracing_spans())).with(testing());
    let ((metrics, spans), testing) = container.methods();

    let port = factory("Port", |_| Ok(8080u16));
    testing.mock(&port, 1);
    assert_eq!(*container.get(&port).unwrap(), 1);

    assert_eq!(metrics.snapshot().overrides, 1);
    assert_eq!(spans.spans().len(), 1);
    assert_eq!(container.plugin_names(), ["metrics+tracing-spans", "testing"]);
}

#[tokio::test]
async fn test_health_over_real_factories() {
    let container = Container::new().with(health());
    let db = factory("Database", |_| Ok("connected"));
    let cache = factory("Cache", |_| -> Result<&'static str, BoxError> { Err("refused".into()) });

    container.methods().register_factory(&db, HealthCheckOptions::default());
    container.methods().register_factory(&cache, HealthCheckOptions::non_critical());
    let report = container.methods().check().await;
    assert_eq!(report.status, HealthStatus::Degraded);

    container.methods().register_factory(&cache, HealthCheckOptions::default());
    assert_eq!(container.methods().check().await.status, HealthStatus::Unhealthy);
}

#[tokio::test]
async fn test_batch_with_testing_mocks() {
    let container = create_test_container(|_| {}).with(batch());
    let (testing, batch) = container.methods();

    let a = factory("A", |_| Ok(1u32));
    let b = factory("B", |_| Ok(2u32));
    testing.mock(&b, 20);

    let values = batch.get_many(&[a.clone(), b.clone()]).await.unwrap();
    assert_eq!(values.iter().map(|v| **v).collect::<Vec<_>>(), [1, 20]);
    assert_eq!(testing.cached_names(), ["A", "B"]);
}

#[tokio::test]
async fn test_logging_plugin_emits_through_subscriber() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();

    let container = Container::new().with(logging_with(LoggingOptions::default().level(tracing::Level::INFO)));
    let ok = factory("Ok", |_| Ok(1u8));
    let broken = factory("Broken", |_| -> Result<u8, BoxError> { Err("nope".into()) });

    container.get(&ok).unwrap();
    assert!(container.get(&broken).is_err());
    container.dispose().await.unwrap();
    assert_eq!(container.methods().options().level, tracing::Level::INFO);
}

#[cfg(feature = "serde")]
#[tokio::test]
async fn test_reports_serialize() {
    let container = Container::new().with(pipe(metrics(), health()));
    let (metrics, health) = container.methods();
    container.get(&value("Number", 1u8)).unwrap();

    let json = metrics.snapshot().to_json().unwrap();
    assert!(json.contains("\"total_resolutions\":1"));
    let report = health.check().await.to_json().unwrap();
    assert!(report.contains("Healthy"));
}
