use async_trait::async_trait;
use ferrous_container::{factory, AsyncDispose, BoxError, Container, DiError, Dispose, Resolver};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

struct Connection {
    name: &'static str,
    log: Log,
}

impl Dispose for Connection {
    fn dispose(&self) -> Result<(), BoxError> {
        self.log.lock().unwrap().push(format!("close {}", self.name));
        Ok(())
    }
}

struct Pool {
    log: Log,
}

#[async_trait]
impl AsyncDispose for Pool {
    async fn dispose(&self) -> Result<(), BoxError> {
        tokio::task::yield_now().await;
        self.log.lock().unwrap().push("drain pool".to_string());
        Ok(())
    }
}

#[tokio::test]
async fn test_disposers_run_in_reverse_order() {
    let log: Log = Arc::default();
    let container = Container::new();
    for step in ["first", "second", "third"] {
        let log = log.clone();
        container.on_dispose(move || {
            log.lock().unwrap().push(step.to_string());
            Ok(())
        });
    }

    container.dispose().await.unwrap();
    assert_eq!(*log.lock().unwrap(), ["third", "second", "first"]);
}

#[tokio::test]
async fn test_services_register_their_own_cleanup() {
    let log: Log = Arc::default();
    let (l1, l2) = (log.clone(), log.clone());
    let pool = factory("Pool", move |ctx| {
        let pool = Arc::new(Pool { log: l1.clone() });
        ctx.register_async_disposer(pool.clone());
        Ok(pool)
    });
    let dep = pool.clone();
    let conn = factory("Connection", move |ctx| {
        ctx.get(&dep)?;
        let conn = Arc::new(Connection { name: "primary", log: l2.clone() });
        ctx.register_disposer(conn.clone());
        Ok(conn)
    });

    let container = Container::new();
    container.get(&conn).unwrap();
    container.dispose().await.unwrap();

    // The connection registered after the pool it depends on, so it closes first.
    assert_eq!(*log.lock().unwrap(), ["close primary", "drain pool"]);
}

#[tokio::test]
async fn test_failures_are_aggregated_and_do_not_stop_others() {
    let ran = Arc::new(Mutex::new(Vec::new()));
    let container = Container::new();

    let r = ran.clone();
    container.on_dispose(move || {
        r.lock().unwrap().push("a");
        Err("a failed".into())
    });
    let r = ran.clone();
    container.on_dispose_async(move || async move {
        r.lock().unwrap().push("b");
        Ok(())
    });
    let r = ran.clone();
    container.on_dispose(move || {
        r.lock().unwrap().push("c");
        Err("c failed".into())
    });

    match container.dispose().await {
        Err(DiError::Dispose { errors }) => {
            let messages: Vec<String> = errors.iter().map(|e| e.to_string()).collect();
            assert_eq!(messages, ["c failed", "a failed"]);
        }
        other => panic!("expected Dispose error, got {other:?}"),
    }
    assert_eq!(*ran.lock().unwrap(), ["c", "b", "a"]);
}

#[tokio::test]
async fn test_disposed_container_rejects_resolution() {
    let number = factory("Number", |_| Ok(1u8));
    let container = Container::new();
    container.get(&number).unwrap();

    container.dispose().await.unwrap();
    assert!(container.is_disposed());
    assert!(!container.has(&number));
    assert!(matches!(container.get(&number), Err(DiError::Disposed)));
    assert!(matches!(container.get_async(&number).await, Err(DiError::Disposed)));
}

#[tokio::test]
async fn test_dispose_is_idempotent() {
    let count = Arc::new(Mutex::new(0));
    let container = Container::new();
    let c = count.clone();
    container.on_dispose(move || {
        *c.lock().unwrap() += 1;
        Ok(())
    });

    container.dispose().await.unwrap();
    container.dispose().await.unwrap();
    assert_eq!(*count.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_child_disposal_leaves_parent_alone() {
    let number = factory("Number", |_| Ok(1u8));
    let parent = Container::new();
    parent.get(&number).unwrap();
    let child = parent.child();

    child.dispose().await.unwrap();
    assert!(!parent.is_disposed());
    assert_eq!(*parent.get(&number).unwrap(), 1);
}
