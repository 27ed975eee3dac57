//! Resolution spans.
//!
//! The [`tracing_spans`] plugin pairs `before_resolve` with the matching
//! `after_resolve`/`resolve_error` by sequence number and keeps the finished
//! spans in a bounded ring. Each finished span is also emitted as a
//! `tracing` event under the `ferrous_container::spans` target.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::hooks::ResolveInfo;
use crate::plugin::{define_plugin, FnPlugin, Internals};
use crate::Container;

pub const DEFAULT_SPAN_CAPACITY: usize = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum SpanStatus {
    Ok,
    Error(String),
}

/// One finished resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SpanRecord {
    pub seq: u64,
    pub name: String,
    /// The factory whose body requested this one.
    pub parent: Option<String>,
    pub depth: usize,
    pub duration: Duration,
    pub status: SpanStatus,
}

impl SpanRecord {
    pub fn is_ok(&self) -> bool {
        self.status == SpanStatus::Ok
    }
}

#[derive(Debug)]
struct SpanBuffer {
    capacity: usize,
    /// Keyed by sequence number. Bounded like `finished`, since a resolution
    /// whose future is dropped mid-flight never reports back.
    open: BTreeMap<u64, ResolveInfo>,
    finished: VecDeque<SpanRecord>,
}

impl SpanBuffer {
    fn open(&mut self, info: &ResolveInfo) {
        if self.open.len() == self.capacity {
            self.open.pop_first();
        }
        self.open.insert(info.seq, info.clone());
    }

    fn close(&mut self, seq: u64, duration: Duration, status: SpanStatus) -> Option<SpanRecord> {
        let info = self.open.remove(&seq)?;
        let record = SpanRecord {
            seq,
            name: info.name.to_string(),
            parent: info.parent.as_ref().map(|p| p.to_string()),
            depth: info.depth,
            duration,
            status,
        };
        if self.finished.len() == self.capacity {
            self.finished.pop_front();
        }
        self.finished.push_back(record.clone());
        Some(record)
    }
}

fn emit(record: &SpanRecord) {
    match &record.status {
        SpanStatus::Ok => tracing::debug!(
            target: "ferrous_container::spans",
            factory = %record.name,
            parent = record.parent.as_deref().unwrap_or("-"),
            depth = record.depth,
            duration_us = record.duration.as_micros() as u64,
            "span closed"
        ),
        SpanStatus::Error(error) => tracing::debug!(
            target: "ferrous_container::spans",
            factory = %record.name,
            parent = record.parent.as_deref().unwrap_or("-"),
            depth = record.depth,
            duration_us = record.duration.as_micros() as u64,
            %error,
            "span failed"
        ),
    }
}

/// Methods added by the [`tracing_spans`] plugin.
#[derive(Debug, Clone)]
pub struct SpanMethods {
    buffer: Arc<Mutex<SpanBuffer>>,
}

impl SpanMethods {
    /// Finished spans, oldest first.
    pub fn spans(&self) -> Vec<SpanRecord> {
        self.buffer.lock().finished.iter().cloned().collect()
    }

    /// Drops finished spans. Spans still open are kept.
    pub fn clear(&self) {
        self.buffer.lock().finished.clear();
    }

    pub fn slowest(&self, limit: usize) -> Vec<SpanRecord> {
        let mut spans = self.spans();
        spans.sort_by(|a, b| b.duration.cmp(&a.duration));
        spans.truncate(limit);
        spans
    }

    /// Resolutions that started but have not finished. Abandoned ones are
    /// forgotten oldest first once there are more than the ring capacity.
    pub fn open_count(&self) -> usize {
        self.buffer.lock().open.len()
    }
}

/// Plugin recording a span per resolution, keeping the last 1024.
pub fn tracing_spans() -> FnPlugin<impl FnOnce(&Container, &Internals) -> SpanMethods, SpanMethods> {
    tracing_spans_with_capacity(DEFAULT_SPAN_CAPACITY)
}

/// Like [`tracing_spans`] with a custom ring size.
pub fn tracing_spans_with_capacity(
    capacity: usize,
) -> FnPlugin<impl FnOnce(&Container, &Internals) -> SpanMethods, SpanMethods> {
    define_plugin("tracing-spans", move |_: &Container, internals: &Internals| {
        let buffer = Arc::new(Mutex::new(SpanBuffer {
            capacity: capacity.max(1),
            open: BTreeMap::new(),
            finished: VecDeque::new(),
        }));
        let hooks = internals.hooks();

        let b = buffer.clone();
        hooks.before_resolve(move |info| {
            b.lock().open(info);
        });
        let b = buffer.clone();
        hooks.after_resolve(move |info, _, elapsed| {
            let record = b.lock().close(info.seq, elapsed, SpanStatus::Ok);
            if let Some(record) = record {
                emit(&record);
            }
        });
        let b = buffer.clone();
        hooks.resolve_error(move |info, error, elapsed| {
            let record = b.lock().close(info.seq, elapsed, SpanStatus::Error(error.to_string()));
            if let Some(record) = record {
                emit(&record);
            }
        });

        SpanMethods { buffer }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{factory, BoxError, Resolver};

    #[test]
    fn nested_resolution_records_parent_and_depth() {
        let container = Container::new().with(tracing_spans());
        let db = factory("Db", |_| Ok(1u8));
        let dep = db.clone();
        let app = factory("App", move |ctx| Ok(*ctx.get(&dep)? + 1));

        container.get(&app).unwrap();

        let spans = container.methods().spans();
        assert_eq!(spans.len(), 2);
        // Inner spans close first.
        assert_eq!(spans[0].name, "Db");
        assert_eq!(spans[0].parent.as_deref(), Some("App"));
        assert_eq!(spans[0].depth, 1);
        assert_eq!(spans[1].name, "App");
        assert_eq!(spans[1].parent, None);
        assert_eq!(container.methods().open_count(), 0);
    }

    #[test]
    fn failures_are_recorded_with_their_message() {
        let container = Container::new().with(tracing_spans());
        let broken = factory("Broken", |_| -> Result<u8, BoxError> { Err("bad".into()) });
        assert!(container.get(&broken).is_err());

        let spans = container.methods().spans();
        assert!(!spans[0].is_ok());
        assert!(matches!(&spans[0].status, SpanStatus::Error(msg) if msg.contains("bad")));
    }

    #[test]
    fn ring_keeps_only_the_newest() {
        let container = Container::new().with(tracing_spans_with_capacity(2));
        let counter = factory("Counter", |_| Ok(0u8)).transient();
        for _ in 0..5 {
            container.get(&counter).unwrap();
        }
        let spans = container.methods().spans();
        assert_eq!(spans.len(), 2);
        assert!(spans[0].seq < spans[1].seq);

        container.methods().clear();
        assert!(container.methods().spans().is_empty());
        assert!(container.methods().slowest(3).is_empty());
    }

    #[tokio::test]
    async fn abandoned_resolutions_do_not_accumulate() {
        let container = Container::new().with(tracing_spans_with_capacity(2));
        let hang = crate::async_factory("Hang", |_| async {
            std::future::pending::<Result<u8, BoxError>>().await
        })
        .transient();

        for _ in 0..5 {
            let attempt = tokio::time::timeout(Duration::from_millis(1), container.get_async(&hang)).await;
            assert!(attempt.is_err());
        }
        assert_eq!(container.methods().open_count(), 2);
        assert!(container.methods().spans().is_empty());
    }
}
