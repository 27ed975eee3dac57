//! Resolution metrics.
//!
//! The [`metrics`] plugin records per-factory timing from the resolution
//! hooks plus container-wide counters.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;

use crate::plugin::{define_plugin, FnPlugin, Internals};
use crate::Container;

const RECENT_WINDOW: usize = 100;

/// Timing of one factory's resolutions.
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimingStats {
    /// Total number of resolutions
    pub count: u64,
    /// Errors among them
    pub errors: u64,
    pub min_duration: Duration,
    pub max_duration: Duration,
    /// Total accumulated time
    pub total_duration: Duration,
    /// Last 100 resolution times, oldest first
    pub recent_times: VecDeque<Duration>,
}

impl TimingStats {
    fn new() -> Self {
        Self {
            count: 0,
            errors: 0,
            min_duration: Duration::MAX,
            max_duration: Duration::ZERO,
            total_duration: Duration::ZERO,
            recent_times: VecDeque::with_capacity(RECENT_WINDOW),
        }
    }

    /// Add a new timing measurement
    pub fn record(&mut self, duration: Duration) {
        self.count += 1;
        self.min_duration = self.min_duration.min(duration);
        self.max_duration = self.max_duration.max(duration);
        self.total_duration += duration;

        if self.recent_times.len() >= RECENT_WINDOW {
            self.recent_times.pop_front();
        }
        self.recent_times.push_back(duration);
    }

    /// Calculate average resolution time
    pub fn average(&self) -> Duration {
        if self.count == 0 {
            Duration::ZERO
        } else {
            let nanos = self.total_duration.as_nanos() / u128::from(self.count);
            Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
        }
    }

    /// 95th percentile over the recent window.
    pub fn p95(&self) -> Duration {
        if self.recent_times.is_empty() {
            return Duration::ZERO;
        }

        let mut sorted: Vec<Duration> = self.recent_times.iter().copied().collect();
        sorted.sort();
        let index = (sorted.len() as f64 * 0.95) as usize;
        sorted[index.min(sorted.len() - 1)]
    }
}

/// Point-in-time copy of everything the collector knows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct MetricsSnapshot {
    pub total_resolutions: u64,
    pub errors: u64,
    pub overrides: u64,
    pub disposals: u64,
    /// Keyed by factory name.
    pub timings: HashMap<String, TimingStats>,
}

impl MetricsSnapshot {
    /// Fraction of resolutions that failed, `0.0` when nothing ran.
    pub fn error_rate(&self) -> f64 {
        let attempts = self.total_resolutions + self.errors;
        if attempts == 0 {
            0.0
        } else {
            self.errors as f64 / attempts as f64
        }
    }

    #[cfg(feature = "serde")]
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Shared state behind the hook subscriptions.
#[derive(Debug, Default)]
struct MetricsCollector {
    state: Mutex<MetricsSnapshot>,
}

impl MetricsCollector {
    fn record_resolution(&self, name: &str, duration: Duration) {
        let mut state = self.state.lock();
        state.total_resolutions += 1;
        timing_entry(&mut state, name).record(duration);
    }

    fn record_error(&self, name: &str, duration: Duration) {
        let mut state = self.state.lock();
        state.errors += 1;
        let stats = timing_entry(&mut state, name);
        stats.errors += 1;
        stats.record(duration);
    }
}

fn timing_entry<'a>(state: &'a mut MetricsSnapshot, name: &str) -> &'a mut TimingStats {
    state.timings.entry(name.to_string()).or_insert_with(TimingStats::new)
}

/// Methods added by the [`metrics`] plugin.
#[derive(Debug, Clone)]
pub struct MetricsMethods {
    collector: Arc<MetricsCollector>,
}

impl MetricsMethods {
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.collector.state.lock().clone()
    }

    /// Timing of the factory called `name`, if it ever ran.
    pub fn timing(&self, name: &str) -> Option<TimingStats> {
        self.collector.state.lock().timings.get(name).cloned()
    }

    /// Factories with the highest average resolution time, slowest first.
    pub fn slowest(&self, limit: usize) -> Vec<(String, Duration)> {
        let state = self.collector.state.lock();
        let mut factories: Vec<_> = state
            .timings
            .iter()
            .map(|(name, stats)| (name.clone(), stats.average()))
            .collect();
        factories.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        factories.truncate(limit);
        factories
    }

    pub fn reset(&self) {
        *self.collector.state.lock() = MetricsSnapshot::default();
    }
}

/// Plugin collecting resolution metrics.
///
/// Failed resolutions count towards the factory's timing as well as the
/// error counters.
///
/// ```
/// use ferrous_container::{factory, metrics, Container, Resolver};
///
/// let container = Container::new().with(metrics());
/// let config = factory("Config", |_| Ok(42u32));
/// container.get(&config).unwrap();
/// container.get(&config).unwrap();
///
/// let snapshot = container.methods().snapshot();
/// assert_eq!(snapshot.total_resolutions, 1);
/// assert_eq!(snapshot.timings["Config"].count, 1);
/// ```
pub fn metrics() -> FnPlugin<impl FnOnce(&Container, &Internals) -> MetricsMethods, MetricsMethods> {
    define_plugin("metrics", |_: &Container, internals: &Internals| {
        let collector = Arc::new(MetricsCollector::default());
        let hooks = internals.hooks();

        let c = collector.clone();
        hooks.after_resolve(move |info, _, elapsed| c.record_resolution(&info.name, elapsed));
        let c = collector.clone();
        hooks.resolve_error(move |info, _, elapsed| c.record_error(&info.name, elapsed));
        let c = collector.clone();
        hooks.on_override(move |_| c.state.lock().overrides += 1);
        let c = collector.clone();
        hooks.on_dispose(move || c.state.lock().disposals += 1);

        MetricsMethods { collector }
    })
}
