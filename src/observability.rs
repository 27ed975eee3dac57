//! Structured logging of container activity.

use std::time::Duration;

use tracing::Level;

use crate::plugin::{define_plugin, FnPlugin, Internals};
use crate::Container;

/// Options for the [`logging`] plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoggingOptions {
    /// Level for routine events. Failed resolutions always log at `WARN`.
    pub level: Level,
    /// Also log the start of each resolution, not just its outcome.
    pub log_start: bool,
}

impl Default for LoggingOptions {
    fn default() -> Self {
        Self {
            level: Level::TRACE,
            log_start: false,
        }
    }
}

impl LoggingOptions {
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    pub fn log_start(mut self, enabled: bool) -> Self {
        self.log_start = enabled;
        self
    }
}

// `tracing` macros need the level at compile time.
macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {
        match $level {
            Level::ERROR => tracing::error!($($arg)+),
            Level::WARN => tracing::warn!($($arg)+),
            Level::INFO => tracing::info!($($arg)+),
            Level::DEBUG => tracing::debug!($($arg)+),
            _ => tracing::trace!($($arg)+),
        }
    };
}

fn micros(elapsed: Duration) -> u64 {
    elapsed.as_micros() as u64
}

/// Handle returned by the [`logging`] plugin.
#[derive(Debug, Clone, Copy)]
pub struct LoggingMethods {
    options: LoggingOptions,
}

impl LoggingMethods {
    pub fn options(&self) -> LoggingOptions {
        self.options
    }
}

/// Plugin logging every resolution, override and dispose at the default
/// `TRACE` level.
pub fn logging() -> FnPlugin<impl FnOnce(&Container, &Internals) -> LoggingMethods, LoggingMethods> {
    logging_with(LoggingOptions::default())
}

pub fn logging_with(
    options: LoggingOptions,
) -> FnPlugin<impl FnOnce(&Container, &Internals) -> LoggingMethods, LoggingMethods> {
    define_plugin("logging", move |_: &Container, internals: &Internals| {
        let level = options.level;
        let hooks = internals.hooks();

        if options.log_start {
            hooks.before_resolve(move |info| {
                event_at!(level, factory = %info.name, depth = info.depth, seq = info.seq, "resolving");
            });
        }
        hooks.after_resolve(move |info, _, elapsed| {
            event_at!(
                level,
                factory = %info.name,
                depth = info.depth,
                overridden = info.overridden,
                elapsed_us = micros(elapsed),
                "resolved"
            );
        });
        hooks.resolve_error(|info, error, elapsed| {
            tracing::warn!(
                factory = %info.name,
                depth = info.depth,
                elapsed_us = micros(elapsed),
                %error,
                "resolution failed"
            );
        });
        hooks.on_override(move |info| {
            event_at!(
                level,
                original = %info.original_name,
                replacement = %info.replacement_name,
                "override set"
            );
        });
        hooks.on_dispose(move || {
            event_at!(level, "disposing container");
        });

        LoggingMethods { options }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{factory, value, BoxError, Resolver};

    #[tokio::test]
    async fn subscribes_to_every_hook() {
        let container = Container::new();
        let logged = container.with(logging_with(LoggingOptions::default().level(Level::INFO).log_start(true)));
        assert_eq!(logged.methods().options().level, Level::INFO);
        assert_eq!(container.hooks().len(), 5);

        let ok = factory("Ok", |_| Ok(1u8));
        let broken = factory("Broken", |_| -> Result<u8, BoxError> { Err("nope".into()) });
        container.get(&ok).unwrap();
        assert!(container.get(&broken).is_err());
        container.override_with(&ok, value("Mock", 2u8));
        container.dispose().await.unwrap();
    }

    #[test]
    fn start_events_are_opt_in() {
        let container = Container::new();
        container.with(logging());
        assert_eq!(container.hooks().len(), 4);
    }
}
