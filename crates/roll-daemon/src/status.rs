//! Logging setup: a plain log file plus human-readable status lines on stderr.

use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::level_filters::LevelFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Prints `HH:MM:SS [LEVEL] message key=value` lines to stderr for events at
/// or above `threshold`.
pub struct StatusLayer {
    threshold: LevelFilter,
}

impl StatusLayer {
    pub fn new(threshold: LevelFilter) -> Self {
        Self { threshold }
    }
}

impl<S> tracing_subscriber::Layer<S> for StatusLayer
where
    S: tracing::Subscriber,
{
    fn on_event(
        &self,
        event: &tracing::Event<'_>,
        _ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let level = event.metadata().level();
        if *level > self.threshold {
            return;
        }

        let line = format_status_line(&chrono::Local::now(), level, event);
        // a closed stderr is ignored
        let _ = writeln!(std::io::stderr().lock(), "{}", line);
    }
}

fn format_status_line(
    now: &chrono::DateTime<chrono::Local>,
    level: &tracing::Level,
    event: &tracing::Event<'_>,
) -> String {
    let mut message = format!("{} [{}] ", now.format("%H:%M:%S"), level);
    let mut visitor = MessageVisitor(&mut message);
    event.record(&mut visitor);
    message
}

struct MessageVisitor<'a>(&'a mut String);

impl<'a> tracing::field::Visit for MessageVisitor<'a> {
    fn record_str(&mut self, field: &tracing::field::Field, value: &str) {
        if field.name() == "message" {
            self.0.push_str(value);
        } else {
            self.0.push_str(&format!(" {}={}", field.name(), value));
        }
    }

    fn record_debug(&mut self, field: &tracing::field::Field, value: &dyn std::fmt::Debug) {
        if field.name() == "message" {
            self.0.push_str(&format!("{:?}", value));
        } else {
            self.0.push_str(&format!(" {}={:?}", field.name(), value));
        }
    }
}

/// stderr verbosity picked from `--verbose` / `--quiet`.
pub fn status_threshold(verbose: bool, quiet: bool) -> LevelFilter {
    if verbose {
        LevelFilter::DEBUG
    } else if quiet {
        LevelFilter::WARN
    } else {
        LevelFilter::INFO
    }
}

/// Install the global subscriber. Returns the log file path.
pub fn init(data_dir: &Path, threshold: LevelFilter) -> anyhow::Result<PathBuf> {
    std::fs::create_dir_all(data_dir)?;
    let log_path = data_dir.join("daemon.log");

    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)?;

    let fmt_layer = tracing_subscriber::fmt::layer()
        .with_writer(log_file)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(fmt_layer)
        .with(StatusLayer::new(threshold))
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,roll_daemon=debug")),
        )
        .init();

    Ok(log_path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_threshold() {
        assert_eq!(status_threshold(false, false), LevelFilter::INFO);
        assert_eq!(status_threshold(true, false), LevelFilter::DEBUG);
        assert_eq!(status_threshold(false, true), LevelFilter::WARN);
        // verbose wins, as in the old runner
        assert_eq!(status_threshold(true, true), LevelFilter::DEBUG);
    }

    #[test]
    fn test_level_ordering_matches_threshold_check() {
        // More verbose levels compare greater than the filter.
        assert!(tracing::Level::DEBUG > LevelFilter::INFO);
        assert!(!(tracing::Level::WARN > LevelFilter::INFO));
    }
}
