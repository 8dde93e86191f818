//! Stderr logging for the scanner threads.
//!
//! Stdout is reserved for notification payloads, so every log line goes to
//! stderr as `[elapsed LEVEL thread] message`. Levels can be overridden per
//! target prefix, e.g. to keep an HTTP client quiet at `debug`.

use std::io::Write;
use std::sync::OnceLock;
use std::time::Instant;

use log::{LevelFilter, Log, Metadata, Record};

#[cfg(feature = "tracing")]
use tracing_subscriber::fmt::format::FmtSpan;
#[cfg(feature = "tracing")]
use tracing_subscriber::util::SubscriberInitExt;
#[cfg(feature = "tracing")]
use tracing_subscriber::{fmt, EnvFilter};

/// Targets that are far noisier than the scanner itself.
const QUIET_TARGETS: &[(&str, LevelFilter)] = &[("ureq", LevelFilter::Warn)];

struct ThreadLogger {
    default: LevelFilter,
    /// Longest matching prefix wins.
    targets: Vec<(String, LevelFilter)>,
    started: Instant,
}

impl ThreadLogger {
    fn level_for(&self, target: &str) -> LevelFilter {
        self.targets
            .iter()
            .filter(|(prefix, _)| target.starts_with(prefix.as_str()))
            .max_by_key(|(prefix, _)| prefix.len())
            .map_or(self.default, |(_, level)| *level)
    }

    fn max_level(&self) -> LevelFilter {
        self.targets
            .iter()
            .map(|(_, level)| *level)
            .fold(self.default, Ord::max)
    }
}

impl Log for ThreadLogger {
    fn enabled(&self, metadata: &Metadata) -> bool {
        metadata.level() <= self.level_for(metadata.target())
    }

    fn log(&self, record: &Record) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let thread = std::thread::current();
        let _ = writeln!(
            std::io::stderr().lock(),
            "[{:8.3}s {:>5} {}] {}",
            self.started.elapsed().as_secs_f64(),
            record.level(),
            thread.name().unwrap_or("-"),
            record.args()
        );
    }

    fn flush(&self) {}
}

static LOGGER: OnceLock<ThreadLogger> = OnceLock::new();

/// Install the stderr logger at `level`, with noisy dependencies capped.
///
/// Only the first call installs anything.
pub fn init_with_level(level: LevelFilter) -> Result<(), log::SetLoggerError> {
    let targets = QUIET_TARGETS
        .iter()
        .map(|(target, cap)| (target.to_string(), level.min(*cap)))
        .collect();
    init_with_targets(level, targets)
}

/// Install the stderr logger with explicit per-target levels.
pub fn init_with_targets(
    default: LevelFilter,
    targets: Vec<(String, LevelFilter)>,
) -> Result<(), log::SetLoggerError> {
    if LOGGER.get().is_some() {
        return Ok(());
    }
    let logger = LOGGER.get_or_init(|| ThreadLogger {
        default,
        targets,
        started: Instant::now(),
    });
    log::set_logger(logger)?;
    log::set_max_level(logger.max_level());
    Ok(())
}

/// Install a `tracing` subscriber on stderr, filtered by `RUST_LOG`
/// (default `info`). `json` switches to one JSON object per event.
#[cfg(feature = "tracing")]
pub fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ureq=warn"));
    let builder = fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_span_events(FmtSpan::CLOSE)
        .with_thread_names(true);
    let _ = if json {
        builder.json().flatten_event(true).finish().try_init()
    } else {
        builder
            .with_timer(fmt::time::Uptime::default())
            .finish()
            .try_init()
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn longest_target_prefix_wins() {
        let logger = ThreadLogger {
            default: LevelFilter::Info,
            targets: vec![
                ("ureq".into(), LevelFilter::Warn),
                ("ureq::pool".into(), LevelFilter::Off),
                ("taggrid::pipeline".into(), LevelFilter::Trace),
            ],
            started: Instant::now(),
        };
        assert_eq!(logger.level_for("taggrid::scanner"), LevelFilter::Info);
        assert_eq!(logger.level_for("ureq::unit"), LevelFilter::Warn);
        assert_eq!(logger.level_for("ureq::pool"), LevelFilter::Off);
        assert_eq!(logger.level_for("taggrid::pipeline"), LevelFilter::Trace);
        assert_eq!(logger.max_level(), LevelFilter::Trace);
    }
}
