//! Logging for the forwarder.
//!
//! Every event is emitted inside a `mail` span whose `direction` says which
//! way the message was moving: `in` for what the transport handed us, `out`
//! for what went to a sink, `internal` for everything in between. Only events
//! from the `mailtunnel` crates are shown.

use std::{fs::OpenOptions, path::PathBuf, str::FromStr, sync::Mutex};

use serde::{Deserialize, Serialize};
use tracing::metadata::LevelFilter;
use tracing_subscriber::{
    Layer, filter::FilterFn, fmt::time::ChronoUtc, prelude::__tracing_subscriber_SubscriberExt,
    util::SubscriberInitExt,
};

pub const LEVEL_ENV: &str = "LOG_LEVEL";

#[macro_export]
macro_rules! log {
    ($level:expr, $direction:literal, $($msg:expr),*) => {{
        let span = $crate::tracing::span!($level, "mail", direction = $direction);
        let _enter = span.enter();

        $crate::tracing::event!($level, $($msg),*)
    }};
}

/// A message leaving us, e.g. a delivery to the sink
#[macro_export]
macro_rules! outgoing {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "out", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::outgoing!(level = TRACE, $($msg),*)
    };
}

/// A message handed to us by the transport
#[macro_export]
macro_rules! incoming {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "in", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::incoming!(level = TRACE, $($msg),*)
    };
}

#[macro_export]
macro_rules! internal {
    (level = $level:ident, $($msg:expr),*) => {
        $crate::log!($crate::tracing::Level::$level, "internal", $($msg),*)
    };

    ($($msg:expr),*) => {
        $crate::internal!(level = TRACE, $($msg),*)
    };
}

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct LogConfig {
    /// `error`, `warn`, `info`, `debug` or `trace`. [`LEVEL_ENV`] wins over it.
    #[serde(default)]
    pub level: Option<String>,

    /// Also append every event to this file, e.g. `mailtunnel.log`
    #[serde(default)]
    pub file: Option<PathBuf>,
}

///
/// The level to log at: `from_env` if it parses, then `configured`, then
/// TRACE for debug builds and INFO otherwise.
///
fn resolve_level(from_env: Option<&str>, configured: Option<&str>) -> LevelFilter {
    let default = if cfg!(debug_assertions) {
        LevelFilter::TRACE
    } else {
        LevelFilter::INFO
    };

    [from_env, configured]
        .into_iter()
        .flatten()
        .find_map(|level| match LevelFilter::from_str(level) {
            Ok(level) => Some(level),
            Err(_) => {
                eprintln!("Invalid log level {level:?}, ignoring it");
                None
            }
        })
        .unwrap_or(default)
}

fn ours(metadata: &tracing::Metadata<'_>) -> bool {
    metadata.target().starts_with("mailtunnel")
}

///
/// Install the subscriber: compact lines on stderr, plus plain lines appended
/// to [`LogConfig::file`] when one is configured.
///
/// # Errors
/// If the log file cannot be opened
///
pub fn init(config: &LogConfig) -> std::io::Result<()> {
    let level = resolve_level(
        std::env::var(LEVEL_ENV).ok().as_deref(),
        config.level.as_deref(),
    );

    let file = config
        .file
        .as_ref()
        .map(|path| OpenOptions::new().create(true).append(true).open(path))
        .transpose()?;

    tracing_subscriber::Registry::default()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_file(false)
                .with_line_number(false)
                .compact()
                .with_ansi(true)
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(ours)),
        )
        .with(file.map(|file| {
            tracing_subscriber::fmt::layer()
                .with_writer(Mutex::new(file))
                .with_ansi(false)
                .with_timer(ChronoUtc::rfc_3339())
                .with_filter(level)
                .with_filter(FilterFn::new(ours))
        }))
        .init();

    Ok(())
}
