//! Re-serialisation sanity checking.
//!
//! Every parsed message is written back out and compared with the bytes we
//! were handed. A mismatch means the parse was lossy; it is never fatal, but
//! both versions are kept on disk for later inspection.

use std::{
    fs::{self, OpenOptions},
    io::{self, Write},
    path::{Path, PathBuf},
    sync::{Arc, LazyLock, OnceLock},
};

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::internal;

/// Where (and whether) mismatching messages are dumped
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SanityConfig {
    /// Write both versions of a mismatching message to `directory`
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Directory receiving `<timestamp>.in` and `<timestamp>.out`
    #[serde(default = "default_directory")]
    pub directory: PathBuf,
}

impl Default for SanityConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_directory(),
        }
    }
}

const fn default_true() -> bool {
    true
}

fn default_directory() -> PathBuf {
    PathBuf::from("insane")
}

static SANITY_CONFIG: OnceLock<Arc<SanityConfig>> = OnceLock::new();

/// Install the process-wide sanity configuration. Only the first call wins.
pub fn init(config: SanityConfig) {
    SANITY_CONFIG.get_or_init(|| Arc::new(config));
}

/// Get the current sanity configuration
#[must_use]
pub fn config() -> Arc<SanityConfig> {
    SANITY_CONFIG
        .get()
        .cloned()
        .unwrap_or_else(|| Arc::new(SanityConfig::default()))
}

#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static COLON_SPACES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r": *").expect("colon regex should be valid"));
#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static LINE_BREAKS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[\r\n]+").expect("line break regex should be valid"));

fn trim_end_newlines(data: &[u8]) -> &[u8] {
    let end = data.iter().rposition(|&b| b != b'\n').map_or(0, |i| i + 1);
    &data[..end]
}

fn trim_end_whitespace(data: &[u8]) -> &[u8] {
    let end = data
        .iter()
        .rposition(|b| !b.is_ascii_whitespace())
        .map_or(0, |i| i + 1);
    &data[..end]
}

/// Normalise `data` to the lines it consists of, ignoring the amount of space
/// after colons, the kind of line endings and trailing whitespace.
fn normalise(data: &[u8]) -> Vec<Vec<u8>> {
    let spaced = COLON_SPACES.replace_all(data, &b": "[..]);

    LINE_BREAKS
        .split(trim_end_whitespace(&spaced))
        .map(|line| trim_end_whitespace(line).to_vec())
        .collect()
}

/// Whether `output` is a faithful re-serialisation of `input`.
///
/// # Examples
///
/// ```
/// use mailtunnel_common::sanity::is_sane;
///
/// assert!(is_sane(b"Subject:hi\r\n\r\nbody\r\n", b"Subject: hi\n\nbody\n"));
/// assert!(!is_sane(b"Subject: hi\n\nbody\n", b"Subject: bye\n\nbody\n"));
/// ```
pub fn is_sane(input: &[u8], output: &[u8]) -> bool {
    let a = trim_end_newlines(input);
    let b = trim_end_newlines(output);

    a == b || normalise(a) == normalise(b)
}

/// Timestamp used to name dump files, with microsecond resolution
pub fn now_string() -> String {
    chrono::Local::now()
        .format("%Y-%m-%d_%H-%M-%S%.6f")
        .to_string()
}

/// `base` with `suffix` appended verbatim. The timestamp already contains a
/// dot, so `Path::with_extension` would eat the microseconds.
pub fn with_suffix(base: &Path, suffix: &str) -> PathBuf {
    let mut path = base.as_os_str().to_owned();
    path.push(suffix);
    PathBuf::from(path)
}

fn append(path: &Path, data: &[u8]) -> io::Result<()> {
    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?
        .write_all(data)
}

/// Write `input` and `output` next to each other in `directory`, returning the
/// common base path of the two files.
///
/// # Errors
///
/// Any I/O error creating the directory or writing either file.
pub fn dump(directory: &Path, input: &[u8], output: &[u8]) -> io::Result<PathBuf> {
    fs::create_dir_all(directory)?;

    let base = directory.join(now_string());
    append(&with_suffix(&base, ".in"), input)?;
    append(&with_suffix(&base, ".out"), output)?;

    Ok(base)
}

/// Record a sanity mismatch according to the configured [`SanityConfig`].
///
/// This never fails; problems writing the dump are logged and swallowed.
pub fn record_mismatch(input: &[u8], output: &[u8]) {
    let config = config();
    if !config.enabled {
        internal!(level = DEBUG, "Data is not sane; dumping is disabled");
        return;
    }

    match dump(&config.directory, input, output) {
        Ok(base) => internal!(
            level = DEBUG,
            "Data is not sane; logging to {}",
            base.display()
        ),
        Err(err) => internal!(
            level = ERROR,
            "Data is not sane and could not log to {}: {err}; continuing anyway",
            config.directory.display()
        ),
    }
}
