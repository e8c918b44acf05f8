//! The title grammar: `prefix* ROOT postfix?`, e.g. `K3FORM`, `FORM1314`,
//! `GFUAA`, `BESTFU13`.

use std::sync::LazyLock;

use regex::Regex;
use thiserror::Error;

use crate::{error::PeriodError, period::resolve_period};

/// The posts on the board
pub const BEST: [&str; 8] = ["CERM", "FORM", "INKA", "KASS", "NF", "PR", "SEKR", "VC"];

/// Roots naming a whole body rather than a single post
pub const KINDS: [&str; 4] = ["BEST", "FU", "EFU", "BESTFU"];

#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static PREFIX_RUNS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("^(?:[KGBOT][0-9]*)*$").expect("Invalid prefix regex"));

#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static FU_POST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^E?FU\w+$").expect("Invalid FU post regex"));

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TitleError {
    #[error("{0:?} is not a title")]
    Unknown(String),

    #[error(transparent)]
    Period(#[from] PeriodError),
}

/// A parsed title: what it names and when
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Title {
    pub root: String,
    pub period: i32,
}

impl Title {
    /// Whether this names one of [`KINDS`] rather than a single post
    pub fn is_kind(&self) -> bool {
        KINDS.contains(&self.root.as_str())
    }

    /// Whether this names a single post, on the board or among the FU
    pub fn is_post(&self) -> bool {
        BEST.contains(&self.root.as_str()) || FU_POST.is_match(&self.root)
    }
}

fn is_known_root(root: &str) -> bool {
    KINDS.contains(&root) || BEST.contains(&root) || FU_POST.is_match(root)
}

/// Spell out the Danish letters the way post names do in ASCII
pub fn transliterate(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        match c {
            'Æ' => out.push_str("AE"),
            'Ø' => out.push_str("OE"),
            'Å' => out.push_str("AA"),
            'æ' => out.push_str("ae"),
            'ø' => out.push_str("oe"),
            'å' => out.push_str("aa"),
            c => out.push(c),
        }
    }
    out
}

///
/// Parse an upper case title relative to the period `base`.
///
/// The shortest prefix that leaves a known root wins, so `KASS` is the
/// treasurer and not `K` applied to `ASS`.
///
/// # Errors
/// If `alias` is not a title, or its period is invalid
///
/// # Examples
///
/// ```
/// use mailtunnel_alias::title::{Title, parse};
///
/// assert_eq!(
///     parse("GFORM14", 2000),
///     Ok(Title { root: "FORM".to_string(), period: 2013 })
/// );
/// ```
///
pub fn parse(alias: &str, base: i32) -> Result<Title, TitleError> {
    let alias = transliterate(alias);
    let body = alias.trim_end_matches(|c: char| c.is_ascii_digit());
    let postfix = &alias[body.len()..];

    let (prefix, root) = body
        .char_indices()
        .map(|(i, _)| body.split_at(i))
        .find(|(prefix, root)| PREFIX_RUNS.is_match(prefix) && is_known_root(root))
        .ok_or_else(|| TitleError::Unknown(alias.clone()))?;

    Ok(Title {
        root: root.to_string(),
        period: resolve_period(prefix, postfix, base)?,
    })
}
