use std::sync::LazyLock;

use mailtunnel_common::internal;
use regex::Regex;

use crate::{
    error::{AliasError, FactError},
    facts::{FactSource, GroupId, GroupRecord, PersonId},
    origin::Origin,
    title,
};

#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static DIRECT_USER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^DIRECTUSER(\d+)$").expect("Invalid direct user regex"));

/// The lookup an accepted alias stands for, run against the fact source once
/// the alias has been matched.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Fetcher {
    Group(GroupId),
    /// Everyone on the board or among the FU
    BestFu { period: i32 },
    /// Everyone holding a title of `kind` (`BEST`, `FU` or `EFU`)
    Kind { kind: String, period: i32 },
    /// Whoever holds the post `root`
    Title { root: String, period: i32 },
    Direct(PersonId),
}

impl Fetcher {
    /// Run the lookup
    ///
    /// # Errors
    /// If the fact source fails
    pub fn fetch(&self, facts: &dyn FactSource) -> Result<Vec<PersonId>, FactError> {
        match self {
            Self::Group(id) => facts.group_members(*id),
            Self::BestFu { period } => {
                let mut members = facts.bestfu_members("BEST", *period)?;
                members.extend(facts.bestfu_members("FU", *period)?);
                Ok(members)
            }
            Self::Kind { kind, period } => facts.bestfu_members(kind, *period),
            Self::Title { root, period } => facts.user_by_title(root, *period),
            Self::Direct(id) => facts.user_by_id(*id),
        }
    }
}

/// An alias accepted by a [`Matcher`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Match {
    pub fetcher: Fetcher,
    pub origin: Origin,
}

/// Accept or pass on an upper case alias, given the compiled group table and
/// the current period.
///
/// `Ok(None)` leaves the alias to the next matcher.
pub type Matcher = fn(&str, &GroupPatterns, i32) -> Result<Option<Match>, AliasError>;

/// Tried in order, the first to accept an alias wins
pub const MATCHERS: [Matcher; 3] = [match_group, match_title, match_direct];

/// Compile a group pattern so that it must match a whole alias
fn compile_group_pattern(group: &GroupRecord) -> Result<fancy_regex::Regex, AliasError> {
    fancy_regex::Regex::new(&format!("^(?:{})$", group.pattern)).map_err(|source| {
        AliasError::InvalidPattern {
            group: group.name.clone(),
            source: Box::new(source),
        }
    })
}

/// Every group of a fact source with its pattern compiled, in listing order.
///
/// Patterns may use lookaround and backreferences, e.g. `FU(?!CK|LD)[A-Z]{2}`.
#[derive(Clone, Debug, Default)]
pub struct GroupPatterns {
    groups: Vec<(GroupRecord, fancy_regex::Regex)>,
}

impl GroupPatterns {
    ///
    /// Compile the pattern of every group `facts` lists. A group whose pattern
    /// does not compile is logged and left out, so it cannot take the other
    /// groups down with it.
    ///
    /// # Errors
    /// If the groups cannot be listed
    ///
    pub fn compile(facts: &dyn FactSource) -> Result<Self, FactError> {
        let mut groups = Vec::new();
        for group in facts.list_groups()? {
            match compile_group_pattern(&group) {
                Ok(pattern) => groups.push((group, pattern)),
                Err(err) => internal!(level = WARN, "Ignoring group: {err}"),
            }
        }

        Ok(Self { groups })
    }

    /// Like [`GroupPatterns::compile`], but any pattern that does not compile
    /// is an error
    ///
    /// # Errors
    /// If the groups cannot be listed, or the first broken pattern
    pub fn compile_strict(facts: &dyn FactSource) -> Result<Self, AliasError> {
        let groups = facts
            .list_groups()?
            .into_iter()
            .map(|group| compile_group_pattern(&group).map(|pattern| (group, pattern)))
            .collect::<Result<_, _>>()?;

        Ok(Self { groups })
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.groups.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    pub fn groups(&self) -> impl Iterator<Item = &GroupRecord> {
        self.groups.iter().map(|(group, _)| group)
    }

    /// Every group whose pattern accepts the whole of `alias`
    pub fn matching<'a>(&'a self, alias: &'a str) -> impl Iterator<Item = &'a GroupRecord> {
        self.groups
            .iter()
            .filter(move |(group, pattern)| match pattern.is_match(alias) {
                Ok(accepted) => accepted,
                Err(err) => {
                    internal!(
                        level = WARN,
                        "Pattern of group {} gave up on {alias}: {err}",
                        group.name
                    );
                    false
                }
            })
            .map(|(group, _)| group)
    }
}

/// Exactly one group whose pattern accepts the whole alias
///
/// # Errors
/// If more than one group accepts the alias
pub fn match_group(
    alias: &str,
    groups: &GroupPatterns,
    _period: i32,
) -> Result<Option<Match>, AliasError> {
    let mut matches: Vec<&GroupRecord> = groups.matching(alias).collect();

    if matches.len() > 1 {
        return Err(AliasError::Ambiguous {
            alias: alias.to_string(),
            groups: matches.into_iter().map(|group| group.name.clone()).collect(),
        });
    }

    Ok(matches.pop().map(|group| Match {
        fetcher: Fetcher::Group(group.id),
        origin: Origin::Group {
            name: group.name.clone(),
        },
    }))
}

/// A board post, FU post or whole body, scoped to a period
///
/// # Errors
/// Never, anything that is not a title is passed on
pub fn match_title(
    alias: &str,
    _groups: &GroupPatterns,
    period: i32,
) -> Result<Option<Match>, AliasError> {
    let parsed = match title::parse(alias, period) {
        Ok(parsed) => parsed,
        Err(err) => {
            internal!(level = TRACE, "{alias} is not a title: {err}");
            return Ok(None);
        }
    };

    let fetcher = match parsed.root.as_str() {
        "BESTFU" => Fetcher::BestFu {
            period: parsed.period,
        },
        _ if parsed.is_kind() => Fetcher::Kind {
            kind: parsed.root.clone(),
            period: parsed.period,
        },
        _ if parsed.is_post() => Fetcher::Title {
            root: parsed.root.clone(),
            period: parsed.period,
        },
        _ => return Ok(None),
    };

    Ok(Some(Match {
        fetcher,
        origin: Origin::Period {
            kind: parsed.root,
            period: parsed.period,
            alias: alias.to_string(),
        },
    }))
}

/// `DIRECTUSER<id>`
///
/// # Errors
/// Never, anything else is passed on
pub fn match_direct(
    alias: &str,
    _groups: &GroupPatterns,
    _period: i32,
) -> Result<Option<Match>, AliasError> {
    let Some(id) = DIRECT_USER
        .captures(alias)
        .and_then(|captures| captures[1].parse().ok())
        .map(PersonId)
    else {
        return Ok(None);
    };

    Ok(Some(Match {
        fetcher: Fetcher::Direct(id),
        origin: Origin::Direct {
            id,
            alias: alias.to_string(),
        },
    }))
}
