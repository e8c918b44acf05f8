use std::{
    collections::BTreeMap,
    sync::{Arc, LazyLock},
};

use mailtunnel_common::internal;
use regex::Regex;

use crate::{
    error::{AliasError, FactError},
    facts::{FactSource, PersonId},
    matcher::{GroupPatterns, MATCHERS},
    origin::Origin,
    period::refresh_current_period,
};

#[allow(clippy::expect_used, reason = "compile-time constant regex should be valid")]
static TOKEN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new("([+-]?)([^+-]+)").expect("Invalid alias token regex"));

/// The group whose members administer the forwarder
pub const ADMIN_GROUP: &str = "ADMIN";

/// The people a recipient resolved to, ascending, each with why they were
/// included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Resolution {
    ids: Vec<PersonId>,
    origins: Vec<Origin>,
}

impl Resolution {
    #[inline]
    pub fn ids(&self) -> &[PersonId] {
        &self.ids
    }

    #[inline]
    pub fn origins(&self) -> &[Origin] {
        &self.origins
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PersonId, &Origin)> {
        self.ids.iter().copied().zip(&self.origins)
    }
}

impl From<BTreeMap<PersonId, Origin>> for Resolution {
    fn from(members: BTreeMap<PersonId, Origin>) -> Self {
        let (ids, origins) = members.into_iter().unzip();
        Self { ids, origins }
    }
}

/// Upper case `name`, reading `$` as `S` (`KA$$` is `KASS`)
pub fn normalize_alias(name: &str) -> String {
    name.replace('$', "S").to_uppercase()
}

///
/// Resolve a single alias to a non-empty set of people.
///
/// # Errors
/// [`AliasError::InvalidRecipient`] if no matcher accepts `name` or nobody
/// currently fits it, otherwise whatever the accepting matcher or the fact
/// source raise.
///
pub fn parse_alias(
    name: &str,
    facts: &dyn FactSource,
    groups: &GroupPatterns,
    period: i32,
) -> Result<(Vec<PersonId>, Origin), AliasError> {
    for matcher in MATCHERS {
        if let Some(matched) = matcher(name, groups, period)? {
            let members = matched.fetcher.fetch(facts)?;
            if members.is_empty() {
                internal!(
                    level = DEBUG,
                    "{name} matched {} but nobody fits it in {period}",
                    matched.origin
                );
                return Err(AliasError::invalid(name));
            }

            return Ok((members, matched.origin));
        }
    }

    internal!(level = DEBUG, "{name} matched no alias");
    Err(AliasError::invalid(name))
}

///
/// Resolve a recipient such as `BEST+FU-KASS`.
///
/// Aliases are folded left to right: `+` adds its people (with its origin,
/// replacing any earlier origin for them), `-` removes them. Every alias that
/// fails to resolve is reported, not just the first.
///
/// # Errors
/// [`AliasError::InvalidRecipient`] naming every bad alias, or `recipient` itself
/// when everything resolved but the result is empty
///
pub fn parse_recipient(
    recipient: &str,
    facts: &dyn FactSource,
    groups: &GroupPatterns,
    period: i32,
) -> Result<Resolution, AliasError> {
    let mut operations = Vec::new();
    let mut invalid = Vec::new();

    for captures in TOKEN.captures_iter(recipient) {
        let name = &captures[2];
        match parse_alias(name, facts, groups, period) {
            Ok((ids, origin)) => operations.push((&captures[1] != "-", ids, origin)),
            Err(AliasError::InvalidRecipient(names)) => invalid.extend(names),
            Err(err) => return Err(err),
        }
    }

    if !invalid.is_empty() {
        return Err(AliasError::InvalidRecipient(invalid));
    }

    let mut members = BTreeMap::new();
    for (union, ids, origin) in operations {
        for id in ids {
            if union {
                members.insert(id, origin.clone());
            } else {
                members.remove(&id);
            }
        }
    }

    if members.is_empty() {
        return Err(AliasError::invalid(recipient));
    }

    Ok(members.into())
}

///
/// Check every group pattern compiles, and that each group's own name is
/// accepted by its pattern and by no other.
///
/// # Errors
/// The first broken pattern or ambiguity found
///
pub fn validate_groups(facts: &dyn FactSource) -> Result<(), AliasError> {
    let groups = GroupPatterns::compile_strict(facts)?;

    for group in groups.groups() {
        let name = normalize_alias(&group.name);
        let accepting: Vec<String> = groups
            .matching(&name)
            .map(|other| other.name.clone())
            .collect();

        if accepting.len() > 1 {
            return Err(AliasError::Ambiguous {
                alias: name,
                groups: accepting,
            });
        }

        if accepting.is_empty() {
            internal!(
                level = WARN,
                "Group {} is not reachable by its own name through {:?}",
                group.name,
                group.pattern
            );
        }
    }

    Ok(())
}

///
/// Resolves recipients against one organisational fact source.
///
/// The group table is read and compiled once, when the resolver is built.
///
#[derive(Clone)]
pub struct Resolver {
    facts: Arc<dyn FactSource>,
    groups: Arc<GroupPatterns>,
}

impl std::fmt::Debug for Resolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolver")
            .field("groups", &self.groups.len())
            .finish_non_exhaustive()
    }
}

impl Resolver {
    ///
    /// Compile the group table of `facts`. Groups whose pattern does not
    /// compile are left out, see [`Resolver::validate`] to find them.
    ///
    /// # Errors
    /// If the groups cannot be listed
    ///
    pub fn new(facts: Arc<dyn FactSource>) -> Result<Self, FactError> {
        let groups = Arc::new(GroupPatterns::compile(facts.as_ref())?);
        internal!(level = DEBUG, "Compiled {} group patterns", groups.len());

        Ok(Self { facts, groups })
    }

    pub fn facts(&self) -> &dyn FactSource {
        self.facts.as_ref()
    }

    pub fn groups(&self) -> &GroupPatterns {
        &self.groups
    }

    /// Resolve `recipient` (already normalised) in `period`
    ///
    /// # Errors
    /// See [`parse_recipient`]
    pub fn resolve(&self, period: i32, recipient: &str) -> Result<Resolution, AliasError> {
        parse_recipient(recipient, self.facts(), &self.groups, period)
    }

    ///
    /// The addresses of everyone `name` reaches in `period`, each paired with
    /// the origin that included them. People without a usable address are
    /// left out.
    ///
    /// # Errors
    /// See [`parse_recipient`]
    ///
    #[tracing::instrument(skip(self))]
    pub fn translate_recipient_with_origins(
        &self,
        period: i32,
        name: &str,
    ) -> Result<Vec<(String, Origin)>, AliasError> {
        let resolution = self.resolve(period, &normalize_alias(name))?;
        let addresses = self.facts.email_addresses(resolution.ids())?;

        let mut translated = Vec::with_capacity(addresses.len());
        for ((id, origin), address) in resolution.iter().zip(addresses) {
            match address {
                Some(address) => translated.push((address, origin.clone())),
                None => internal!(level = DEBUG, "No address for {id} reached through {origin}"),
            }
        }

        Ok(translated)
    }

    /// The addresses of everyone `name` reaches in `period`
    ///
    /// # Errors
    /// See [`parse_recipient`]
    pub fn translate_recipient(&self, period: i32, name: &str) -> Result<Vec<String>, AliasError> {
        Ok(self
            .translate_recipient_with_origins(period, name)?
            .into_iter()
            .map(|(address, _)| address)
            .collect())
    }

    /// The current period, or `previous` if it cannot be read
    pub fn current_period(&self, previous: Option<i32>) -> Option<i32> {
        refresh_current_period(self.facts(), previous)
    }

    /// Check the group configuration, see [`validate_groups`]
    ///
    /// # Errors
    /// The first broken pattern or ambiguity found
    pub fn validate(&self) -> Result<(), AliasError> {
        validate_groups(self.facts())
    }

    ///
    /// The addresses of the [`ADMIN_GROUP`] members, or `fallback` when the
    /// fact source fails or knows of nobody.
    ///
    pub fn admin_emails(&self, fallback: &[String]) -> Vec<String> {
        let lookup = || -> Result<Vec<String>, AliasError> {
            let mut members = Vec::new();
            for group in self.groups.groups() {
                if group.name == ADMIN_GROUP {
                    members.extend(self.facts.group_members(group.id)?);
                }
            }

            Ok(self
                .facts
                .email_addresses(&members)?
                .into_iter()
                .flatten()
                .collect())
        };

        match lookup() {
            Ok(addresses) if !addresses.is_empty() => addresses,
            Ok(_) => fallback.to_vec(),
            Err(err) => {
                internal!(level = WARN, "Falling back to configured admins: {err}");
                fallback.to_vec()
            }
        }
    }
}
