//! Alias resolution
//!
//! A recipient such as `BEST+FU-KASS` is a small expression: `+`/`-` separated
//! aliases, each naming a set of people, folded left to right into one set by
//! union and difference. Each alias is a group name (matched against the
//! group's pattern), a title scoped to a period (`K3FORM`, `FORM1314`,
//! `BESTFU`), or a direct user reference (`DIRECTUSER42`).

mod error;
mod facts;
mod matcher;
mod origin;
pub mod period;
mod resolver;
pub mod title;

pub use error::{AliasError, FactError, PeriodError};
pub use facts::{
    FactSource, GroupId, GroupRecord, PersonId, StaticFacts, StaticGroup, StaticPerson, StaticTitle,
};
pub use matcher::{Fetcher, GroupPatterns, MATCHERS, Match, Matcher};
pub use origin::Origin;
pub use resolver::{
    ADMIN_GROUP, Resolution, Resolver, normalize_alias, parse_alias, parse_recipient,
    validate_groups,
};
