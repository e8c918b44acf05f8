use std::fmt::{self, Display};

use serde::{Deserialize, Serialize};

use crate::error::FactError;

/// A person in the organisational database
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonId(pub u64);

impl Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&self.0, f)
    }
}

/// A group in the organisational database
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct GroupId(pub u64);

/// A group as listed by [`FactSource::list_groups`]
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GroupRecord {
    pub id: GroupId,
    /// Name used for display and in list headers
    pub name: String,
    /// Pattern every alias naming this group matches in full
    pub pattern: String,
}

/// Read-only organisational facts the alias engine resolves against.
///
/// Every call is a synchronous, idempotent, side-effect free read.
pub trait FactSource: Send + Sync {
    /// # Errors
    /// If the source cannot be queried
    fn list_groups(&self) -> Result<Vec<GroupRecord>, FactError>;

    /// # Errors
    /// If the source cannot be queried
    fn group_members(&self, group: GroupId) -> Result<Vec<PersonId>, FactError>;

    /// Holders of any title of `kind` (`BEST`, `FU` or `EFU`) in `period`
    ///
    /// # Errors
    /// If the source cannot be queried
    fn bestfu_members(&self, kind: &str, period: i32) -> Result<Vec<PersonId>, FactError>;

    /// Holders of the title `root` in `period`
    ///
    /// # Errors
    /// If the source cannot be queried
    fn user_by_title(&self, root: &str, period: i32) -> Result<Vec<PersonId>, FactError>;

    /// `[id]` when the person exists, otherwise empty
    ///
    /// # Errors
    /// If the source cannot be queried
    fn user_by_id(&self, id: PersonId) -> Result<Vec<PersonId>, FactError>;

    /// The address of each person, in order. `None` for people without an
    /// address or who have not allowed direct mail.
    ///
    /// # Errors
    /// If the source cannot be queried
    fn email_addresses(&self, ids: &[PersonId]) -> Result<Vec<Option<String>>, FactError>;

    /// The period of the currently elected board
    ///
    /// # Errors
    /// If the source cannot be queried
    fn current_period(&self) -> Result<i32, FactError>;
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StaticGroup {
    pub id: GroupId,
    pub name: String,
    pub pattern: String,
    #[serde(default)]
    pub members: Vec<PersonId>,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StaticTitle {
    pub person: PersonId,
    /// `BEST`, `FU` or `EFU`
    pub kind: String,
    /// e.g. `FORM`, `KASS`, `FUAA`
    pub root: String,
    pub period: i32,
}

#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct StaticPerson {
    pub id: PersonId,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default = "default_true")]
    pub allow_direct_email: bool,
}

const fn default_true() -> bool {
    true
}

/// An in-memory [`FactSource`], loadable from configuration.
///
/// # Examples
///
/// ```
/// use mailtunnel_alias::{FactSource, PersonId, StaticFacts};
///
/// let facts: StaticFacts = ron::from_str(r#"(
///     current_period: Some(2016),
///     people: [(id: 1, email: Some("form@example.org"))],
///     titles: [(person: 1, kind: "BEST", root: "FORM", period: 2016)],
/// )"#).unwrap();
///
/// assert_eq!(facts.user_by_title("FORM", 2016).unwrap(), vec![PersonId(1)]);
/// ```
#[derive(Clone, Debug, Default, Deserialize, Serialize)]
pub struct StaticFacts {
    #[serde(default)]
    pub current_period: Option<i32>,
    #[serde(default)]
    pub groups: Vec<StaticGroup>,
    #[serde(default)]
    pub titles: Vec<StaticTitle>,
    #[serde(default)]
    pub people: Vec<StaticPerson>,
}

impl FactSource for StaticFacts {
    fn list_groups(&self) -> Result<Vec<GroupRecord>, FactError> {
        Ok(self
            .groups
            .iter()
            .map(|group| GroupRecord {
                id: group.id,
                name: group.name.clone(),
                pattern: group.pattern.clone(),
            })
            .collect())
    }

    fn group_members(&self, group: GroupId) -> Result<Vec<PersonId>, FactError> {
        Ok(self
            .groups
            .iter()
            .filter(|g| g.id == group)
            .flat_map(|g| g.members.iter().copied())
            .collect())
    }

    fn bestfu_members(&self, kind: &str, period: i32) -> Result<Vec<PersonId>, FactError> {
        Ok(self
            .titles
            .iter()
            .filter(|title| title.kind == kind && title.period == period)
            .map(|title| title.person)
            .collect())
    }

    fn user_by_title(&self, root: &str, period: i32) -> Result<Vec<PersonId>, FactError> {
        Ok(self
            .titles
            .iter()
            .filter(|title| title.root == root && title.period == period)
            .map(|title| title.person)
            .collect())
    }

    fn user_by_id(&self, id: PersonId) -> Result<Vec<PersonId>, FactError> {
        Ok(self
            .people
            .iter()
            .filter(|person| person.id == id)
            .map(|person| person.id)
            .take(1)
            .collect())
    }

    fn email_addresses(&self, ids: &[PersonId]) -> Result<Vec<Option<String>>, FactError> {
        Ok(ids
            .iter()
            .map(|id| {
                self.people
                    .iter()
                    .find(|person| person.id == *id)
                    .filter(|person| person.allow_direct_email)
                    .and_then(|person| person.email.clone())
                    .filter(|email| !email.is_empty())
            })
            .collect())
    }

    fn current_period(&self) -> Result<i32, FactError> {
        self.current_period
            .ok_or_else(|| FactError::Unavailable("no current period recorded".to_string()))
    }
}
