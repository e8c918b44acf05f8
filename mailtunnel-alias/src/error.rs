//! Error types for alias resolution.

use thiserror::Error;

/// Errors raised by an organisational [`FactSource`](crate::FactSource).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FactError {
    /// The source could not be reached at all.
    #[error("Fact source unavailable: {0}")]
    Unavailable(String),

    /// The source answered, but the query failed.
    #[error("Fact query failed: {0}")]
    Query(String),
}

/// Errors turning a title prefix/postfix into a period.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PeriodError {
    /// The postfix is neither a year, a two-digit year nor a year pair.
    #[error("Invalid period postfix: {0:?}")]
    InvalidPostfix(String),

    /// The prefix grade does not fit.
    #[error("Invalid period prefix: {0:?}")]
    InvalidPrefix(String),
}

/// Errors resolving a recipient.
#[derive(Debug, Error)]
pub enum AliasError {
    /// One or more names resolved to nobody. Carries every failing name.
    #[error("Invalid recipient: {}", .0.join(", "))]
    InvalidRecipient(Vec<String>),

    /// More than one group pattern accepts the alias. This is a
    /// configuration defect, not a problem with the message.
    #[error("The alias {alias:?} matches more than one group: {}", groups.join(", "))]
    Ambiguous { alias: String, groups: Vec<String> },

    /// A group pattern does not compile.
    #[error("Invalid pattern for group {group:?}: {source}")]
    InvalidPattern {
        group: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },

    /// The fact source failed.
    #[error(transparent)]
    Facts(#[from] FactError),
}

impl AliasError {
    /// Convenience for a single failing name
    pub fn invalid(name: impl Into<String>) -> Self {
        Self::InvalidRecipient(vec![name.into()])
    }

    /// Returns `true` if the recipient itself is at fault, so retrying the
    /// same message can never succeed.
    #[must_use]
    pub const fn is_invalid_recipient(&self) -> bool {
        matches!(self, Self::InvalidRecipient(_))
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as StdError;

    use super::*;

    #[test]
    fn test_invalid_recipient_lists_every_name() {
        let err = AliasError::InvalidRecipient(vec!["FOO".to_string(), "BAR".to_string()]);
        assert_eq!(err.to_string(), "Invalid recipient: FOO, BAR");
        assert!(err.is_invalid_recipient());
    }

    #[test]
    fn test_configuration_errors_are_not_invalid_recipients() {
        let err = AliasError::Ambiguous {
            alias: "JUNTA".to_string(),
            groups: vec!["JUNTA".to_string(), "FORMJUNTA".to_string()],
        };
        assert!(!err.is_invalid_recipient());
        assert_eq!(
            err.to_string(),
            "The alias \"JUNTA\" matches more than one group: JUNTA, FORMJUNTA"
        );

        let err = AliasError::from(FactError::Unavailable("down".to_string()));
        assert!(!err.is_invalid_recipient());
        assert_eq!(err.to_string(), "Fact source unavailable: down");
    }

    #[test]
    fn test_invalid_pattern_keeps_source() {
        let source = fancy_regex::Regex::new("FU(?!CK").unwrap_err();
        let err = AliasError::InvalidPattern {
            group: "FUxx".to_string(),
            source: Box::new(source),
        };
        assert!(err.source().is_some());
    }
}
