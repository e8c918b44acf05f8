use std::fmt::{self, Display};

/// A set of addresses delivered together, with its own sender and list headers
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RecipientGroup {
    /// What the group is called in list headers
    pub name: String,
    pub addresses: Vec<String>,
}

/// One entry of a translated recipient list.
///
/// A list of nothing but plain addresses is delivered once; as soon as a
/// single group is present every entry becomes its own delivery unit.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TargetRecipient {
    Address(String),
    Group(RecipientGroup),
}

impl TargetRecipient {
    pub fn group(name: impl Into<String>, addresses: Vec<String>) -> Self {
        Self::Group(RecipientGroup {
            name: name.into(),
            addresses,
        })
    }

    pub const fn is_address(&self) -> bool {
        matches!(self, Self::Address(_))
    }

    /// An address with nothing in it
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Address(address) if address.is_empty())
    }

    /// The addresses this target delivers to
    pub fn addresses(&self) -> Vec<String> {
        match self {
            Self::Address(address) => vec![address.clone()],
            Self::Group(group) => group.addresses.clone(),
        }
    }
}

impl From<String> for TargetRecipient {
    fn from(address: String) -> Self {
        Self::Address(address)
    }
}

impl From<&str> for TargetRecipient {
    fn from(address: &str) -> Self {
        Self::Address(address.to_string())
    }
}

impl Display for TargetRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Address(address) => f.write_str(address),
            Self::Group(group) => write!(f, "{} ({})", group.name, group.addresses.join(", ")),
        }
    }
}

#[cfg(test)]
mod test {
    use super::TargetRecipient;

    #[test]
    fn shapes() {
        let address = TargetRecipient::from("a@example.org");
        assert!(address.is_address());
        assert!(!address.is_empty());
        assert_eq!(address.addresses(), vec!["a@example.org"]);

        assert!(TargetRecipient::from("").is_empty());

        let group = TargetRecipient::group("JUNTA", vec!["b@example.org".to_string()]);
        assert!(!group.is_address());
        assert!(!group.is_empty());
        assert_eq!(group.to_string(), "JUNTA (b@example.org)");
    }
}
