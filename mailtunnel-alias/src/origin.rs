use std::fmt::{self, Display};

use crate::facts::PersonId;

/// Why a person ended up in a resolution
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Member of the named group
    Group { name: String },
    /// Holder of a title of `kind` in `period`, reached through `alias`
    Period {
        kind: String,
        period: i32,
        alias: String,
    },
    /// Named directly through `alias`
    Direct { id: PersonId, alias: String },
}

impl Origin {
    /// The name the sender used to reach this origin
    pub fn alias(&self) -> &str {
        match self {
            Self::Group { name } => name,
            Self::Period { alias, .. } | Self::Direct { alias, .. } => alias,
        }
    }
}

impl Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Group { name } => f.write_str(name),
            Self::Period { kind, period, .. } => write!(f, "{kind}{period}"),
            Self::Direct { id, .. } => write!(f, "DIRECTUSER{id}"),
        }
    }
}

#[cfg(test)]
mod test {
    use super::Origin;
    use crate::facts::PersonId;

    #[test]
    fn display() {
        assert_eq!(
            Origin::Group {
                name: "JUNTA".to_string()
            }
            .to_string(),
            "JUNTA"
        );
        assert_eq!(
            Origin::Period {
                kind: "FORM".to_string(),
                period: 2013,
                alias: "K3FORM".to_string()
            }
            .to_string(),
            "FORM2013"
        );
        assert_eq!(
            Origin::Direct {
                id: PersonId(42),
                alias: "DIRECTUSER42".to_string()
            }
            .to_string(),
            "DIRECTUSER42"
        );
    }
}
