use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Stable identity of a node, and the subject its content is stored under.
///
/// Names never change once allocated. The nil UUID is reserved for the
/// root directory so every implementation finds the same tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Name(Uuid);

impl Name {
    /// `00000000-0000-0000-0000-000000000000`
    pub const ROOT: Name = Name(Uuid::nil());

    /// Allocate a fresh random name.
    pub fn generate() -> Self {
        Name(Uuid::new_v4())
    }

    pub fn is_root(&self) -> bool {
        *self == Self::ROOT
    }

    /// The mailbox subject this node's content is stored under.
    pub fn subject(&self) -> String {
        self.0.hyphenated().to_string()
    }
}

impl fmt::Display for Name {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0.hyphenated())
    }
}

impl FromStr for Name {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Name)
    }
}

impl From<Uuid> for Name {
    fn from(uuid: Uuid) -> Self {
        Name(uuid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_root_subject_is_nil_uuid() {
        assert_eq!(
            Name::ROOT.subject(),
            "00000000-0000-0000-0000-000000000000"
        );
        assert!(Name::ROOT.is_root());
    }

    #[test]
    fn test_subject_round_trips_through_parse() {
        let name = Name::generate();
        assert!(!name.is_root());
        assert_eq!(name.subject().parse::<Name>().unwrap(), name);
        assert!("not-a-name".parse::<Name>().is_err());
    }
}
