use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::Error;

/// Stable numeric handle for a messaging-platform user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

impl UserId {
    #[must_use]
    pub fn get(self) -> i64 {
        self.0
    }
}

impl From<i64> for UserId {
    fn from(id: i64) -> Self {
        Self(id)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for UserId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        s.trim()
            .parse::<i64>()
            .map(Self)
            .map_err(|_| Error::invalid_user_id(s))
    }
}

/// Access tier of a user. Ordered from least to most privileged.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    Standard,
    Trusted,
    Operator,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Trusted => "trusted",
            Self::Operator => "operator",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "trusted" => Ok(Self::Trusted),
            "operator" => Ok(Self::Operator),
            _ => Err(Error::unknown_role(s)),
        }
    }
}

/// A persisted user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserRecord {
    pub id: UserId,
    pub name: Option<String>,
    pub role: Role,
    pub message_count: u64,
    /// Set by the user's first `/start`. Rows created by role seeding start
    /// out unset.
    pub started: bool,
}

impl UserRecord {
    #[must_use]
    pub fn is_operator(&self) -> bool {
        self.role == Role::Operator
    }
}

#[allow(clippy::unwrap_used)]
#[cfg(test)]
mod tests {
    use {super::*, rstest::rstest};

    #[rstest]
    #[case("7", 7)]
    #[case(" 42 ", 42)]
    #[case("-1001", -1001)]
    fn parse_user_id(#[case] input: &str, #[case] expected: i64) {
        assert_eq!(input.parse::<UserId>().unwrap(), UserId(expected));
    }

    #[rstest]
    #[case("abc")]
    #[case("")]
    #[case("12.5")]
    fn parse_user_id_rejects_garbage(#[case] input: &str) {
        assert!(matches!(
            input.parse::<UserId>(),
            Err(Error::InvalidUserId { .. })
        ));
    }

    #[test]
    fn roles_are_ordered_by_privilege() {
        assert!(Role::Standard < Role::Trusted);
        assert!(Role::Trusted < Role::Operator);
    }

    #[test]
    fn role_text_roundtrip() {
        for role in [Role::Standard, Role::Trusted, Role::Operator] {
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
        assert_eq!("Operator".parse::<Role>().unwrap(), Role::Operator);
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn user_id_serializes_as_bare_number() {
        let json = serde_json::to_string(&UserId(42)).unwrap();
        assert_eq!(json, "42");
        let role = serde_json::to_string(&Role::Trusted).unwrap();
        assert_eq!(role, "\"trusted\"");
    }
}
