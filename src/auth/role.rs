//! User roles and the typed role sets routes declare.

use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Role assigned to a user account.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Warehouse,
    Operator,
}

impl Role {
    pub const ALL: [Self; 3] = [Self::Admin, Self::Warehouse, Self::Operator];

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Warehouse => "warehouse",
            Self::Operator => "operator",
        }
    }

    const fn bit(self) -> u8 {
        match self {
            Self::Admin => 0b001,
            Self::Warehouse => 0b010,
            Self::Operator => 0b100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown user role: {0}")]
pub struct UnknownRole(pub String);

/// Parses the persisted `user_role` value.
impl FromStr for Role {
    type Err = UnknownRole;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "admin" => Ok(Self::Admin),
            "warehouse" => Ok(Self::Warehouse),
            "operator" => Ok(Self::Operator),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Set of roles a route accepts.
///
/// Built from `Role` values only, so a route can never reference a role that
/// does not exist.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct RoleSet(u8);

impl RoleSet {
    pub const EMPTY: Self = Self(0);
    pub const ALL: Self = Self::of(&Role::ALL);

    #[must_use]
    pub const fn of(roles: &[Role]) -> Self {
        let mut bits = 0u8;
        let mut i = 0;
        while i < roles.len() {
            bits |= roles[i].bit();
            i += 1;
        }
        Self(bits)
    }

    #[must_use]
    pub const fn with(self, role: Role) -> Self {
        Self(self.0 | role.bit())
    }

    #[must_use]
    pub const fn contains(self, role: Role) -> bool {
        self.0 & role.bit() != 0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn iter(self) -> impl Iterator<Item = Role> {
        Role::ALL.into_iter().filter(move |role| self.contains(*role))
    }
}

impl FromIterator<Role> for RoleSet {
    fn from_iter<I: IntoIterator<Item = Role>>(iter: I) -> Self {
        iter.into_iter().fold(Self::EMPTY, Self::with)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_round_trips_through_db_text() {
        for role in Role::ALL {
            assert_eq!(role.as_str().parse::<Role>(), Ok(role));
        }
        assert_eq!(" operator ".parse::<Role>(), Ok(Role::Operator));
        assert_eq!(
            "root".parse::<Role>(),
            Err(UnknownRole("root".to_string()))
        );
    }

    #[test]
    fn role_serializes_lowercase() -> Result<(), serde_json::Error> {
        assert_eq!(serde_json::to_string(&Role::Warehouse)?, "\"warehouse\"");
        let role: Role = serde_json::from_str("\"operator\"")?;
        assert_eq!(role, Role::Operator);
        Ok(())
    }

    #[test]
    fn role_set_membership() {
        let admins = RoleSet::of(&[Role::Admin]);
        assert!(admins.contains(Role::Admin));
        assert!(!admins.contains(Role::Operator));
        assert!(RoleSet::EMPTY.is_empty());

        let staff: RoleSet = [Role::Admin, Role::Warehouse].into_iter().collect();
        assert_eq!(
            staff.iter().collect::<Vec<_>>(),
            vec![Role::Admin, Role::Warehouse]
        );
        assert!(RoleSet::ALL.contains(Role::Operator));
    }
}
