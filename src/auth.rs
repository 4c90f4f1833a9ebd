//! Caller identity and the admin-only field partition.
//!
//! Authentication happens upstream; this module only decides whether an
//! already-identified caller may touch a given set of fields or actions.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;
use crate::state_machine::{Action, Field};

/// Fields only an administrator may change.
pub const ADMIN_ONLY_FIELDS: [Field; 4] = [
    Field::Status,
    Field::Progress,
    Field::ErrorMessage,
    Field::EstimatedDuration,
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[default]
    User,
    Admin,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Admin => write!(f, "admin"),
        }
    }
}

impl FromStr for Role {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "user" => Ok(Role::User),
            "admin" => Ok(Role::Admin),
            other => Err(EngineError::validation("role", format!("unknown role '{other}'"))),
        }
    }
}

/// The identity on whose behalf an engine operation runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caller {
    pub id: String,
    pub role: Role,
}

impl Caller {
    pub fn new(id: impl Into<String>, role: Role) -> Self {
        Self {
            id: id.into(),
            role,
        }
    }

    pub fn user(id: impl Into<String>) -> Self {
        Self::new(id, Role::User)
    }

    pub fn admin(id: impl Into<String>) -> Self {
        Self::new(id, Role::Admin)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

/// Result of checking a request against the caller's role.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Access {
    Allowed,
    /// The request names these admin-only targets.
    Denied(Vec<&'static str>),
}

impl Access {
    pub fn into_result(self) -> Result<(), EngineError> {
        match self {
            Access::Allowed => Ok(()),
            Access::Denied(targets) => Err(EngineError::Forbidden {
                fields: targets.into_iter().map(String::from).collect(),
            }),
        }
    }
}

pub fn is_admin_only(field: Field) -> bool {
    ADMIN_ONLY_FIELDS.contains(&field)
}

/// Partition check for an update request: non-admins may only name
/// descriptive fields.
pub fn check_fields(caller: &Caller, fields: &[Field]) -> Access {
    if caller.is_admin() {
        return Access::Allowed;
    }
    let denied: Vec<&'static str> = fields
        .iter()
        .copied()
        .filter(|field| is_admin_only(*field))
        .map(Field::as_str)
        .collect();
    if denied.is_empty() {
        Access::Allowed
    } else {
        Access::Denied(denied)
    }
}

pub fn check_action(caller: &Caller, action: &Action) -> Access {
    if action.requires_admin() {
        require_admin(caller, action.name())
    } else {
        Access::Allowed
    }
}

pub fn require_admin(caller: &Caller, target: &'static str) -> Access {
    if caller.is_admin() {
        Access::Allowed
    } else {
        Access::Denied(vec![target])
    }
}
