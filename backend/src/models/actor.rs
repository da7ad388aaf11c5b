//! Acting identities and their roles.

use serde::{Deserialize, Serialize};

/// The identity on whose behalf an evidence operation runs.
///
/// Passed explicitly into every registry and guard call; the role is
/// always resolved through the case-assignment collaborator, never
/// carried by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Actor {
    pub id: i64,
}

impl Actor {
    pub fn new(id: i64) -> Self {
        Self { id }
    }
}

/// Role of an actor as known to the user directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    SuperAdmin,
    Admin,
    /// Any other role (investigator, officer, analyst, ...).
    Staff,
}

impl Role {
    /// Map a stored role name onto a `Role`.
    pub fn from_db(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "super_admin" | "superadmin" | "super-admin" => Role::SuperAdmin,
            "admin" | "administrator" => Role::Admin,
            _ => Role::Staff,
        }
    }

    pub fn is_admin(self) -> bool {
        matches!(self, Role::SuperAdmin | Role::Admin)
    }
}
