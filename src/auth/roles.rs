// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! User roles for authorization.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// User roles for authorization.
///
/// ## Role Hierarchy
///
/// - `Admin` - Full access, including user management and the audit log
/// - `Organizer` - Creates groups and polls, issues tokens and voter keys
/// - `Member` - Votes and reads results
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Organizer,
    Member,
}

impl Role {
    /// Derive the role from the user's stored flags. The administrator flag
    /// wins over the organizer flag.
    pub fn from_flags(organizator: bool, administrator: bool) -> Role {
        match (administrator, organizator) {
            (true, _) => Role::Admin,
            (false, true) => Role::Organizer,
            (false, false) => Role::Member,
        }
    }

    /// Check if this role has at least the privileges of the required role.
    pub fn has_privilege(&self, required: Role) -> bool {
        match (self, required) {
            (Role::Admin, _) => true,
            (Role::Organizer, Role::Organizer | Role::Member) => true,
            (Role::Member, Role::Member) => true,
            _ => false,
        }
    }
}

impl Default for Role {
    /// Least privilege.
    fn default() -> Self {
        Role::Member
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::Admin => write!(f, "admin"),
            Role::Organizer => write!(f, "organizer"),
            Role::Member => write!(f, "member"),
        }
    }
}
