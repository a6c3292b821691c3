// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Authenticated user representation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::roles::Role;
use crate::storage::UserProfile;

/// Session key under which the logged-in user is stored.
pub const SESSION_USER_KEY: &str = "user";

/// The user a session is logged in as.
///
/// This is a snapshot taken at login. `updated_at` lets the session
/// middleware notice when the stored user has changed since.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: u64,
    pub name: String,
    pub role: Role,
    /// `updated_at` of the user row when the snapshot was taken
    pub updated_at: DateTime<Utc>,
}

impl AuthenticatedUser {
    pub fn has_role(&self, required: Role) -> bool {
        self.role.has_privilege(required)
    }

    pub fn is_admin(&self) -> bool {
        self.role == Role::Admin
    }
}

impl From<UserProfile> for AuthenticatedUser {
    fn from(user: UserProfile) -> Self {
        Self {
            user_id: user.id,
            name: user.name,
            role: Role::from_flags(user.organizator, user.administrator),
            updated_at: user.updated_at,
        }
    }
}
