// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Ownership checks for polls and groups.
//!
//! Organizers may only manage what they own. Administrators may manage
//! everything.

use super::{AuthError, AuthenticatedUser};

/// Trait for resources that have an owner.
pub trait OwnedResource {
    fn owner_id(&self) -> u64;
}

/// Trait for enforcing ownership.
pub trait OwnershipEnforcer {
    /// Verify that the user owns this resource or is an administrator.
    ///
    /// # Errors
    /// Returns `AuthError::InsufficientPermissions` otherwise.
    fn verify_ownership(&self, user: &AuthenticatedUser) -> Result<(), AuthError>;
}

impl<T: OwnedResource> OwnershipEnforcer for T {
    fn verify_ownership(&self, user: &AuthenticatedUser) -> Result<(), AuthError> {
        if self.owner_id() == user.user_id || user.is_admin() {
            Ok(())
        } else {
            tracing::warn!(
                user_id = user.user_id,
                owner_id = self.owner_id(),
                "Ownership check failed"
            );
            Err(AuthError::InsufficientPermissions)
        }
    }
}
