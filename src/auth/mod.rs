// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Authentication Module
//!
//! Session-based authentication for the poll API.
//!
//! ## Auth Flow
//!
//! 1. Client posts name and password to `POST /api/session`
//! 2. The server verifies the Argon2 hash and stores an
//!    [`AuthenticatedUser`] snapshot in the session under `"user"`
//! 3. The browser carries the `session_id` cookie on later requests
//! 4. [`session_guard`] compares the snapshot's `updated_at` with the
//!    stored user on every request and logs the session out when they
//!    differ
//!
//! Handlers take [`Auth`], [`OrganizerOnly`] or [`AdminOnly`] to require a
//! logged-in user, and [`OwnershipEnforcer`] to check resource ownership.

pub mod error;
pub mod extractor;
pub mod middleware;
pub mod ownership;
pub mod roles;
pub mod session;
pub mod user;

pub use error::AuthError;
pub use extractor::{AdminOnly, Auth, OrganizerOnly};
pub use middleware::session_guard;
pub use ownership::{OwnedResource, OwnershipEnforcer};
pub use roles::Role;
pub use session::{Session, SessionStore, SESSION_COOKIE};
pub use user::{AuthenticatedUser, SESSION_USER_KEY};
