// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Group Poll Server - Group Polls with Anonymous Voting
//!
//! Users log in with a name and password, organizers create groups and
//! polls, and members vote either under their identity or anonymously with
//! RSA-signed voting tokens or per-member voter keys.
//!
//! ## Modules
//!
//! - `api` - HTTP API handlers (Axum)
//! - `auth` - Cookie sessions, roles and ownership checks
//! - `storage` - Embedded redb database, repositories and audit log
//! - `voting` - Signing keys, voting tokens and token redemption

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod models;
pub mod session_sweeper;
pub mod state;
pub mod storage;
pub mod voting;
