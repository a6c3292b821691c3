// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # Storage Module
//!
//! Persistent storage for users, groups, polls, ballots and the anonymous
//! voting ledger, in a single redb file (`polls.redb` under `DATA_DIR`).
//!
//! ## Consistency Model
//!
//! - redb admits one write transaction at a time
//! - Uniqueness rules (user names, memberships, spent tokens, one ballot
//!   per voter) are checked and written in the same write transaction
//! - Multi-row operations run through [`Database::transaction`], which
//!   commits on success and aborts on any error
//!
//! ## Important Notes
//!
//! - Repositories are synchronous. Call RSA-heavy operations (key
//!   generation, token batches, voter-key ballots) from `spawn_blocking`
//! - Poll signing keys and voter private keys live in this database; the
//!   API never returns a poll's signing key

pub mod audit;
pub mod database;
pub mod error;
pub mod repository;

pub use audit::{
    AuditEvent, AuditEventType, AuditFilter, AuditLogEntry, AuditRepository, DEFAULT_QUERY_LIMIT,
};
pub use database::Database;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use repository::*;
