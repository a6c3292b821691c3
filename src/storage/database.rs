// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Embedded relational store backed by redb (pure Rust, ACID).
//!
//! ## Table Layout
//!
//! Rows are serialized as JSON bytes and keyed by a numeric id drawn from
//! the `sequences` table.
//!
//! - `users`: user_id → User
//! - `users_by_name`: name → user_id (unique index)
//! - `groups`: group_id → Group
//! - `group_memberships`: (group_id, user_id) → GroupMembership
//! - `polls`: poll_id → Poll
//! - `poll_options`: option_id → PollOption
//! - `poll_voters`: voter_id → PollVoter
//! - `poll_votes`: (poll_id, vote_id) → PollVote
//! - `blind_signature_requests`: request_id → BlindSignatureRequest
//! - `used_voting_tokens`: (poll_id, token_hash) → UsedVotingToken
//! - `audit_logs`: entry_id → AuditLogEntry
//! - `sequences`: table name → last issued id
//!
//! redb admits one write transaction at a time. Every uniqueness rule is a
//! lookup followed by an insert inside the same write transaction, so
//! racing writers are serialized and exactly one of them wins.

use std::path::Path;

use redb::{ReadTransaction, ReadableDatabase, ReadableTable, TableDefinition, WriteTransaction};
use serde::{de::DeserializeOwned, Serialize};

use super::{StoreError, StoreResult};

// =============================================================================
// Table Definitions
// =============================================================================

pub(crate) const USERS: TableDefinition<u64, &[u8]> = TableDefinition::new("users");
pub(crate) const USERS_BY_NAME: TableDefinition<&str, u64> = TableDefinition::new("users_by_name");
pub(crate) const GROUPS: TableDefinition<u64, &[u8]> = TableDefinition::new("groups");
pub(crate) const GROUP_MEMBERSHIPS: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("group_memberships");
pub(crate) const POLLS: TableDefinition<u64, &[u8]> = TableDefinition::new("polls");
pub(crate) const POLL_OPTIONS: TableDefinition<u64, &[u8]> = TableDefinition::new("poll_options");
pub(crate) const POLL_VOTERS: TableDefinition<u64, &[u8]> = TableDefinition::new("poll_voters");
pub(crate) const POLL_VOTES: TableDefinition<(u64, u64), &[u8]> =
    TableDefinition::new("poll_votes");
pub(crate) const BLIND_SIGNATURE_REQUESTS: TableDefinition<u64, &[u8]> =
    TableDefinition::new("blind_signature_requests");
pub(crate) const USED_VOTING_TOKENS: TableDefinition<(u64, &str), &[u8]> =
    TableDefinition::new("used_voting_tokens");
pub(crate) const AUDIT_LOGS: TableDefinition<u64, &[u8]> = TableDefinition::new("audit_logs");
const SEQUENCES: TableDefinition<&str, u64> = TableDefinition::new("sequences");

// =============================================================================
// Database
// =============================================================================

/// Process-wide database handle. Open once at startup and share via `Arc`.
pub struct Database {
    db: redb::Database,
}

impl Database {
    /// Open (or create) the database at the given path.
    pub fn open(path: &Path) -> StoreResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = redb::Database::create(path)?;

        // Pre-create all tables so later read transactions don't fail
        let write_txn = db.begin_write()?;
        {
            let _ = write_txn.open_table(USERS)?;
            let _ = write_txn.open_table(USERS_BY_NAME)?;
            let _ = write_txn.open_table(GROUPS)?;
            let _ = write_txn.open_table(GROUP_MEMBERSHIPS)?;
            let _ = write_txn.open_table(POLLS)?;
            let _ = write_txn.open_table(POLL_OPTIONS)?;
            let _ = write_txn.open_table(POLL_VOTERS)?;
            let _ = write_txn.open_table(POLL_VOTES)?;
            let _ = write_txn.open_table(BLIND_SIGNATURE_REQUESTS)?;
            let _ = write_txn.open_table(USED_VOTING_TOKENS)?;
            let _ = write_txn.open_table(AUDIT_LOGS)?;
            let _ = write_txn.open_table(SEQUENCES)?;
        }
        write_txn.commit()?;

        tracing::info!(path = %path.display(), "Database opened");
        Ok(Self { db })
    }

    pub fn begin_read(&self) -> StoreResult<ReadTransaction> {
        Ok(self.db.begin_read()?)
    }

    /// Run `f` inside a write transaction.
    ///
    /// Commits when `f` returns `Ok`. Any error aborts the transaction, so
    /// none of the writes made by `f` become visible.
    pub fn transaction<T, F>(&self, f: F) -> StoreResult<T>
    where
        F: FnOnce(&WriteTransaction) -> StoreResult<T>,
    {
        let write_txn = self.db.begin_write()?;
        match f(&write_txn) {
            Ok(value) => {
                write_txn.commit()?;
                Ok(value)
            }
            Err(e) => {
                if let Err(abort_err) = write_txn.abort() {
                    tracing::warn!(error = %abort_err, "Failed to abort write transaction");
                }
                Err(e)
            }
        }
    }
}

// =============================================================================
// Row Helpers
// =============================================================================

/// Allocate the next id of a sequence. Ids start at 1.
pub(crate) fn next_id(txn: &WriteTransaction, sequence: &str) -> StoreResult<u64> {
    let mut table = txn.open_table(SEQUENCES)?;
    let current = table.get(sequence)?.map(|v| v.value()).unwrap_or(0);
    let next = current + 1;
    table.insert(sequence, next)?;
    Ok(next)
}

pub(crate) fn encode<T: Serialize>(row: &T) -> StoreResult<Vec<u8>> {
    Ok(serde_json::to_vec(row)?)
}

pub(crate) fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StoreResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Load one JSON row by id.
pub(crate) fn read_row<T, Tb>(table: &Tb, id: u64) -> StoreResult<Option<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<u64, &'static [u8]>,
{
    match table.get(id)? {
        Some(value) => Ok(Some(decode(value.value())?)),
        None => Ok(None),
    }
}

/// Load every row of an id-keyed table, in id order.
pub(crate) fn scan_rows<T, Tb>(table: &Tb) -> StoreResult<Vec<T>>
where
    T: DeserializeOwned,
    Tb: ReadableTable<u64, &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in table.iter()? {
        let (_, value) = entry?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

/// Load a row that must exist, mapping absence to `NotFound`.
pub(crate) fn require_row<T, Tb>(table: &Tb, id: u64, what: &str) -> StoreResult<T>
where
    T: DeserializeOwned,
    Tb: ReadableTable<u64, &'static [u8]>,
{
    read_row(table, id)?.ok_or_else(|| StoreError::NotFound(format!("{what} {id}")))
}

// =============================================================================
// Tests
// =============================================================================

#[cfg(test)]
pub(crate) fn temp_db() -> (Database, tempfile::TempDir) {
    let dir = tempfile::tempdir().unwrap();
    let db = Database::open(&dir.path().join("test.redb")).unwrap();
    (db, dir)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequences_are_monotonic_per_name() {
        let (db, _dir) = temp_db();
        let ids = db
            .transaction(|txn| {
                Ok((
                    next_id(txn, "polls")?,
                    next_id(txn, "polls")?,
                    next_id(txn, "users")?,
                ))
            })
            .unwrap();
        assert_eq!(ids, (1, 2, 1));

        let after = db.transaction(|txn| next_id(txn, "polls")).unwrap();
        assert_eq!(after, 3);
    }

    #[test]
    fn unusable_parent_directory_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("data");
        std::fs::write(&blocker, b"not a directory").unwrap();

        let result = Database::open(&blocker.join("nested").join("polls.redb"));
        assert!(matches!(result, Err(StoreError::Io(_))));
    }

    #[test]
    fn failed_transaction_leaves_no_trace() {
        let (db, _dir) = temp_db();
        let result: StoreResult<()> = db.transaction(|txn| {
            let id = next_id(txn, "polls")?;
            let mut table = txn.open_table(POLLS)?;
            table.insert(id, b"{}".as_slice())?;
            Err(StoreError::Validation("boom".into()))
        });
        assert!(matches!(result, Err(StoreError::Validation(_))));

        let read_txn = db.begin_read().unwrap();
        let table = read_txn.open_table(POLLS).unwrap();
        assert!(table.get(1).unwrap().is_none());

        // The sequence bump was rolled back as well
        let id = db.transaction(|txn| next_id(txn, "polls")).unwrap();
        assert_eq!(id, 1);
    }

    #[test]
    fn reopen_keeps_data() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("store.redb");
        {
            let db = Database::open(&path).unwrap();
            db.transaction(|txn| next_id(txn, "users")).unwrap();
        }
        let db = Database::open(&path).unwrap();
        assert_eq!(db.transaction(|txn| next_id(txn, "users")).unwrap(), 2);
    }
}
