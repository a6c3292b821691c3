// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Used voting token ledger.
//!
//! The `(poll_id, token_hash)` key is the only double-spend defense: a
//! token counts as spent exactly when its insert commits. Concurrent spends
//! of one token are serialized by redb's single writer and only the first
//! records.

use chrono::{DateTime, Utc};
use redb::{ReadableTable, WriteTransaction};
use serde::{Deserialize, Serialize};

use super::polls::Poll;
use crate::storage::database::{
    decode, encode, next_id, require_row, Database, POLLS, USED_VOTING_TOKENS,
};
use crate::storage::StoreResult;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct UsedVotingToken {
    pub id: u64,
    pub poll_id: u64,
    /// Hex SHA-256 of the token
    pub token_hash: String,
    pub used_at: DateTime<Utc>,
}

/// Result of recording a token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AddOutcome {
    Recorded(UsedVotingToken),
    /// The token was spent before; nothing was written.
    AlreadyUsed,
}

pub struct UsedTokenGuard<'a> {
    db: &'a Database,
}

impl<'a> UsedTokenGuard<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record a token as spent.
    pub fn add(&self, poll_id: u64, token_hash: &str) -> StoreResult<AddOutcome> {
        self.db.transaction(|txn| {
            {
                let polls = txn.open_table(POLLS)?;
                let _: Poll = require_row(&polls, poll_id, "Poll")?;
            }
            record_in(txn, poll_id, token_hash)
        })
    }

    pub fn is_used(&self, poll_id: u64, token_hash: &str) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let used = read_txn.open_table(USED_VOTING_TOKENS)?;
        Ok(used.get((poll_id, token_hash))?.is_some())
    }

    pub fn get(&self, poll_id: u64, token_hash: &str) -> StoreResult<Option<UsedVotingToken>> {
        let read_txn = self.db.begin_read()?;
        let used = read_txn.open_table(USED_VOTING_TOKENS)?;
        match used.get((poll_id, token_hash))? {
            Some(value) => Ok(Some(decode(value.value())?)),
            None => Ok(None),
        }
    }
}

/// Record a spent token inside a caller's transaction. The caller is
/// responsible for the poll's existence.
pub(crate) fn record_in(
    txn: &WriteTransaction,
    poll_id: u64,
    token_hash: &str,
) -> StoreResult<AddOutcome> {
    let mut used = txn.open_table(USED_VOTING_TOKENS)?;
    if used.get((poll_id, token_hash))?.is_some() {
        tracing::warn!(poll_id, "Voting token replay rejected");
        return Ok(AddOutcome::AlreadyUsed);
    }

    let record = UsedVotingToken {
        id: next_id(txn, "used_voting_tokens")?,
        poll_id,
        token_hash: token_hash.to_string(),
        used_at: Utc::now(),
    };
    used.insert((poll_id, token_hash), encode(&record)?.as_slice())?;
    Ok(AddOutcome::Recorded(record))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::database::temp_db;
    use crate::storage::repository::polls::tests::seed_poll;
    use crate::storage::StoreError;
    use redb::ReadableTableMetadata;
    use std::sync::Arc;

    #[test]
    fn first_add_records_later_adds_are_sentinels() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let guard = UsedTokenGuard::new(&db);

        assert!(!guard.is_used(poll.id, "abc").unwrap());
        let AddOutcome::Recorded(record) = guard.add(poll.id, "abc").unwrap() else {
            panic!("first add must record");
        };
        assert_eq!(record.token_hash, "abc");
        assert!(guard.is_used(poll.id, "abc").unwrap());

        for _ in 0..3 {
            assert_eq!(guard.add(poll.id, "abc").unwrap(), AddOutcome::AlreadyUsed);
        }
        assert_eq!(guard.get(poll.id, "abc").unwrap(), Some(record));

        let read_txn = db.begin_read().unwrap();
        let used = read_txn.open_table(USED_VOTING_TOKENS).unwrap();
        assert_eq!(used.len().unwrap(), 1);
    }

    #[test]
    fn same_hash_in_another_poll_is_independent() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let other = crate::storage::repository::PollRepository::new(&db)
            .create(&crate::storage::repository::CreatePoll {
                name: "Other".into(),
                owner_id: poll.owner_id,
                expires: None,
                anonymous: true,
                group_id: None,
                max_options: 1,
            })
            .unwrap();
        let guard = UsedTokenGuard::new(&db);

        assert!(matches!(guard.add(poll.id, "abc").unwrap(), AddOutcome::Recorded(_)));
        assert!(matches!(guard.add(other.id, "abc").unwrap(), AddOutcome::Recorded(_)));
    }

    #[test]
    fn unknown_poll_is_an_error_not_a_sentinel() {
        let (db, _dir) = temp_db();
        let err = UsedTokenGuard::new(&db).add(9, "abc").unwrap_err();
        assert!(matches!(err, StoreError::NotFound(_)));
    }

    #[test]
    fn concurrent_adds_have_one_winner() {
        let (db, _dir) = temp_db();
        let (_, poll, _) = seed_poll(&db, true);
        let db = Arc::new(db);

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let db = Arc::clone(&db);
                std::thread::spawn(move || UsedTokenGuard::new(&db).add(poll.id, "race").unwrap())
            })
            .collect();
        let recorded = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|outcome| matches!(outcome, AddOutcome::Recorded(_)))
            .count();
        assert_eq!(recorded, 1);
    }
}
