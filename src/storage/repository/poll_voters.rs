// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Per-voter RSA keypairs for anonymous polls.
//!
//! One keypair is issued per group member. Rows are never mutated and are
//! removed only when their poll is deleted.

use chrono::{DateTime, Utc};
use redb::ReadableTable;
use serde::{Deserialize, Serialize};

use super::groups::Group;
use super::memberships::member_ids;
use super::polls::Poll;
use crate::storage::database::{
    encode, next_id, require_row, scan_rows, Database, GROUPS, GROUP_MEMBERSHIPS, POLLS,
    POLL_VOTERS,
};
use crate::storage::{StoreError, StoreResult};
use crate::voting::crypto::{self, CryptoResult, KeyPair};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollVoter {
    pub id: u64,
    pub poll_id: u64,
    /// PKCS#8 PEM
    pub private_key: String,
    /// SPKI PEM
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

impl PollVoter {
    /// Message a voter signs to prove they hold this key when casting a
    /// ballot. Option ids are sorted so the proof does not depend on order.
    pub fn ballot_message(poll_id: u64, voter_id: u64, option_ids: &[u64]) -> String {
        let mut sorted = option_ids.to_vec();
        sorted.sort_unstable();
        let options: Vec<String> = sorted.iter().map(u64::to_string).collect();
        format!("{poll_id}:{voter_id}:{}", options.join(","))
    }

    /// Check a ballot proof against this voter's public key.
    pub fn verify_ballot_proof(&self, option_ids: &[u64], proof: &[u8]) -> CryptoResult<bool> {
        let public_key = crypto::parse_public_key(&self.public_key)?;
        let message = Self::ballot_message(self.poll_id, self.id, option_ids);
        Ok(crypto::verify(&public_key, message.as_bytes(), proof))
    }
}

/// A voter keypair together with the member it was issued to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoterKeypair {
    pub user_id: u64,
    pub voter: PollVoter,
}

pub struct PollVoterRepository<'a> {
    db: &'a Database,
}

impl<'a> PollVoterRepository<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Generate and store one voter keypair for a poll.
    pub fn generate_keypair(&self, poll_id: u64) -> StoreResult<PollVoter> {
        let keypair = KeyPair::generate()?;

        self.db.transaction(|txn| {
            let polls = txn.open_table(POLLS)?;
            let _: Poll = require_row(&polls, poll_id, "Poll")?;
            let mut voters = txn.open_table(POLL_VOTERS)?;
            let voter = PollVoter {
                id: next_id(txn, "poll_voters")?,
                poll_id,
                private_key: keypair.private_key_pem,
                public_key: keypair.public_key_pem,
                created_at: Utc::now(),
            };
            voters.insert(voter.id, encode(&voter)?.as_slice())?;
            Ok(voter)
        })
    }

    pub fn get(&self, voter_id: u64) -> StoreResult<PollVoter> {
        let read_txn = self.db.begin_read()?;
        let voters = read_txn.open_table(POLL_VOTERS)?;
        require_row(&voters, voter_id, "Voter key")
    }

    /// Every voter key issued for a poll, in id order.
    pub fn by_poll(&self, poll_id: u64) -> StoreResult<Vec<PollVoter>> {
        let read_txn = self.db.begin_read()?;
        let voters = read_txn.open_table(POLL_VOTERS)?;
        let mut rows: Vec<PollVoter> = scan_rows(&voters)?;
        rows.retain(|voter| voter.poll_id == poll_id);
        Ok(rows)
    }

    /// Issue one keypair per member of `group_id`.
    ///
    /// All rows are written in one transaction: either every member gets a
    /// key or nobody does. A poll gets its batch once; a second call is a
    /// `Conflict`.
    pub fn generate_keypairs_for_group(
        &self,
        poll_id: u64,
        group_id: u64,
    ) -> StoreResult<Vec<VoterKeypair>> {
        self.generate_keypairs_for_group_with(poll_id, group_id, KeyPair::generate)
    }

    pub(crate) fn generate_keypairs_for_group_with<F>(
        &self,
        poll_id: u64,
        group_id: u64,
        mut keygen: F,
    ) -> StoreResult<Vec<VoterKeypair>>
    where
        F: FnMut() -> CryptoResult<KeyPair>,
    {
        // Key generation is slow, so most of it happens before the write
        // lock is taken, against a snapshot of the membership.
        let snapshot = {
            let read_txn = self.db.begin_read()?;
            let voters = read_txn.open_table(POLL_VOTERS)?;
            ensure_no_voters(&voters, poll_id)?;
            let memberships = read_txn.open_table(GROUP_MEMBERSHIPS)?;
            member_ids(&memberships, group_id)?
        };
        let mut pregenerated = Vec::with_capacity(snapshot.len());
        for _ in &snapshot {
            pregenerated.push(keygen()?);
        }

        let issued = self.db.transaction(|txn| {
            let polls = txn.open_table(POLLS)?;
            let _: Poll = require_row(&polls, poll_id, "Poll")?;
            let groups = txn.open_table(GROUPS)?;
            let _: Group = require_row(&groups, group_id, "Group")?;
            let memberships = txn.open_table(GROUP_MEMBERSHIPS)?;
            let members = member_ids(&memberships, group_id)?;

            let mut voters = txn.open_table(POLL_VOTERS)?;
            // Authoritative: a concurrent batch may have committed since
            // the snapshot
            ensure_no_voters(&voters, poll_id)?;
            let mut issued = Vec::with_capacity(members.len());
            for user_id in members {
                // Members who joined after the snapshot get a fresh key here
                let keypair = match pregenerated.pop() {
                    Some(keypair) => keypair,
                    None => keygen()?,
                };
                let voter = PollVoter {
                    id: next_id(txn, "poll_voters")?,
                    poll_id,
                    private_key: keypair.private_key_pem,
                    public_key: keypair.public_key_pem,
                    created_at: Utc::now(),
                };
                voters.insert(voter.id, encode(&voter)?.as_slice())?;
                issued.push(VoterKeypair { user_id, voter });
            }
            Ok(issued)
        })?;

        tracing::info!(poll_id, group_id, count = issued.len(), "Voter keys issued");
        Ok(issued)
    }
}

fn ensure_no_voters<Tb>(voters: &Tb, poll_id: u64) -> StoreResult<()>
where
    Tb: ReadableTable<u64, &'static [u8]>,
{
    let rows: Vec<PollVoter> = scan_rows(voters)?;
    if rows.iter().any(|voter| voter.poll_id == poll_id) {
        return Err(StoreError::Conflict(format!(
            "Voter keys for poll {poll_id} have already been issued"
        )));
    }
    Ok(())
}
