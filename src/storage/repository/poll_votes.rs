// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Vote recorder.
//!
//! Votes are keyed by `(poll_id, vote_id)` so tallies scan one key range.
//! Each vote carries exactly one origin: an authenticated user, a voter key
//! with the server's signature over the vote data, or a redeemed token that
//! carries no identity at all.
//!
//! Voter-key votes are signed with the *stored* private key, so the server
//! can tell which key cast which vote at write time. Token votes are the
//! only path that stores nothing linkable.

use std::collections::{BTreeMap, HashMap, HashSet};

use base64ct::{Base64, Encoding};
use chrono::{DateTime, Utc};
use redb::{ReadableTable, Table, WriteTransaction};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::poll_options::{options_of, PollOption};
use super::poll_voters::{PollVoter, PollVoterRepository};
use super::polls::Poll;
use super::used_tokens::{record_in, AddOutcome};
use super::users::User;
use crate::storage::database::{
    decode, encode, next_id, read_row, require_row, Database, POLLS, POLL_OPTIONS, POLL_VOTERS,
    POLL_VOTES, USERS,
};
use crate::storage::{StoreError, StoreResult};
use crate::voting::crypto::{self, PemSigner};

/// Who, if anyone, a vote is attributed to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum VoteOrigin {
    User { user_id: u64 },
    VoterKey { voter_key_id: u64, signature: String },
    Token,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PollVote {
    pub id: u64,
    pub poll_id: u64,
    pub option_id: u64,
    pub origin: VoteOrigin,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CreateAnonymousVote {
    pub poll_id: u64,
    pub option_id: u64,
    pub voter_key_id: u64,
    /// Signed as its JSON serialization
    pub data: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct CreateAuthenticatedVote {
    pub poll_id: u64,
    pub option_id: u64,
    pub user_id: u64,
}

/// Vote count of one option.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct OptionResult {
    /// Option id
    pub id: u64,
    pub content: String,
    pub vote_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VotedPoll {
    pub poll_id: u64,
    pub name: String,
    /// Time of the user's first vote in the poll
    pub voted_at: DateTime<Utc>,
}

/// An authenticated vote with the voter's name and the chosen option.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct VoterChoice {
    pub user_id: u64,
    pub name: String,
    pub option_id: u64,
    pub content: String,
}

/// Identity behind a ballot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BallotVoter {
    User(u64),
    VoterKey(u64),
    /// A token whose signature has already been verified
    Token { token_hash: String },
}

/// Every option a voter picks in one poll, recorded together.
#[derive(Debug, Clone)]
pub struct Ballot {
    pub poll_id: u64,
    pub option_ids: Vec<u64>,
    pub voter: BallotVoter,
}

pub struct VoteRecorder<'a> {
    db: &'a Database,
}

impl<'a> VoteRecorder<'a> {
    pub fn new(db: &'a Database) -> Self {
        Self { db }
    }

    /// Record a vote under a voter key, signing `data` with the key's
    /// stored private half.
    pub fn create_anonymous(&self, input: &CreateAnonymousVote) -> StoreResult<PollVote> {
        let voter = PollVoterRepository::new(self.db).get(input.voter_key_id)?;
        let payload = serde_json::to_vec(&input.data)?;
        let signature = Base64::encode_string(&crypto::sign(&voter.private_key, &payload)?);

        self.db.transaction(|txn| {
            check_option(txn, input.poll_id, input.option_id)?;
            let mut votes = txn.open_table(POLL_VOTES)?;
            insert_vote(
                txn,
                &mut votes,
                input.poll_id,
                input.option_id,
                VoteOrigin::VoterKey {
                    voter_key_id: voter.id,
                    signature,
                },
            )
        })
    }

    pub fn create_authenticated(&self, input: &CreateAuthenticatedVote) -> StoreResult<PollVote> {
        self.db.transaction(|txn| {
            {
                let users = txn.open_table(USERS)?;
                let _: User = require_row(&users, input.user_id, "User")?;
            }
            check_option(txn, input.poll_id, input.option_id)?;
            let mut votes = txn.open_table(POLL_VOTES)?;
            insert_vote(
                txn,
                &mut votes,
                input.poll_id,
                input.option_id,
                VoteOrigin::User {
                    user_id: input.user_id,
                },
            )
        })
    }

    /// Vote counts per option in display order. Options nobody picked are
    /// listed with a count of zero.
    pub fn get_poll_results(&self, poll_id: u64) -> StoreResult<Vec<OptionResult>> {
        let read_txn = self.db.begin_read()?;
        let options = read_txn.open_table(POLL_OPTIONS)?;
        let votes = read_txn.open_table(POLL_VOTES)?;

        let mut tally: HashMap<u64, u64> = HashMap::new();
        for vote in votes_of(&votes, poll_id)? {
            *tally.entry(vote.option_id).or_default() += 1;
        }

        Ok(options_of(&options, poll_id)?
            .into_iter()
            .map(|option| OptionResult {
                vote_count: tally.get(&option.id).copied().unwrap_or(0),
                id: option.id,
                content: option.content,
            })
            .collect())
    }

    pub fn has_user_voted(&self, poll_id: u64, user_id: u64) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let votes = read_txn.open_table(POLL_VOTES)?;
        has_voted(&votes, poll_id, &BallotVoter::User(user_id))
    }

    pub fn has_voter_key_voted(&self, poll_id: u64, voter_key_id: u64) -> StoreResult<bool> {
        let read_txn = self.db.begin_read()?;
        let votes = read_txn.open_table(POLL_VOTES)?;
        has_voted(&votes, poll_id, &BallotVoter::VoterKey(voter_key_id))
    }

    /// Polls the user cast an authenticated vote in, one entry per poll.
    pub fn polls_voted_by_user(&self, user_id: u64) -> StoreResult<Vec<VotedPoll>> {
        let read_txn = self.db.begin_read()?;
        let votes = read_txn.open_table(POLL_VOTES)?;

        let mut first_vote: BTreeMap<u64, DateTime<Utc>> = BTreeMap::new();
        for entry in votes.iter()? {
            let (_, value) = entry?;
            let vote: PollVote = decode(value.value())?;
            if vote.origin == (VoteOrigin::User { user_id }) {
                first_vote
                    .entry(vote.poll_id)
                    .and_modify(|at| *at = (*at).min(vote.created_at))
                    .or_insert(vote.created_at);
            }
        }

        let polls = read_txn.open_table(POLLS)?;
        let mut voted = Vec::with_capacity(first_vote.len());
        for (poll_id, voted_at) in first_vote {
            let poll: Option<Poll> = read_row(&polls, poll_id)?;
            if let Some(poll) = poll {
                voted.push(VotedPoll {
                    poll_id,
                    name: poll.name,
                    voted_at,
                });
            }
        }
        Ok(voted)
    }

    /// Authenticated votes of a poll with voter names and option contents.
    pub fn voter_choices(&self, poll_id: u64) -> StoreResult<Vec<VoterChoice>> {
        let read_txn = self.db.begin_read()?;
        let votes = read_txn.open_table(POLL_VOTES)?;
        let users = read_txn.open_table(USERS)?;
        let options = read_txn.open_table(POLL_OPTIONS)?;

        let mut choices = Vec::new();
        for vote in votes_of(&votes, poll_id)? {
            let VoteOrigin::User { user_id } = vote.origin else {
                continue;
            };
            let user: Option<User> = read_row(&users, user_id)?;
            let option: Option<PollOption> = read_row(&options, vote.option_id)?;
            if let (Some(user), Some(option)) = (user, option) {
                choices.push(VoterChoice {
                    user_id,
                    name: user.name,
                    option_id: option.id,
                    content: option.content,
                });
            }
        }
        Ok(choices)
    }

    /// Validate and record a whole ballot in one transaction.
    ///
    /// The poll must exist and be open, the options must be distinct
    /// options of the poll, and between 1 and `max_options` of them must be
    /// chosen. A user or voter key may cast one ballot per poll. A token
    /// ballot spends its token in the same transaction, so a replayed token
    /// records nothing.
    pub fn cast_ballot(&self, ballot: &Ballot) -> StoreResult<Vec<PollVote>> {
        let poll_id = ballot.poll_id;
        let now = Utc::now();

        self.db.transaction(|txn| {
            let poll: Poll = {
                let polls = txn.open_table(POLLS)?;
                require_row(&polls, poll_id, "Poll")?
            };
            if poll.is_expired(now) {
                return Err(StoreError::Validation(format!("Poll {poll_id} has expired")));
            }
            {
                let options = txn.open_table(POLL_OPTIONS)?;
                validate_selection(&poll, &options_of(&options, poll_id)?, &ballot.option_ids)?;
            }

            let mut votes = txn.open_table(POLL_VOTES)?;
            let origins: Vec<VoteOrigin> = match &ballot.voter {
                BallotVoter::User(user_id) => {
                    let users = txn.open_table(USERS)?;
                    let _: User = require_row(&users, *user_id, "User")?;
                    if has_voted(&votes, poll_id, &ballot.voter)? {
                        return Err(StoreError::Conflict(format!(
                            "User {user_id} has already voted in poll {poll_id}"
                        )));
                    }
                    ballot
                        .option_ids
                        .iter()
                        .map(|_| VoteOrigin::User { user_id: *user_id })
                        .collect()
                }
                BallotVoter::VoterKey(voter_key_id) => {
                    let voters = txn.open_table(POLL_VOTERS)?;
                    let voter: PollVoter = require_row(&voters, *voter_key_id, "Voter key")?;
                    if voter.poll_id != poll_id {
                        return Err(StoreError::Validation(format!(
                            "Voter key {voter_key_id} was not issued for poll {poll_id}"
                        )));
                    }
                    if has_voted(&votes, poll_id, &ballot.voter)? {
                        return Err(StoreError::Conflict(format!(
                            "Voter key {voter_key_id} has already voted in poll {poll_id}"
                        )));
                    }
                    sign_selection(&voter, &ballot.option_ids)?
                }
                BallotVoter::Token { token_hash } => {
                    if record_in(txn, poll_id, token_hash)? == AddOutcome::AlreadyUsed {
                        return Err(StoreError::Conflict(
                            "Voting token has already been used".into(),
                        ));
                    }
                    vec![VoteOrigin::Token; ballot.option_ids.len()]
                }
            };

            let mut recorded = Vec::with_capacity(origins.len());
            for (&option_id, origin) in ballot.option_ids.iter().zip(origins) {
                recorded.push(insert_vote(txn, &mut votes, poll_id, option_id, origin)?);
            }

            tracing::info!(poll_id, options = recorded.len(), "Ballot recorded");
            Ok(recorded)
        })
    }
}

/// The JSON document a voter-key vote signature covers.
pub fn vote_data(poll_id: u64, option_id: u64) -> serde_json::Value {
    serde_json::json!({ "poll_id": poll_id, "option_id": option_id })
}

fn sign_selection(voter: &PollVoter, option_ids: &[u64]) -> StoreResult<Vec<VoteOrigin>> {
    let signer = PemSigner::from_pkcs8_pem(&voter.private_key)?;
    option_ids
        .iter()
        .map(|&option_id| {
            let payload = serde_json::to_vec(&vote_data(voter.poll_id, option_id))?;
            Ok(VoteOrigin::VoterKey {
                voter_key_id: voter.id,
                signature: Base64::encode_string(&signer.sign(&payload)?),
            })
        })
        .collect()
}

fn validate_selection(poll: &Poll, options: &[PollOption], chosen: &[u64]) -> StoreResult<()> {
    if chosen.is_empty() {
        return Err(StoreError::Validation(
            "A ballot must choose at least one option".into(),
        ));
    }
    if chosen.len() > poll.max_options as usize {
        return Err(StoreError::Validation(format!(
            "Poll {} allows at most {} options per ballot",
            poll.id, poll.max_options
        )));
    }

    let valid: HashSet<u64> = options.iter().map(|o| o.id).collect();
    let mut seen = HashSet::with_capacity(chosen.len());
    for &option_id in chosen {
        if !valid.contains(&option_id) {
            return Err(StoreError::Validation(format!(
                "Option {option_id} does not belong to poll {}",
                poll.id
            )));
        }
        if !seen.insert(option_id) {
            return Err(StoreError::Validation(format!(
                "Option {option_id} is chosen more than once"
            )));
        }
    }
    Ok(())
}

/// `NotFound` for a missing poll or option, `Validation` when the option
/// belongs to another poll.
fn check_option(txn: &WriteTransaction, poll_id: u64, option_id: u64) -> StoreResult<()> {
    let polls = txn.open_table(POLLS)?;
    let _: Poll = require_row(&polls, poll_id, "Poll")?;
    let options = txn.open_table(POLL_OPTIONS)?;
    let option: PollOption = require_row(&options, option_id, "Poll option")?;
    if option.poll_id != poll_id {
        return Err(StoreError::Validation(format!(
            "Option {option_id} does not belong to poll {poll_id}"
        )));
    }
    Ok(())
}

fn insert_vote(
    txn: &WriteTransaction,
    votes: &mut Table<'_, (u64, u64), &'static [u8]>,
    poll_id: u64,
    option_id: u64,
    origin: VoteOrigin,
) -> StoreResult<PollVote> {
    let vote = PollVote {
        id: next_id(txn, "poll_votes")?,
        poll_id,
        option_id,
        origin,
        created_at: Utc::now(),
    };
    votes.insert((poll_id, vote.id), encode(&vote)?.as_slice())?;
    Ok(vote)
}

fn votes_of<Tb>(votes: &Tb, poll_id: u64) -> StoreResult<Vec<PollVote>>
where
    Tb: ReadableTable<(u64, u64), &'static [u8]>,
{
    let mut rows = Vec::new();
    for entry in votes.range((poll_id, 0)..=(poll_id, u64::MAX))? {
        let (_, value) = entry?;
        rows.push(decode(value.value())?);
    }
    Ok(rows)
}

/// Whether `voter` already has a vote in the poll. Tokens never match.
fn has_voted<Tb>(votes: &Tb, poll_id: u64, voter: &BallotVoter) -> StoreResult<bool>
where
    Tb: ReadableTable<(u64, u64), &'static [u8]>,
{
    Ok(votes_of(votes, poll_id)?
        .iter()
        .any(|vote| match (voter, &vote.origin) {
            (BallotVoter::User(id), VoteOrigin::User { user_id }) => id == user_id,
            (BallotVoter::VoterKey(id), VoteOrigin::VoterKey { voter_key_id, .. }) => {
                id == voter_key_id
            }
            _ => false,
        }))
}
