// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Repository layer providing typed access to the database.
//!
//! Each repository borrows the shared [`Database`](super::Database) and
//! offers the operations of one relation. Operations that touch several
//! rows run in a single write transaction.

pub mod blind_signatures;
pub mod groups;
pub mod memberships;
pub mod poll_options;
pub mod poll_voters;
pub mod poll_votes;
pub mod polls;
pub mod used_tokens;
pub mod users;

pub use blind_signatures::{BlindSignatureRepository, BlindSignatureRequest};
pub use groups::{CreateGroup, Group, GroupRepository, UpdateGroup};
pub use memberships::{GroupMembership, MemberSummary, MembershipRepository};
pub use poll_options::{CreateOption, NewOption, PollOption, PollOptionRepository, UpdateOption};
pub use poll_voters::{PollVoter, PollVoterRepository, VoterKeypair};
pub use poll_votes::{
    Ballot, BallotVoter, CreateAnonymousVote, CreateAuthenticatedVote, OptionResult, PollVote,
    VoteOrigin, VoteRecorder, VotedPoll, VoterChoice,
};
pub use polls::{CreatePoll, Poll, PollRepository, PollSigningKeys, PollView, UpdatePoll};
pub use used_tokens::{AddOutcome, UsedTokenGuard, UsedVotingToken};
pub use users::{CreateUser, UpdateUser, User, UserProfile, UserRepository};
