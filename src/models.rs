// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! # API Data Models
//!
//! Request and response bodies of the JSON API. Stored rows that are safe to
//! show clients (`UserProfile`, `Group`, `PollView`, `PollOption`, ...) are
//! returned as-is and live in the storage layer.
//!
//! ## Model Categories
//!
//! - **Session**: Login and the current user
//! - **Directory**: Users and groups
//! - **Polls**: Poll creation, ballots and results
//! - **Anonymous voting**: Tokens, voter keys and blind signatures
//! - **Audit**: Audit log queries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

use crate::auth::AuthenticatedUser;
use crate::storage::{
    AuditEventType, AuditLogEntry, BlindSignatureRequest, Group, MemberSummary, NewOption,
    OptionResult, PollOption, PollView, VotedPoll, VoterChoice,
};
use crate::voting::IssuedToken;

// =============================================================================
// Session Models
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub name: String,
    pub password: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionResponse {
    pub user: AuthenticatedUser,
}

// =============================================================================
// Directory Models
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateUserRequest {
    pub name: String,
    pub password: String,
    #[serde(default)]
    pub organizator: bool,
    #[serde(default)]
    pub administrator: bool,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateGroupRequest {
    pub name: String,
    /// Users to add right away. The creator always joins.
    #[serde(default)]
    pub member_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct GroupResponse {
    pub group: Group,
    pub members: Vec<MemberSummary>,
}

/// `group_id` stays a string so a missing value can be told apart from a
/// malformed one.
#[derive(Debug, Clone, Deserialize, IntoParams)]
pub struct GroupMembersParams {
    pub group_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct GroupMembersResponse {
    pub members: Vec<MemberSummary>,
}

// =============================================================================
// Poll Models
// =============================================================================

fn default_max_options() -> u32 {
    1
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreatePollRequest {
    pub name: String,
    /// `None` never expires
    #[serde(default)]
    pub expires: Option<DateTime<Utc>>,
    #[serde(default)]
    pub anonymous: bool,
    /// Restrict voting to the members of this group
    #[serde(default)]
    pub group_id: Option<u64>,
    #[serde(default = "default_max_options")]
    pub max_options: u32,
    pub options: Vec<NewOption>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollDetails {
    pub poll: PollView,
    pub options: Vec<PollOption>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PollListResponse {
    pub polls: Vec<PollView>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VotedPollsResponse {
    pub polls: Vec<VotedPoll>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct BallotRequest {
    pub option_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq, Eq)]
pub struct BallotReceipt {
    pub poll_id: u64,
    /// Options recorded
    pub option_ids: Vec<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PollResultsResponse {
    pub poll_id: u64,
    /// Ordered by option order
    pub results: Vec<OptionResult>,
    pub total_votes: u64,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct VoterChoicesResponse {
    pub poll_id: u64,
    pub choices: Vec<VoterChoice>,
}

// =============================================================================
// Anonymous Voting Models
// =============================================================================

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct IssueTokensRequest {
    pub count: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssuedTokensResponse {
    pub poll_id: u64,
    /// SPKI PEM the tokens verify against
    pub verification_key: String,
    pub tokens: Vec<IssuedToken>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct TokenBallotRequest {
    /// Encoded token bundle
    pub token_data: String,
    pub option_ids: Vec<u64>,
}

/// A voter key handed to the poll owner for distribution.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IssuedVoterKey {
    pub user_id: u64,
    pub voter_key_id: u64,
    /// PKCS#8 PEM
    pub private_key: String,
    /// SPKI PEM
    pub public_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct VoterKeysResponse {
    pub poll_id: u64,
    pub voters: Vec<IssuedVoterKey>,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct VoterKeyBallotRequest {
    pub voter_key_id: u64,
    pub option_ids: Vec<u64>,
    /// Base64 RSASSA-PKCS1-v1_5/SHA-256 signature by the voter key over
    /// `"{poll_id}:{voter_key_id}:{sorted option ids, comma separated}"`
    pub proof: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct CreateBlindSignatureRequest {
    pub blinded_message: String,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct SignBlindSignatureRequest {
    /// Base64 blind signature computed by the poll authority
    pub signature: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct PendingBlindSignaturesResponse {
    pub requests: Vec<BlindSignatureRequest>,
}

// =============================================================================
// Audit Models
// =============================================================================

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
pub struct AuditQueryParams {
    pub event_type: Option<AuditEventType>,
    pub entity_type: Option<String>,
    pub entity_id: Option<String>,
    /// Inclusive lower bound, RFC 3339
    pub start: Option<DateTime<Utc>>,
    /// Inclusive upper bound, RFC 3339
    pub end: Option<DateTime<Utc>>,
    /// Page size (default 50)
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditLogEntry>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn create_poll_request_defaults() {
        let request: CreatePollRequest = serde_json::from_str(
            r#"{"name": "Lunch", "options": [{"content": "Pizza"}, {"content": "Soup", "option_order": 5}]}"#,
        )
        .unwrap();
        assert_eq!(request.max_options, 1);
        assert!(!request.anonymous);
        assert!(request.expires.is_none());
        assert_eq!(request.options[1].option_order, Some(5));
    }

    #[test]
    fn create_user_flags_default_off() {
        let request: CreateUserRequest =
            serde_json::from_str(r#"{"name": "kim", "password": "pw"}"#).unwrap();
        assert!(!request.organizator && !request.administrator);
    }
}
