// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Anonymous ballots.
//!
//! Two paths lead to an anonymous ballot:
//!
//! - **Tokens**: the poll owner issues signed voting tokens and hands them
//!   out. Anyone holding an unspent token may cast one ballot with it; no
//!   session is needed.
//! - **Voter keys**: the poll owner issues one RSA keypair per group member.
//!   A ballot is accepted when it carries a signature by the voter's key
//!   over the ballot message, and each key votes once.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64ct::{Base64, Encoding};
use serde_json::json;

use super::blocking;
use crate::{
    auth::{Auth, OwnershipEnforcer},
    error::ApiError,
    models::{
        BallotReceipt, IssueTokensRequest, IssuedTokensResponse, IssuedVoterKey,
        TokenBallotRequest, VoterKeyBallotRequest, VoterKeysResponse,
    },
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, Ballot, BallotVoter, Poll, PollRepository,
        PollVoterRepository, StoreError, VoteRecorder,
    },
    voting::{TokenIssuer, TokenRedeemer, MAX_TOKENS_PER_BATCH},
};

fn require_anonymous(poll: &Poll) -> Result<(), ApiError> {
    if poll.anonymous {
        Ok(())
    } else {
        Err(ApiError::bad_request("Poll is not anonymous"))
    }
}

/// Issue voting tokens for a poll. Owner or admin only.
///
/// Tokens are returned once and not stored; only their hashes are recorded
/// when they are spent.
#[utoipa::path(
    post,
    path = "/api/polls/{poll_id}/tokens",
    tag = "Anonymous",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    request_body = IssueTokensRequest,
    responses(
        (status = 201, description = "Tokens issued", body = IssuedTokensResponse),
        (status = 400, description = "Invalid count or poll not anonymous"),
        (status = 403, description = "Not the poll owner"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn issue_tokens(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
    Json(request): Json<IssueTokensRequest>,
) -> Result<(StatusCode, Json<IssuedTokensResponse>), ApiError> {
    if request.count == 0 || request.count > MAX_TOKENS_PER_BATCH {
        return Err(ApiError::bad_request(format!(
            "count must be between 1 and {MAX_TOKENS_PER_BATCH}"
        )));
    }

    let poll = PollRepository::new(&state.db).get(poll_id)?;
    poll.verify_ownership(&user)?;
    require_anonymous(&poll)?;

    let count = request.count;
    let response = blocking(&state, move |db| {
        let tokens = TokenIssuer::new(db).generate_tokens(poll_id, count)?;
        let keys = PollRepository::new(db).ensure_signing_keys(poll_id)?;
        Ok::<_, StoreError>(IssuedTokensResponse {
            poll_id,
            verification_key: keys.verification_key,
            tokens,
        })
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::TokensIssued, "poll")
            .with_entity_id(poll_id)
            .with_user(user.user_id)
            .with_metadata(json!({ "count": count })),
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// Cast a ballot with a voting token. No session required.
#[utoipa::path(
    post,
    path = "/api/polls/{poll_id}/token-votes",
    tag = "Anonymous",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    request_body = TokenBallotRequest,
    responses(
        (status = 201, description = "Ballot recorded", body = BallotReceipt),
        (status = 400, description = "Malformed or forged token, or invalid selection"),
        (status = 404, description = "Poll not found"),
        (status = 409, description = "Token already used")
    )
)]
pub async fn cast_token_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
    Json(request): Json<TokenBallotRequest>,
) -> Result<(StatusCode, Json<BallotReceipt>), ApiError> {
    let keys = Arc::clone(&state.verification_keys);
    let option_ids = blocking(&state, move |db| {
        let verified = TokenRedeemer::new(db, &keys).verify(&request.token_data)?;
        if verified.poll_id != poll_id {
            return Err(ApiError::bad_request(
                "Voting token was issued for another poll",
            ));
        }
        let recorded = VoteRecorder::new(db).cast_ballot(&Ballot {
            poll_id,
            option_ids: request.option_ids,
            voter: BallotVoter::Token {
                token_hash: verified.token_hash,
            },
        })?;
        Ok::<_, ApiError>(recorded.iter().map(|vote| vote.option_id).collect::<Vec<_>>())
    })
    .await?;

    AuditRepository::new(&state.db)
        .log(&AuditEvent::new(AuditEventType::TokenVoteCast, "poll").with_entity_id(poll_id));

    Ok((
        StatusCode::CREATED,
        Json(BallotReceipt {
            poll_id,
            option_ids,
        }),
    ))
}

/// Issue one voter key per member of the poll's group. Owner or admin only.
///
/// Keys are issued once per poll; the response is the only copy of the
/// private keys handed out.
#[utoipa::path(
    post,
    path = "/api/polls/{poll_id}/voters",
    tag = "Anonymous",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    responses(
        (status = 201, description = "Voter keys issued", body = VoterKeysResponse),
        (status = 400, description = "Poll is not anonymous or has no group"),
        (status = 403, description = "Not the poll owner"),
        (status = 404, description = "Poll not found"),
        (status = 409, description = "Voter keys already issued")
    )
)]
pub async fn issue_voter_keys(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
) -> Result<(StatusCode, Json<VoterKeysResponse>), ApiError> {
    let poll = PollRepository::new(&state.db).get(poll_id)?;
    poll.verify_ownership(&user)?;
    require_anonymous(&poll)?;
    let group_id = poll
        .group_id
        .ok_or_else(|| ApiError::bad_request("Poll has no group"))?;

    let voters = blocking(&state, move |db| {
        PollRepository::new(db).ensure_signing_keys(poll_id)?;
        PollVoterRepository::new(db).generate_keypairs_for_group(poll_id, group_id)
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::VoterKeysIssued, "poll")
            .with_entity_id(poll_id)
            .with_user(user.user_id)
            .with_metadata(json!({ "group_id": group_id, "count": voters.len() })),
    );

    let voters = voters
        .into_iter()
        .map(|issued| IssuedVoterKey {
            user_id: issued.user_id,
            voter_key_id: issued.voter.id,
            private_key: issued.voter.private_key,
            public_key: issued.voter.public_key,
        })
        .collect();

    Ok((StatusCode::CREATED, Json(VoterKeysResponse { poll_id, voters })))
}

/// Cast a ballot with a voter key. No session required.
#[utoipa::path(
    post,
    path = "/api/polls/{poll_id}/anonymous-votes",
    tag = "Anonymous",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    request_body = VoterKeyBallotRequest,
    responses(
        (status = 201, description = "Ballot recorded", body = BallotReceipt),
        (status = 400, description = "Invalid selection or key of another poll"),
        (status = 403, description = "Proof does not match the voter key"),
        (status = 404, description = "Poll or voter key not found"),
        (status = 409, description = "Voter key already used")
    )
)]
pub async fn cast_anonymous_vote(
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
    Json(request): Json<VoterKeyBallotRequest>,
) -> Result<(StatusCode, Json<BallotReceipt>), ApiError> {
    let proof = Base64::decode_vec(request.proof.trim())
        .map_err(|_| ApiError::bad_request("Ballot proof is not valid base64"))?;

    let option_ids = blocking(&state, move |db| {
        let voter = PollVoterRepository::new(db).get(request.voter_key_id)?;
        if voter.poll_id != poll_id {
            return Err(ApiError::bad_request(
                "Voter key was not issued for this poll",
            ));
        }
        if !voter
            .verify_ballot_proof(&request.option_ids, &proof)
            .map_err(StoreError::from)?
        {
            tracing::warn!(poll_id, voter_key_id = voter.id, "Ballot proof rejected");
            return Err(ApiError::forbidden("Ballot proof does not match the voter key"));
        }
        let recorded = VoteRecorder::new(db).cast_ballot(&Ballot {
            poll_id,
            option_ids: request.option_ids,
            voter: BallotVoter::VoterKey(voter.id),
        })?;
        Ok::<_, ApiError>(recorded.iter().map(|vote| vote.option_id).collect::<Vec<_>>())
    })
    .await?;

    AuditRepository::new(&state.db)
        .log(&AuditEvent::new(AuditEventType::AnonymousVoteCast, "poll").with_entity_id(poll_id));

    Ok((
        StatusCode::CREATED,
        Json(BallotReceipt {
            poll_id,
            option_ids,
        }),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use crate::api::tests::{login_as, request, send};
    use crate::state::test_state;
    use crate::storage::repository::polls::tests::seed_poll;
    use crate::storage::{
        AuditFilter, CreateGroup, CreatePoll, GroupRepository, NewOption, PollVoter,
        UsedTokenGuard,
    };
    use crate::voting::crypto::sign;
    use crate::voting::TokenBundle;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn issued_token_casts_exactly_one_ballot() {
        let (state, _dir) = test_state();
        let (owner, organizer) = login_as(&state, "fay", true, false).await;
        let (poll, options) = PollRepository::new(&state.db)
            .create_with_options(
                &CreatePoll {
                    name: "Retreat".into(),
                    owner_id: owner.user_id,
                    expires: None,
                    anonymous: true,
                    group_id: None,
                    max_options: 1,
                },
                &[
                    NewOption {
                        content: "Lake".into(),
                        option_order: None,
                    },
                    NewOption {
                        content: "Hills".into(),
                        option_order: None,
                    },
                ],
            )
            .unwrap();
        let app = router(state.clone(), Duration::from_secs(5));

        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/api/polls/{}/tokens", poll.id),
                Some(&organizer),
                Some(json!({ "count": 2 })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["tokens"].as_array().unwrap().len(), 2);
        assert!(body["verification_key"]
            .as_str()
            .unwrap()
            .starts_with("-----BEGIN PUBLIC KEY-----"));
        let token_data = body["tokens"][0]["token_data"].as_str().unwrap().to_string();
        let token_hash = body["tokens"][0]["token_hash"].as_str().unwrap().to_string();

        let ballot = json!({ "token_data": token_data, "option_ids": [options[1].id] });
        let uri = format!("/api/polls/{}/token-votes", poll.id);
        let (status, body) = send(&app, request("POST", &uri, None, Some(ballot.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["option_ids"], json!([options[1].id]));
        assert!(UsedTokenGuard::new(&state.db).is_used(poll.id, &token_hash).unwrap());

        let (status, _) = send(&app, request("POST", &uri, None, Some(ballot))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let results = VoteRecorder::new(&state.db).get_poll_results(poll.id).unwrap();
        assert_eq!(results[1].vote_count, 1);

        // No token material in the audit log
        let entries = AuditRepository::new(&state.db)
            .query(&AuditFilter::default(), 100, 0)
            .unwrap();
        let dump = serde_json::to_string(&entries).unwrap();
        assert!(!dump.contains(&token_hash));
        assert!(!dump.contains(&token_data));
    }

    #[tokio::test]
    async fn token_for_another_poll_is_rejected() {
        let (state, _dir) = test_state();
        let (owner, first, first_options) = seed_poll(&state.db, true);
        let second = PollRepository::new(&state.db)
            .create(&CreatePoll {
                name: "Dinner".into(),
                owner_id: owner,
                expires: None,
                anonymous: true,
                group_id: None,
                max_options: 1,
            })
            .unwrap();
        let issued = TokenIssuer::new(&state.db).generate_tokens(second.id, 1).unwrap();
        let app = router(state.clone(), Duration::from_secs(5));

        let (status, body) = send(
            &app,
            request(
                "POST",
                &format!("/api/polls/{}/token-votes", first.id),
                None,
                Some(json!({
                    "token_data": issued[0].token_data,
                    "option_ids": [first_options[0].id],
                })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["error"], "Voting token was issued for another poll");
        assert!(!UsedTokenGuard::new(&state.db)
            .is_used(second.id, &issued[0].token_hash)
            .unwrap());
    }

    #[tokio::test]
    async fn forged_token_is_rejected() {
        let (state, _dir) = test_state();
        let (_, poll, options) = seed_poll(&state.db, true);
        PollRepository::new(&state.db).ensure_signing_keys(poll.id).unwrap();
        let forged = TokenBundle::new("00".repeat(32), &[7; 256], poll.id)
            .encode()
            .unwrap();
        let app = router(state, Duration::from_secs(5));

        let (status, _) = send(
            &app,
            request(
                "POST",
                &format!("/api/polls/{}/token-votes", poll.id),
                None,
                Some(json!({ "token_data": forged, "option_ids": [options[0].id] })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn token_issuance_is_owner_only() {
        let (state, _dir) = test_state();
        let (_, poll, _) = seed_poll(&state.db, true);
        let (_, stranger) = login_as(&state, "gus", true, false).await;
        let app = router(state, Duration::from_secs(5));

        let uri = format!("/api/polls/{}/tokens", poll.id);
        let (status, _) = send(&app, request("POST", &uri, Some(&stranger), Some(json!({ "count": 1 })))).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        let (status, _) = send(&app, request("POST", &uri, None, Some(json!({ "count": 1 })))).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn voter_key_ballot_needs_a_matching_proof() {
        let (state, _dir) = test_state();
        let (owner, organizer) = login_as(&state, "hana", true, false).await;
        let (member, _) = login_as(&state, "ike", false, false).await;
        let group = GroupRepository::new(&state.db)
            .create(&CreateGroup {
                name: "panel".into(),
                owner_id: owner.user_id,
            })
            .unwrap();
        GroupRepository::new(&state.db)
            .add_members(group.id, &[owner.user_id, member.user_id])
            .unwrap();
        let (poll, options) = PollRepository::new(&state.db)
            .create_with_options(
                &CreatePoll {
                    name: "Chair".into(),
                    owner_id: owner.user_id,
                    expires: None,
                    anonymous: true,
                    group_id: Some(group.id),
                    max_options: 1,
                },
                &[NewOption {
                    content: "Jo".into(),
                    option_order: None,
                }],
            )
            .unwrap();
        let app = router(state.clone(), Duration::from_secs(5));

        let voters_uri = format!("/api/polls/{}/voters", poll.id);
        let (status, body) = send(&app, request("POST", &voters_uri, Some(&organizer), None)).await;
        assert_eq!(status, StatusCode::CREATED);
        let voters = body["voters"].as_array().unwrap().clone();
        assert_eq!(voters.len(), 2);
        let (status, _) = send(&app, request("POST", &voters_uri, Some(&organizer), None)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let key = voters
            .iter()
            .find(|v| v["user_id"] == member.user_id)
            .unwrap();
        let voter_key_id = key["voter_key_id"].as_u64().unwrap();
        let private_key = key["private_key"].as_str().unwrap();
        let option_ids = vec![options[0].id];
        let message = PollVoter::ballot_message(poll.id, voter_key_id, &option_ids);
        let proof = Base64::encode_string(&sign(private_key, message.as_bytes()).unwrap());

        let vote_uri = format!("/api/polls/{}/anonymous-votes", poll.id);
        let forged = Base64::encode_string(&[1u8; 256]);
        let (status, _) = send(
            &app,
            request(
                "POST",
                &vote_uri,
                None,
                Some(json!({ "voter_key_id": voter_key_id, "option_ids": option_ids, "proof": forged })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let ballot = json!({ "voter_key_id": voter_key_id, "option_ids": option_ids, "proof": proof });
        let (status, _) = send(&app, request("POST", &vote_uri, None, Some(ballot.clone()))).await;
        assert_eq!(status, StatusCode::CREATED);
        let (status, _) = send(&app, request("POST", &vote_uri, None, Some(ballot))).await;
        assert_eq!(status, StatusCode::CONFLICT);

        assert!(VoteRecorder::new(&state.db)
            .has_voter_key_voted(poll.id, voter_key_id)
            .unwrap());
    }

    #[tokio::test]
    async fn voter_keys_need_a_group_poll() {
        let (state, _dir) = test_state();
        let (owner, organizer) = login_as(&state, "jay", true, false).await;
        let poll = PollRepository::new(&state.db)
            .create(&CreatePoll {
                name: "Open".into(),
                owner_id: owner.user_id,
                expires: None,
                anonymous: true,
                group_id: None,
                max_options: 1,
            })
            .unwrap();
        let app = router(state, Duration::from_secs(5));
        let (status, body) = send(
            &app,
            request("POST", &format!("/api/polls/{}/voters", poll.id), Some(&organizer), None),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body, json!({ "error": "Poll has no group" }));
    }
}
