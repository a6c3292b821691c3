// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Poll management, authenticated ballots and results.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::json;

use super::{blocking, can_access_poll};
use crate::{
    auth::{Auth, AuthError, OrganizerOnly, OwnershipEnforcer},
    error::ApiError,
    models::{
        BallotReceipt, BallotRequest, CreatePollRequest, PollDetails, PollListResponse,
        PollResultsResponse, VotedPollsResponse, VoterChoicesResponse,
    },
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, Ballot, BallotVoter, CreatePoll,
        GroupRepository, PollOptionRepository, PollRepository, PollView, VoteRecorder,
    },
};

/// Open polls the user can see, most recently updated first.
#[utoipa::path(
    get,
    path = "/api/polls",
    tag = "Polls",
    responses(
        (status = 200, description = "Open polls", body = PollListResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn list_polls(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<PollListResponse>, ApiError> {
    let polls = blocking(&state, move |db| {
        let mut visible = Vec::new();
        for poll in PollRepository::new(db).active(Utc::now())? {
            if can_access_poll(db, &poll, &user)? {
                visible.push(PollView::from(poll));
            }
        }
        Ok::<_, ApiError>(visible)
    })
    .await?;

    Ok(Json(PollListResponse { polls }))
}

/// Create a poll with its options. Organizers only.
#[utoipa::path(
    post,
    path = "/api/polls",
    tag = "Polls",
    request_body = CreatePollRequest,
    responses(
        (status = 201, description = "Poll created", body = PollDetails),
        (status = 400, description = "Invalid poll"),
        (status = 403, description = "Organizer role required, or group not owned"),
        (status = 404, description = "Group not found")
    )
)]
pub async fn create_poll(
    OrganizerOnly(user): OrganizerOnly,
    State(state): State<AppState>,
    Json(request): Json<CreatePollRequest>,
) -> Result<(StatusCode, Json<PollDetails>), ApiError> {
    if request.options.is_empty() {
        return Err(ApiError::bad_request("A poll needs at least one option"));
    }
    if request.max_options as usize > request.options.len() {
        return Err(ApiError::bad_request(
            "max_options cannot exceed the number of options",
        ));
    }

    let owner = user.clone();
    let (poll, options) = blocking(&state, move |db| {
        if let Some(group_id) = request.group_id {
            GroupRepository::new(db)
                .get(group_id)?
                .verify_ownership(&owner)?;
        }
        let created = PollRepository::new(db).create_with_options(
            &CreatePoll {
                name: request.name,
                owner_id: owner.user_id,
                expires: request.expires,
                anonymous: request.anonymous,
                group_id: request.group_id,
                max_options: request.max_options,
            },
            &request.options,
        )?;
        Ok::<_, ApiError>(created)
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::PollCreated, "poll")
            .with_entity_id(poll.id)
            .with_user(user.user_id)
            .with_metadata(json!({
                "anonymous": poll.anonymous,
                "group_id": poll.group_id,
                "options": options.len(),
            })),
    );

    Ok((
        StatusCode::CREATED,
        Json(PollDetails {
            poll: poll.into(),
            options,
        }),
    ))
}

/// Polls the user has cast an authenticated ballot in.
#[utoipa::path(
    get,
    path = "/api/polls/voted",
    tag = "Polls",
    responses(
        (status = 200, description = "Polls voted in", body = VotedPollsResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn voted_polls(
    Auth(user): Auth,
    State(state): State<AppState>,
) -> Result<Json<VotedPollsResponse>, ApiError> {
    let polls = VoteRecorder::new(&state.db).polls_voted_by_user(user.user_id)?;
    Ok(Json(VotedPollsResponse { polls }))
}

/// A poll with its options.
#[utoipa::path(
    get,
    path = "/api/polls/{poll_id}",
    tag = "Polls",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    responses(
        (status = 200, description = "Poll", body = PollDetails),
        (status = 403, description = "Not a member of the poll's group"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn get_poll(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
) -> Result<Json<PollDetails>, ApiError> {
    let poll = PollRepository::new(&state.db).get(poll_id)?;
    if !can_access_poll(&state.db, &poll, &user)? {
        return Err(AuthError::InsufficientPermissions.into());
    }
    let options = PollOptionRepository::new(&state.db).by_poll(poll_id)?;
    Ok(Json(PollDetails {
        poll: poll.into(),
        options,
    }))
}

/// Delete a poll and everything recorded for it. Owner or admin only.
#[utoipa::path(
    delete,
    path = "/api/polls/{poll_id}",
    tag = "Polls",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    responses(
        (status = 204, description = "Poll deleted"),
        (status = 403, description = "Not the poll owner"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn delete_poll(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
) -> Result<StatusCode, ApiError> {
    let polls = PollRepository::new(&state.db);
    polls.get(poll_id)?.verify_ownership(&user)?;
    polls.delete(poll_id)?;
    state.verification_keys.invalidate(poll_id);
    Ok(StatusCode::NO_CONTENT)
}

/// Vote counts per option, in option order.
#[utoipa::path(
    get,
    path = "/api/polls/{poll_id}/results",
    tag = "Polls",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    responses(
        (status = 200, description = "Results", body = PollResultsResponse),
        (status = 403, description = "Not a member of the poll's group"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn poll_results(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
) -> Result<Json<PollResultsResponse>, ApiError> {
    let poll = PollRepository::new(&state.db).get(poll_id)?;
    if !can_access_poll(&state.db, &poll, &user)? {
        return Err(AuthError::InsufficientPermissions.into());
    }
    let results = VoteRecorder::new(&state.db).get_poll_results(poll_id)?;
    let total_votes = results.iter().map(|r| r.vote_count).sum();
    Ok(Json(PollResultsResponse {
        poll_id,
        results,
        total_votes,
    }))
}

/// Who chose what in a non-anonymous poll. Owner or admin only.
#[utoipa::path(
    get,
    path = "/api/polls/{poll_id}/choices",
    tag = "Polls",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    responses(
        (status = 200, description = "Choices", body = VoterChoicesResponse),
        (status = 400, description = "Poll is anonymous"),
        (status = 403, description = "Not the poll owner"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn voter_choices(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
) -> Result<Json<VoterChoicesResponse>, ApiError> {
    let poll = PollRepository::new(&state.db).get(poll_id)?;
    poll.verify_ownership(&user)?;
    if poll.anonymous {
        return Err(ApiError::bad_request("Poll is anonymous"));
    }
    let choices = VoteRecorder::new(&state.db).voter_choices(poll_id)?;
    Ok(Json(VoterChoicesResponse { poll_id, choices }))
}

/// Cast the logged-in user's ballot in a non-anonymous poll.
#[utoipa::path(
    post,
    path = "/api/polls/{poll_id}/votes",
    tag = "Polls",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    request_body = BallotRequest,
    responses(
        (status = 201, description = "Ballot recorded", body = BallotReceipt),
        (status = 400, description = "Invalid selection, expired or anonymous poll"),
        (status = 403, description = "Not a member of the poll's group"),
        (status = 404, description = "Poll not found"),
        (status = 409, description = "Already voted")
    )
)]
pub async fn cast_vote(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
    Json(request): Json<BallotRequest>,
) -> Result<(StatusCode, Json<BallotReceipt>), ApiError> {
    let poll = PollRepository::new(&state.db).get(poll_id)?;
    if poll.anonymous {
        return Err(ApiError::bad_request(
            "Poll only accepts anonymous ballots",
        ));
    }
    if !can_access_poll(&state.db, &poll, &user)? {
        return Err(AuthError::InsufficientPermissions.into());
    }

    let recorded = VoteRecorder::new(&state.db).cast_ballot(&Ballot {
        poll_id,
        option_ids: request.option_ids,
        voter: BallotVoter::User(user.user_id),
    })?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::VoteCast, "poll")
            .with_entity_id(poll_id)
            .with_user(user.user_id),
    );

    Ok((
        StatusCode::CREATED,
        Json(BallotReceipt {
            poll_id,
            option_ids: recorded.iter().map(|vote| vote.option_id).collect(),
        }),
    ))
}
