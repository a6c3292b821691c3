// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Blind signature requests.
//!
//! A voter submits a blinded message for a poll; the poll owner computes
//! the blind signature outside the service and records it here. The
//! service never signs submitted messages itself: the poll signing key
//! only ever signs tokens minted by the issuer.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use base64ct::{Base64, Encoding};

use super::{blocking, can_access_poll};
use crate::{
    auth::{Auth, AuthError, OwnershipEnforcer},
    error::ApiError,
    models::{
        CreateBlindSignatureRequest, PendingBlindSignaturesResponse, SignBlindSignatureRequest,
    },
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, BlindSignatureRepository,
        BlindSignatureRequest, PollRepository,
    },
};

/// Submit a blinded message for signing.
#[utoipa::path(
    post,
    path = "/api/polls/{poll_id}/blind-signatures",
    tag = "Blind Signatures",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    request_body = CreateBlindSignatureRequest,
    responses(
        (status = 201, description = "Request stored", body = BlindSignatureRequest),
        (status = 400, description = "Empty message or poll not anonymous"),
        (status = 403, description = "No access to the poll"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn request_blind_signature(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
    Json(request): Json<CreateBlindSignatureRequest>,
) -> Result<(StatusCode, Json<BlindSignatureRequest>), ApiError> {
    let voter = user.clone();
    let created = blocking(&state, move |db| {
        let poll = PollRepository::new(db).get(poll_id)?;
        if !poll.anonymous {
            return Err(ApiError::bad_request("Poll is not anonymous"));
        }
        if !can_access_poll(db, &poll, &voter)? {
            return Err(AuthError::InsufficientPermissions.into());
        }
        Ok::<_, ApiError>(BlindSignatureRepository::new(db).create(poll_id, &request.blinded_message)?)
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::BlindSignatureRequested, "blind_signature_request")
            .with_entity_id(created.id)
            .with_user(user.user_id),
    );

    Ok((StatusCode::CREATED, Json(created)))
}

/// Unsigned requests of a poll. Owner or admin only.
#[utoipa::path(
    get,
    path = "/api/polls/{poll_id}/blind-signatures/pending",
    tag = "Blind Signatures",
    params(("poll_id" = u64, Path, description = "Poll ID")),
    responses(
        (status = 200, description = "Pending requests", body = PendingBlindSignaturesResponse),
        (status = 403, description = "Not the poll owner"),
        (status = 404, description = "Poll not found")
    )
)]
pub async fn pending_blind_signatures(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(poll_id): Path<u64>,
) -> Result<Json<PendingBlindSignaturesResponse>, ApiError> {
    PollRepository::new(&state.db)
        .get(poll_id)?
        .verify_ownership(&user)?;
    let requests = BlindSignatureRepository::new(&state.db).pending_by_poll(poll_id)?;
    Ok(Json(PendingBlindSignaturesResponse { requests }))
}

/// Record the blind signature for a pending request. Owner or admin only.
#[utoipa::path(
    post,
    path = "/api/blind-signatures/{request_id}/sign",
    tag = "Blind Signatures",
    params(("request_id" = u64, Path, description = "Blind signature request ID")),
    request_body = SignBlindSignatureRequest,
    responses(
        (status = 200, description = "Signature recorded", body = BlindSignatureRequest),
        (status = 400, description = "Signature missing or not base64"),
        (status = 403, description = "Not the poll owner"),
        (status = 404, description = "Request not found"),
        (status = 409, description = "Request already signed")
    )
)]
pub async fn sign_blind_signature(
    Auth(user): Auth,
    State(state): State<AppState>,
    Path(request_id): Path<u64>,
    Json(body): Json<SignBlindSignatureRequest>,
) -> Result<Json<BlindSignatureRequest>, ApiError> {
    let signature = body.signature.trim().to_string();
    if Base64::decode_vec(&signature).is_err() {
        return Err(ApiError::bad_request("Signature is not valid base64"));
    }

    let owner = user.clone();
    let signed = blocking(&state, move |db| {
        let repo = BlindSignatureRepository::new(db);
        let pending = repo.get(request_id)?;
        PollRepository::new(db)
            .get(pending.poll_id)?
            .verify_ownership(&owner)?;
        Ok::<_, ApiError>(repo.sign(request_id, &signature)?)
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::BlindSignatureIssued, "blind_signature_request")
            .with_entity_id(request_id)
            .with_user(user.user_id),
    );

    Ok(Json(signed))
}
