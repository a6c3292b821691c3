// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Login and logout.

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

use super::blocking;
use crate::{
    audit_log,
    auth::{Auth, AuthError, AuthenticatedUser, Session, SESSION_USER_KEY},
    error::ApiError,
    models::{LoginRequest, SessionResponse},
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditRepository, UserRepository},
};

/// Log in with name and password.
#[utoipa::path(
    post,
    path = "/api/session",
    tag = "Session",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Logged in", body = SessionResponse),
        (status = 401, description = "Invalid credentials")
    )
)]
pub async fn login(
    State(state): State<AppState>,
    session: Session,
    Json(request): Json<LoginRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let name = request.name.trim().to_string();
    let lookup = name.clone();
    let profile = blocking(&state, move |db| {
        UserRepository::new(db).authenticate(&lookup, &request.password)
    })
    .await?;

    let Some(profile) = profile else {
        tracing::info!(%name, "Login rejected");
        AuditRepository::new(&state.db).log(
            &AuditEvent::new(AuditEventType::LoginFailed, "user")
                .with_metadata(json!({ "name": name })),
        );
        return Err(AuthError::InvalidCredentials.into());
    };

    let user = AuthenticatedUser::from(profile);
    let session = session.regenerate().await;
    session
        .set(SESSION_USER_KEY, &user)
        .await
        .map_err(ApiError::internal)?;

    tracing::info!(user_id = user.user_id, "User logged in");
    audit_log!(&state.db, AuditEventType::LoginSucceeded, "user", user.user_id, &user);

    Ok(Json(SessionResponse { user }))
}

/// The logged-in user.
#[utoipa::path(
    get,
    path = "/api/session",
    tag = "Session",
    responses(
        (status = 200, description = "Current user", body = SessionResponse),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn current_session(Auth(user): Auth) -> Json<SessionResponse> {
    Json(SessionResponse { user })
}

/// Log out. Succeeds whether or not the session was logged in.
#[utoipa::path(
    delete,
    path = "/api/session",
    tag = "Session",
    responses(
        (status = 204, description = "Logged out")
    )
)]
pub async fn logout(session: Session) -> StatusCode {
    session.destroy().await;
    StatusCode::NO_CONTENT
}
