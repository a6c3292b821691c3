// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{extract::State, http::StatusCode, Json};
use serde_json::json;

use super::blocking;
use crate::{
    auth::AdminOnly,
    error::ApiError,
    models::CreateUserRequest,
    state::AppState,
    storage::{AuditEvent, AuditEventType, AuditRepository, CreateUser, UserProfile, UserRepository},
};

/// List all users. Admin only.
#[utoipa::path(
    get,
    path = "/api/users",
    tag = "Users",
    responses(
        (status = 200, description = "All users", body = [UserProfile]),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn list_users(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
) -> Result<Json<Vec<UserProfile>>, ApiError> {
    Ok(Json(UserRepository::new(&state.db).list()?))
}

/// Create a user. Admin only.
#[utoipa::path(
    post,
    path = "/api/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserProfile),
        (status = 400, description = "Invalid name or password"),
        (status = 403, description = "Not authorized (admin required)"),
        (status = 409, description = "Name already taken")
    )
)]
pub async fn create_user(
    AdminOnly(admin): AdminOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserProfile>), ApiError> {
    let profile = blocking(&state, move |db| {
        UserRepository::new(db).create(&CreateUser {
            name: request.name,
            password: request.password,
            organizator: request.organizator,
            administrator: request.administrator,
        })
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::UserCreated, "user")
            .with_entity_id(profile.id)
            .with_user(admin.user_id)
            .with_metadata(json!({
                "organizator": profile.organizator,
                "administrator": profile.administrator,
            })),
    );

    Ok((StatusCode::CREATED, Json(profile)))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::tests::{login_as, request, send};
    use crate::state::test_state;
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn admin_creates_users_without_leaking_hashes() {
        let (state, _dir) = test_state();
        let (_, admin) = login_as(&state, "root", false, true).await;
        let app = router(state, Duration::from_secs(5));

        let (status, body) = send(
            &app,
            request(
                "POST",
                "/api/users",
                Some(&admin),
                Some(json!({ "name": "olga", "password": "pw", "organizator": true })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        assert_eq!(body["name"], "olga");
        assert_eq!(body["organizator"], true);
        assert!(body.get("password_hash").is_none());

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/users",
                Some(&admin),
                Some(json!({ "name": "olga", "password": "pw" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, body) = send(&app, request("GET", "/api/users", Some(&admin), None)).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body.as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn members_cannot_create_users() {
        let (state, _dir) = test_state();
        let (_, member) = login_as(&state, "pat", true, false).await;
        let app = router(state, Duration::from_secs(5));

        let (status, _) = send(
            &app,
            request(
                "POST",
                "/api/users",
                Some(&member),
                Some(json!({ "name": "x", "password": "pw" })),
            ),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
