// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use std::{sync::Arc, time::Duration};

use axum::{
    extract::{Request, State},
    http::StatusCode,
    middleware::{self, Next},
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    trace::TraceLayer,
};
use utoipa::OpenApi;
use utoipa_swagger_ui::SwaggerUi;

use crate::{
    auth::{session_guard, AuthenticatedUser, Role},
    error::ApiError,
    models::{
        AuditLogResponse, BallotReceipt, BallotRequest, CreateBlindSignatureRequest,
        CreateGroupRequest, CreatePollRequest, CreateUserRequest, GroupMembersResponse,
        GroupResponse, IssueTokensRequest, IssuedTokensResponse, IssuedVoterKey, LoginRequest,
        PendingBlindSignaturesResponse, PollDetails, PollListResponse, PollResultsResponse,
        SessionResponse, SignBlindSignatureRequest, TokenBallotRequest, VoterChoicesResponse, VoterKeyBallotRequest,
        VoterKeysResponse, VotedPollsResponse,
    },
    state::AppState,
    storage::{
        AuditEventType, AuditLogEntry, BlindSignatureRequest, Database, Group, MemberSummary,
        MembershipRepository, NewOption, OptionResult, Poll, PollOption, PollView, StoreResult,
        UserProfile, VotedPoll, VoterChoice,
    },
    voting::IssuedToken,
};

pub mod anonymous;
pub mod audit;
pub mod blind_signatures;
pub mod groups;
pub mod health;
pub mod polls;
pub mod session;
pub mod users;

pub fn router(state: AppState, request_timeout: Duration) -> Router {
    let api_routes = Router::new()
        .route(
            "/session",
            get(session::current_session)
                .post(session::login)
                .delete(session::logout),
        )
        .route("/users", get(users::list_users).post(users::create_user))
        .route("/groups", post(groups::create_group))
        .route("/group-members", get(groups::group_members))
        .route("/polls", get(polls::list_polls).post(polls::create_poll))
        .route("/polls/voted", get(polls::voted_polls))
        .route(
            "/polls/{poll_id}",
            get(polls::get_poll).delete(polls::delete_poll),
        )
        .route("/polls/{poll_id}/results", get(polls::poll_results))
        .route("/polls/{poll_id}/choices", get(polls::voter_choices))
        .route("/polls/{poll_id}/votes", post(polls::cast_vote))
        .route("/polls/{poll_id}/tokens", post(anonymous::issue_tokens))
        .route(
            "/polls/{poll_id}/token-votes",
            post(anonymous::cast_token_vote),
        )
        .route("/polls/{poll_id}/voters", post(anonymous::issue_voter_keys))
        .route(
            "/polls/{poll_id}/anonymous-votes",
            post(anonymous::cast_anonymous_vote),
        )
        .route(
            "/polls/{poll_id}/blind-signatures",
            post(blind_signatures::request_blind_signature),
        )
        .route(
            "/polls/{poll_id}/blind-signatures/pending",
            get(blind_signatures::pending_blind_signatures),
        )
        .route(
            "/blind-signatures/{request_id}/sign",
            post(blind_signatures::sign_blind_signature),
        )
        .route("/audit", get(audit::query_audit_logs));

    Router::new()
        .route("/health", get(health::health))
        .route("/health/live", get(health::liveness))
        .route("/health/ready", get(health::readiness))
        .nest("/api", api_routes)
        .merge(SwaggerUi::new("/docs").url("/api-doc/openapi.json", ApiDoc::openapi()))
        .layer(middleware::from_fn_with_state(state.clone(), session_guard))
        .layer(middleware::from_fn_with_state(request_timeout, enforce_timeout))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

/// Answer `408` once a request has used up its time budget.
async fn enforce_timeout(
    State(budget): State<Duration>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();
    match tokio::time::timeout(budget, next.run(request)).await {
        Ok(response) => response,
        Err(_) => {
            tracing::warn!(%path, budget_ms = budget.as_millis() as u64, "Request timed out");
            ApiError::new(StatusCode::REQUEST_TIMEOUT, "Request timed out").into_response()
        }
    }
}

/// Run store work on the blocking pool.
///
/// Password hashing and RSA operations take milliseconds to seconds and
/// must not run on the async workers.
pub(crate) async fn blocking<T, E, F>(state: &AppState, job: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, E> + Send + 'static,
    T: Send + 'static,
    E: Into<ApiError> + Send + 'static,
{
    let db = Arc::clone(&state.db);
    tokio::task::spawn_blocking(move || job(&db))
        .await
        .map_err(ApiError::internal)?
        .map_err(Into::into)
}

/// Whether `user` may see a poll: polls without a group are open to every
/// logged-in user, group polls to members, the owner and administrators.
pub(crate) fn can_access_poll(
    db: &Database,
    poll: &Poll,
    user: &AuthenticatedUser,
) -> StoreResult<bool> {
    match poll.group_id {
        None => Ok(true),
        Some(_) if poll.owner_id == user.user_id || user.is_admin() => Ok(true),
        Some(group_id) => MembershipRepository::new(db).is_member(user.user_id, group_id),
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        health::liveness,
        health::readiness,
        session::login,
        session::current_session,
        session::logout,
        users::list_users,
        users::create_user,
        groups::create_group,
        groups::group_members,
        polls::list_polls,
        polls::create_poll,
        polls::voted_polls,
        polls::get_poll,
        polls::delete_poll,
        polls::poll_results,
        polls::voter_choices,
        polls::cast_vote,
        anonymous::issue_tokens,
        anonymous::cast_token_vote,
        anonymous::issue_voter_keys,
        anonymous::cast_anonymous_vote,
        blind_signatures::request_blind_signature,
        blind_signatures::pending_blind_signatures,
        blind_signatures::sign_blind_signature,
        audit::query_audit_logs
    ),
    components(
        schemas(
            health::HealthResponse,
            health::ReadyResponse,
            health::HealthChecks,
            LoginRequest,
            SessionResponse,
            AuthenticatedUser,
            Role,
            UserProfile,
            CreateUserRequest,
            Group,
            MemberSummary,
            CreateGroupRequest,
            GroupResponse,
            GroupMembersResponse,
            PollView,
            PollOption,
            NewOption,
            CreatePollRequest,
            PollDetails,
            PollListResponse,
            VotedPoll,
            VotedPollsResponse,
            BallotRequest,
            BallotReceipt,
            OptionResult,
            PollResultsResponse,
            VoterChoice,
            VoterChoicesResponse,
            IssueTokensRequest,
            IssuedToken,
            IssuedTokensResponse,
            TokenBallotRequest,
            IssuedVoterKey,
            VoterKeysResponse,
            VoterKeyBallotRequest,
            BlindSignatureRequest,
            CreateBlindSignatureRequest,
            SignBlindSignatureRequest,
            PendingBlindSignaturesResponse,
            AuditEventType,
            AuditLogEntry,
            AuditLogResponse
        )
    ),
    tags(
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Session", description = "Login and logout"),
        (name = "Users", description = "User administration"),
        (name = "Groups", description = "Groups and membership"),
        (name = "Polls", description = "Polls, ballots and results"),
        (name = "Anonymous", description = "Voting tokens and voter keys"),
        (name = "BlindSignatures", description = "Blind signature requests"),
        (name = "Audit", description = "Audit log queries")
    )
)]
struct ApiDoc;

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::auth::{SESSION_COOKIE, SESSION_USER_KEY};
    use crate::state::test_state;
    use crate::storage::{CreateUser, UserRepository};
    use axum::body::{to_bytes, Body};
    use axum::http::{header, Request as HttpRequest};
    use serde_json::Value;
    use tower::ServiceExt;

    /// Create a user and a logged-in session for them. Returns the session id.
    pub(crate) async fn login_as(
        state: &AppState,
        name: &str,
        organizator: bool,
        administrator: bool,
    ) -> (AuthenticatedUser, String) {
        let profile = UserRepository::new(&state.db)
            .create(&CreateUser {
                name: name.into(),
                password: "pw".into(),
                organizator,
                administrator,
            })
            .unwrap();
        let user = AuthenticatedUser::from(profile);
        let session = state.sessions.load(None).await;
        session.set(SESSION_USER_KEY, &user).await.unwrap();
        (user, session.id().to_string())
    }

    pub(crate) fn request(
        method: &str,
        uri: &str,
        session_id: Option<&str>,
        body: Option<Value>,
    ) -> HttpRequest<Body> {
        let mut builder = HttpRequest::builder().method(method).uri(uri);
        if let Some(id) = session_id {
            builder = builder.header(header::COOKIE, format!("{SESSION_COOKIE}={id}"));
        }
        match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        }
    }

    pub(crate) async fn send(app: &Router, request: HttpRequest<Body>) -> (StatusCode, Value) {
        let response = app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, body)
    }

    #[tokio::test]
    async fn router_builds_with_all_routes() {
        let (state, _dir) = test_state();
        let app = router(state, Duration::from_secs(5));
        let _ = app.into_make_service();
    }

    #[tokio::test]
    async fn health_is_public_and_tagged_with_request_id() {
        let (state, _dir) = test_state();
        let app = router(state, Duration::from_secs(5));
        let response = app
            .oneshot(request("GET", "/health/live", None, None))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert!(response.headers().contains_key("x-request-id"));
    }

    #[tokio::test]
    async fn openapi_document_is_served() {
        let (state, _dir) = test_state();
        let app = router(state, Duration::from_secs(5));
        let (status, body) = send(&app, request("GET", "/api-doc/openapi.json", None, None)).await;
        assert_eq!(status, StatusCode::OK);
        assert!(body["paths"]["/api/group-members"].is_object());
    }

    #[tokio::test]
    async fn slow_requests_time_out() {
        let app: Router = Router::new()
            .route(
                "/slow",
                get(|| async {
                    tokio::time::sleep(Duration::from_secs(5)).await;
                    "late"
                }),
            )
            .layer(middleware::from_fn_with_state(
                Duration::from_millis(20),
                enforce_timeout,
            ));
        let (status, body) = send(&app, request("GET", "/slow", None, None)).await;
        assert_eq!(status, StatusCode::REQUEST_TIMEOUT);
        assert_eq!(body["error"], "Request timed out");
    }

    #[tokio::test]
    async fn unknown_api_route_is_404() {
        let (state, _dir) = test_state();
        let app = router(state, Duration::from_secs(5));
        let (status, _) = send(&app, request("GET", "/api/nope", None, None)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
