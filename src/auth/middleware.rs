// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Session middleware.
//!
//! Every request passes through [`session_guard`]. It attaches the request's
//! [`Session`] to the request extensions and, when the session is logged in,
//! checks that the user snapshot it holds is still current. A session whose
//! user was changed or deleted since login is destroyed and the client is
//! redirected to `/`.
//!
//! The middleware also maintains the `session_id` cookie: it is set when a
//! new session gets stored or the session was regenerated, and expired once
//! a known session is gone.

use axum::{
    extract::{Request, State},
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderValue, StatusCode,
    },
    middleware::Next,
    response::{IntoResponse, Response},
};

use super::{session::session_id_from, AuthenticatedUser, SESSION_COOKIE, SESSION_USER_KEY};
use crate::{
    audit_log, error::ApiError, state::AppState, storage::AuditEventType,
    storage::UserRepository,
};

fn session_cookie(session_id: &str) -> String {
    format!("{SESSION_COOKIE}={session_id}; Path=/; HttpOnly; SameSite=Lax")
}

fn expired_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

fn append_cookie(response: &mut Response, cookie: &str) {
    match HeaderValue::from_str(cookie) {
        Ok(value) => {
            response.headers_mut().append(SET_COOKIE, value);
        }
        Err(e) => tracing::warn!(error = %e, "Dropping unencodable session cookie"),
    }
}

/// Load the session, drop it if its user is stale, then run the handler.
pub async fn session_guard(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let cookie_id = session_id_from(request.headers());
    let session = state.sessions.load(cookie_id.as_deref()).await;

    if let Some(user) = session.get::<AuthenticatedUser>(SESSION_USER_KEY).await {
        match UserRepository::new(&state.db).is_latest(user.user_id, user.updated_at) {
            Ok(true) => {}
            Ok(false) => {
                session.destroy().await;
                tracing::info!(user_id = user.user_id, "Stale session invalidated");
                audit_log!(
                    &state.db,
                    AuditEventType::SessionInvalidated,
                    "user",
                    user.user_id,
                    &user
                );
                let mut response = (StatusCode::FOUND, [(LOCATION, "/")]).into_response();
                append_cookie(&mut response, &expired_cookie());
                return response;
            }
            Err(e) => return ApiError::from(e).into_response(),
        }
    }

    request.extensions_mut().insert(session.clone());
    let mut response = next.run(request).await;

    let active_id = session.active_id().await;
    let regenerated = active_id != session.id();
    let stored = state.sessions.contains(&active_id).await;
    if stored && (session.is_new() || regenerated) {
        append_cookie(&mut response, &session_cookie(&active_id));
    } else if !stored && cookie_id.is_some() {
        append_cookie(&mut response, &expired_cookie());
    }
    response
}
