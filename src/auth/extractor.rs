// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

//! Axum extractors for authenticated users.
//!
//! Use the `Auth` extractor in handlers to require a logged-in session:
//!
//! ```rust,ignore
//! async fn my_handler(Auth(user): Auth) -> impl IntoResponse {
//!     // user is AuthenticatedUser
//! }
//! ```
//!
//! The session middleware has already checked that the user snapshot in
//! the session is current, so extractors only read it.

use axum::{extract::FromRequestParts, http::request::Parts};

use super::{AuthError, AuthenticatedUser, Role, Session, SESSION_USER_KEY};

async fn session_user(parts: &mut Parts) -> Result<AuthenticatedUser, AuthError> {
    let session = parts
        .extensions
        .get::<Session>()
        .cloned()
        .ok_or(AuthError::SessionUnavailable)?;
    session
        .get::<AuthenticatedUser>(SESSION_USER_KEY)
        .await
        .ok_or(AuthError::NotAuthenticated)
}

/// Extractor for logged-in users.
#[derive(Debug, Clone)]
pub struct Auth(pub AuthenticatedUser);

impl<S: Send + Sync> FromRequestParts<S> for Auth {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(Auth(session_user(parts).await?))
    }
}

/// Extractor that requires the organizer role (administrators pass too).
#[derive(Debug, Clone)]
pub struct OrganizerOnly(pub AuthenticatedUser);

impl<S: Send + Sync> FromRequestParts<S> for OrganizerOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = session_user(parts).await?;
        if !user.has_role(Role::Organizer) {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(OrganizerOnly(user))
    }
}

/// Extractor that requires admin role.
#[derive(Debug, Clone)]
pub struct AdminOnly(pub AuthenticatedUser);

impl<S: Send + Sync> FromRequestParts<S> for AdminOnly {
    type Rejection = AuthError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let user = session_user(parts).await?;
        if !user.is_admin() {
            return Err(AuthError::InsufficientPermissions);
        }
        Ok(AdminOnly(user))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::SessionStore;
    use axum::http::Request;
    use chrono::Utc;
    use std::time::Duration;

    fn user(role: Role) -> AuthenticatedUser {
        AuthenticatedUser {
            user_id: 1,
            name: "erin".into(),
            role,
            updated_at: Utc::now(),
        }
    }

    async fn parts_with(user: Option<AuthenticatedUser>) -> Parts {
        let store = SessionStore::new(Duration::from_secs(60));
        let session = store.load(None).await;
        if let Some(user) = user {
            session.set(SESSION_USER_KEY, &user).await.unwrap();
        }
        let (mut parts, _) = Request::new(()).into_parts();
        parts.extensions.insert(session);
        parts
    }

    #[tokio::test]
    async fn auth_requires_logged_in_session() {
        let mut parts = parts_with(None).await;
        let err = Auth::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::NotAuthenticated));

        let mut parts = parts_with(Some(user(Role::Member))).await;
        let Auth(found) = Auth::from_request_parts(&mut parts, &()).await.unwrap();
        assert_eq!(found.name, "erin");
    }

    #[tokio::test]
    async fn missing_session_layer_is_reported() {
        let (mut parts, _) = Request::new(()).into_parts();
        let err = Auth::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionUnavailable));
    }

    #[tokio::test]
    async fn organizer_only_checks_role() {
        let mut parts = parts_with(Some(user(Role::Member))).await;
        let err = OrganizerOnly::from_request_parts(&mut parts, &())
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions));

        let mut parts = parts_with(Some(user(Role::Admin))).await;
        assert!(OrganizerOnly::from_request_parts(&mut parts, &()).await.is_ok());
    }

    #[tokio::test]
    async fn admin_only_rejects_organizers() {
        let mut parts = parts_with(Some(user(Role::Organizer))).await;
        let err = AdminOnly::from_request_parts(&mut parts, &()).await.unwrap_err();
        assert!(matches!(err, AuthError::InsufficientPermissions));
    }
}
