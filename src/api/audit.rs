// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    Json,
};

use crate::{
    auth::AdminOnly,
    error::ApiError,
    models::{AuditLogResponse, AuditQueryParams},
    state::AppState,
    storage::{AuditFilter, AuditRepository, DEFAULT_QUERY_LIMIT},
};

/// Largest page the audit endpoint returns.
pub const MAX_AUDIT_PAGE: usize = 500;

/// Query the audit log, newest first. Admin only.
#[utoipa::path(
    get,
    path = "/api/audit",
    tag = "Audit",
    params(AuditQueryParams),
    responses(
        (status = 200, description = "Matching entries", body = AuditLogResponse),
        (status = 401, description = "Not authenticated"),
        (status = 403, description = "Not authorized (admin required)")
    )
)]
pub async fn query_audit_logs(
    AdminOnly(_admin): AdminOnly,
    State(state): State<AppState>,
    Query(params): Query<AuditQueryParams>,
) -> Result<Json<AuditLogResponse>, ApiError> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_QUERY_LIMIT)
        .clamp(1, MAX_AUDIT_PAGE);
    let offset = params.offset.unwrap_or(0);
    let filter = AuditFilter {
        event_type: params.event_type,
        entity_type: params.entity_type,
        entity_id: params.entity_id,
        start: params.start,
        end: params.end,
    };

    let entries = AuditRepository::new(&state.db).query(&filter, limit, offset)?;
    Ok(Json(AuditLogResponse { entries }))
}

#[cfg(test)]
mod tests {
    use crate::api::router;
    use crate::api::tests::{login_as, request, send};
    use crate::state::test_state;
    use crate::storage::{AuditEvent, AuditEventType, AuditRepository};
    use axum::http::StatusCode;
    use serde_json::json;
    use std::time::Duration;

    #[tokio::test]
    async fn admin_filters_by_event_type() {
        let (state, _dir) = test_state();
        let (_, admin) = login_as(&state, "ada", false, true).await;
        let audit = AuditRepository::new(&state.db);
        audit.log(&AuditEvent::new(AuditEventType::PollCreated, "poll").with_entity_id(1));
        audit.log(&AuditEvent::new(AuditEventType::PollCreated, "poll").with_entity_id(2));
        audit.log(
            &AuditEvent::new(AuditEventType::TokensIssued, "poll")
                .with_entity_id(2)
                .with_metadata(json!({ "count": 3, "token": "secret" })),
        );
        let app = router(state, Duration::from_secs(5));

        let (status, body) = send(
            &app,
            request("GET", "/api/audit?event_type=poll_created", Some(&admin), None),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["entries"].as_array().unwrap().len(), 2);

        let (_, body) = send(
            &app,
            request("GET", "/api/audit?entity_id=2&limit=1", Some(&admin), None),
        )
        .await;
        let entries = body["entries"].as_array().unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0]["event_type"], "tokens_issued");
        assert_eq!(entries[0]["metadata"], json!({ "count": 3 }));
    }

    #[tokio::test]
    async fn members_cannot_read_the_audit_log() {
        let (state, _dir) = test_state();
        let (_, member) = login_as(&state, "bo", false, false).await;
        let app = router(state, Duration::from_secs(5));

        let (status, _) = send(&app, request("GET", "/api/audit", Some(&member), None)).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }
}
