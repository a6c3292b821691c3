// SPDX-License-Identifier: AGPL-3.0-or-later
//
// Copyright (C) 2026 Relational Network

use axum::{
    extract::{Query, State},
    http::StatusCode,
    Json,
};
use serde_json::json;

use super::blocking;
use crate::{
    auth::{Auth, OrganizerOnly},
    error::ApiError,
    models::{CreateGroupRequest, GroupMembersParams, GroupMembersResponse, GroupResponse},
    state::AppState,
    storage::{
        AuditEvent, AuditEventType, AuditRepository, CreateGroup, GroupRepository,
        MembershipRepository, StoreError,
    },
};

/// Create a group. The creator becomes its owner and first member.
#[utoipa::path(
    post,
    path = "/api/groups",
    tag = "Groups",
    request_body = CreateGroupRequest,
    responses(
        (status = 201, description = "Group created", body = GroupResponse),
        (status = 400, description = "Invalid name"),
        (status = 403, description = "Organizer role required"),
        (status = 404, description = "A listed member does not exist")
    )
)]
pub async fn create_group(
    OrganizerOnly(user): OrganizerOnly,
    State(state): State<AppState>,
    Json(request): Json<CreateGroupRequest>,
) -> Result<(StatusCode, Json<GroupResponse>), ApiError> {
    let owner_id = user.user_id;
    let response = blocking(&state, move |db| {
        let groups = GroupRepository::new(db);
        let group = groups.create(&CreateGroup {
            name: request.name,
            owner_id,
        })?;

        let mut member_ids = request.member_ids;
        member_ids.push(owner_id);
        if let Err(e) = groups.add_members(group.id, &member_ids) {
            // add_members is all-or-nothing, so only the empty group remains
            groups.delete(group.id)?;
            return Err(e);
        }

        let members = MembershipRepository::new(db).members_of(group.id)?;
        Ok::<_, StoreError>(GroupResponse { group, members })
    })
    .await?;

    AuditRepository::new(&state.db).log(
        &AuditEvent::new(AuditEventType::GroupCreated, "group")
            .with_entity_id(response.group.id)
            .with_user(user.user_id)
            .with_metadata(json!({ "members": response.members.len() })),
    );

    Ok((StatusCode::CREATED, Json(response)))
}

/// Members of a group.
///
/// Errors use fixed messages: `Missing group_id parameter` for a missing id
/// and `Server error` for any store failure.
#[utoipa::path(
    get,
    path = "/api/group-members",
    tag = "Groups",
    params(GroupMembersParams),
    responses(
        (status = 200, description = "Group members", body = GroupMembersResponse),
        (status = 400, description = "Missing or malformed group_id"),
        (status = 401, description = "Not authenticated"),
        (status = 500, description = "Server error")
    )
)]
pub async fn group_members(
    Auth(_user): Auth,
    State(state): State<AppState>,
    Query(params): Query<GroupMembersParams>,
) -> Result<Json<GroupMembersResponse>, ApiError> {
    let raw = params
        .group_id
        .as_deref()
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .ok_or_else(|| ApiError::bad_request("Missing group_id parameter"))?;
    let group_id: u64 = raw
        .parse()
        .map_err(|_| ApiError::bad_request("Invalid group_id parameter"))?;

    match MembershipRepository::new(&state.db).members_of(group_id) {
        Ok(members) => Ok(Json(GroupMembersResponse { members })),
        Err(e) => {
            tracing::error!(group_id, error = %e, "Failed to list group members");
            Err(ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, "Server error"))
        }
    }
}
