//! Group and membership endpoints.

use api_types::group::{GroupCreated, GroupNew, MemberInvite, MemberStatusUpdate, ThresholdUpdate};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{CreateGroupCmd, GroupMember, GroupSummary, Transaction, users};

use crate::{ServerError, convert, server::ServerState};

pub async fn create(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<GroupNew>,
) -> Result<(StatusCode, Json<GroupCreated>), ServerError> {
    let mut cmd = CreateGroupCmd::new(payload.name.trim(), &user.username);
    if let Some(description) = payload.description {
        cmd = cmd.description(description);
    }
    if let Some(kind) = payload.kind {
        cmd = cmd.kind(convert::group_kind(kind));
    }
    if let Some(strategy) = payload.strategy {
        cmd = cmd.strategy(convert::strategy(strategy));
    }
    if let Some(pct) = payload.vote_threshold_pct {
        cmd = cmd.vote_threshold_pct(pct);
    }
    let id = state.engine.create_group(cmd).await?;
    Ok((StatusCode::CREATED, Json(GroupCreated { id })))
}

pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Vec<GroupSummary>>, ServerError> {
    Ok(Json(state.engine.list_groups(&user.username).await?))
}

pub async fn get(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<Json<GroupSummary>, ServerError> {
    Ok(Json(state.engine.group(&group_id, &user.username).await?))
}

pub async fn members(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<GroupMember>>, ServerError> {
    Ok(Json(
        state.engine.list_members(&group_id, &user.username).await?,
    ))
}

pub async fn invite(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
    Json(payload): Json<MemberInvite>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .invite_member(
            &group_id,
            payload.username.trim(),
            convert::member_role(payload.role),
            &user.username,
        )
        .await?;
    Ok(StatusCode::CREATED)
}

pub async fn accept(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.accept_invite(&group_id, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_status(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path((group_id, username)): Path<(String, String)>,
    Json(payload): Json<MemberStatusUpdate>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .set_member_status(
            &group_id,
            &username,
            convert::member_status(payload.status),
            &user.username,
        )
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn set_threshold(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
    Json(payload): Json<ThresholdUpdate>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .set_vote_threshold(&group_id, payload.vote_threshold_pct, &user.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn transactions(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Transaction>>, ServerError> {
    Ok(Json(
        state
            .engine
            .group_transactions(&group_id, &user.username)
            .await?,
    ))
}
