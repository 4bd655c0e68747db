//! Investment proposals, ballots and positions.

use api_types::investment::{ProposalCreated, ProposalNew, VoteCast, VoteCastResult};
use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
};
use engine::{Investment, InvestmentVote, ProposeInvestmentCmd, VoteDetail, users};

use crate::{ServerError, convert, server::ServerState};

pub async fn propose(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<ProposalNew>,
) -> Result<(StatusCode, Json<ProposalCreated>), ServerError> {
    let mut cmd = ProposeInvestmentCmd::new(
        payload.group_id,
        &user.username,
        convert::trade_action(payload.action),
        payload.symbol,
        payload.amount_minor,
    );
    if let Some(shares) = payload.shares_micros {
        cmd = cmd.shares(shares);
    }
    if let Some(reasoning) = payload.reasoning {
        cmd = cmd.reasoning(reasoning);
    }
    let vote_id = state.engine.propose_investment(cmd).await?;
    Ok((StatusCode::CREATED, Json(ProposalCreated { vote_id })))
}

pub async fn vote(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<VoteCast>,
) -> Result<Json<VoteCastResult>, ServerError> {
    let status = state
        .engine
        .cast_vote(
            &payload.vote_id,
            &user.username,
            convert::decision(payload.decision),
        )
        .await?;
    Ok(Json(VoteCastResult {
        status: status.as_str().to_string(),
    }))
}

pub async fn get_vote(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(vote_id): Path<String>,
) -> Result<Json<VoteDetail>, ServerError> {
    Ok(Json(state.engine.vote(&vote_id, &user.username).await?))
}

pub async fn cancel(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(vote_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.cancel_vote(&vote_id, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_votes(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<InvestmentVote>>, ServerError> {
    Ok(Json(
        state
            .engine
            .list_votes(&group_id, None, &user.username)
            .await?,
    ))
}

pub async fn positions(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
) -> Result<Json<Vec<Investment>>, ServerError> {
    Ok(Json(
        state
            .engine
            .group_investments(&group_id, &user.username)
            .await?,
    ))
}
