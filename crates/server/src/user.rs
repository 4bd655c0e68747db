//! Endpoints scoped to the authenticated user.

use api_types::user::{BankExchange, NotificationQuery, PaymentMethodLink, TransactionQuery};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use engine::{Dashboard, Notification, Transaction, users};

use crate::{ServerError, server::ServerState};

const DEFAULT_TRANSACTIONS: u64 = 50;
const MAX_TRANSACTIONS: u64 = 500;

pub async fn link_payment_method(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<PaymentMethodLink>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .link_payment_method(&user.username, payload.customer_ref.trim())
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn bank_exchange(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<BankExchange>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .link_bank_account(&user.username, &payload.public_token)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn notifications(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Query(query): Query<NotificationQuery>,
) -> Result<Json<Vec<Notification>>, ServerError> {
    Ok(Json(
        state
            .engine
            .list_notifications(&user.username, query.unread_only)
            .await?,
    ))
}

pub async fn mark_read(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(notification_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state
        .engine
        .mark_notification_read(&notification_id, &user.username)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn dashboard(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
) -> Result<Json<Dashboard>, ServerError> {
    Ok(Json(state.engine.dashboard(&user.username).await?))
}

pub async fn transactions(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Query(query): Query<TransactionQuery>,
) -> Result<Json<Vec<Transaction>>, ServerError> {
    let limit = query
        .limit
        .unwrap_or(DEFAULT_TRANSACTIONS)
        .clamp(1, MAX_TRANSACTIONS);
    Ok(Json(
        state
            .engine
            .user_transactions(&user.username, limit)
            .await?,
    ))
}
