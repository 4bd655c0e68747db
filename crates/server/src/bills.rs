//! Bill endpoints: creation, lookup, draft lifecycle, charge retries and
//! virtual cards.

use api_types::bill::{BillCreated, BillListQuery, BillNew, RetryResult};
use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use base64::{Engine as _, engine::general_purpose::STANDARD};
use engine::{Bill, BillDetail, BillFilter, Claim, CreateBillCmd, LineItem, VirtualCard, users};

use crate::{ServerError, convert, server::ServerState};

pub async fn create(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Json(payload): Json<BillNew>,
) -> Result<(StatusCode, Json<BillCreated>), ServerError> {
    let items = payload
        .items
        .into_iter()
        .map(|item| LineItem::new(item.id, item.name, item.price_minor))
        .collect();
    let claims = payload
        .claims
        .into_iter()
        .map(|claim| Claim::new(claim.username, claim.item_ids))
        .collect();

    let mut cmd = CreateBillCmd::new(payload.group_id, &user.username)
        .items(items)
        .tax(payload.tax_minor)
        .tip(payload.tip_minor)
        .claims(claims)
        .draft(payload.draft);
    if let Some(merchant) = payload.merchant {
        cmd = cmd.merchant(merchant);
    }
    if let Some(image) = payload.receipt_image {
        let image = STANDARD
            .decode(image.as_bytes())
            .map_err(|err| ServerError::Generic(format!("receipt_image is not base64: {err}")))?;
        cmd = cmd.receipt_image(image);
    }

    let id = state.engine.create_bill(cmd).await?;
    Ok((StatusCode::CREATED, Json(BillCreated { id })))
}

pub async fn get(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(bill_id): Path<String>,
) -> Result<Json<BillDetail>, ServerError> {
    Ok(Json(state.engine.bill(&bill_id, &user.username).await?))
}

pub async fn list(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(group_id): Path<String>,
    Query(query): Query<BillListQuery>,
) -> Result<Json<Vec<Bill>>, ServerError> {
    let mut filter = BillFilter::default();
    if let Some(status) = query.status {
        filter = filter.status(convert::bill_status(status));
    }
    if let Some(created_by) = query.created_by {
        filter = filter.created_by(created_by);
    }
    Ok(Json(
        state
            .engine
            .list_bills(&group_id, filter, &user.username)
            .await?,
    ))
}

pub async fn submit(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(bill_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.submit_bill(&bill_id, &user.username).await?;
    Ok(StatusCode::ACCEPTED)
}

pub async fn cancel(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(bill_id): Path<String>,
) -> Result<StatusCode, ServerError> {
    state.engine.cancel_bill(&bill_id, &user.username).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn retry(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path((bill_id, username)): Path<(String, String)>,
) -> Result<Json<RetryResult>, ServerError> {
    let status = state
        .engine
        .retry_participant_charge(&bill_id, &username, &user.username)
        .await?;
    Ok(Json(RetryResult {
        status: status.as_str().to_string(),
    }))
}

pub async fn create_card(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(bill_id): Path<String>,
) -> Result<(StatusCode, Json<VirtualCard>), ServerError> {
    let card = state
        .engine
        .create_virtual_card(&bill_id, &user.username)
        .await?;
    Ok((StatusCode::CREATED, Json(card)))
}

pub async fn cards(
    Extension(user): Extension<users::Model>,
    State(state): State<ServerState>,
    Path(bill_id): Path<String>,
) -> Result<Json<Vec<VirtualCard>>, ServerError> {
    Ok(Json(state.engine.bill_cards(&bill_id, &user.username).await?))
}
