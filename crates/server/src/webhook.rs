//! Payment gateway and card issuer webhooks.
//!
//! When a secret is configured the raw body must carry a hex encoded
//! HMAC-SHA256 in the `x-signature` header.

use api_types::webhook::{ChargeStatus, IssuingAck, IssuingWebhook, PaymentWebhook};
use axum::{Json, body::Bytes, extract::State, http::HeaderMap, http::StatusCode};
use engine::{CardAuthorization, PaymentEvent, PaymentOutcome};
use hmac::{Hmac, Mac};
use sha2::Sha256;

use crate::{ServerError, server::ServerState};

type HmacSha256 = Hmac<Sha256>;

pub const SIGNATURE_HEADER: &str = "x-signature";

pub fn sign(secret: &str, body: &[u8]) -> Result<String, ServerError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| ServerError::Generic(format!("invalid webhook secret: {err}")))?;
    mac.update(body);
    Ok(hex::encode(mac.finalize().into_bytes()))
}

fn verify(secret: &str, body: &[u8], signature: &str) -> Result<(), ServerError> {
    let expected = hex::decode(signature.trim())
        .map_err(|_| ServerError::Unauthorized("malformed signature".to_string()))?;
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|err| ServerError::Generic(format!("invalid webhook secret: {err}")))?;
    mac.update(body);
    mac.verify_slice(&expected)
        .map_err(|_| ServerError::Unauthorized("signature mismatch".to_string()))
}

fn into_event(payload: PaymentWebhook) -> Result<PaymentEvent, ServerError> {
    let outcome = match payload.status {
        ChargeStatus::Succeeded => PaymentOutcome::Succeeded {
            charge_ref: payload
                .charge_ref
                .filter(|r| !r.is_empty())
                .ok_or_else(|| ServerError::Generic("charge_ref is required".to_string()))?,
        },
        ChargeStatus::Failed => PaymentOutcome::Failed {
            reason: payload
                .reason
                .unwrap_or_else(|| "charge failed".to_string()),
        },
    };
    Ok(PaymentEvent {
        bill_id: payload.bill_id,
        username: payload.username,
        outcome,
    })
}

fn authenticate(state: &ServerState, headers: &HeaderMap, body: &[u8]) -> Result<(), ServerError> {
    let Some(secret) = state.webhook_secret.as_deref() else {
        return Ok(());
    };
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| ServerError::Unauthorized("missing signature".to_string()))?;
    verify(secret, body, signature)
}

pub async fn payment(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<StatusCode, ServerError> {
    authenticate(&state, &headers, &body)?;

    let payload: PaymentWebhook = serde_json::from_slice(&body)
        .map_err(|err| ServerError::Generic(format!("invalid webhook body: {err}")))?;
    let event = into_event(payload)?;
    tracing::info!(bill_id = %event.bill_id, user = %event.username, "payment webhook");
    state.engine.apply_payment_event(event).await?;
    Ok(StatusCode::OK)
}

pub async fn issuing(
    State(state): State<ServerState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<IssuingAck>, ServerError> {
    authenticate(&state, &headers, &body)?;

    let payload: IssuingWebhook = serde_json::from_slice(&body)
        .map_err(|err| ServerError::Generic(format!("invalid webhook body: {err}")))?;
    match payload {
        IssuingWebhook::CardCreated { card_ref } => {
            tracing::info!(%card_ref, "virtual card created by issuer");
            Ok(Json(IssuingAck::default()))
        }
        IssuingWebhook::AuthorizationCreated {
            authorization_ref,
            card_ref,
            amount_minor,
            merchant,
        } => {
            let approved = state
                .engine
                .authorize_card(CardAuthorization {
                    authorization_ref,
                    card_ref,
                    amount_minor,
                    merchant,
                })
                .await?;
            Ok(Json(IssuingAck {
                approved: Some(approved),
            }))
        }
    }
}
