use axum::{Json, http::StatusCode, response::IntoResponse};
use engine::EngineError;

use serde::Serialize;
pub use hub::Hub;
pub use ocr::HttpReceiptScanner;
pub use server::{ServerState, router, run, run_with_listener, spawn_with_listener};
pub use webhook::{SIGNATURE_HEADER, sign as sign_webhook};

mod bills;
mod convert;
mod groups;
mod hub;
mod investments;
mod ocr;
mod server;
mod user;
mod webhook;

pub enum ServerError {
    Engine(EngineError),
    Unauthorized(String),
    Generic(String),
}

#[derive(Serialize)]
struct Error {
    error: String,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::KeyNotFound(_) => StatusCode::NOT_FOUND,
        EngineError::ExistingKey(_)
        | EngineError::InvalidState(_)
        | EngineError::Consistency(_) => StatusCode::CONFLICT,
        EngineError::Gateway(_) => StatusCode::BAD_GATEWAY,
        EngineError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
        EngineError::InvalidAmount(_)
        | EngineError::Validation(_)
        | EngineError::ItemNotFound(_)
        | EngineError::DivisionUndefined
        | EngineError::InvalidRole(_)
        | EngineError::InvalidId(_) => StatusCode::UNPROCESSABLE_ENTITY,
    }
}

fn message_for_engine_error(err: EngineError) -> String {
    match err {
        EngineError::Database(db_err) => {
            tracing::error!("database error: {db_err}");
            "internal server error".to_string()
        }
        EngineError::Consistency(msg) => {
            tracing::warn!("consistency violation: {msg}");
            format!("Consistency violation: {msg}")
        }
        other => other.to_string(),
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> axum::response::Response {
        let (status, error) = match self {
            ServerError::Engine(err) => (status_for_engine_error(&err), message_for_engine_error(err)),
            ServerError::Unauthorized(err) => (StatusCode::UNAUTHORIZED, err),
            ServerError::Generic(err) => (StatusCode::BAD_REQUEST, err),
        };

        (status, Json(Error { error })).into_response()
    }
}

impl From<EngineError> for ServerError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

#[cfg(test)]
mod tests {
    use engine::gateways::GatewayError;
    use sea_orm::DbErr;

    use super::*;

    fn status_of(err: EngineError) -> StatusCode {
        ServerError::from(err).into_response().status()
    }

    #[test]
    fn engine_forbidden_maps_to_403() {
        assert_eq!(
            status_of(EngineError::Forbidden("forbidden".to_string())),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn engine_not_found_maps_to_404() {
        assert_eq!(
            status_of(EngineError::KeyNotFound("x".to_string())),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn engine_conflicts_map_to_409() {
        assert_eq!(
            status_of(EngineError::ExistingKey("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::InvalidState("x".to_string())),
            StatusCode::CONFLICT
        );
        assert_eq!(
            status_of(EngineError::Consistency("x".to_string())),
            StatusCode::CONFLICT
        );
    }

    #[test]
    fn engine_validation_maps_to_422() {
        for err in [
            EngineError::InvalidAmount("x".to_string()),
            EngineError::Validation("x".to_string()),
            EngineError::ItemNotFound("x".to_string()),
            EngineError::DivisionUndefined,
            EngineError::InvalidRole("x".to_string()),
            EngineError::InvalidId("x".to_string()),
        ] {
            assert_eq!(status_of(err), StatusCode::UNPROCESSABLE_ENTITY);
        }
    }

    #[test]
    fn gateway_failure_maps_to_502() {
        assert_eq!(
            status_of(EngineError::Gateway(GatewayError::Declined("no".to_string()))),
            StatusCode::BAD_GATEWAY
        );
    }

    #[test]
    fn database_error_is_hidden() {
        let err = EngineError::Database(DbErr::Custom("secret table".to_string()));
        assert_eq!(
            message_for_engine_error(err),
            "internal server error".to_string()
        );
    }

    #[test]
    fn generic_maps_to_400() {
        let res = ServerError::Generic("bad".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn unauthorized_maps_to_401() {
        let res = ServerError::Unauthorized("bad signature".to_string()).into_response();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }
}
