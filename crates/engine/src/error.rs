//! The module contains the errors the engine can throw.
//!
//! Synchronous rejections:
//!
//! - [`Validation`], [`InvalidAmount`], [`ItemNotFound`], [`DivisionUndefined`]
//!   and [`InvalidRole`] for malformed input.
//! - [`Forbidden`] when the actor lacks the required membership, role or
//!   status.
//! - [`InvalidState`] when a bill or vote is not in an eligible state.
//!
//! Workflow failures:
//!
//! - [`Gateway`] wraps a transient collaborator failure.
//! - [`Consistency`] signals that an atomic state transition was lost to a
//!   concurrent writer.
//!
//!  [`Validation`]: EngineError::Validation
//!  [`InvalidAmount`]: EngineError::InvalidAmount
//!  [`ItemNotFound`]: EngineError::ItemNotFound
//!  [`DivisionUndefined`]: EngineError::DivisionUndefined
//!  [`InvalidRole`]: EngineError::InvalidRole
//!  [`Forbidden`]: EngineError::Forbidden
//!  [`InvalidState`]: EngineError::InvalidState
//!  [`Gateway`]: EngineError::Gateway
//!  [`Consistency`]: EngineError::Consistency
use sea_orm::DbErr;
use thiserror::Error;

use crate::gateways::GatewayError;

/// Engine custom errors.
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("\"{0}\" key not found!")]
    KeyNotFound(String),
    #[error("\"{0}\" already present!")]
    ExistingKey(String),
    #[error("Invalid amount: {0}")]
    InvalidAmount(String),
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Item not found: {0}")]
    ItemNotFound(String),
    #[error("Split undefined: subtotal is zero but tax/tip is not")]
    DivisionUndefined,
    #[error("Invalid role: {0}")]
    InvalidRole(String),
    #[error("Invalid id: {0}")]
    InvalidId(String),
    #[error("Forbidden: {0}")]
    Forbidden(String),
    #[error("Invalid state: {0}")]
    InvalidState(String),
    #[error("Consistency violation: {0}")]
    Consistency(String),
    #[error(transparent)]
    Gateway(#[from] GatewayError),
    #[error(transparent)]
    Database(#[from] DbErr),
}

impl PartialEq for EngineError {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::KeyNotFound(a), Self::KeyNotFound(b)) => a == b,
            (Self::ExistingKey(a), Self::ExistingKey(b)) => a == b,
            (Self::InvalidAmount(a), Self::InvalidAmount(b)) => a == b,
            (Self::Validation(a), Self::Validation(b)) => a == b,
            (Self::ItemNotFound(a), Self::ItemNotFound(b)) => a == b,
            (Self::DivisionUndefined, Self::DivisionUndefined) => true,
            (Self::InvalidRole(a), Self::InvalidRole(b)) => a == b,
            (Self::InvalidId(a), Self::InvalidId(b)) => a == b,
            (Self::Forbidden(a), Self::Forbidden(b)) => a == b,
            (Self::InvalidState(a), Self::InvalidState(b)) => a == b,
            (Self::Consistency(a), Self::Consistency(b)) => a == b,
            (Self::Gateway(a), Self::Gateway(b)) => a == b,
            (Self::Database(a), Self::Database(b)) => a.to_string() == b.to_string(),
            _ => false,
        }
    }
}
