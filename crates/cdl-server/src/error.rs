use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cdl_ledger::LedgerError;
use serde_json::json;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("internal error: {0}")]
    Internal(String),
}

pub type ServerResult<T> = Result<T, ServerError>;

impl ServerError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Ledger(err) => match err {
                LedgerError::DocumentNotFound(_) | LedgerError::ContractNotFound(_) => {
                    StatusCode::NOT_FOUND
                }
                LedgerError::InvalidPayload(_) | LedgerError::InvalidContract(_) => {
                    StatusCode::BAD_REQUEST
                }
                LedgerError::InvalidTransition { .. }
                | LedgerError::ContractAlreadyResolved { .. }
                | LedgerError::SealingInProgress
                | LedgerError::ChainConflict { .. } => StatusCode::CONFLICT,
                LedgerError::MiningExhausted { .. } => StatusCode::SERVICE_UNAVAILABLE,
                LedgerError::Signing(_)
                | LedgerError::Serialization(_)
                | LedgerError::LockPoisoned(_)
                | LedgerError::Config(_)
                | LedgerError::BackgroundTask(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            Self::Config(_) | Self::Io(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Ledger(err) if err.is_retryable())
    }
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        let body = json!({
            "error": self.to_string(),
            "retryable": self.retryable(),
        });
        (status, Json(body)).into_response()
    }
}
