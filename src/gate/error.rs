//! HTTP error mapping

use axum::{
    http::{header, StatusCode},
    response::{IntoResponse, Response},
};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Missing X-OPENAI-API-KEY header")]
    MissingCredential,

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Upstream error ({status}): {body}")]
    Upstream { status: u16, body: String },

    #[error("Upstream unreachable: {0}")]
    Transport(String),
}

impl GatewayError {
    pub fn status(&self) -> StatusCode {
        match self {
            GatewayError::MissingCredential | GatewayError::InvalidRequest(_) => {
                StatusCode::BAD_REQUEST
            }
            GatewayError::Upstream { .. } | GatewayError::Transport(_) => StatusCode::BAD_GATEWAY,
        }
    }
}

impl From<crate::Error> for GatewayError {
    fn from(err: crate::Error) -> Self {
        match err {
            crate::Error::Validation(msg) => GatewayError::InvalidRequest(msg),
            crate::Error::Json(e) => GatewayError::InvalidRequest(e.to_string()),
            crate::Error::Upstream { status, body } => GatewayError::Upstream { status, body },
            other => GatewayError::Transport(other.to_string()),
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("{}", self);
        } else {
            tracing::warn!("{}", self);
        }

        (
            status,
            [(header::CONTENT_TYPE, "text/plain; charset=utf-8")],
            self.to_string(),
        )
            .into_response()
    }
}
