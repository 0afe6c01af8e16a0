//! API error responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use meshsim_engine::TopologyError;
use serde::Serialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    Engine(#[from] meshsim_engine::Error),

    #[error("{0}")]
    Unprocessable(String),

    #[error("no topology has been computed yet")]
    NotReady,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        use meshsim_engine::Error;
        match self {
            Self::Engine(Error::InvalidTopologyRequest(TopologyError::UnknownNode(_))) => {
                StatusCode::NOT_FOUND
            }
            Self::Engine(Error::InvalidTopologyRequest(_)) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Engine(Error::NodeUnavailable { .. } | Error::Provider(_)) => {
                StatusCode::BAD_GATEWAY
            }
            Self::Engine(Error::Unsupported(_)) => StatusCode::NOT_IMPLEMENTED,
            Self::Unprocessable(_) => StatusCode::UNPROCESSABLE_ENTITY,
            Self::NotReady => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::warn!(%status, error = %self, "Request failed");
        }
        (status, Json(ErrorBody { error: self.to_string() })).into_response()
    }
}

pub type ApiResult<T> = std::result::Result<T, ApiError>;
