use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;

/// Erreurs renvoyées par les routes d'ingestion.
///
/// Le blackout n'est pas une panne : c'est un refus attendu qui simule
/// la coupure Wi-Fi côté capteur.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum GatewayError {
    #[error("Simulated Wi-Fi failure")]
    BlackoutActive,
    #[error("invalid JSON")]
    InvalidJson,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: &'static str,
    message: String,
}

impl GatewayError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            GatewayError::BlackoutActive => StatusCode::SERVICE_UNAVAILABLE,
            GatewayError::InvalidJson => StatusCode::BAD_REQUEST,
        }
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            GatewayError::BlackoutActive => "blackout_simulation",
            GatewayError::InvalidJson => "invalid JSON",
        }
    }
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        match &self {
            GatewayError::BlackoutActive => tracing::debug!("[gateway] push rejected: blackout simulation active"),
            GatewayError::InvalidJson => tracing::warn!(error = %self, "[gateway] rejected payload"),
        }
        let body = ErrorBody { error: self.error_code(), message: self.to_string() };
        (self.status_code(), Json(body)).into_response()
    }
}

pub type GatewayResult<T> = Result<T, GatewayError>;
