//! Mapping from workflow errors to HTTP responses
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use testgen_core::TestgenError;

#[derive(Debug)]
pub struct ApiError(pub TestgenError);

impl From<TestgenError> for ApiError {
    fn from(err: TestgenError) -> Self {
        Self(err)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            TestgenError::UnknownRun(_) => StatusCode::NOT_FOUND,
            TestgenError::WrongPhase { .. } | TestgenError::InvalidTransition { .. } => StatusCode::CONFLICT,
            TestgenError::InvalidPayload(_) => StatusCode::UNPROCESSABLE_ENTITY,
            // a collaborator failed while serving the request
            TestgenError::Task(_) => StatusCode::BAD_GATEWAY,
            TestgenError::Merge(_) | TestgenError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self.0, "request failed");
        }
        let message = self.0.to_string();
        let code = message.split('/').next().unwrap_or_default().to_string();
        (status, Json(json!({ "error": code, "message": message }))).into_response()
    }
}
