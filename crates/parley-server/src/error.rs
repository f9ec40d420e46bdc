//! API error handling

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// API error type
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

impl ApiError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: msg.into(),
        }
    }

    pub fn not_implemented(msg: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_IMPLEMENTED,
            message: msg.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "type": match self.status {
                    StatusCode::NOT_FOUND => "not_found_error",
                    StatusCode::NOT_IMPLEMENTED => "not_implemented_error",
                    _ => "server_error",
                },
                "code": self.status.as_str()
            }
        }));
        (self.status, body).into_response()
    }
}

impl From<parley_core::Error> for ApiError {
    fn from(err: parley_core::Error) -> Self {
        match &err {
            parley_core::Error::Validation(msg) => ApiError::not_found(msg.clone()),
            parley_core::Error::UnknownModel(_) => ApiError::not_found("Model not found"),
            _ => ApiError::internal(err.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let validation = ApiError::from(parley_core::Error::Validation("Invalid seed".into()));
        assert_eq!(validation.status, StatusCode::NOT_FOUND);
        assert_eq!(validation.message, "Invalid seed");

        let unknown = ApiError::from(parley_core::Error::UnknownModel("gpt".into()));
        assert_eq!(unknown.status, StatusCode::NOT_FOUND);
        assert_eq!(unknown.message, "Model not found");

        let generation = ApiError::from(parley_core::Error::Generation("oom".into()));
        assert_eq!(generation.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
