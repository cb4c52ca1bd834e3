//! HTTP error handling.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};

/// Result type for HTTP handlers.
pub type AppResult<T> = Result<T, AppError>;

/// Application error with HTTP status code.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }
}

impl From<vigil_core::Error> for AppError {
    fn from(err: vigil_core::Error) -> Self {
        match &err {
            vigil_core::Error::InvalidInput(_) => Self::bad_request(err.to_string()),
            vigil_core::Error::NotFound(_) => Self::not_found(err.to_string()),
            _ => Self::internal(err.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(serde_json::json!({
            "code": self.status.as_u16(),
            "message": self.message,
        }));
        (self.status, body).into_response()
    }
}

/// The `{code: 0, data}` envelope every successful endpoint replies with.
pub fn ok_response(data: serde_json::Value) -> Json<serde_json::Value> {
    Json(serde_json::json!({ "code": 0, "data": data }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn core_errors_map_to_statuses() {
        let err: AppError = vigil_core::Error::InvalidInput("bad".to_string()).into();
        assert_eq!(err.status, StatusCode::BAD_REQUEST);

        let err: AppError = vigil_core::Error::NotFound("missing".to_string()).into();
        assert_eq!(err.status, StatusCode::NOT_FOUND);

        let err: AppError = vigil_core::Error::Internal("boom".to_string()).into();
        assert_eq!(err.status, StatusCode::INTERNAL_SERVER_ERROR);
    }
}
