use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

/// The query string could not be turned into a filter or list options.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("Malformed query string: {0}")]
    MalformedQuery(String),

    #[error("Malformed query key `{0}`")]
    MalformedKey(String),

    #[error("Unknown operator `{operator}` on field `{field}`")]
    UnknownOperator { field: String, operator: String },

    #[error("Field `{0}` mixes an equality match with comparison operators")]
    ConflictingConditions(String),

    #[error("Operator `{operator}` given more than once for field `{field}`")]
    RepeatedOperator { field: String, operator: String },

    #[error("Operator `{operator}` on field `{field}` needs a value")]
    EmptyValue { field: String, operator: String },

    #[error("Projection cannot mix included and excluded fields")]
    MixedProjection,
}

/// The backing store failed. Never retried here.
#[derive(Error, Debug)]
pub enum DataAccessError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Stored document is not valid JSON: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Stored document in `{collection}` is not an object")]
    NotAnObject { collection: String },

    #[error("Document in `{collection}` has no `_id`")]
    MissingId { collection: String },
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid {key} value: {reason}")]
    Invalid { key: String, reason: String },
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error(transparent)]
    DataAccess(#[from] DataAccessError),

    #[error("{resource} not found with id of {id}")]
    NotFound { resource: &'static str, id: String },

    #[error("Malformed payload: {0}")]
    MalformedPayload(String),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Validation { .. } => StatusCode::BAD_REQUEST,
            AppError::MalformedPayload { .. } => StatusCode::BAD_REQUEST,
            AppError::NotFound { .. } => StatusCode::NOT_FOUND,
            AppError::DataAccess { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        };

        if status.is_server_error() {
            error!("Request failed: {self}");
        }

        let body = Json(json!({
            "success": false,
            "error": self.to_string(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_codes() {
        let validation = AppError::from(ValidationError::MixedProjection).into_response();
        assert_eq!(validation.status(), StatusCode::BAD_REQUEST);

        let missing = AppError::NotFound {
            resource: "Bootcamp",
            id: "abc".to_string(),
        };
        assert_eq!(missing.to_string(), "Bootcamp not found with id of abc");
        assert_eq!(missing.into_response().status(), StatusCode::NOT_FOUND);

        let corrupt = AppError::from(DataAccessError::NotAnObject {
            collection: "courses".to_string(),
        });
        assert_eq!(
            corrupt.into_response().status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
