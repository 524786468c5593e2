use axum::{
    extract::{multipart::MultipartRejection, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use lendr_core::StoreError;
use serde_json::{json, Map, Value};

#[derive(Debug)]
pub enum AppError {
    AuthorizationError(String),
    ValidationError {
        field: Option<String>,
        message: String,
    },
    NotFoundError(String),
    InternalServerError(String),
    Anyhow(anyhow::Error),
}

impl AppError {
    pub fn field(field: impl Into<String>, message: impl Into<String>) -> Self {
        AppError::ValidationError {
            field: Some(field.into()),
            message: message.into(),
        }
    }

    pub fn detail(message: impl Into<String>) -> Self {
        AppError::ValidationError {
            field: None,
            message: message.into(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            AppError::AuthorizationError(msg) => (StatusCode::FORBIDDEN, json!({ "detail": msg })),
            AppError::ValidationError { field: Some(field), message } => {
                let mut errors = Map::new();
                errors.insert(field, json!([message]));
                (StatusCode::BAD_REQUEST, Value::Object(errors))
            }
            AppError::ValidationError { field: None, message } => {
                (StatusCode::BAD_REQUEST, json!({ "detail": message }))
            }
            AppError::NotFoundError(msg) => {
                tracing::debug!("Not found: {}", msg);
                (StatusCode::NOT_FOUND, json!({ "detail": "Not found." }))
            }
            AppError::InternalServerError(msg) => {
                tracing::error!("Internal Server Error: {}", msg);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": "Internal Server Error" }),
                )
            }
            AppError::Anyhow(err) => {
                tracing::error!("Internal Server Error: {}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    json!({ "detail": "Internal Server Error" }),
                )
            }
        };

        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for AppError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound { .. } => AppError::NotFoundError(err.to_string()),
            StoreError::Conflict { entity, .. } => AppError::field(
                "external_id",
                format!("{entity} with this external_id already exists."),
            ),
            StoreError::Domain(e) => AppError::ValidationError {
                field: e.field().map(str::to_string),
                message: e.message(),
            },
            StoreError::Backend(msg) => AppError::InternalServerError(msg),
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::detail(rejection.body_text())
    }
}

impl From<MultipartRejection> for AppError {
    fn from(rejection: MultipartRejection) -> Self {
        AppError::field("file", rejection.body_text())
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::Anyhow(err)
    }
}
