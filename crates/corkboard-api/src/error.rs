use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use tracing::error;

use corkboard_types::api::ErrorResponse;

/// Everything a board operation can fail with.
#[derive(Debug, thiserror::Error)]
pub enum BoardError {
    #[error("Username already exists")]
    DuplicateUsername,

    #[error("{0}")]
    InvalidRegistration(&'static str),

    #[error("Invalid username or password")]
    InvalidCredentials,

    #[error("Invalid form: {0}")]
    InvalidForm(String),

    #[error("A message needs text or an image")]
    EmptyMessage,

    #[error("Content must not be empty")]
    EmptyContent,

    #[error("Image data is not valid base64")]
    InvalidImage,

    #[error("Message not found")]
    MessageNotFound,

    #[error("User not found")]
    UserNotFound,

    #[error("Image generation failed: {0}")]
    ExternalServiceFailure(String),

    #[error("Login required")]
    Unauthenticated,

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl BoardError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::DuplicateUsername => StatusCode::CONFLICT,
            Self::InvalidCredentials | Self::Unauthenticated => StatusCode::UNAUTHORIZED,
            Self::InvalidRegistration(_)
            | Self::InvalidForm(_)
            | Self::EmptyMessage
            | Self::EmptyContent
            | Self::InvalidImage => StatusCode::BAD_REQUEST,
            Self::MessageNotFound | Self::UserNotFound => StatusCode::NOT_FOUND,
            Self::ExternalServiceFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Public message for the response body. Internal details are logged
    /// instead of returned.
    fn public_message(&self) -> String {
        match self {
            Self::Internal(e) => {
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl IntoResponse for BoardError {
    fn into_response(self) -> Response {
        match self {
            Self::Unauthenticated => Redirect::to("/login").into_response(),
            Self::ExternalServiceFailure(_) => JsonError(self).into_response(),
            other => (other.status(), other.public_message()).into_response(),
        }
    }
}

/// A [`BoardError`] rendered as `{"error": ...}` for endpoints whose callers
/// always expect JSON.
#[derive(Debug)]
pub struct JsonError(pub BoardError);

impl From<BoardError> for JsonError {
    fn from(e: BoardError) -> Self {
        Self(e)
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        let status = self.0.status();
        let body = ErrorResponse {
            error: self.0.public_message(),
        };
        (status, Json(body)).into_response()
    }
}
