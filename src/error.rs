use axum::{
    extract::multipart::MultipartError,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::upload::UploadError;

/// A request that was refused before anything was written.
///
/// The HTML board swallows these silently; the JSON API reports them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("trip name is required")]
    BlankTripName,
    #[error("trip location is required")]
    BlankTripLocation,
    #[error("suggestion title is required")]
    BlankTitle,
    #[error("link must be an http or https address")]
    UnsafeLink,
    #[error("voter name is required")]
    BlankVoter,
    #[error("this name has already voted")]
    AlreadyVoted,
    #[error("trip does not exist")]
    UnknownTrip,
    #[error("suggestion does not exist")]
    UnknownSuggestion,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("upload error: {0}")]
    Multipart(#[from] MultipartError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Rejected(#[from] Rejection),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
    #[error("not found")]
    NotFound,
}

impl AppError {
    pub fn rejection(&self) -> Option<Rejection> {
        match self {
            AppError::Rejected(rejection) => Some(*rejection),
            _ => None,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = match self {
            AppError::Config(_) | AppError::Io(_) | AppError::Database(_) | AppError::Other(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
            AppError::Multipart(_) | AppError::Upload(_) => StatusCode::BAD_REQUEST,
            AppError::Rejected(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::NotFound => StatusCode::NOT_FOUND,
        };

        (status, self.to_string()).into_response()
    }
}
