use axum::{http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;
use thiserror::Error;

use crate::{media::MediaError, pdf::ReportError, studio::StudioError};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("session not found")]
    SessionNotFound,
    #[error("variant not found")]
    VariantNotFound,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Studio(#[from] StudioError),
    #[error(transparent)]
    Media(#[from] MediaError),
    #[error(transparent)]
    Report(#[from] ReportError),
}

impl AppError {
    fn status(&self) -> StatusCode {
        match self {
            Self::SessionNotFound | Self::VariantNotFound => StatusCode::NOT_FOUND,
            Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::Studio(StudioError::NoImage) => StatusCode::BAD_REQUEST,
            Self::Studio(StudioError::Superseded) => StatusCode::CONFLICT,
            Self::Studio(StudioError::Failed(_)) => StatusCode::BAD_GATEWAY,
            Self::Media(_) | Self::Report(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let failure = match &self {
            Self::Studio(StudioError::Failed(f)) => Some(f.clone()),
            _ => None,
        };
        (status, Json(json!({ "error": self.to_string(), "failure": failure }))).into_response()
    }
}
