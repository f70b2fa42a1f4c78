use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::services::{notifications::DispatchError, repository::RepositoryError};

/// Failures of the trip creation and confirmation workflows.
#[derive(Debug, Error)]
pub enum TripError {
    #[error("destination must have at least 4 characters")]
    InvalidDestination,
    #[error("trip start date is in the past")]
    InvalidStartDate,
    #[error("trip end date is before its start date")]
    InvalidEndDate,
    #[error("trip {0} not found")]
    TripNotFound(String),
    #[error("persistence failed: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("notification dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TripErrorKind {
    InvalidDestination,
    InvalidStartDate,
    InvalidEndDate,
    TripNotFound,
    Persistence,
    Dispatch,
}

impl TripError {
    pub fn kind(&self) -> TripErrorKind {
        match self {
            TripError::InvalidDestination => TripErrorKind::InvalidDestination,
            TripError::InvalidStartDate => TripErrorKind::InvalidStartDate,
            TripError::InvalidEndDate => TripErrorKind::InvalidEndDate,
            TripError::TripNotFound(_) => TripErrorKind::TripNotFound,
            TripError::Persistence(_) => TripErrorKind::Persistence,
            TripError::Dispatch(_) => TripErrorKind::Dispatch,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error(transparent)]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error(transparent)]
    Trip(#[from] TripError),
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Trip(err) => match err.kind() {
                TripErrorKind::InvalidDestination
                | TripErrorKind::InvalidStartDate
                | TripErrorKind::InvalidEndDate => StatusCode::BAD_REQUEST,
                TripErrorKind::TripNotFound => StatusCode::NOT_FOUND,
                TripErrorKind::Persistence | TripErrorKind::Dispatch => {
                    StatusCode::INTERNAL_SERVER_ERROR
                }
            },
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Config(_)
            | AppError::Io(_)
            | AppError::Database(_)
            | AppError::Migration(_)
            | AppError::Other(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "request failed");
        }
        (status, self.to_string()).into_response()
    }
}
