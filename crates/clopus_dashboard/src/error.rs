//! Handler errors and their HTTP responses.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use clopus_common::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DashboardError {
    #[error("Missing {0}")]
    MissingParam(&'static str),

    #[error("{0}")]
    NotFound(String),

    #[error("Render error: {0}")]
    Render(#[from] std::fmt::Error),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

impl DashboardError {
    pub fn status(&self) -> StatusCode {
        match self {
            DashboardError::MissingParam(_) => StatusCode::BAD_REQUEST,
            DashboardError::NotFound(_) => StatusCode::NOT_FOUND,
            DashboardError::Store(e) if e.is_not_found() => StatusCode::NOT_FOUND,
            DashboardError::Render(_) | DashboardError::Store(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for DashboardError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}
