//! HTTP route handlers

mod books;
mod index;
mod search;
mod sync;
mod system;

use actix_web::http::StatusCode;
use actix_web::{web, HttpResponse, ResponseError};
use bookfinder_common::BookFinderError;
use std::fmt;

use crate::types::ErrorResponse;

/// Register every route
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(system::health)
        .service(system::stats)
        .service(books::list_books)
        .service(books::get_book)
        .service(sync::sync_book)
        .service(sync::sync_batch)
        .service(index::rebuild_index)
        .service(search::discover);
}

/// Error wrapper that renders `{error}` with the mapped status code
#[derive(Debug)]
pub struct ApiError(pub BookFinderError);

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl From<BookFinderError> for ApiError {
    fn from(err: BookFinderError) -> Self {
        Self(err)
    }
}

impl ResponseError for ApiError {
    fn status_code(&self) -> StatusCode {
        StatusCode::from_u16(self.0.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(ErrorResponse {
            error: self.0.to_string(),
        })
    }
}

pub type ApiResult = Result<HttpResponse, ApiError>;
