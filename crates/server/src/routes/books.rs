use actix_web::{get, web, HttpResponse};
use bookfinder_common::BookFinderError;
use bookfinder_sources::Isbn;
use std::sync::Arc;

use super::ApiResult;
use crate::state::AppState;
use crate::types::BooksQuery;

/// List books, optionally filtered by title/author keywords
#[get("/books")]
pub async fn list_books(query: web::Query<BooksQuery>, state: web::Data<Arc<AppState>>) -> ApiResult {
    let books = state.catalog().list(query.q.as_deref(), query.limit).await?;
    Ok(HttpResponse::Ok().json(books))
}

/// One book by ISBN (any accepted form)
#[get("/books/{isbn}")]
pub async fn get_book(path: web::Path<String>, state: web::Data<Arc<AppState>>) -> ApiResult {
    let isbn = Isbn::parse(&path.into_inner())?;
    let book = state
        .catalog()
        .get(&isbn)
        .await?
        .ok_or_else(|| BookFinderError::not_found(format!("Book {} not found", isbn)))?;

    Ok(HttpResponse::Ok().json(book))
}
