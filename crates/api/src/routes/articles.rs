//! Article endpoints for seeding drafts the reference sagas act on.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use common::{ArticleId, UserId};
use saga::services::{Article, ArticleRepository};
use serde::Deserialize;

use crate::AppState;
use crate::error::ApiError;

#[derive(Deserialize)]
pub struct CreateArticleRequest {
    pub author_id: Option<String>,
    pub title: String,
}

/// POST /articles: create a draft article, ready for `publish-article`.
#[tracing::instrument(skip(state, req))]
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateArticleRequest>,
) -> Result<(StatusCode, Json<Article>), ApiError> {
    let author_id = match req.author_id.as_deref() {
        Some(id) => id
            .parse::<UserId>()
            .map_err(|e| ApiError::BadRequest(format!("Invalid author_id: {e}")))?,
        None => UserId::new(),
    };
    if req.title.trim().is_empty() {
        return Err(ApiError::BadRequest("title must not be empty".to_string()));
    }

    let article = Article::draft(author_id, req.title);
    state.collaborators.articles.save(article.clone()).await?;
    tracing::info!(article_id = %article.id, %author_id, "draft article created");

    Ok((StatusCode::CREATED, Json(article)))
}

/// GET /articles/{id}: load an article with its publication status.
#[tracing::instrument(skip(state))]
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<Article>, ApiError> {
    let article_id: ArticleId = id
        .parse()
        .map_err(|e| ApiError::BadRequest(format!("Invalid ID format: {e}")))?;
    let article = state
        .collaborators
        .articles
        .find(article_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Article {id} not found")))?;
    Ok(Json(article))
}
