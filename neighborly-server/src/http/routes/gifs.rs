//! GIF search proxy for the message composer

use std::sync::Arc;

use axum::{extract::State, routing::get, Json, Router};
use serde::Deserialize;

use crate::auth::CurrentUser;
use crate::http::error::ApiError;
use crate::http::extractors::QueryParams;
use crate::http::server::AppState;
use crate::integrations::Gif;

const DEFAULT_LIMIT: u32 = 12;
const MAX_LIMIT: u32 = 50;
const MAX_QUERY_LEN: usize = 100;

#[derive(Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
    pub limit: Option<u32>,
}

/// GET /api/gifs/search?q=&limit=
async fn search(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    QueryParams(query): QueryParams<SearchQuery>,
) -> Result<Json<Vec<Gif>>, ApiError> {
    let q = query.q.trim();
    if q.is_empty() {
        return Err(neighborly_core::ValidationError::Empty { field: "q" }.into());
    }
    if q.chars().count() > MAX_QUERY_LEN {
        return Err(neighborly_core::ValidationError::TooLong {
            field: "q",
            max: MAX_QUERY_LEN,
        }
        .into());
    }
    let limit = query.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);

    Ok(Json(state.gifs.search(q, limit).await?))
}

/// GIF routes (rate limited)
pub fn router() -> Router<Arc<AppState>> {
    Router::new().route("/api/gifs/search", get(search))
}
