//! Keyword-based topic and sentiment analysis, memoized by text hash

use std::sync::Arc;

use axum::{extract::State, routing::post, Json, Router};
use neighborly_core::{
    analyze_sentiment, classify_topic, text_hash, Body, SentimentAnalysis, TopicClassification,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};

use crate::auth::CurrentUser;
use crate::http::error::ApiError;
use crate::http::extractors::JsonBody;
use crate::http::server::AppState;
use crate::store::AnalysisKind;

#[derive(Deserialize)]
pub struct AnalyzeRequest {
    pub text: String,
}

/// An analysis result plus whether it came from the cache
#[derive(Debug, Serialize)]
pub struct Analyzed<T> {
    #[serde(flatten)]
    pub result: T,
    pub cached: bool,
}

/// Look `text` up in the cache for `kind`, computing and storing on a miss.
///
/// A cached row that no longer deserializes is recomputed and overwritten.
pub(crate) async fn memoized<T, F>(
    state: &AppState,
    kind: AnalysisKind,
    text: &str,
    compute: F,
) -> Result<Analyzed<T>, ApiError>
where
    T: Serialize + DeserializeOwned,
    F: FnOnce(&str) -> T,
{
    let hash = text_hash(text);

    if let Some(value) = state.store.cached_analysis(kind, &hash).await? {
        match serde_json::from_value::<T>(value) {
            Ok(result) => return Ok(Analyzed { result, cached: true }),
            Err(e) => tracing::warn!(error = %e, table = kind.table(), %hash, "stale cache row"),
        }
    }

    let result = compute(text);
    let value = serde_json::to_value(&result)
        .map_err(|e| ApiError::internal(format!("encoding analysis: {e}")))?;
    state.store.store_analysis(kind, &hash, &value).await?;
    Ok(Analyzed {
        result,
        cached: false,
    })
}

/// Sentiment for `text`, through the cache.
pub(crate) async fn sentiment(
    state: &AppState,
    text: &str,
) -> Result<Analyzed<SentimentAnalysis>, ApiError> {
    memoized(state, AnalysisKind::Sentiment, text, analyze_sentiment).await
}

/// POST /api/ai/classify
async fn classify(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    JsonBody(req): JsonBody<AnalyzeRequest>,
) -> Result<Json<Analyzed<TopicClassification>>, ApiError> {
    let text = Body::new(&req.text)?;
    Ok(Json(
        memoized(&state, AnalysisKind::Topic, text.as_str(), classify_topic).await?,
    ))
}

/// POST /api/ai/sentiment
async fn sentiment_route(
    State(state): State<Arc<AppState>>,
    CurrentUser(_user): CurrentUser,
    JsonBody(req): JsonBody<AnalyzeRequest>,
) -> Result<Json<Analyzed<SentimentAnalysis>>, ApiError> {
    let text = Body::new(&req.text)?;
    Ok(Json(sentiment(&state, text.as_str()).await?))
}

/// Analysis routes (rate limited)
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/ai/classify", post(classify))
        .route("/api/ai/sentiment", post(sentiment_route))
}
