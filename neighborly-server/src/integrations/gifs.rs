//! GIF search for chat messages (Giphy-compatible API)

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::config::GifConfig;

/// A search hit, flattened from the provider's payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Gif {
    pub id: String,
    pub title: String,
    pub url: String,
    pub preview_url: String,
}

#[derive(Debug, thiserror::Error)]
pub enum GifError {
    #[error("GIF search is not configured")]
    Disabled,

    #[error("GIF request failed: {0}")]
    Http(#[from] reqwest::Error),
}

#[async_trait]
pub trait GifProvider: Send + Sync {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Gif>, GifError>;
}

pub struct HttpGifProvider {
    http: reqwest::Client,
    api_url: String,
    api_key: String,
    rating: String,
}

impl HttpGifProvider {
    pub fn new(api_url: String, api_key: String, rating: String) -> Result<Self, GifError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self {
            http,
            api_url,
            api_key,
            rating,
        })
    }
}

#[derive(Deserialize)]
struct SearchResponse {
    data: Vec<GifData>,
}

#[derive(Deserialize)]
struct GifData {
    id: String,
    #[serde(default)]
    title: String,
    images: GifImages,
}

#[derive(Deserialize)]
struct GifImages {
    original: GifRendition,
    fixed_width_small: Option<GifRendition>,
}

#[derive(Deserialize)]
struct GifRendition {
    url: String,
}

impl From<GifData> for Gif {
    fn from(data: GifData) -> Self {
        let preview_url = data
            .images
            .fixed_width_small
            .map(|r| r.url)
            .unwrap_or_else(|| data.images.original.url.clone());
        Self {
            id: data.id,
            title: data.title,
            url: data.images.original.url,
            preview_url,
        }
    }
}

#[async_trait]
impl GifProvider for HttpGifProvider {
    async fn search(&self, query: &str, limit: u32) -> Result<Vec<Gif>, GifError> {
        let limit = limit.to_string();
        let response = self
            .http
            .get(&self.api_url)
            .query(&[
                ("api_key", self.api_key.as_str()),
                ("q", query),
                ("limit", limit.as_str()),
                ("rating", self.rating.as_str()),
            ])
            .send()
            .await?
            .error_for_status()?
            .json::<SearchResponse>()
            .await?;

        Ok(response.data.into_iter().map(Gif::from).collect())
    }
}

/// Used when no API key is configured
pub struct DisabledGifs;

#[async_trait]
impl GifProvider for DisabledGifs {
    async fn search(&self, _query: &str, _limit: u32) -> Result<Vec<Gif>, GifError> {
        Err(GifError::Disabled)
    }
}

/// Pick the provider for a configuration.
pub fn provider_from_config(config: &GifConfig) -> Result<Box<dyn GifProvider>, GifError> {
    match &config.api_key {
        Some(key) => Ok(Box::new(HttpGifProvider::new(
            config.api_url.clone(),
            key.clone(),
            config.rating.clone(),
        )?)),
        None => Ok(Box::new(DisabledGifs)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn maps_provider_payload() {
        let payload = r#"{
            "data": [
                {
                    "id": "abc",
                    "title": "Happy dance",
                    "images": {
                        "original": {"url": "https://media.example/abc.gif"},
                        "fixed_width_small": {"url": "https://media.example/abc-small.gif"}
                    }
                },
                {
                    "id": "def",
                    "images": {"original": {"url": "https://media.example/def.gif"}}
                }
            ]
        }"#;
        let response: SearchResponse = serde_json::from_str(payload).unwrap();
        let gifs: Vec<Gif> = response.data.into_iter().map(Gif::from).collect();

        assert_eq!(gifs[0].preview_url, "https://media.example/abc-small.gif");
        assert_eq!(gifs[1].title, "");
        assert_eq!(gifs[1].preview_url, gifs[1].url);
    }

    #[tokio::test]
    async fn disabled_provider_errors() {
        assert!(matches!(
            DisabledGifs.search("cats", 5).await,
            Err(GifError::Disabled)
        ));
    }
}
