use crate::api::models::{
    ErrorBody, Story, StoryCreate, StoryItem, StoryItemBatchUpdate, StoryItemCreate,
    StoryItemMove, StoryItemReorder, StorySummary,
};
use crate::story::provider::StoryDataProvider;
use reqwest::{Client, Method, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, warn};
use urlencoding::encode;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Non-2xx response; `message` is the server's `detail` when it sent one
    #[error("{message}")]
    Server { status: u16, message: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Not found: {0}")]
    NotFound(String),
}

impl ApiError {
    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            ApiError::Server { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }
}

/// HTTP client for the voicebox backend's story endpoints
#[derive(Clone)]
pub struct StoryClient {
    client: Client,
    base_url: String,
}

impl StoryClient {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the backend serves a generation's audio from
    pub fn audio_url(&self, generation_id: &str) -> String {
        format!("{}/audio/{}", self.base_url, encode(generation_id))
    }

    fn story_url(&self, story_id: &str, suffix: &str) -> String {
        format!("{}/stories/{}{}", self.base_url, encode(story_id), suffix)
    }

    async fn send<B: Serialize + ?Sized>(
        &self,
        method: Method,
        url: &str,
        body: Option<&B>,
    ) -> Result<Response, ApiError> {
        debug!("{} {}", method, url);

        let mut request = self.client.request(method, url);
        if let Some(body) = body {
            request = request.json(body);
        }

        let response = request.send().await?;
        check_status(response).await
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T, ApiError> {
        let response = self.send::<()>(Method::GET, url, None).await?;
        Ok(response.json().await?)
    }

    async fn send_json<B: Serialize + ?Sized, T: DeserializeOwned>(
        &self,
        method: Method,
        url: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let response = self.send(method, url, Some(body)).await?;
        Ok(response.json().await?)
    }

    async fn get_bytes(&self, url: &str) -> Result<Vec<u8>, ApiError> {
        let response = self.send::<()>(Method::GET, url, None).await?;
        Ok(response.bytes().await?.to_vec())
    }
}

/// Turn a non-2xx response into `ApiError::Server`, preferring the backend's `detail`
async fn check_status(response: Response) -> Result<Response, ApiError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let message = match response.json::<ErrorBody>().await {
        Ok(body) => body
            .detail
            .map(|detail| match detail {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            })
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16())),
        Err(_) => status
            .canonical_reason()
            .map(str::to_string)
            .unwrap_or_else(|| format!("HTTP error! status: {}", status.as_u16())),
    };

    warn!("Request failed with {}: {}", status, message);
    Err(ApiError::Server {
        status: status.as_u16(),
        message,
    })
}

#[async_trait::async_trait]
impl StoryDataProvider for StoryClient {
    async fn list_stories(&self) -> Result<Vec<StorySummary>, ApiError> {
        self.get_json(&format!("{}/stories", self.base_url)).await
    }

    async fn get_story(&self, story_id: &str) -> Result<Story, ApiError> {
        self.get_json(&self.story_url(story_id, "")).await
    }

    async fn create_story(&self, data: &StoryCreate) -> Result<StorySummary, ApiError> {
        self.send_json(Method::POST, &format!("{}/stories", self.base_url), data)
            .await
    }

    async fn update_story(
        &self,
        story_id: &str,
        data: &StoryCreate,
    ) -> Result<StorySummary, ApiError> {
        self.send_json(Method::PUT, &self.story_url(story_id, ""), data)
            .await
    }

    async fn delete_story(&self, story_id: &str) -> Result<(), ApiError> {
        self.send::<()>(Method::DELETE, &self.story_url(story_id, ""), None)
            .await?;
        Ok(())
    }

    async fn add_item(&self, story_id: &str, data: &StoryItemCreate) -> Result<StoryItem, ApiError> {
        self.send_json(Method::POST, &self.story_url(story_id, "/items"), data)
            .await
    }

    async fn remove_item(&self, story_id: &str, generation_id: &str) -> Result<(), ApiError> {
        let url = self.story_url(story_id, &format!("/items/{}", encode(generation_id)));
        self.send::<()>(Method::DELETE, &url, None).await?;
        Ok(())
    }

    async fn update_item_times(
        &self,
        story_id: &str,
        data: &StoryItemBatchUpdate,
    ) -> Result<(), ApiError> {
        self.send(Method::PUT, &self.story_url(story_id, "/items/times"), Some(data))
            .await?;
        Ok(())
    }

    async fn reorder_items(
        &self,
        story_id: &str,
        generation_ids: &[String],
    ) -> Result<Vec<StoryItem>, ApiError> {
        let body = StoryItemReorder {
            generation_ids: generation_ids.to_vec(),
        };
        self.send_json(Method::PUT, &self.story_url(story_id, "/items/reorder"), &body)
            .await
    }

    async fn move_item(
        &self,
        story_id: &str,
        generation_id: &str,
        data: &StoryItemMove,
    ) -> Result<StoryItem, ApiError> {
        let url = self.story_url(story_id, &format!("/items/{}/move", encode(generation_id)));
        self.send_json(Method::PUT, &url, data).await
    }

    async fn export_audio(&self, story_id: &str) -> Result<Vec<u8>, ApiError> {
        self.get_bytes(&self.story_url(story_id, "/export-audio"))
            .await
    }

    async fn clip_audio(&self, generation_id: &str) -> Result<Vec<u8>, ApiError> {
        self.get_bytes(&self.audio_url(generation_id)).await
    }
}
