//! REST API client for the render service HTTP endpoints.
//!
//! Wraps job submission, task listing and chapter loading using
//! [`reqwest`].

use std::time::Duration;

use async_trait::async_trait;
use reel_core::assets::Chapter;
use reel_core::job::{JobKey, JobKind};
use reel_core::task::RemoteTaskRecord;
use reel_core::types::{ChapterId, Ordinal};
use serde::Deserialize;

use crate::config::RenderConfig;
use crate::service::{is_already_running_message, RenderService, SubmitAck, TransitionOptions};

/// HTTP client for a single render service instance.
#[derive(Debug, Clone)]
pub struct RenderApi {
    client: reqwest::Client,
    api_url: String,
}

/// Errors from the render service REST layer.
#[derive(Debug, thiserror::Error)]
pub enum RenderApiError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout, etc.).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The render service returned a non-2xx status code.
    #[error("Render service error ({status}): {body}")]
    ApiError {
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The job key does not fit the job kind.
    #[error("Key {key} is not a valid {kind} key")]
    InvalidKey { kind: JobKind, key: JobKey },
}

impl RenderApiError {
    /// Whether the service refused the request because the job is already
    /// queued or running (some deployments answer with `409` instead of a
    /// `success: false` envelope).
    pub fn is_already_running(&self) -> bool {
        match self {
            RenderApiError::ApiError { body, .. } => is_already_running_message(body),
            _ => false,
        }
    }
}

/// Task listings come either bare or wrapped in `{ "tasks": [...] }`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TaskListResponse {
    Bare(Vec<RemoteTaskRecord>),
    Wrapped { tasks: Vec<RemoteTaskRecord> },
}

impl RenderApi {
    /// Create a new API client.
    ///
    /// * `api_url` - Base HTTP URL, e.g. `http://host:8000`.
    pub fn new(api_url: String) -> Self {
        Self::with_client(reqwest::Client::new(), api_url)
    }

    /// Create an API client reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, api_url: String) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
        }
    }

    /// Build a client with the configured request timeout.
    pub fn from_config(config: &RenderConfig) -> Result<Self, RenderApiError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;
        Ok(Self::with_client(client, config.api_url.clone()))
    }

    /// Base HTTP URL of the render service.
    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    /// Queue image generation for one shot.
    ///
    /// Sends `POST /api/v1/chapters/{chapter_id}/shots/{n}/generate-image`.
    pub async fn submit_shot_image(
        &self,
        chapter_id: ChapterId,
        ordinal: Ordinal,
    ) -> Result<SubmitAck, RenderApiError> {
        let response = self
            .client
            .post(self.shot_url(chapter_id, ordinal, "generate-image"))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Queue video generation for one shot.
    ///
    /// Sends `POST /api/v1/chapters/{chapter_id}/shots/{n}/generate-video`.
    pub async fn submit_shot_video(
        &self,
        chapter_id: ChapterId,
        ordinal: Ordinal,
    ) -> Result<SubmitAck, RenderApiError> {
        let response = self
            .client
            .post(self.shot_url(chapter_id, ordinal, "generate-video"))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// Queue a transition video between two adjacent shots.
    ///
    /// Sends `POST /api/v1/chapters/{chapter_id}/transitions/generate`.
    /// Optional fields are omitted from the body when unset.
    pub async fn submit_transition(
        &self,
        chapter_id: ChapterId,
        from: Ordinal,
        to: Ordinal,
        options: &TransitionOptions,
    ) -> Result<SubmitAck, RenderApiError> {
        let mut body = serde_json::json!({
            "from_index": from,
            "to_index": to,
        });
        if let Some(workflow_id) = &options.workflow_id {
            body["workflow_id"] = serde_json::json!(workflow_id);
        }
        if let Some(frame_count) = options.frame_count {
            body["frame_count"] = serde_json::json!(frame_count);
        }

        let response = self
            .client
            .post(format!(
                "{}/api/v1/chapters/{}/transitions/generate",
                self.api_url, chapter_id
            ))
            .json(&body)
            .send()
            .await?;

        Self::parse_response(response).await
    }

    /// List tasks of one kind.
    ///
    /// Sends `GET /api/v1/tasks?task_type={kind}&limit={limit}`. The query is
    /// not chapter-scoped; callers filter by chapter themselves.
    pub async fn list_tasks(
        &self,
        kind: JobKind,
        limit: u32,
    ) -> Result<Vec<RemoteTaskRecord>, RenderApiError> {
        let response = self
            .client
            .get(format!("{}/api/v1/tasks", self.api_url))
            .query(&[("task_type", kind.as_str().to_string()), ("limit", limit.to_string())])
            .send()
            .await?;

        let listing: TaskListResponse = Self::parse_response(response).await?;
        Ok(match listing {
            TaskListResponse::Bare(tasks) | TaskListResponse::Wrapped { tasks } => tasks,
        })
    }

    /// Load a chapter with its shots.
    ///
    /// Sends `GET /api/v1/chapters/{chapter_id}`.
    pub async fn fetch_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, RenderApiError> {
        let response = self
            .client
            .get(format!("{}/api/v1/chapters/{}", self.api_url, chapter_id))
            .send()
            .await?;

        Self::parse_response(response).await
    }

    // ---- private helpers ----

    fn shot_url(&self, chapter_id: ChapterId, ordinal: Ordinal, action: &str) -> String {
        format!(
            "{}/api/v1/chapters/{}/shots/{}/{}",
            self.api_url, chapter_id, ordinal, action
        )
    }

    /// Ensure the response has a success status code. Returns the
    /// response unchanged on success, or a [`RenderApiError::ApiError`]
    /// containing the status and body text on failure.
    async fn ensure_success(
        response: reqwest::Response,
    ) -> Result<reqwest::Response, RenderApiError> {
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(RenderApiError::ApiError {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    /// Parse a successful JSON response body into the expected type.
    async fn parse_response<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, RenderApiError> {
        let response = Self::ensure_success(response).await?;
        Ok(response.json::<T>().await?)
    }
}

#[async_trait]
impl RenderService for RenderApi {
    async fn submit(
        &self,
        chapter_id: ChapterId,
        kind: JobKind,
        key: &JobKey,
        options: &TransitionOptions,
    ) -> Result<SubmitAck, RenderApiError> {
        let ack = match (kind, *key) {
            (JobKind::ShotImage, JobKey::Shot(n)) => self.submit_shot_image(chapter_id, n).await?,
            (JobKind::ShotVideo, JobKey::Shot(n)) => self.submit_shot_video(chapter_id, n).await?,
            (JobKind::TransitionVideo, JobKey::Transition { from, to }) => {
                self.submit_transition(chapter_id, from, to, options).await?
            }
            _ => return Err(RenderApiError::InvalidKey { kind, key: *key }),
        };

        tracing::debug!(
            chapter_id,
            kind = %kind,
            key = %key,
            success = ack.success,
            message = %ack.message,
            "Render service acknowledged submission",
        );
        Ok(ack)
    }

    async fn list_tasks(
        &self,
        kind: JobKind,
        limit: u32,
    ) -> Result<Vec<RemoteTaskRecord>, RenderApiError> {
        RenderApi::list_tasks(self, kind, limit).await
    }

    async fn fetch_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, RenderApiError> {
        RenderApi::fetch_chapter(self, chapter_id).await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trailing_slash_is_trimmed() {
        let api = RenderApi::new("http://render:8000/".into());
        assert_eq!(api.api_url(), "http://render:8000");
        assert_eq!(
            api.shot_url(4, 2, "generate-image"),
            "http://render:8000/api/v1/chapters/4/shots/2/generate-image"
        );
    }

    #[test]
    fn conflict_body_counts_as_already_running() {
        let err = RenderApiError::ApiError {
            status: 409,
            body: r#"{"detail":"Task already running"}"#.into(),
        };
        assert!(err.is_already_running());

        let err = RenderApiError::ApiError {
            status: 500,
            body: "internal".into(),
        };
        assert!(!err.is_already_running());
    }

    #[test]
    fn task_listing_accepts_both_shapes() {
        let bare = r#"[{"name":"Image · shot 1","status":"pending","chapterId":1}]"#;
        let wrapped = r#"{"tasks":[{"name":"Image · shot 1","status":"pending","chapterId":1}]}"#;

        for body in [bare, wrapped] {
            let listing: TaskListResponse = serde_json::from_str(body).unwrap();
            let tasks = match listing {
                TaskListResponse::Bare(t) | TaskListResponse::Wrapped { tasks: t } => t,
            };
            assert_eq!(tasks.len(), 1);
        }
    }

    #[tokio::test]
    async fn mismatched_key_is_rejected_without_a_request() {
        let api = RenderApi::new("http://127.0.0.1:9".into());
        let err = RenderService::submit(
            &api,
            1,
            JobKind::TransitionVideo,
            &JobKey::shot(1),
            &TransitionOptions::default(),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, RenderApiError::InvalidKey { .. }));
    }
}
