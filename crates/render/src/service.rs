//! The render service boundary used by the pipeline.
//!
//! [`RenderService`] is implemented over HTTP by [`crate::api::RenderApi`];
//! tests substitute an in-memory implementation.

use async_trait::async_trait;
use reel_core::assets::Chapter;
use reel_core::job::{JobKey, JobKind};
use reel_core::task::RemoteTaskRecord;
use reel_core::types::ChapterId;
use serde::{Deserialize, Serialize};

use crate::api::RenderApiError;

/// Message fragments the service uses to say a job for the same unit is
/// already queued or running. Matched case-insensitively.
pub const ALREADY_RUNNING_MARKERS: &[&str] = &[
    "already running",
    "already in progress",
    "already queued",
    "正在生成",
    "已在运行",
    "已在队列",
];

/// Whether a service message reports an already-running job.
pub fn is_already_running_message(message: &str) -> bool {
    let lowered = message.to_lowercase();
    ALREADY_RUNNING_MARKERS
        .iter()
        .any(|marker| lowered.contains(marker))
}

/// Envelope returned by every submission endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitAck {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

/// How the pipeline reads a submission acknowledgement.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// The job was queued.
    Accepted,
    /// A job for the same unit is already queued or running.
    AlreadyRunning,
    /// The service refused the job.
    Rejected(String),
}

impl SubmitAck {
    pub fn outcome(&self) -> SubmitOutcome {
        if self.success {
            SubmitOutcome::Accepted
        } else if is_already_running_message(&self.message) {
            SubmitOutcome::AlreadyRunning
        } else {
            SubmitOutcome::Rejected(self.message.clone())
        }
    }
}

/// Extra parameters carried by transition submissions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransitionOptions {
    /// Workflow selector understood by the render service.
    pub workflow_id: Option<String>,
    /// Number of frames to render.
    pub frame_count: Option<u32>,
}

impl TransitionOptions {
    /// Frame count for a clip of `duration_secs` at `fps`, at least one frame.
    pub fn frame_count_for(duration_secs: f64, fps: u32) -> u32 {
        if duration_secs <= 0.0 || fps == 0 {
            return 1;
        }
        ((duration_secs * fps as f64).round() as u32).max(1)
    }
}

/// Operations the pipeline needs from the render service.
#[async_trait]
pub trait RenderService: Send + Sync {
    /// Submit one generation job.
    ///
    /// `options` is only sent for [`JobKind::TransitionVideo`].
    async fn submit(
        &self,
        chapter_id: ChapterId,
        kind: JobKind,
        key: &JobKey,
        options: &TransitionOptions,
    ) -> Result<SubmitAck, RenderApiError>;

    /// List tasks of one kind, newest first, at most `limit` records.
    async fn list_tasks(
        &self,
        kind: JobKind,
        limit: u32,
    ) -> Result<Vec<RemoteTaskRecord>, RenderApiError>;

    /// Load a chapter with its shots and transitions.
    async fn fetch_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, RenderApiError>;
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
