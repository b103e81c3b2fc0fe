//! Events emitted by chapter sessions.
//!
//! Delivered over a [`tokio::sync::broadcast`] channel; call
//! [`crate::session::ChapterSession::subscribe`] to receive them.

use reel_core::job::{JobKey, JobKind};
use reel_core::tracker::JobOutcome;
use reel_core::types::ChapterId;
use serde::Serialize;

/// A session-level change the editing surface may want to render.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum PipelineEvent {
    /// The render service accepted a job.
    JobQueued {
        chapter_id: ChapterId,
        kind: JobKind,
        key: JobKey,
    },

    /// A queued job reached a terminal state.
    JobResolved {
        chapter_id: ChapterId,
        kind: JobKind,
        key: JobKey,
        outcome: JobOutcome,
    },

    /// A batch submission finished.
    BatchFinished {
        chapter_id: ChapterId,
        kind: JobKind,
        succeeded: usize,
        skipped: usize,
        failed: usize,
    },

    /// Chapter data was reloaded after jobs completed.
    ChapterRefreshed { chapter_id: ChapterId },
}
