use reel_core::types::ChapterId;
use reel_render::api::RenderApiError;

/// Errors surfaced by the pipeline controller.
///
/// Per-job failures never appear here; they are reported through
/// [`crate::submitter::BatchReport`] and the trackers.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    /// No session is open for the chapter.
    #[error("Chapter {0} is not open")]
    ChapterNotOpen(ChapterId),

    /// The chapter could not be loaded from the render service.
    #[error("Failed to load chapter {chapter_id}: {source}")]
    ChapterLoad {
        chapter_id: ChapterId,
        #[source]
        source: RenderApiError,
    },
}
