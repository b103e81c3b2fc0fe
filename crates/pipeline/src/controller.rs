//! Chapter-scoped pipeline controller.
//!
//! [`PipelineController`] keeps one [`ChapterSession`] per open chapter,
//! each with its own trackers and its own reconciliation poller task.
//! Closing or switching a chapter cancels its poller and drops its
//! trackers, so no pending state leaks from one chapter into another.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use reel_core::job::{JobKey, JobKind};
use reel_core::types::ChapterId;
use reel_render::service::RenderService;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::poller::ReconciliationPoller;
use crate::session::ChapterSession;
use crate::submitter::{BatchReport, ItemOutcome};

/// How long to wait for a poller task to exit when a chapter closes.
const POLLER_STOP_TIMEOUT: Duration = Duration::from_secs(5);

/// Internal bookkeeping for one open chapter.
struct ManagedSession {
    session: Arc<ChapterSession>,
    poller: tokio::task::JoinHandle<()>,
}

/// Owns the sessions of every open chapter.
///
/// Cheap to share behind an `Arc`; all methods take `&self`.
pub struct PipelineController {
    service: Arc<dyn RenderService>,
    config: PipelineConfig,
    sessions: RwLock<HashMap<ChapterId, ManagedSession>>,
    /// Master cancellation token; every session token is a child of it.
    cancel: CancellationToken,
}

impl PipelineController {
    pub fn new(service: Arc<dyn RenderService>, config: PipelineConfig) -> Self {
        Self {
            service,
            config,
            sessions: RwLock::new(HashMap::new()),
            cancel: CancellationToken::new(),
        }
    }

    /// Open a session for `chapter_id`, loading the chapter and starting its
    /// poller. Returns the existing session if the chapter is already open.
    pub async fn open_chapter(
        &self,
        chapter_id: ChapterId,
    ) -> Result<Arc<ChapterSession>, PipelineError> {
        if let Some(existing) = self.session(chapter_id).await {
            return Ok(existing);
        }

        let session = ChapterSession::open(
            chapter_id,
            Arc::clone(&self.service),
            self.config.clone(),
            self.cancel.child_token(),
        )
        .await?;

        let mut sessions = self.sessions.write().await;
        // Another caller may have opened the chapter while we were loading.
        if let Some(existing) = sessions.get(&chapter_id) {
            session.close();
            return Ok(Arc::clone(&existing.session));
        }

        let poller = ReconciliationPoller::new(&self.config);
        let poller = tokio::spawn(poller.run(Arc::clone(&session)));
        sessions.insert(
            chapter_id,
            ManagedSession {
                session: Arc::clone(&session),
                poller,
            },
        );

        Ok(session)
    }

    /// The open session for `chapter_id`, if any.
    pub async fn session(&self, chapter_id: ChapterId) -> Option<Arc<ChapterSession>> {
        self.sessions
            .read()
            .await
            .get(&chapter_id)
            .map(|managed| Arc::clone(&managed.session))
    }

    /// IDs of all open chapters.
    pub async fn open_chapters(&self) -> Vec<ChapterId> {
        let mut ids: Vec<ChapterId> = self.sessions.read().await.keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// Close a chapter: stop its poller and discard its trackers.
    ///
    /// Returns `false` if the chapter was not open.
    pub async fn close_chapter(&self, chapter_id: ChapterId) -> bool {
        let managed = self.sessions.write().await.remove(&chapter_id);
        match managed {
            Some(managed) => {
                stop(chapter_id, managed).await;
                true
            }
            None => false,
        }
    }

    /// Close `previous` (if any and different) and open `next`.
    pub async fn switch_chapter(
        &self,
        previous: Option<ChapterId>,
        next: ChapterId,
    ) -> Result<Arc<ChapterSession>, PipelineError> {
        if let Some(previous) = previous.filter(|id| *id != next) {
            self.close_chapter(previous).await;
        }
        self.open_chapter(next).await
    }

    /// Submit a single job in an open chapter.
    pub async fn generate_one(
        &self,
        chapter_id: ChapterId,
        kind: JobKind,
        key: JobKey,
    ) -> Result<ItemOutcome, PipelineError> {
        let session = self.require(chapter_id).await?;
        Ok(session.generate_one(kind, key).await)
    }

    /// Submit every eligible job of `kind` in an open chapter.
    pub async fn generate_all_eligible(
        &self,
        chapter_id: ChapterId,
        kind: JobKind,
    ) -> Result<BatchReport, PipelineError> {
        let session = self.require(chapter_id).await?;
        Ok(session.generate_all_eligible(kind).await)
    }

    /// Close every chapter.
    pub async fn shutdown(&self) {
        tracing::info!("Shutting down pipeline controller");
        self.cancel.cancel();

        let drained: Vec<_> = self.sessions.write().await.drain().collect();
        for (chapter_id, managed) in drained {
            stop(chapter_id, managed).await;
        }

        tracing::info!("Pipeline controller shut down complete");
    }

    async fn require(&self, chapter_id: ChapterId) -> Result<Arc<ChapterSession>, PipelineError> {
        self.session(chapter_id)
            .await
            .ok_or(PipelineError::ChapterNotOpen(chapter_id))
    }
}

async fn stop(chapter_id: ChapterId, managed: ManagedSession) {
    managed.session.close();
    if tokio::time::timeout(POLLER_STOP_TIMEOUT, managed.poller)
        .await
        .is_err()
    {
        tracing::warn!(chapter_id, "Poller did not stop in time");
    }
    tracing::info!(chapter_id, "Chapter session closed");
}
