//! Per-chapter pipeline state.
//!
//! A [`ChapterSession`] is the sole owner of one chapter's three job
//! trackers and its asset state. Each tracker sits behind its own mutex and
//! the assets behind a read/write lock; no lock is held across a call to the
//! render service. When several locks are needed they are taken in a fixed
//! order: assets first, then trackers in [`JobKind`] order.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use reel_core::assets::ChapterAssets;
use reel_core::gate::{self, Eligibility};
use reel_core::job::{JobKey, JobKind};
use reel_core::tracker::{JobOutcome, JobState, JobTracker};
use reel_core::types::{ChapterId, Ordinal};
use reel_render::service::RenderService;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::PipelineConfig;
use crate::error::PipelineError;
use crate::events::PipelineEvent;
use crate::poller::{ReconciliationPoller, TickOutcome};
use crate::submitter::{BatchReport, BatchSubmitter, ItemOutcome};

/// Broadcast channel capacity for session events.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// The three per-kind trackers of a session.
struct Trackers {
    shot_image: Mutex<JobTracker>,
    shot_video: Mutex<JobTracker>,
    transition_video: Mutex<JobTracker>,
}

impl Trackers {
    fn new() -> Self {
        Self {
            shot_image: Mutex::new(JobTracker::new(JobKind::ShotImage)),
            shot_video: Mutex::new(JobTracker::new(JobKind::ShotVideo)),
            transition_video: Mutex::new(JobTracker::new(JobKind::TransitionVideo)),
        }
    }

    fn get(&self, kind: JobKind) -> &Mutex<JobTracker> {
        match kind {
            JobKind::ShotImage => &self.shot_image,
            JobKind::ShotVideo => &self.shot_video,
            JobKind::TransitionVideo => &self.transition_video,
        }
    }
}

/// Generation state for one open chapter.
pub struct ChapterSession {
    chapter_id: ChapterId,
    service: Arc<dyn RenderService>,
    config: PipelineConfig,
    assets: RwLock<ChapterAssets>,
    /// Uploads applied since the last chapter refresh started fetching.
    recent_uploads: Mutex<BTreeMap<Ordinal, String>>,
    trackers: Trackers,
    event_tx: broadcast::Sender<PipelineEvent>,
    /// Cancelled when the chapter is closed.
    cancel: CancellationToken,
    /// Set while a reconciliation tick is running.
    pub(crate) poll_busy: AtomicBool,
}

impl std::fmt::Debug for ChapterSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChapterSession")
            .field("chapter_id", &self.chapter_id)
            .field("closed", &self.is_closed())
            .finish_non_exhaustive()
    }
}

impl ChapterSession {
    /// Create a session over already-loaded asset state.
    pub fn new(
        chapter_id: ChapterId,
        assets: ChapterAssets,
        service: Arc<dyn RenderService>,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Arc<Self> {
        let (event_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Arc::new(Self {
            chapter_id,
            service,
            config,
            assets: RwLock::new(assets),
            recent_uploads: Mutex::new(BTreeMap::new()),
            trackers: Trackers::new(),
            event_tx,
            cancel,
            poll_busy: AtomicBool::new(false),
        })
    }

    /// Load the chapter from the render service and create a session for it.
    pub async fn open(
        chapter_id: ChapterId,
        service: Arc<dyn RenderService>,
        config: PipelineConfig,
        cancel: CancellationToken,
    ) -> Result<Arc<Self>, PipelineError> {
        let chapter = service
            .fetch_chapter(chapter_id)
            .await
            .map_err(|source| PipelineError::ChapterLoad { chapter_id, source })?;
        let assets = ChapterAssets::from_chapter(&chapter);

        tracing::info!(
            chapter_id,
            shot_count = assets.shot_count(),
            "Chapter session opened",
        );

        Ok(Self::new(chapter_id, assets, service, config, cancel))
    }

    pub fn chapter_id(&self) -> ChapterId {
        self.chapter_id
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub(crate) fn service(&self) -> &dyn RenderService {
        self.service.as_ref()
    }

    /// Subscribe to this session's events.
    pub fn subscribe(&self) -> broadcast::Receiver<PipelineEvent> {
        self.event_tx.subscribe()
    }

    pub(crate) fn emit(&self, event: PipelineEvent) {
        // No subscribers is fine.
        let _ = self.event_tx.send(event);
    }

    /// Stop the session's poller and any batch still running.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    // ---- user-facing actions ----

    /// Submit a single job, without stagger.
    pub async fn generate_one(&self, kind: JobKind, key: JobKey) -> ItemOutcome {
        BatchSubmitter::new(self.config.submit_stagger)
            .submit_one(self, kind, key)
            .await
    }

    /// Submit every job of `kind` the dependency gate currently allows.
    pub async fn generate_all_eligible(&self, kind: JobKind) -> BatchReport {
        let candidates = self.assets.read().await.candidate_keys(kind);
        BatchSubmitter::new(self.config.submit_stagger)
            .submit_all(self, kind, candidates)
            .await
    }

    /// Record a user-uploaded image for a shot.
    ///
    /// The upload supersedes any image generation for the shot, so its
    /// `shot_image` state is cleared. It is also remembered until the next
    /// chapter refresh, which re-applies it if the reloaded chapter predates
    /// it. Returns `false` for unknown shots.
    pub async fn apply_uploaded_image(&self, ordinal: Ordinal, url: &str) -> bool {
        {
            let mut assets = self.assets.write().await;
            if !assets.set_uploaded_image(ordinal, url) {
                return false;
            }
            self.recent_uploads
                .lock()
                .await
                .insert(ordinal, url.to_string());
        }
        let previous = self
            .trackers
            .get(JobKind::ShotImage)
            .lock()
            .await
            .clear(&JobKey::shot(ordinal));

        tracing::info!(
            chapter_id = self.chapter_id,
            ordinal,
            superseded = previous.is_some(),
            "Uploaded image applied to shot",
        );
        true
    }

    /// Track a job the render service reports as already running for `key`,
    /// so reconciliation resolves it like one submitted from here.
    ///
    /// Returns `false` when the key is outstanding, outside the chapter, or
    /// does not fit `kind`.
    pub async fn adopt_running(&self, kind: JobKind, key: JobKey) -> bool {
        let in_chapter = {
            let assets = self.assets.read().await;
            key.ordinals().iter().all(|n| assets.contains_shot(*n))
        };
        if !in_chapter || !self.trackers.get(kind).lock().await.mark_adopted(key) {
            return false;
        }

        tracing::info!(
            chapter_id = self.chapter_id,
            kind = %kind,
            key = %key,
            "Tracking job already running on the render service",
        );
        self.emit(PipelineEvent::JobQueued {
            chapter_id: self.chapter_id,
            kind,
            key,
        });
        true
    }

    /// Run one reconciliation tick now, unless one is already running.
    pub async fn poll_now(&self) -> TickOutcome {
        ReconciliationPoller::new(&self.config).tick(self).await
    }

    // ---- read side ----

    /// Keys of `kind` that are submitting or queued.
    pub async fn outstanding(&self, kind: JobKind) -> BTreeSet<JobKey> {
        self.trackers.get(kind).lock().await.outstanding()
    }

    /// Whether no job of any kind is submitting or queued.
    pub async fn is_idle(&self) -> bool {
        for kind in JobKind::ALL {
            if self.trackers.get(kind).lock().await.has_outstanding() {
                return false;
            }
        }
        true
    }

    pub async fn state(&self, kind: JobKind, key: &JobKey) -> Option<JobState> {
        self.trackers.get(kind).lock().await.state(key).cloned()
    }

    pub async fn last_result(&self, kind: JobKind, key: &JobKey) -> Option<JobOutcome> {
        self.trackers.get(kind).lock().await.last_result(key).cloned()
    }

    pub async fn results(&self, kind: JobKind) -> BTreeMap<JobKey, JobOutcome> {
        self.trackers.get(kind).lock().await.results()
    }

    /// Copy of the chapter's current asset state.
    pub async fn assets(&self) -> ChapterAssets {
        self.assets.read().await.clone()
    }

    /// Whether the single-pair transition action should be offered for the
    /// pair starting at `from` (both shots have images).
    pub async fn transition_action_available(&self, from: Ordinal) -> bool {
        let Some(key) = JobKey::transition(from) else {
            return false;
        };
        let assets = self.assets.read().await;
        let images = self.trackers.get(JobKind::ShotImage).lock().await;
        gate::transition_action_available(&key, &assets, Some(&images))
    }

    /// Gate verdict for one key without changing any state.
    pub async fn eligibility(&self, kind: JobKind, key: &JobKey) -> Eligibility {
        let assets = self.assets.read().await;
        let upstream = match gate::prerequisite(kind) {
            Some(prev) => Some(self.trackers.get(prev).lock().await),
            None => None,
        };
        let own = self.trackers.get(kind).lock().await;
        gate::check(kind, key, &assets, &own, upstream.as_deref())
    }

    // ---- submission plumbing ----

    /// Check the gate and, if eligible, mark the key submitting, atomically
    /// with respect to other submissions and reconciliation.
    pub(crate) async fn try_begin(&self, kind: JobKind, key: JobKey) -> Eligibility {
        let assets = self.assets.read().await;
        let upstream = match gate::prerequisite(kind) {
            Some(prev) => Some(self.trackers.get(prev).lock().await),
            None => None,
        };
        let mut own = self.trackers.get(kind).lock().await;

        let verdict = gate::check(kind, &key, &assets, &own, upstream.as_deref());
        if verdict.is_eligible() {
            own.mark_submitting(key);
        }
        verdict
    }

    /// Record a successful submission acknowledgement.
    pub(crate) async fn finish_queued(&self, kind: JobKind, key: JobKey) -> bool {
        let queued = self.trackers.get(kind).lock().await.mark_queued(&key);
        if queued {
            self.emit(PipelineEvent::JobQueued {
                chapter_id: self.chapter_id,
                kind,
                key,
            });
        }
        queued
    }

    /// Return a submission that produced no job to absent.
    pub(crate) async fn finish_reverted(&self, kind: JobKind, key: JobKey) {
        self.trackers.get(kind).lock().await.revert_submission(&key);
    }

    pub(crate) fn tracker(&self, kind: JobKind) -> &Mutex<JobTracker> {
        self.trackers.get(kind)
    }

    pub(crate) fn asset_state(&self) -> &RwLock<ChapterAssets> {
        &self.assets
    }

    pub(crate) fn recent_uploads(&self) -> &Mutex<BTreeMap<Ordinal, String>> {
        &self.recent_uploads
    }
}
