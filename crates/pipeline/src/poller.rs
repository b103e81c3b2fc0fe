//! Reconciliation of local job state against the render service's queue.
//!
//! [`ReconciliationPoller::run`] ticks on a fixed interval until the session
//! closes. Each tick fetches the task list for every kind with queued keys
//! (concurrently), folds the results into the session, and triggers one
//! chapter refresh if anything resolved. Ticks never overlap: the loop
//! awaits each tick before waiting for the next, missed intervals are
//! skipped, and [`ReconciliationPoller::tick`] refuses to start while
//! another tick on the same session is running.

use std::collections::BTreeSet;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use reel_core::assets::ChapterAssets;
use reel_core::job::{JobKey, JobKind};
use reel_core::task;
use reel_core::tracker::JobOutcome;
use tokio::time::MissedTickBehavior;

use crate::config::PipelineConfig;
use crate::events::PipelineEvent;
use crate::session::ChapterSession;

/// What a single tick did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TickOutcome {
    /// Another tick was still running.
    Skipped,
    /// No kind had queued keys; no request was made.
    Idle,
    Polled(TickReport),
}

/// Counts for a tick that reached the render service.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Kinds whose task list was fetched.
    pub polled: Vec<JobKind>,
    /// Kinds whose fetch failed; retried next tick.
    pub fetch_failed: Vec<JobKind>,
    pub completed: usize,
    pub failed: usize,
    /// Queued keys the service no longer listed.
    pub dropped: usize,
    /// Whether the chapter refresh ran this tick.
    pub refreshed: bool,
}

/// Clears the session's busy flag when a tick ends, however it ends.
struct TickGuard<'a>(&'a ChapterSession);

impl<'a> TickGuard<'a> {
    fn acquire(session: &'a ChapterSession) -> Option<Self> {
        session
            .poll_busy
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(session))
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.0.poll_busy.store(false, Ordering::Release);
    }
}

/// Periodic, non-overlapping reconciliation for one session.
#[derive(Debug, Clone, Copy)]
pub struct ReconciliationPoller {
    interval: Duration,
    task_list_limit: u32,
}

impl ReconciliationPoller {
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            interval: config.poll_interval,
            task_list_limit: config.task_list_limit,
        }
    }

    /// Tick every interval until the session is closed.
    ///
    /// The loop keeps running while nothing is queued so that newly queued
    /// work is noticed within one interval; idle ticks make no requests.
    pub async fn run(self, session: Arc<ChapterSession>) {
        let mut ticker = tokio::time::interval_at(
            tokio::time::Instant::now() + self.interval,
            self.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        tracing::info!(
            chapter_id = session.chapter_id(),
            interval_ms = self.interval.as_millis() as u64,
            "Reconciliation poller started",
        );

        loop {
            tokio::select! {
                _ = session.cancel_token().cancelled() => break,
                _ = ticker.tick() => {
                    match self.tick(&session).await {
                        TickOutcome::Polled(report) => tracing::debug!(
                            chapter_id = session.chapter_id(),
                            ?report,
                            "Reconciliation tick finished",
                        ),
                        TickOutcome::Skipped => tracing::debug!(
                            chapter_id = session.chapter_id(),
                            "Previous tick still running, skipped",
                        ),
                        TickOutcome::Idle => {}
                    }
                }
            }
        }

        tracing::info!(chapter_id = session.chapter_id(), "Reconciliation poller stopped");
    }

    /// Run one reconciliation pass.
    pub async fn tick(&self, session: &ChapterSession) -> TickOutcome {
        let Some(_guard) = TickGuard::acquire(session) else {
            return TickOutcome::Skipped;
        };

        let mut pending: Vec<(JobKind, BTreeSet<JobKey>)> = Vec::new();
        for kind in JobKind::ALL {
            let snapshot = session.tracker(kind).lock().await.snapshot_queued();
            if !snapshot.is_empty() {
                pending.push((kind, snapshot));
            }
        }
        if pending.is_empty() {
            return TickOutcome::Idle;
        }

        let service = session.service();
        let limit = self.task_list_limit;
        let fetches = join_all(
            pending
                .iter()
                .map(|(kind, _)| async move { service.list_tasks(*kind, limit).await }),
        )
        .await;

        let chapter_id = session.chapter_id();
        let mut report = TickReport::default();
        let mut completed: Vec<(JobKind, JobKey, String)> = Vec::new();

        for ((kind, snapshot), fetched) in pending.into_iter().zip(fetches) {
            let records = match fetched {
                Ok(records) => records,
                Err(e) => {
                    tracing::warn!(chapter_id, kind = %kind, error = %e, "Task list fetch failed");
                    report.fetch_failed.push(kind);
                    continue;
                }
            };
            report.polled.push(kind);

            let observations = task::observe(kind, chapter_id, &records);
            let outcome = session
                .tracker(kind)
                .lock()
                .await
                .apply_reconciliation(&snapshot, &observations);

            if !outcome.completed.is_empty() {
                let mut assets = session.asset_state().write().await;
                for (key, url) in &outcome.completed {
                    assets.apply_result(kind, key, url);
                }
            }

            for (key, url) in &outcome.completed {
                tracing::info!(chapter_id, kind = %kind, key = %key, url = %url, "Job completed");
                session.emit(PipelineEvent::JobResolved {
                    chapter_id,
                    kind,
                    key: *key,
                    outcome: JobOutcome::Success { url: url.clone() },
                });
                completed.push((kind, *key, url.clone()));
            }
            for (key, error) in &outcome.failed {
                tracing::warn!(chapter_id, kind = %kind, key = %key, error = %error, "Job failed");
                session.emit(PipelineEvent::JobResolved {
                    chapter_id,
                    kind,
                    key: *key,
                    outcome: JobOutcome::Failure {
                        error: error.clone(),
                    },
                });
            }
            if !outcome.dropped.is_empty() {
                tracing::info!(
                    chapter_id,
                    kind = %kind,
                    keys = ?outcome.dropped,
                    "Queued jobs no longer listed by the render service, cleared",
                );
            }

            report.completed += outcome.completed.len();
            report.failed += outcome.failed.len();
            report.dropped += outcome.dropped.len();
        }

        if report.completed + report.failed > 0 {
            report.refreshed = refresh_chapter(session, &completed).await;
        }

        TickOutcome::Polled(report)
    }
}

/// Reload the chapter once, keeping results folded during this tick and
/// uploads applied while the reload was in flight, in case the reloaded data
/// does not carry them yet.
async fn refresh_chapter(session: &ChapterSession, folded: &[(JobKind, JobKey, String)]) -> bool {
    let chapter_id = session.chapter_id();

    // Uploads applied before this point are on the server already.
    session.recent_uploads().lock().await.clear();

    match session.service().fetch_chapter(chapter_id).await {
        Ok(chapter) => {
            let mut fresh = ChapterAssets::from_chapter(&chapter);
            for (kind, key, url) in folded {
                let present = match (kind, key) {
                    (JobKind::ShotImage, JobKey::Shot(n)) => fresh.has_image(*n),
                    (JobKind::ShotVideo, JobKey::Shot(n)) => fresh.has_video(*n),
                    (JobKind::TransitionVideo, JobKey::Transition { from, .. }) => {
                        fresh.transition_url(*from).is_some()
                    }
                    _ => true,
                };
                if !present {
                    fresh.apply_result(*kind, key, url);
                }
            }
            {
                let mut assets = session.asset_state().write().await;
                let uploads = std::mem::take(&mut *session.recent_uploads().lock().await);
                for (ordinal, url) in &uploads {
                    fresh.set_uploaded_image(*ordinal, url);
                }
                *assets = fresh;
            }
            session.emit(PipelineEvent::ChapterRefreshed { chapter_id });
            true
        }
        Err(e) => {
            tracing::warn!(chapter_id, error = %e, "Chapter refresh failed, keeping local assets");
            false
        }
    }
}
