//! Staggered job submission.
//!
//! [`BatchSubmitter::submit_all`] filters candidates through the dependency
//! gate, then submits the eligible ones one at a time with a fixed delay in
//! between to spare the render service a burst. Per-item failures are
//! counted, never propagated.

use std::time::Duration;

use reel_core::gate::Eligibility;
use reel_core::job::{JobKey, JobKind};
use reel_render::service::{SubmitOutcome, TransitionOptions};

use crate::events::PipelineEvent;
use crate::session::ChapterSession;

/// Result of submitting one key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    /// The render service queued the job.
    Queued,
    /// A job for the key is already queued or running, remotely or locally.
    Skipped,
    /// The dependency gate refused the key; nothing was sent.
    Ineligible(Eligibility),
    /// The submission failed; the key is back to absent.
    Failed(String),
}

/// Aggregate result of a batch submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub kind: JobKind,
    /// Candidates that passed the gate before submission started.
    pub eligible: usize,
    pub succeeded: usize,
    pub skipped: usize,
    pub failed: usize,
    /// Keys counted as skipped, in submission order.
    pub skipped_keys: Vec<JobKey>,
    /// Candidates the gate refused, with the reason.
    pub ineligible: Vec<(JobKey, Eligibility)>,
    /// Failure messages per key.
    pub failures: Vec<(JobKey, String)>,
    /// The session closed before every eligible key was submitted.
    pub aborted: bool,
}

impl BatchReport {
    fn new(kind: JobKind) -> Self {
        Self {
            kind,
            eligible: 0,
            succeeded: 0,
            skipped: 0,
            failed: 0,
            skipped_keys: Vec::new(),
            ineligible: Vec::new(),
            failures: Vec::new(),
            aborted: false,
        }
    }

    /// No candidate passed the gate, so no request was made.
    pub fn nothing_eligible(&self) -> bool {
        self.eligible == 0
    }

    fn record(&mut self, key: JobKey, outcome: ItemOutcome) {
        match outcome {
            ItemOutcome::Queued => self.succeeded += 1,
            ItemOutcome::Skipped => {
                self.skipped += 1;
                self.skipped_keys.push(key);
            }
            ItemOutcome::Ineligible(reason) => self.ineligible.push((key, reason)),
            ItemOutcome::Failed(error) => {
                self.failed += 1;
                self.failures.push((key, error));
            }
        }
    }
}

/// Submits jobs for one session, sequentially.
#[derive(Debug, Clone, Copy)]
pub struct BatchSubmitter {
    stagger: Duration,
}

impl BatchSubmitter {
    pub fn new(stagger: Duration) -> Self {
        Self { stagger }
    }

    /// Submit every eligible key in `candidates`, in order.
    pub async fn submit_all(
        &self,
        session: &ChapterSession,
        kind: JobKind,
        candidates: Vec<JobKey>,
    ) -> BatchReport {
        let mut report = BatchReport::new(kind);

        let mut eligible = Vec::with_capacity(candidates.len());
        for key in candidates {
            match session.eligibility(kind, &key).await {
                Eligibility::Eligible => eligible.push(key),
                reason => report.ineligible.push((key, reason)),
            }
        }
        report.eligible = eligible.len();

        if eligible.is_empty() {
            tracing::info!(
                chapter_id = session.chapter_id(),
                kind = %kind,
                ineligible = report.ineligible.len(),
                "Nothing eligible to submit",
            );
            return report;
        }

        tracing::info!(
            chapter_id = session.chapter_id(),
            kind = %kind,
            eligible = eligible.len(),
            stagger_ms = self.stagger.as_millis() as u64,
            "Starting batch submission",
        );

        let options = session.config().transition_options();
        for (i, key) in eligible.into_iter().enumerate() {
            if i > 0 && !self.stagger.is_zero() {
                tokio::select! {
                    _ = session.cancel_token().cancelled() => {}
                    _ = tokio::time::sleep(self.stagger) => {}
                }
            }
            if session.is_closed() {
                report.aborted = true;
                break;
            }

            let outcome = match submit_key(session, kind, key, &options).await {
                // Someone else picked the key up since the gate pass.
                ItemOutcome::Ineligible(Eligibility::Outstanding) => ItemOutcome::Skipped,
                other => other,
            };
            report.record(key, outcome);
        }

        tracing::info!(
            chapter_id = session.chapter_id(),
            kind = %kind,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            aborted = report.aborted,
            "Batch submission finished",
        );

        session.emit(PipelineEvent::BatchFinished {
            chapter_id: session.chapter_id(),
            kind,
            succeeded: report.succeeded,
            skipped: report.skipped,
            failed: report.failed,
        });

        report
    }

    /// Submit a single key: the batch state machine for one item, no delay.
    pub async fn submit_one(
        &self,
        session: &ChapterSession,
        kind: JobKind,
        key: JobKey,
    ) -> ItemOutcome {
        if session.is_closed() {
            return ItemOutcome::Failed("session closed".to_string());
        }
        let options = session.config().transition_options();
        submit_key(session, kind, key, &options).await
    }
}

async fn submit_key(
    session: &ChapterSession,
    kind: JobKind,
    key: JobKey,
    options: &TransitionOptions,
) -> ItemOutcome {
    let chapter_id = session.chapter_id();

    match session.try_begin(kind, key).await {
        Eligibility::Eligible => {}
        reason => {
            tracing::debug!(chapter_id, kind = %kind, key = %key, ?reason, "Key not eligible");
            return ItemOutcome::Ineligible(reason);
        }
    }

    let result = session.service().submit(chapter_id, kind, &key, options).await;

    let outcome = match result {
        Ok(ack) => match ack.outcome() {
            SubmitOutcome::Accepted => ItemOutcome::Queued,
            SubmitOutcome::AlreadyRunning => ItemOutcome::Skipped,
            SubmitOutcome::Rejected(message) => ItemOutcome::Failed(message),
        },
        Err(e) if e.is_already_running() => ItemOutcome::Skipped,
        Err(e) => ItemOutcome::Failed(e.to_string()),
    };

    match &outcome {
        ItemOutcome::Queued => {
            if session.finish_queued(kind, key).await {
                tracing::info!(chapter_id, kind = %kind, key = %key, "Job queued");
            } else {
                // Cleared while in flight (e.g. superseded by an upload).
                tracing::info!(
                    chapter_id,
                    kind = %kind,
                    key = %key,
                    "Job queued after local clear, not tracked",
                );
            }
        }
        ItemOutcome::Skipped => {
            session.finish_reverted(kind, key).await;
            tracing::info!(chapter_id, kind = %kind, key = %key, "Job already running, skipped");
        }
        ItemOutcome::Failed(error) => {
            session.finish_reverted(kind, key).await;
            tracing::warn!(
                chapter_id,
                kind = %kind,
                key = %key,
                error = %error,
                "Job submission failed",
            );
        }
        ItemOutcome::Ineligible(_) => {}
    }

    outcome
}
