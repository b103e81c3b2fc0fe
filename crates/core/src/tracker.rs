//! Client-side lifecycle of generation jobs for one job kind.
//!
//! Each key is in exactly one [`JobState`] or absent from the map. The only
//! way from [`JobState::Submitting`] to [`JobState::Queued`] is
//! [`JobTracker::mark_queued`], called after the render service
//! acknowledged the submission. Every mutation touches a single key, so a
//! submission and a reconciliation pass never overwrite each other.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use crate::job::{JobKey, JobKind};
use crate::task::Observation;

/// Terminal result of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum JobOutcome {
    Success { url: String },
    Failure { error: String },
}

impl JobOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, JobOutcome::Success { .. })
    }
}

/// Local state of one job key. Absent keys have no entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum JobState {
    /// Submission request in flight.
    Submitting,
    /// Acknowledged by the render service, awaiting completion.
    Queued,
    /// Terminal; kept as the key's last result until resubmitted or cleared.
    Resolved(JobOutcome),
}

impl JobState {
    pub fn is_outstanding(&self) -> bool {
        matches!(self, JobState::Submitting | JobState::Queued)
    }
}

/// What one reconciliation pass did to the tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    /// Keys that completed, with their result URL.
    pub completed: Vec<(JobKey, String)>,
    /// Keys that failed, with the reported error.
    pub failed: Vec<(JobKey, String)>,
    /// Keys the service still reports as pending or running.
    pub still_queued: Vec<JobKey>,
    /// Snapshot keys the service no longer lists; cleared to absent.
    pub dropped: Vec<JobKey>,
}

impl Reconciliation {
    /// Whether any key reached a terminal state.
    pub fn any_resolved(&self) -> bool {
        !self.completed.is_empty() || !self.failed.is_empty()
    }
}

/// Job states for one kind within one chapter session.
#[derive(Debug, Clone)]
pub struct JobTracker {
    kind: JobKind,
    states: BTreeMap<JobKey, JobState>,
}

impl JobTracker {
    pub fn new(kind: JobKind) -> Self {
        Self {
            kind,
            states: BTreeMap::new(),
        }
    }

    pub fn kind(&self) -> JobKind {
        self.kind
    }

    pub fn state(&self, key: &JobKey) -> Option<&JobState> {
        self.states.get(key)
    }

    /// absent | resolved -> submitting.
    ///
    /// Returns `false` (and changes nothing) when the key is already
    /// outstanding or does not fit this tracker's kind.
    pub fn mark_submitting(&mut self, key: JobKey) -> bool {
        if !self.kind.accepts(&key) || self.is_outstanding(&key) {
            return false;
        }
        self.states.insert(key, JobState::Submitting);
        true
    }

    /// submitting -> queued. Any other starting state is left untouched,
    /// including absent (the key was cleared while its request was in flight).
    pub fn mark_queued(&mut self, key: &JobKey) -> bool {
        match self.states.get_mut(key) {
            Some(state) if matches!(state, JobState::Submitting) => {
                *state = JobState::Queued;
                true
            }
            _ => false,
        }
    }

    /// queued -> resolved. A no-op for keys that are not queued, so resolving
    /// twice keeps the first outcome.
    pub fn mark_resolved(&mut self, key: &JobKey, outcome: JobOutcome) -> bool {
        match self.states.get_mut(key) {
            Some(state) if matches!(state, JobState::Queued) => {
                *state = JobState::Resolved(outcome);
                true
            }
            _ => false,
        }
    }

    /// absent | resolved -> queued, for a job the render service is already
    /// running without this tracker having submitted it.
    pub fn mark_adopted(&mut self, key: JobKey) -> bool {
        if !self.kind.accepts(&key) || self.is_outstanding(&key) {
            return false;
        }
        self.states.insert(key, JobState::Queued);
        true
    }

    /// submitting -> absent, used when a submission did not produce a job.
    pub fn revert_submission(&mut self, key: &JobKey) -> bool {
        if matches!(self.states.get(key), Some(JobState::Submitting)) {
            self.states.remove(key);
            true
        } else {
            false
        }
    }

    /// Return the key to absent from any state.
    pub fn clear(&mut self, key: &JobKey) -> Option<JobState> {
        self.states.remove(key)
    }

    pub fn is_outstanding(&self, key: &JobKey) -> bool {
        self.states.get(key).is_some_and(JobState::is_outstanding)
    }

    /// Keys currently queued on the render service.
    pub fn snapshot_queued(&self) -> BTreeSet<JobKey> {
        self.keys_where(|s| matches!(s, JobState::Queued))
    }

    /// Keys either submitting or queued.
    pub fn outstanding(&self) -> BTreeSet<JobKey> {
        self.keys_where(JobState::is_outstanding)
    }

    pub fn has_outstanding(&self) -> bool {
        self.states.values().any(JobState::is_outstanding)
    }

    pub fn last_result(&self, key: &JobKey) -> Option<&JobOutcome> {
        match self.states.get(key) {
            Some(JobState::Resolved(outcome)) => Some(outcome),
            _ => None,
        }
    }

    /// Result URL of a successfully resolved key.
    pub fn success_url(&self, key: &JobKey) -> Option<&str> {
        match self.last_result(key) {
            Some(JobOutcome::Success { url }) => Some(url),
            _ => None,
        }
    }

    /// All terminal results, keyed by job key.
    pub fn results(&self) -> BTreeMap<JobKey, JobOutcome> {
        self.states
            .iter()
            .filter_map(|(key, state)| match state {
                JobState::Resolved(outcome) => Some((*key, outcome.clone())),
                _ => None,
            })
            .collect()
    }

    /// Fold one poll's observations into the tracker.
    ///
    /// Only keys in `snapshot` (taken before the task list was fetched) that
    /// are still queued are touched. Keys queued after the snapshot was taken
    /// are outside this pass and are picked up on the next one.
    pub fn apply_reconciliation(
        &mut self,
        snapshot: &BTreeSet<JobKey>,
        observations: &BTreeMap<JobKey, Observation>,
    ) -> Reconciliation {
        let mut result = Reconciliation::default();

        for key in snapshot {
            if !matches!(self.states.get(key), Some(JobState::Queued)) {
                continue;
            }

            match observations.get(key) {
                Some(Observation::InProgress) => result.still_queued.push(*key),
                Some(Observation::Completed { url: Some(url) }) => {
                    self.mark_resolved(key, JobOutcome::Success { url: url.clone() });
                    result.completed.push((*key, url.clone()));
                }
                Some(Observation::Completed { url: None }) => {
                    let error = "completed without a result URL".to_string();
                    self.mark_resolved(key, JobOutcome::Failure { error: error.clone() });
                    result.failed.push((*key, error));
                }
                Some(Observation::Failed { error }) => {
                    let error = error
                        .clone()
                        .unwrap_or_else(|| "generation failed".to_string());
                    self.mark_resolved(key, JobOutcome::Failure { error: error.clone() });
                    result.failed.push((*key, error));
                }
                None => {
                    self.states.remove(key);
                    result.dropped.push(*key);
                }
            }
        }

        result
    }

    fn keys_where(&self, pred: impl Fn(&JobState) -> bool) -> BTreeSet<JobKey> {
        self.states
            .iter()
            .filter(|(_, state)| pred(state))
            .map(|(key, _)| *key)
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    fn queued(tracker: &mut JobTracker, key: JobKey) {
        assert!(tracker.mark_submitting(key));
        assert!(tracker.mark_queued(&key));
    }

    // -- Transitions --

    #[test]
    fn submitting_then_queued() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let key = JobKey::shot(1);

        assert!(t.mark_submitting(key));
        assert_eq!(t.state(&key), Some(&JobState::Submitting));
        assert!(t.snapshot_queued().is_empty());

        assert!(t.mark_queued(&key));
        assert_eq!(t.state(&key), Some(&JobState::Queued));
        assert!(t.snapshot_queued().contains(&key));
    }

    #[test]
    fn outstanding_key_cannot_be_resubmitted() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let key = JobKey::shot(1);

        assert!(t.mark_submitting(key));
        assert!(!t.mark_submitting(key));
        t.mark_queued(&key);
        assert!(!t.mark_submitting(key));
        assert_eq!(t.state(&key), Some(&JobState::Queued));
    }

    #[test]
    fn resolved_key_can_be_retried() {
        let mut t = JobTracker::new(JobKind::ShotVideo);
        let key = JobKey::shot(2);
        queued(&mut t, key);
        t.mark_resolved(&key, JobOutcome::Failure { error: "oom".into() });

        assert!(t.mark_submitting(key));
        assert_eq!(t.last_result(&key), None);
    }

    #[test]
    fn wrong_shape_is_rejected() {
        let mut t = JobTracker::new(JobKind::TransitionVideo);
        assert!(!t.mark_submitting(JobKey::shot(1)));
        assert!(t.outstanding().is_empty());
    }

    #[test]
    fn queued_only_from_submitting() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let key = JobKey::shot(3);
        assert!(!t.mark_queued(&key));
        assert_eq!(t.state(&key), None);
    }

    #[test]
    fn resolving_twice_keeps_first_outcome() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let key = JobKey::shot(1);
        queued(&mut t, key);

        assert!(t.mark_resolved(&key, JobOutcome::Success { url: "/a.png".into() }));
        assert!(!t.mark_resolved(&key, JobOutcome::Failure { error: "late".into() }));
        assert_eq!(t.success_url(&key), Some("/a.png"));
    }

    #[test]
    fn revert_only_undoes_submitting() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let key = JobKey::shot(1);
        assert!(t.mark_submitting(key));
        assert!(t.revert_submission(&key));
        assert_eq!(t.state(&key), None);

        queued(&mut t, key);
        assert!(!t.revert_submission(&key));
        assert!(t.is_outstanding(&key));
    }

    #[test]
    fn adopted_key_is_queued_unless_outstanding() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        assert!(t.mark_adopted(JobKey::shot(1)));
        assert!(t.snapshot_queued().contains(&JobKey::shot(1)));

        assert!(t.mark_submitting(JobKey::shot(2)));
        assert!(!t.mark_adopted(JobKey::shot(2)));
        assert_eq!(t.state(&JobKey::shot(2)), Some(&JobState::Submitting));
        assert!(!t.mark_adopted(JobKey::transition(1).unwrap()));
    }

    #[test]
    fn clear_returns_previous_state() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let key = JobKey::shot(4);
        queued(&mut t, key);
        assert_matches!(t.clear(&key), Some(JobState::Queued));
        assert!(!t.has_outstanding());
    }

    // -- Reconciliation --

    #[test]
    fn reconciliation_folds_each_status() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        for n in 1..=5 {
            queued(&mut t, JobKey::shot(n));
        }
        let snapshot = t.snapshot_queued();
        let observations = BTreeMap::from([
            (JobKey::shot(1), Observation::Completed { url: Some("/1.png".into()) }),
            (JobKey::shot(2), Observation::InProgress),
            (JobKey::shot(3), Observation::Failed { error: Some("nsfw filter".into()) }),
            (JobKey::shot(4), Observation::Completed { url: None }),
        ]);

        let r = t.apply_reconciliation(&snapshot, &observations);

        assert_eq!(r.completed, vec![(JobKey::shot(1), "/1.png".to_string())]);
        assert_eq!(r.still_queued, vec![JobKey::shot(2)]);
        assert_eq!(r.failed.len(), 2);
        assert_eq!(r.dropped, vec![JobKey::shot(5)]);
        assert!(r.any_resolved());

        assert_eq!(t.success_url(&JobKey::shot(1)), Some("/1.png"));
        assert!(t.is_outstanding(&JobKey::shot(2)));
        assert_matches!(
            t.last_result(&JobKey::shot(3)),
            Some(JobOutcome::Failure { error }) if error == "nsfw filter"
        );
        assert_eq!(t.state(&JobKey::shot(5)), None);
        assert_eq!(t.snapshot_queued(), BTreeSet::from([JobKey::shot(2)]));
    }

    #[test]
    fn key_queued_after_snapshot_survives_reconciliation() {
        let mut t = JobTracker::new(JobKind::ShotVideo);
        queued(&mut t, JobKey::shot(1));
        let snapshot = t.snapshot_queued();

        // Lands between the fetch and the fold.
        queued(&mut t, JobKey::shot(2));

        let observations = BTreeMap::from([(
            JobKey::shot(1),
            Observation::Completed {
                url: Some("/1.mp4".into()),
            },
        )]);
        let r = t.apply_reconciliation(&snapshot, &observations);

        assert!(r.dropped.is_empty());
        assert_eq!(t.snapshot_queued(), BTreeSet::from([JobKey::shot(2)]));
    }

    #[test]
    fn key_cleared_during_tick_is_not_resurrected() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        queued(&mut t, JobKey::shot(1));
        let snapshot = t.snapshot_queued();
        t.clear(&JobKey::shot(1));

        let observations = BTreeMap::from([(
            JobKey::shot(1),
            Observation::Completed {
                url: Some("/x.png".into()),
            },
        )]);
        let r = t.apply_reconciliation(&snapshot, &observations);

        assert!(!r.any_resolved());
        assert_eq!(t.state(&JobKey::shot(1)), None);
    }

    #[test]
    fn idle_reconciliation_is_empty() {
        let mut t = JobTracker::new(JobKind::ShotImage);
        let r = t.apply_reconciliation(&BTreeSet::new(), &BTreeMap::new());
        assert_eq!(r, Reconciliation::default());
    }
}
