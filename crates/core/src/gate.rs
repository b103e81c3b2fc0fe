//! Dependency gate: decides whether a job may be submitted.
//!
//! Pure functions over the chapter's asset state and the job trackers. They
//! do no I/O and are cheap enough to run for every candidate of a batch.
//!
//! | Kind               | Prerequisite                         |
//! |--------------------|--------------------------------------|
//! | `shot_image`       | none                                 |
//! | `shot_video`       | the shot has an image                |
//! | `transition_video` | both shots of the pair have a video  |
//!
//! A prerequisite counts as met when the chapter assets carry the media or
//! the prerequisite kind's tracker holds a successful result for the shot.
//! No job is eligible while the same key is already submitting or queued.

use crate::assets::ChapterAssets;
use crate::job::{JobKey, JobKind};
use crate::tracker::JobTracker;
use crate::types::Ordinal;

/// Gate verdict for one candidate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// The key is already submitting or queued.
    Outstanding,
    /// The shot needs an image first.
    MissingImage(Ordinal),
    /// The shot needs a video first.
    MissingVideo(Ordinal),
    /// The key refers to a shot outside the chapter.
    OutOfRange,
    /// The key's shape does not match the kind.
    WrongShape,
}

impl Eligibility {
    pub fn is_eligible(self) -> bool {
        matches!(self, Eligibility::Eligible)
    }
}

/// The kind whose results satisfy `kind`'s prerequisite, if any.
pub fn prerequisite(kind: JobKind) -> Option<JobKind> {
    match kind {
        JobKind::ShotImage => None,
        JobKind::ShotVideo => Some(JobKind::ShotImage),
        JobKind::TransitionVideo => Some(JobKind::ShotVideo),
    }
}

/// Decide whether `key` may be submitted as a `kind` job.
///
/// * `own`      - the tracker for `kind`.
/// * `upstream` - the tracker for [`prerequisite`]`(kind)`, when available.
pub fn check(
    kind: JobKind,
    key: &JobKey,
    assets: &ChapterAssets,
    own: &JobTracker,
    upstream: Option<&JobTracker>,
) -> Eligibility {
    if !kind.accepts(key) {
        return Eligibility::WrongShape;
    }
    if !key.ordinals().iter().all(|n| assets.contains_shot(*n)) {
        return Eligibility::OutOfRange;
    }
    if own.is_outstanding(key) {
        return Eligibility::Outstanding;
    }

    match (kind, *key) {
        (JobKind::ShotImage, _) => Eligibility::Eligible,
        (JobKind::ShotVideo, JobKey::Shot(n)) => {
            if has_image(assets, upstream, n) {
                Eligibility::Eligible
            } else {
                Eligibility::MissingImage(n)
            }
        }
        (JobKind::TransitionVideo, JobKey::Transition { from, to }) => {
            match [from, to].into_iter().find(|n| !has_video(assets, upstream, *n)) {
                Some(missing) => Eligibility::MissingVideo(missing),
                None => Eligibility::Eligible,
            }
        }
        _ => Eligibility::WrongShape,
    }
}

/// Whether a single-pair "generate transition" action should be offered.
///
/// This is the weaker image-based rule: both shots exist and have images.
/// It only controls visibility; submission still goes through [`check`].
pub fn transition_action_available(
    key: &JobKey,
    assets: &ChapterAssets,
    images: Option<&JobTracker>,
) -> bool {
    match *key {
        JobKey::Transition { from, to } => [from, to]
            .into_iter()
            .all(|n| assets.contains_shot(n) && has_image(assets, images, n)),
        JobKey::Shot(_) => false,
    }
}

fn has_image(assets: &ChapterAssets, images: Option<&JobTracker>, n: Ordinal) -> bool {
    assets.has_image(n) || tracker_has_result(images, JobKind::ShotImage, n)
}

fn has_video(assets: &ChapterAssets, videos: Option<&JobTracker>, n: Ordinal) -> bool {
    assets.has_video(n) || tracker_has_result(videos, JobKind::ShotVideo, n)
}

fn tracker_has_result(tracker: Option<&JobTracker>, kind: JobKind, n: Ordinal) -> bool {
    tracker
        .filter(|t| t.kind() == kind)
        .is_some_and(|t| t.success_url(&JobKey::shot(n)).is_some())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
