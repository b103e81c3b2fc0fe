//! Job key codec: short-form encoding and task-name extraction.
//!
//! The render service does not return a structured job key with its task
//! records. The only carrier is the human-readable task name, which embeds
//! the shot ordinal(s) as `shot N` or `shot N → shot M` (the Chinese
//! `镜头N` form is accepted as well). All parsing of those names lives in
//! this module.

use std::sync::LazyLock;

use regex::Regex;

use crate::job::{JobKey, JobKind};
use crate::types::Ordinal;

/// A single shot reference, e.g. `Shot 12`, `shot #3`, `镜头 4`.
const SHOT_PATTERN: &str = r"(?i)(?:shot|镜头)\s*#?\s*(\d+)";

/// A shot-to-shot transition, e.g. `shot 3 → shot 4`, `Shot 3 -> 4`.
const TRANSITION_PATTERN: &str =
    r"(?i)(?:shot|镜头)\s*#?\s*(\d+)\s*(?:→|->|至)\s*(?:(?:shot|镜头)\s*#?\s*)?(\d+)";

static SHOT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(SHOT_PATTERN).expect("valid regex"));
static TRANSITION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(TRANSITION_PATTERN).expect("valid regex"));

/// Render `key` in its short form (`"N"` or `"N-M"`).
pub fn encode(kind: JobKind, key: &JobKey) -> String {
    debug_assert!(kind.accepts(key), "{key} is not a {kind} key");
    key.to_string()
}

/// Inverse of [`encode`]. Returns `None` for malformed input or a key whose
/// shape does not match `kind`.
pub fn decode(kind: JobKind, encoded: &str) -> Option<JobKey> {
    JobKey::parse(kind, encoded).ok()
}

/// Canonical task display name for a job, as the render service names it.
///
/// [`name_contains`] always recovers `key` from this name.
pub fn task_name(kind: JobKind, key: &JobKey) -> String {
    match (kind, key) {
        (JobKind::ShotImage, JobKey::Shot(n)) => format!("Image · shot {n}"),
        (JobKind::ShotVideo, JobKey::Shot(n)) => format!("Video · shot {n}"),
        (_, JobKey::Transition { from, to }) => format!("Transition · shot {from} → shot {to}"),
        (_, JobKey::Shot(n)) => format!("Transition · shot {n}"),
    }
}

/// Extract the job key embedded in a task display name.
///
/// Returns `None` when the name carries no recognisable key for `kind`.
/// Per-shot kinds refuse names that describe a transition, and transitions
/// refuse pairs that are not adjacent.
pub fn name_contains(kind: JobKind, display_name: &str) -> Option<JobKey> {
    if kind.is_transition() {
        let caps = TRANSITION_RE.captures(display_name)?;
        let from = parse_ordinal(caps.get(1)?.as_str())?;
        let to = parse_ordinal(caps.get(2)?.as_str())?;
        return JobKey::pair(from, to);
    }

    if TRANSITION_RE.is_match(display_name) {
        return None;
    }
    let caps = SHOT_RE.captures(display_name)?;
    parse_ordinal(caps.get(1)?.as_str()).map(JobKey::Shot)
}

fn parse_ordinal(digits: &str) -> Option<Ordinal> {
    digits.parse::<Ordinal>().ok().filter(|n| *n >= 1)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_keys(kind: JobKind) -> Vec<JobKey> {
        let ordinals = [1, 2, 9, 10, 57, 999];
        if kind.is_transition() {
            ordinals.iter().map(|&n| JobKey::transition(n).unwrap()).collect()
        } else {
            ordinals.iter().map(|&n| JobKey::shot(n)).collect()
        }
    }

    // -- Short form --

    #[test]
    fn encode_decode_round_trip() {
        for kind in JobKind::ALL {
            for key in sample_keys(kind) {
                assert_eq!(decode(kind, &encode(kind, &key)), Some(key));
            }
        }
    }

    #[test]
    fn decode_rejects_wrong_shape() {
        assert_eq!(decode(JobKind::ShotImage, "3-4"), None);
        assert_eq!(decode(JobKind::TransitionVideo, "3"), None);
        assert_eq!(decode(JobKind::TransitionVideo, "3-5"), None);
    }

    // -- Task names --

    #[test]
    fn task_name_round_trip() {
        for kind in JobKind::ALL {
            for key in sample_keys(kind) {
                assert_eq!(name_contains(kind, &task_name(kind, &key)), Some(key));
            }
        }
    }

    #[test]
    fn shot_name_variants() {
        assert_eq!(
            name_contains(JobKind::ShotImage, "Generate image for Shot 12"),
            Some(JobKey::shot(12))
        );
        assert_eq!(
            name_contains(JobKind::ShotVideo, "shot #3 video"),
            Some(JobKey::shot(3))
        );
        assert_eq!(
            name_contains(JobKind::ShotImage, "镜头4 图片生成"),
            Some(JobKey::shot(4))
        );
    }

    #[test]
    fn transition_name_variants() {
        assert_eq!(
            name_contains(JobKind::TransitionVideo, "Transition: Shot 3 -> Shot 4"),
            Some(JobKey::transition(3).unwrap())
        );
        assert_eq!(
            name_contains(JobKind::TransitionVideo, "转场 镜头1 → 镜头2"),
            Some(JobKey::transition(1).unwrap())
        );
        assert_eq!(
            name_contains(JobKind::TransitionVideo, "shot 5 → 6"),
            Some(JobKey::transition(5).unwrap())
        );
    }

    #[test]
    fn shot_kinds_ignore_transition_names() {
        let name = task_name(JobKind::TransitionVideo, &JobKey::transition(2).unwrap());
        assert_eq!(name_contains(JobKind::ShotImage, &name), None);
        assert_eq!(name_contains(JobKind::ShotVideo, &name), None);
    }

    #[test]
    fn transition_ignores_single_shot_names() {
        let name = task_name(JobKind::ShotVideo, &JobKey::shot(2));
        assert_eq!(name_contains(JobKind::TransitionVideo, &name), None);
    }

    #[test]
    fn transition_rejects_non_adjacent_pair() {
        assert_eq!(
            name_contains(JobKind::TransitionVideo, "shot 3 → shot 5"),
            None
        );
    }

    #[test]
    fn unrelated_names_yield_none() {
        for kind in JobKind::ALL {
            assert_eq!(name_contains(kind, ""), None);
            assert_eq!(name_contains(kind, "Character portrait: Alice"), None);
            assert_eq!(name_contains(kind, "shot 0"), None);
            assert_eq!(name_contains(kind, "screenshot of scene"), None);
        }
    }

    #[test]
    fn oversized_ordinal_is_ignored() {
        assert_eq!(
            name_contains(JobKind::ShotImage, "shot 99999999999999999999"),
            None
        );
    }
}
