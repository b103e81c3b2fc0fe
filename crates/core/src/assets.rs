//! Chapter data and the per-chapter asset state the pipeline consults.
//!
//! [`Chapter`] is the render service's view of a chapter (shots plus any
//! generated transitions). [`ChapterAssets`] is the pipeline's working copy
//! of the generated media: image / video URLs per shot ordinal and a video
//! URL per adjacent pair.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};

use crate::job::{JobKey, JobKind};
use crate::types::{ChapterId, Ordinal};

/// One narrative unit within a chapter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shot {
    /// 1-based position in the chapter's shot sequence.
    pub index: Ordinal,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub characters: BTreeSet<String>,
    #[serde(default)]
    pub scene: Option<String>,
    /// Target duration in seconds.
    #[serde(default)]
    pub duration: Option<f64>,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub video_url: Option<String>,
}

/// A generated transition clip between two adjacent shots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransitionClip {
    pub from_index: Ordinal,
    pub to_index: Ordinal,
    pub video_url: Option<String>,
}

/// A chapter as returned by the render service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: ChapterId,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub shots: Vec<Shot>,
    #[serde(default)]
    pub transitions: Vec<TransitionClip>,
}

/// Generated media for a single shot.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ShotAssets {
    pub image_url: Option<String>,
    pub video_url: Option<String>,
}

/// Ground-truth media state for one chapter.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChapterAssets {
    shots: BTreeMap<Ordinal, ShotAssets>,
    /// Transition video URLs keyed by the `from` ordinal.
    transitions: BTreeMap<Ordinal, String>,
}

impl ChapterAssets {
    /// Build asset state from a loaded chapter.
    ///
    /// Shots are re-numbered by their order in `chapter.shots` when the
    /// service leaves `index` at zero.
    pub fn from_chapter(chapter: &Chapter) -> Self {
        let shots = chapter
            .shots
            .iter()
            .enumerate()
            .map(|(pos, shot)| {
                let ordinal = if shot.index == 0 {
                    pos as Ordinal + 1
                } else {
                    shot.index
                };
                let assets = ShotAssets {
                    image_url: non_empty(shot.image_url.as_deref()),
                    video_url: non_empty(shot.video_url.as_deref()),
                };
                (ordinal, assets)
            })
            .collect();

        let transitions = chapter
            .transitions
            .iter()
            .filter(|t| t.from_index.checked_add(1) == Some(t.to_index))
            .filter_map(|t| Some((t.from_index, non_empty(t.video_url.as_deref())?)))
            .collect();

        Self { shots, transitions }
    }

    /// Asset state for `count` shots with no media yet.
    pub fn with_shot_count(count: Ordinal) -> Self {
        Self {
            shots: (1..=count).map(|n| (n, ShotAssets::default())).collect(),
            transitions: BTreeMap::new(),
        }
    }

    /// Number of shots in the chapter.
    pub fn shot_count(&self) -> Ordinal {
        self.shots.len() as Ordinal
    }

    /// Shot ordinals in ascending order.
    pub fn ordinals(&self) -> impl Iterator<Item = Ordinal> + '_ {
        self.shots.keys().copied()
    }

    pub fn contains_shot(&self, ordinal: Ordinal) -> bool {
        self.shots.contains_key(&ordinal)
    }

    pub fn shot(&self, ordinal: Ordinal) -> Option<&ShotAssets> {
        self.shots.get(&ordinal)
    }

    pub fn image_url(&self, ordinal: Ordinal) -> Option<&str> {
        self.shots.get(&ordinal)?.image_url.as_deref()
    }

    pub fn video_url(&self, ordinal: Ordinal) -> Option<&str> {
        self.shots.get(&ordinal)?.video_url.as_deref()
    }

    pub fn transition_url(&self, from: Ordinal) -> Option<&str> {
        self.transitions.get(&from).map(String::as_str)
    }

    pub fn has_image(&self, ordinal: Ordinal) -> bool {
        self.image_url(ordinal).is_some()
    }

    pub fn has_video(&self, ordinal: Ordinal) -> bool {
        self.video_url(ordinal).is_some()
    }

    /// Every job key of `kind` that exists in this chapter, in order.
    ///
    /// Transition candidates are the adjacent pairs `(n, n + 1)` where both
    /// shots exist. The last ordinal never starts a pair, even at `u32::MAX`.
    pub fn candidate_keys(&self, kind: JobKind) -> Vec<JobKey> {
        if kind.is_transition() {
            self.ordinals()
                .filter_map(JobKey::transition)
                .filter(|key| key.ordinals().iter().all(|n| self.contains_shot(*n)))
                .collect()
        } else {
            self.ordinals().map(JobKey::shot).collect()
        }
    }

    /// Fold a completed job's result URL into the asset state.
    ///
    /// Returns `false` when the key does not belong to this chapter.
    pub fn apply_result(&mut self, kind: JobKind, key: &JobKey, url: &str) -> bool {
        match (kind, *key) {
            (JobKind::ShotImage, JobKey::Shot(n)) => match self.shots.get_mut(&n) {
                Some(shot) => {
                    shot.image_url = Some(url.to_string());
                    true
                }
                None => false,
            },
            (JobKind::ShotVideo, JobKey::Shot(n)) => match self.shots.get_mut(&n) {
                Some(shot) => {
                    shot.video_url = Some(url.to_string());
                    true
                }
                None => false,
            },
            (JobKind::TransitionVideo, JobKey::Transition { from, to }) => {
                if self.contains_shot(from) && self.contains_shot(to) {
                    self.transitions.insert(from, url.to_string());
                    true
                } else {
                    false
                }
            }
            _ => false,
        }
    }

    /// Set a user-uploaded image for a shot. Returns `false` for unknown shots.
    pub fn set_uploaded_image(&mut self, ordinal: Ordinal, url: &str) -> bool {
        match self.shots.get_mut(&ordinal) {
            Some(shot) => {
                shot.image_url = Some(url.to_string());
                true
            }
            None => false,
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn shot(index: Ordinal, image: Option<&str>, video: Option<&str>) -> Shot {
        Shot {
            index,
            description: format!("shot {index}"),
            characters: BTreeSet::new(),
            scene: None,
            duration: Some(4.0),
            image_url: image.map(str::to_string),
            video_url: video.map(str::to_string),
        }
    }

    #[test]
    fn from_chapter_reads_urls_and_ignores_blanks() {
        let chapter = Chapter {
            id: 7,
            title: "Opening".into(),
            shots: vec![
                shot(1, Some("/img/1.png"), None),
                shot(2, Some("  "), Some("/vid/2.mp4")),
            ],
            transitions: vec![TransitionClip {
                from_index: 1,
                to_index: 2,
                video_url: Some("/tr/1-2.mp4".into()),
            }],
        };
        let assets = ChapterAssets::from_chapter(&chapter);

        assert_eq!(assets.shot_count(), 2);
        assert_eq!(assets.image_url(1), Some("/img/1.png"));
        assert!(!assets.has_image(2));
        assert!(assets.has_video(2));
        assert_eq!(assets.transition_url(1), Some("/tr/1-2.mp4"));
    }

    #[test]
    fn from_chapter_numbers_unindexed_shots_by_position() {
        let chapter = Chapter {
            id: 1,
            title: String::new(),
            shots: vec![shot(0, None, None), shot(0, None, None)],
            transitions: vec![],
        };
        let assets = ChapterAssets::from_chapter(&chapter);
        assert_eq!(assets.ordinals().collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn transition_candidates_are_adjacent_pairs_only() {
        let assets = ChapterAssets::with_shot_count(4);
        assert_eq!(
            assets.candidate_keys(JobKind::TransitionVideo),
            vec![
                JobKey::transition(1).unwrap(),
                JobKey::transition(2).unwrap(),
                JobKey::transition(3).unwrap()
            ]
        );
    }

    #[test]
    fn max_ordinal_does_not_start_a_transition() {
        let chapter = Chapter {
            id: 3,
            title: String::new(),
            shots: vec![shot(1, None, None), shot(Ordinal::MAX, None, None)],
            transitions: vec![TransitionClip {
                from_index: Ordinal::MAX,
                to_index: 0,
                video_url: Some("/tr/x.mp4".into()),
            }],
        };
        let assets = ChapterAssets::from_chapter(&chapter);

        assert!(assets.candidate_keys(JobKind::TransitionVideo).is_empty());
        assert_eq!(assets.transition_url(Ordinal::MAX), None);
        assert_eq!(
            assets.candidate_keys(JobKind::ShotImage),
            vec![JobKey::shot(1), JobKey::shot(Ordinal::MAX)]
        );
    }

    #[test]
    fn single_shot_chapter_has_no_transitions() {
        let assets = ChapterAssets::with_shot_count(1);
        assert!(assets.candidate_keys(JobKind::TransitionVideo).is_empty());
        assert_eq!(
            assets.candidate_keys(JobKind::ShotImage),
            vec![JobKey::shot(1)]
        );
    }

    #[test]
    fn apply_result_routes_by_kind() {
        let mut assets = ChapterAssets::with_shot_count(3);
        assert!(assets.apply_result(JobKind::ShotImage, &JobKey::shot(2), "/i/2.png"));
        assert!(assets.apply_result(JobKind::ShotVideo, &JobKey::shot(2), "/v/2.mp4"));
        assert!(assets.apply_result(
            JobKind::TransitionVideo,
            &JobKey::transition(2).unwrap(),
            "/t/2.mp4"
        ));

        assert_eq!(assets.image_url(2), Some("/i/2.png"));
        assert_eq!(assets.video_url(2), Some("/v/2.mp4"));
        assert_eq!(assets.transition_url(2), Some("/t/2.mp4"));
    }

    #[test]
    fn apply_result_rejects_unknown_shots_and_mismatched_keys() {
        let mut assets = ChapterAssets::with_shot_count(2);
        assert!(!assets.apply_result(JobKind::ShotImage, &JobKey::shot(5), "/x"));
        assert!(!assets.apply_result(JobKind::ShotImage, &JobKey::transition(1).unwrap(), "/x"));
        assert!(!assets.apply_result(
            JobKind::TransitionVideo,
            &JobKey::transition(2).unwrap(),
            "/x"
        ));
        assert_eq!(assets, ChapterAssets::with_shot_count(2));
    }
}
