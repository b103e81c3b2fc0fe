//! Generation job kinds and the keys that identify one unit of work.
//!
//! A [`JobKey`] is a shot ordinal for the two per-shot kinds and an
//! adjacent ordinal pair for transitions. Keys are rendered as `"N"` or
//! `"N-M"` so they can be used as map members and embedded in logs.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::Ordinal;

// ---------------------------------------------------------------------------
// Job kinds
// ---------------------------------------------------------------------------

/// Wire name for shot image generation.
pub const KIND_SHOT_IMAGE: &str = "shot_image";
/// Wire name for shot video generation.
pub const KIND_SHOT_VIDEO: &str = "shot_video";
/// Wire name for transition video generation.
pub const KIND_TRANSITION_VIDEO: &str = "transition_video";

/// The closed set of generation categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    ShotImage,
    ShotVideo,
    TransitionVideo,
}

impl JobKind {
    /// Every kind, in pipeline order.
    pub const ALL: [JobKind; 3] = [
        JobKind::ShotImage,
        JobKind::ShotVideo,
        JobKind::TransitionVideo,
    ];

    /// Wire name used in task-list queries and logs.
    pub fn as_str(self) -> &'static str {
        match self {
            JobKind::ShotImage => KIND_SHOT_IMAGE,
            JobKind::ShotVideo => KIND_SHOT_VIDEO,
            JobKind::TransitionVideo => KIND_TRANSITION_VIDEO,
        }
    }

    /// Whether keys of this kind are ordinal pairs.
    pub fn is_transition(self) -> bool {
        matches!(self, JobKind::TransitionVideo)
    }

    /// Whether `key` has the shape this kind expects.
    pub fn accepts(self, key: &JobKey) -> bool {
        match key {
            JobKey::Shot(_) => !self.is_transition(),
            JobKey::Transition { .. } => self.is_transition(),
        }
    }
}

impl fmt::Display for JobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for JobKind {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            KIND_SHOT_IMAGE => Ok(JobKind::ShotImage),
            KIND_SHOT_VIDEO => Ok(JobKind::ShotVideo),
            KIND_TRANSITION_VIDEO => Ok(JobKind::TransitionVideo),
            other => Err(CoreError::UnknownJobKind(other.to_string())),
        }
    }
}

// ---------------------------------------------------------------------------
// Job keys
// ---------------------------------------------------------------------------

/// Identifies one unit of work within a kind.
///
/// Transition keys always satisfy `to == from + 1`; build them with
/// [`JobKey::transition`] or [`JobKey::pair`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub enum JobKey {
    Shot(Ordinal),
    Transition { from: Ordinal, to: Ordinal },
}

impl JobKey {
    /// Key for a single shot.
    pub fn shot(ordinal: Ordinal) -> Self {
        JobKey::Shot(ordinal)
    }

    /// Key for the transition from `from` into the following shot; `None`
    /// when `from` is zero or has no successor.
    pub fn transition(from: Ordinal) -> Option<Self> {
        JobKey::pair(from, from.checked_add(1)?)
    }

    /// Key for an explicit pair; `None` unless the shots are adjacent and
    /// both ordinals are 1-based.
    pub fn pair(from: Ordinal, to: Ordinal) -> Option<Self> {
        if from >= 1 && from.checked_add(1) == Some(to) {
            Some(JobKey::Transition { from, to })
        } else {
            None
        }
    }

    /// Every shot ordinal this key touches.
    pub fn ordinals(&self) -> Vec<Ordinal> {
        match *self {
            JobKey::Shot(n) => vec![n],
            JobKey::Transition { from, to } => vec![from, to],
        }
    }

    /// Parse the short `"N"` / `"N-M"` form for the given kind.
    pub fn parse(kind: JobKind, value: &str) -> Result<Self, CoreError> {
        let invalid = || CoreError::InvalidJobKey {
            kind: kind.as_str(),
            value: value.to_string(),
        };

        let key: JobKey = value.parse().map_err(|_| invalid())?;
        if kind.accepts(&key) {
            Ok(key)
        } else {
            Err(invalid())
        }
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            JobKey::Shot(n) => write!(f, "{n}"),
            JobKey::Transition { from, to } => write!(f, "{from}-{to}"),
        }
    }
}

impl FromStr for JobKey {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || CoreError::InvalidJobKey {
            kind: "any",
            value: s.to_string(),
        };
        let parse_ordinal = |part: &str| -> Result<Ordinal, CoreError> {
            match part.trim().parse::<Ordinal>() {
                Ok(n) if n >= 1 => Ok(n),
                _ => Err(invalid()),
            }
        };

        match s.split_once('-') {
            None => Ok(JobKey::Shot(parse_ordinal(s)?)),
            Some((from, to)) => {
                JobKey::pair(parse_ordinal(from)?, parse_ordinal(to)?).ok_or_else(invalid)
            }
        }
    }
}

impl From<JobKey> for String {
    fn from(key: JobKey) -> Self {
        key.to_string()
    }
}

impl TryFrom<String> for JobKey {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
