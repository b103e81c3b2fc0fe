//! Render-service task records and their interpretation for one chapter.
//!
//! The render service owns the task queue; the pipeline only reads it. A
//! task list fetched for one kind is reduced to one [`Observation`] per job
//! key of a single chapter by [`observe`].

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::codec;
use crate::job::{JobKey, JobKind};
use crate::types::{ChapterId, Timestamp};

/// Server-side task status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Running,
    Completed,
    Failed,
}

/// One task as listed by the render service.
///
/// `name` is the only field carrying the job key; see [`crate::codec`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteTaskRecord {
    #[serde(default)]
    pub id: Option<String>,
    pub name: String,
    pub status: TaskStatus,
    #[serde(default)]
    pub result_url: Option<String>,
    #[serde(default)]
    pub chapter_id: Option<ChapterId>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub created_at: Option<Timestamp>,
}

/// The reconciliation-relevant reading of a task record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation {
    /// Pending or running.
    InProgress,
    Completed { url: Option<String> },
    Failed { error: Option<String> },
}

impl From<&RemoteTaskRecord> for Observation {
    fn from(record: &RemoteTaskRecord) -> Self {
        match record.status {
            TaskStatus::Pending | TaskStatus::Running => Observation::InProgress,
            TaskStatus::Completed => Observation::Completed {
                url: record
                    .result_url
                    .as_deref()
                    .map(str::trim)
                    .filter(|u| !u.is_empty())
                    .map(str::to_string),
            },
            TaskStatus::Failed => Observation::Failed {
                error: record.error.clone(),
            },
        }
    }
}

/// Reduce a task list to one observation per job key of `chapter_id`.
///
/// Records for other chapters and records whose name carries no key for
/// `kind` are skipped. When several records decode to the same key the
/// newest wins: by `created_at` when both records carry one, otherwise the
/// one listed first (the service lists newest first).
pub fn observe(
    kind: JobKind,
    chapter_id: ChapterId,
    records: &[RemoteTaskRecord],
) -> BTreeMap<JobKey, Observation> {
    let mut newest: BTreeMap<JobKey, &RemoteTaskRecord> = BTreeMap::new();

    for record in records {
        if record.chapter_id != Some(chapter_id) {
            continue;
        }
        let Some(key) = codec::name_contains(kind, &record.name) else {
            continue;
        };

        match newest.get(&key) {
            Some(current) if !is_newer(record, current) => {}
            _ => {
                newest.insert(key, record);
            }
        }
    }

    newest
        .into_iter()
        .map(|(key, record)| (key, Observation::from(record)))
        .collect()
}

fn is_newer(candidate: &RemoteTaskRecord, current: &RemoteTaskRecord) -> bool {
    match (candidate.created_at, current.created_at) {
        (Some(a), Some(b)) => a > b,
        _ => false,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
