//! Shared fixtures for pipeline integration tests.
//!
//! [`FakeRenderService`] is an in-memory [`RenderService`] whose submission
//! answers, task lists and chapters are scripted by each test, and which
//! records every call it receives.

#![allow(dead_code)]

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use reel_core::assets::{Chapter, Shot, TransitionClip};
use reel_core::codec;
use reel_core::job::{JobKey, JobKind};
use reel_core::task::{RemoteTaskRecord, TaskStatus};
use reel_core::types::{ChapterId, Ordinal};
use reel_pipeline::config::PipelineConfig;
use reel_render::api::RenderApiError;
use reel_render::service::{RenderService, SubmitAck, TransitionOptions};
use tokio::sync::Notify;

/// Scripted answer to a submission.
#[derive(Debug, Clone)]
pub enum FakeSubmit {
    Accept,
    AlreadyRunning,
    Reject(String),
    TransportError,
}

/// One recorded submission.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmitCall {
    pub chapter_id: ChapterId,
    pub kind: JobKind,
    pub key: JobKey,
    pub options: TransitionOptions,
}

/// Pauses a fake call until released, to hold a tick mid-flight.
pub struct CallGate {
    pub started: Notify,
    pub release: Notify,
}

impl CallGate {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            started: Notify::new(),
            release: Notify::new(),
        })
    }

    async fn pass(&self) {
        self.started.notify_one();
        self.release.notified().await;
    }
}

#[derive(Default)]
pub struct FakeRenderService {
    chapters: Mutex<HashMap<ChapterId, Chapter>>,
    submit_script: Mutex<HashMap<(JobKind, JobKey), FakeSubmit>>,
    submit_calls: Mutex<Vec<SubmitCall>>,
    tasks: Mutex<HashMap<JobKind, Vec<RemoteTaskRecord>>>,
    failing_lists: Mutex<HashSet<JobKind>>,
    list_calls: Mutex<Vec<JobKind>>,
    fetch_calls: AtomicUsize,
    listing_gate: Mutex<Option<Arc<CallGate>>>,
    fetch_gate: Mutex<Option<Arc<CallGate>>>,
}

impl FakeRenderService {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_chapter(chapter: Chapter) -> Arc<Self> {
        let fake = Self::new();
        fake.put_chapter(chapter);
        fake
    }

    pub fn put_chapter(&self, chapter: Chapter) {
        self.chapters.lock().unwrap().insert(chapter.id, chapter);
    }

    pub fn remove_chapter(&self, chapter_id: ChapterId) {
        self.chapters.lock().unwrap().remove(&chapter_id);
    }

    pub fn script(&self, kind: JobKind, key: JobKey, answer: FakeSubmit) {
        self.submit_script.lock().unwrap().insert((kind, key), answer);
    }

    pub fn set_tasks(&self, kind: JobKind, records: Vec<RemoteTaskRecord>) {
        self.tasks.lock().unwrap().insert(kind, records);
    }

    pub fn fail_listing(&self, kind: JobKind) {
        self.failing_lists.lock().unwrap().insert(kind);
    }

    /// Make every following `list_tasks` call wait for `release`.
    pub fn gate_listing(&self) -> Arc<CallGate> {
        let gate = CallGate::new();
        *self.listing_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    /// Make every following `fetch_chapter` call wait for `release`.
    pub fn gate_fetch(&self) -> Arc<CallGate> {
        let gate = CallGate::new();
        *self.fetch_gate.lock().unwrap() = Some(Arc::clone(&gate));
        gate
    }

    pub fn submit_calls(&self) -> Vec<SubmitCall> {
        self.submit_calls.lock().unwrap().clone()
    }

    pub fn submitted_keys(&self, kind: JobKind) -> BTreeSet<JobKey> {
        self.submit_calls()
            .into_iter()
            .filter(|c| c.kind == kind)
            .map(|c| c.key)
            .collect()
    }

    pub fn list_calls(&self) -> Vec<JobKind> {
        self.list_calls.lock().unwrap().clone()
    }

    pub fn fetch_calls(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RenderService for FakeRenderService {
    async fn submit(
        &self,
        chapter_id: ChapterId,
        kind: JobKind,
        key: &JobKey,
        options: &TransitionOptions,
    ) -> Result<SubmitAck, RenderApiError> {
        self.submit_calls.lock().unwrap().push(SubmitCall {
            chapter_id,
            kind,
            key: *key,
            options: options.clone(),
        });

        let answer = self
            .submit_script
            .lock()
            .unwrap()
            .get(&(kind, *key))
            .cloned()
            .unwrap_or(FakeSubmit::Accept);

        match answer {
            FakeSubmit::Accept => Ok(SubmitAck {
                success: true,
                message: "queued".into(),
            }),
            FakeSubmit::AlreadyRunning => Ok(SubmitAck {
                success: false,
                message: "Task already running".into(),
            }),
            FakeSubmit::Reject(message) => Ok(SubmitAck {
                success: false,
                message,
            }),
            FakeSubmit::TransportError => Err(RenderApiError::ApiError {
                status: 503,
                body: "upstream unavailable".into(),
            }),
        }
    }

    async fn list_tasks(
        &self,
        kind: JobKind,
        _limit: u32,
    ) -> Result<Vec<RemoteTaskRecord>, RenderApiError> {
        self.list_calls.lock().unwrap().push(kind);

        let gate = self.listing_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        if self.failing_lists.lock().unwrap().contains(&kind) {
            return Err(RenderApiError::ApiError {
                status: 502,
                body: "bad gateway".into(),
            });
        }
        Ok(self
            .tasks
            .lock()
            .unwrap()
            .get(&kind)
            .cloned()
            .unwrap_or_default())
    }

    async fn fetch_chapter(&self, chapter_id: ChapterId) -> Result<Chapter, RenderApiError> {
        self.fetch_calls.fetch_add(1, Ordering::SeqCst);

        let gate = self.fetch_gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.pass().await;
        }

        self.chapters
            .lock()
            .unwrap()
            .get(&chapter_id)
            .cloned()
            .ok_or_else(|| RenderApiError::ApiError {
                status: 404,
                body: format!("chapter {chapter_id} not found"),
            })
    }
}

// ---------------------------------------------------------------------------
// Builders
// ---------------------------------------------------------------------------

/// A chapter with `count` shots; `images` / `videos` list the shots that
/// already have media.
pub fn chapter(id: ChapterId, count: Ordinal, images: &[Ordinal], videos: &[Ordinal]) -> Chapter {
    Chapter {
        id,
        title: format!("Chapter {id}"),
        shots: (1..=count)
            .map(|n| Shot {
                index: n,
                description: format!("Shot {n} description"),
                characters: BTreeSet::from(["Lin".to_string()]),
                scene: Some("Harbour".into()),
                duration: Some(4.0),
                image_url: images.contains(&n).then(|| format!("/media/{id}/img/{n}.png")),
                video_url: videos.contains(&n).then(|| format!("/media/{id}/vid/{n}.mp4")),
            })
            .collect(),
        transitions: Vec::<TransitionClip>::new(),
    }
}

/// A task record named the way the render service names `key`.
pub fn task(
    kind: JobKind,
    key: JobKey,
    chapter_id: ChapterId,
    status: TaskStatus,
    result_url: Option<&str>,
) -> RemoteTaskRecord {
    RemoteTaskRecord {
        id: None,
        name: codec::task_name(kind, &key),
        status,
        result_url: result_url.map(str::to_string),
        chapter_id: Some(chapter_id),
        error: (status == TaskStatus::Failed).then(|| "sampler diverged".to_string()),
        created_at: None,
    }
}

/// Config with no stagger, so batches run without sleeping.
pub fn fast_config() -> PipelineConfig {
    PipelineConfig {
        submit_stagger: Duration::ZERO,
        ..PipelineConfig::default()
    }
}
