//! `reel-worker` -- headless batch generation for one chapter.
//!
//! Opens a chapter, submits every eligible job of each requested kind in
//! pipeline order, and waits for the render service to finish each stage
//! before starting the next, so videos pick up freshly generated images and
//! transitions pick up freshly generated videos. Jobs the render service
//! reports as already running are tracked too, so a stage also waits for
//! work started elsewhere.
//!
//! # Environment variables
//!
//! | Variable         | Required | Default                 | Description          |
//! |------------------|----------|-------------------------|----------------------|
//! | `CHAPTER_ID`     | yes      | --                      | Chapter to generate  |
//! | `GENERATE_KINDS` | no       | all kinds               | Stages, in order     |
//! | `RENDER_API_URL` | no       | `http://localhost:8000` | Render service URL   |
//!
//! `GENERATE_KINDS` is a comma-separated list of `shot_image`, `shot_video`
//! and `transition_video`.
//!
//! Pipeline tuning (`SUBMIT_STAGGER_MS`, `POLL_INTERVAL_MS`, ...) is read by
//! [`PipelineConfig::from_env`].

use std::sync::Arc;

use reel_core::job::JobKind;
use reel_core::types::ChapterId;
use reel_pipeline::config::PipelineConfig;
use reel_pipeline::controller::PipelineController;
use reel_pipeline::session::ChapterSession;
use reel_render::api::RenderApi;
use reel_render::config::RenderConfig;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reel_worker=info,reel_pipeline=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let chapter_id: ChapterId = std::env::var("CHAPTER_ID")
        .unwrap_or_else(|_| {
            tracing::error!("CHAPTER_ID environment variable is required");
            std::process::exit(1);
        })
        .parse()
        .unwrap_or_else(|_| {
            tracing::error!("CHAPTER_ID must be a valid integer");
            std::process::exit(1);
        });

    let kinds = match std::env::var("GENERATE_KINDS") {
        Ok(raw) => parse_kinds(&raw).unwrap_or_else(|e| {
            tracing::error!(error = %e, "Invalid GENERATE_KINDS");
            std::process::exit(1);
        }),
        Err(_) => JobKind::ALL.to_vec(),
    };

    let render_config = RenderConfig::from_env();
    let pipeline_config = PipelineConfig::from_env();

    tracing::info!(
        chapter_id,
        api_url = %render_config.api_url,
        kinds = ?kinds,
        "Starting reel-worker",
    );

    let api = RenderApi::from_config(&render_config).unwrap_or_else(|e| {
        tracing::error!(error = %e, "Failed to build render API client");
        std::process::exit(1);
    });
    let controller = PipelineController::new(Arc::new(api), pipeline_config);

    let session = match controller.open_chapter(chapter_id).await {
        Ok(session) => session,
        Err(e) => {
            tracing::error!(chapter_id, error = %e, "Failed to open chapter");
            std::process::exit(1);
        }
    };

    tokio::select! {
        _ = run_stages(&session, &kinds) => {}
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Interrupted, stopping");
        }
    }

    controller.shutdown().await;
}

/// Run each stage to completion: submit, then wait until nothing is pending.
async fn run_stages(session: &ChapterSession, kinds: &[JobKind]) {
    let wait = session.config().poll_interval;

    for &kind in kinds {
        let report = session.generate_all_eligible(kind).await;
        tracing::info!(
            chapter_id = session.chapter_id(),
            kind = %kind,
            succeeded = report.succeeded,
            skipped = report.skipped,
            failed = report.failed,
            ineligible = report.ineligible.len(),
            "Stage submitted",
        );
        if report.aborted {
            return;
        }

        for &key in &report.skipped_keys {
            session.adopt_running(kind, key).await;
        }

        while !session.is_idle().await {
            tokio::time::sleep(wait).await;
        }

        let results = session.results(kind).await;
        let failed = results.values().filter(|r| !r.is_success()).count();
        tracing::info!(
            chapter_id = session.chapter_id(),
            kind = %kind,
            resolved = results.len(),
            failed,
            "Stage finished",
        );
    }
}

fn parse_kinds(raw: &str) -> Result<Vec<JobKind>, reel_core::error::CoreError> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}
