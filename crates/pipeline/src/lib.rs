//! Generation-pipeline orchestration for chapter editing sessions.
//!
//! A [`controller::PipelineController`] owns one [`session::ChapterSession`]
//! per open chapter. Each session holds the three per-kind job trackers and
//! the chapter's asset state; [`submitter::BatchSubmitter`] pushes jobs to
//! the render service and [`poller::ReconciliationPoller`] folds the
//! service's task queue back into the session.

pub mod config;
pub mod controller;
pub mod error;
pub mod events;
pub mod poller;
pub mod session;
pub mod submitter;
