use std::time::Duration;

use reel_render::service::TransitionOptions;

/// Default delay between consecutive submissions of one batch.
const DEFAULT_SUBMIT_STAGGER_MS: u64 = 200;
/// Default reconciliation interval.
const DEFAULT_POLL_INTERVAL_MS: u64 = 3000;
/// Default cap on task records fetched per kind and tick.
const DEFAULT_TASK_LIST_LIMIT: u32 = 100;
/// Default frame rate used to derive transition frame counts.
const DEFAULT_TRANSITION_FPS: u32 = 16;

/// Pipeline tuning loaded from environment variables.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Delay inserted between submissions within one batch.
    pub submit_stagger: Duration,
    /// Interval between reconciliation ticks.
    pub poll_interval: Duration,
    /// `limit` passed to the task-list query.
    pub task_list_limit: u32,
    /// Workflow selector sent with transition submissions.
    pub transition_workflow: Option<String>,
    /// Target transition length; when set, a frame count is sent.
    pub transition_duration_secs: Option<f64>,
    pub transition_fps: u32,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            submit_stagger: Duration::from_millis(DEFAULT_SUBMIT_STAGGER_MS),
            poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            task_list_limit: DEFAULT_TASK_LIST_LIMIT,
            transition_workflow: None,
            transition_duration_secs: None,
            transition_fps: DEFAULT_TRANSITION_FPS,
        }
    }
}

impl PipelineConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                    | Default |
    /// |----------------------------|---------|
    /// | `SUBMIT_STAGGER_MS`        | `200`   |
    /// | `POLL_INTERVAL_MS`         | `3000`  |
    /// | `TASK_LIST_LIMIT`          | `100`   |
    /// | `TRANSITION_WORKFLOW`      | unset   |
    /// | `TRANSITION_DURATION_SECS` | unset   |
    /// | `TRANSITION_FPS`           | `16`    |
    pub fn from_env() -> Self {
        let submit_stagger = Duration::from_millis(
            env_parse("SUBMIT_STAGGER_MS").unwrap_or(DEFAULT_SUBMIT_STAGGER_MS),
        );

        // A zero interval would make `tokio::time::interval` panic.
        let poll_interval = Duration::from_millis(
            env_parse("POLL_INTERVAL_MS")
                .filter(|ms: &u64| *ms > 0)
                .unwrap_or(DEFAULT_POLL_INTERVAL_MS),
        );

        let transition_workflow = std::env::var("TRANSITION_WORKFLOW")
            .ok()
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        Self {
            submit_stagger,
            poll_interval,
            task_list_limit: env_parse("TASK_LIST_LIMIT").unwrap_or(DEFAULT_TASK_LIST_LIMIT),
            transition_workflow,
            transition_duration_secs: env_parse("TRANSITION_DURATION_SECS")
                .filter(|secs: &f64| *secs > 0.0),
            transition_fps: env_parse("TRANSITION_FPS").unwrap_or(DEFAULT_TRANSITION_FPS),
        }
    }

    /// Options sent with every transition submission.
    pub fn transition_options(&self) -> TransitionOptions {
        TransitionOptions {
            workflow_id: self.transition_workflow.clone(),
            frame_count: self
                .transition_duration_secs
                .map(|secs| TransitionOptions::frame_count_for(secs, self.transition_fps)),
        }
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.trim().parse().ok())
}
