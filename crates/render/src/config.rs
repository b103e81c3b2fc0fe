/// Default base URL of the render service.
const DEFAULT_API_URL: &str = "http://localhost:8000";

/// Default HTTP request timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Render service connection settings loaded from environment variables.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Base HTTP URL, e.g. `http://host:8000` (no trailing slash needed).
    pub api_url: String,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl RenderConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var               | Default                 |
    /// |-----------------------|-------------------------|
    /// | `RENDER_API_URL`      | `http://localhost:8000` |
    /// | `RENDER_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Self {
        let api_url = std::env::var("RENDER_API_URL")
            .ok()
            .map(|v| v.trim().trim_end_matches('/').to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());

        let timeout_secs = std::env::var("RENDER_TIMEOUT_SECS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_TIMEOUT_SECS);

        Self {
            api_url,
            timeout_secs,
        }
    }
}
