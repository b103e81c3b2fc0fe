#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    #[error("Invalid job key '{value}' for {kind}")]
    InvalidJobKey { kind: &'static str, value: String },

    #[error("Unknown job kind '{0}'")]
    UnknownJobKind(String),
}
