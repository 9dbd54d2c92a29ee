use thiserror::Error;

/// Failures raised while driving the browser session.
#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to launch browser: {0}")]
    Launch(String),

    #[error("no live browser session")]
    NoSession,

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("tab operation failed: {0}")]
    Tab(String),

    #[error("failed to read rendered document: {0}")]
    Snapshot(String),

    #[error("failed to click {selector}: {message}")]
    Interaction { selector: String, message: String },
}

impl AgentError {
    /// Short label used in log fields.
    pub fn kind(&self) -> &'static str {
        match self {
            AgentError::Launch(_) => "launch",
            AgentError::NoSession => "no_session",
            AgentError::Navigation { .. } => "navigation",
            AgentError::Tab(_) => "tab",
            AgentError::Snapshot(_) => "snapshot",
            AgentError::Interaction { .. } => "interaction",
        }
    }

    /// Whether the session itself is likely unusable and should be relaunched.
    pub fn is_session_fatal(&self) -> bool {
        matches!(
            self,
            AgentError::Launch(_) | AgentError::NoSession | AgentError::Tab(_)
        )
    }
}
