//! Error types shared across Screenmux crates.

/// Which elementary stream an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamKind {
    Video,
    Audio,
}

impl std::fmt::Display for StreamKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StreamKind::Video => f.write_str("video"),
            StreamKind::Audio => f.write_str("audio"),
        }
    }
}

/// Top-level error type for Screenmux operations.
#[derive(Debug, thiserror::Error)]
pub enum ScreenmuxError {
    #[error("Capture error: {message}")]
    Capture { message: String },

    #[error("Conversion error: {message}")]
    Convert { message: String },

    #[error("{stream} encoder error: {message}")]
    Encode { stream: StreamKind, message: String },

    #[error("Output write error: {message}")]
    Write { message: String },

    #[error("Audio error: {message}")]
    Audio { message: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Pipeline error: {message}")]
    Pipeline { message: String },

    #[error("Pipeline is stopped")]
    Stopped,

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

/// Result type alias using ScreenmuxError.
pub type ScreenmuxResult<T> = Result<T, ScreenmuxError>;

impl ScreenmuxError {
    pub fn capture(msg: impl Into<String>) -> Self {
        Self::Capture {
            message: msg.into(),
        }
    }

    pub fn convert(msg: impl Into<String>) -> Self {
        Self::Convert {
            message: msg.into(),
        }
    }

    pub fn encode(stream: StreamKind, msg: impl Into<String>) -> Self {
        Self::Encode {
            stream,
            message: msg.into(),
        }
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self::Write {
            message: msg.into(),
        }
    }

    pub fn audio(msg: impl Into<String>) -> Self {
        Self::Audio {
            message: msg.into(),
        }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    pub fn pipeline(msg: impl Into<String>) -> Self {
        Self::Pipeline {
            message: msg.into(),
        }
    }

    /// Copy of this error that keeps the variant. Wrapped io errors keep
    /// their kind; json and anyhow errors keep only their message.
    pub fn replicate(&self) -> Self {
        match self {
            Self::Capture { message } => Self::capture(message.clone()),
            Self::Convert { message } => Self::convert(message.clone()),
            Self::Encode { stream, message } => Self::encode(*stream, message.clone()),
            Self::Write { message } => Self::write(message.clone()),
            Self::Audio { message } => Self::audio(message.clone()),
            Self::Config { message } => Self::config(message.clone()),
            Self::Pipeline { message } => Self::pipeline(message.clone()),
            Self::Stopped => Self::Stopped,
            Self::Io(e) => Self::Io(std::io::Error::new(e.kind(), e.to_string())),
            Self::Json(e) => Self::Other(anyhow::anyhow!(e.to_string())),
            Self::Other(e) => Self::Other(anyhow::anyhow!(e.to_string())),
        }
    }
}
