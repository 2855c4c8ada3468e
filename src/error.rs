use thiserror::Error;

/// Main error type for the vidremix library
#[derive(Error, Debug)]
pub enum RemixError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Source read error: {0}")]
    Source(#[from] SourceError),

    #[error("Effect failure: {0}")]
    Effect(#[from] EffectError),

    #[error("Encode failure: {0}")]
    Encode(#[from] EncodeError),

    #[error("Audio processing error: {0}")]
    Audio(#[from] AudioError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Configuration errors, raised before any processing starts
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse configuration file: {path} ({reason})")]
    ParseFailed { path: String, reason: String },

    #[error("Invalid configuration value: {key} = {value}")]
    InvalidValue { key: String, value: String },

    #[error("Missing required asset for {key}: {path}")]
    MissingAsset { key: String, path: String },

    #[error("Configuration file not found: {path}")]
    FileNotFound { path: String },
}

/// Errors reading the input container or auxiliary media
#[derive(Error, Debug)]
pub enum SourceError {
    #[error("Failed to open media: {path}")]
    OpenFailed { path: String },

    #[error("Probe failed for {path}: {reason}")]
    ProbeFailed { path: String, reason: String },

    #[error("No video stream in {path}")]
    NoVideoStream { path: String },

    #[error("Decoding failed: {reason}")]
    DecodeFailed { reason: String },

    #[error("Unsupported format: {format}")]
    UnsupportedFormat { format: String },
}

/// A single effect could not run; the frame passes through unchanged
#[derive(Error, Debug)]
pub enum EffectError {
    #[error("{effect}: precondition not met ({reason})")]
    Precondition { effect: String, reason: String },

    #[error("{effect}: asset unavailable ({reason})")]
    AssetUnavailable { effect: String, reason: String },
}

/// Encoder or remux subprocess failures
#[derive(Error, Debug)]
pub enum EncodeError {
    #[error("Media tool not found: {tool}")]
    ToolMissing { tool: String },

    #[error("{tool} exited with {status}: {stderr}")]
    ProcessFailed {
        tool: String,
        status: String,
        stderr: String,
    },

    #[error("Encoder pipe closed: {reason}")]
    PipeClosed { reason: String },

    #[error("Frame size mismatch: expected {expected} bytes, got {actual}")]
    FrameSize { expected: usize, actual: usize },
}

/// Audio-specific errors
#[derive(Error, Debug)]
pub enum AudioError {
    #[error("Failed to load audio file: {path}")]
    LoadFailed { path: String },

    #[error("Unsupported audio format: {format}")]
    UnsupportedFormat { format: String },

    #[error("Audio stage {stage} failed: {reason}")]
    StageFailed { stage: String, reason: String },

    #[error("Failed to write audio file: {path}")]
    WriteFailed { path: String },
}

/// Convenience type alias for Results using RemixError
pub type Result<T> = std::result::Result<T, RemixError>;

impl RemixError {
    /// Whether this error must abort the run.
    ///
    /// Effect failures degrade to a skipped effect; everything else is fatal.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Effect(_))
    }

    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            Self::Source(SourceError::OpenFailed { path })
            | Self::Source(SourceError::ProbeFailed { path, .. }) => {
                format!(
                    "Could not read video file '{}'. Please check the file exists and is a supported format.",
                    path
                )
            }
            Self::Config(ConfigError::FileNotFound { path }) => {
                format!("Configuration file '{}' not found.", path)
            }
            Self::Config(ConfigError::MissingAsset { key, path }) => {
                format!("'{}' is enabled but its asset '{}' does not exist.", key, path)
            }
            Self::Encode(EncodeError::ToolMissing { tool }) => {
                format!("'{}' not found. Please install FFmpeg or set [toolchain] paths.", tool)
            }
            _ => self.to_string(),
        }
    }
}

impl EffectError {
    pub fn precondition(effect: &str, reason: impl Into<String>) -> Self {
        Self::Precondition {
            effect: effect.to_string(),
            reason: reason.into(),
        }
    }
}
