use thiserror::Error;

/// Exit code used for failures that were not anticipated by a user-facing exit.
pub const UNEXPECTED_EXIT_CODE: i32 = 2;

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    /// Deliberate stop with a message for the user, e.g. "no video files found"
    #[error("{message}")]
    Exit { message: String, code: i32 },

    #[error("'{0}' is not found in PATH")]
    ToolNotInstalled(String),

    #[error("Probe error: {0}")]
    Probe(String),

    #[error("Media processing error: {0}")]
    Media(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Prompt error: {0}")]
    Prompt(String),

    #[error("Plex API error: {0}")]
    Plex(String),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

impl StreamError {
    /// User-facing exit with the default failure code
    pub fn exit<S: Into<String>>(message: S) -> Self {
        Self::Exit {
            message: message.into(),
            code: 1,
        }
    }

    pub fn exit_with_code<S: Into<String>>(message: S, code: i32) -> Self {
        Self::Exit {
            message: message.into(),
            code,
        }
    }

    /// Exit code for deliberate, user-facing stops. `None` for unexpected errors.
    pub fn user_facing_code(&self) -> Option<i32> {
        match self {
            Self::Exit { code, .. } => Some(*code),
            Self::ToolNotInstalled(_) => Some(2),
            _ => None,
        }
    }

    /// Short type name used when reporting unexpected errors
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Io(_) => "IoError",
            Self::Json(_) => "JsonError",
            Self::Http(_) => "HttpError",
            Self::Exit { .. } => "Exit",
            Self::ToolNotInstalled(_) => "ToolNotInstalled",
            Self::Probe(_) => "ProbeError",
            Self::Media(_) => "MediaError",
            Self::Config(_) => "ConfigError",
            Self::Prompt(_) => "PromptError",
            Self::Plex(_) => "PlexError",
            Self::FileNotFound(_) => "FileNotFound",
            Self::UnsupportedFormat(_) => "UnsupportedFormat",
        }
    }
}

impl From<dialoguer::Error> for StreamError {
    fn from(err: dialoguer::Error) -> Self {
        StreamError::Prompt(err.to_string())
    }
}

/// Stop with a user-facing exit when `condition` holds
pub fn exit_if<S: Into<String>>(condition: bool, message: S, code: i32) -> Result<()> {
    if condition {
        return Err(StreamError::exit_with_code(message, code));
    }
    Ok(())
}

pub type Result<T> = std::result::Result<T, StreamError>;
