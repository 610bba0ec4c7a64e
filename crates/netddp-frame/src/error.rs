/// Errors that can occur while encoding or decoding DDP frames.
#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    /// The text is not valid JSON, or a frame could not be serialized.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// The text parsed, but the top-level value is not a JSON object.
    #[error("frame is not a JSON object (found {0})")]
    NotAnObject(&'static str),
}

pub type Result<T> = std::result::Result<T, FrameError>;
