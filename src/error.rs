//! Crate-wide error type
//!
//! Layers never surface these to the orchestrator. They are used by the
//! helpers underneath a layer (decoders, ffmpeg wrappers, container parsers)
//! and by the collaborators around the core (storage, server, CLI).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("unsupported media type: {0}")]
    Unsupported(String),

    #[error("{tool} failed: {message}")]
    Tool { tool: String, message: String },

    #[error("malformed container: {0}")]
    Container(String),

    #[error("model backend error: {0}")]
    Model(String),

    #[error("storage error: {0}")]
    Storage(#[from] crate::db::DbError),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn tool(tool: &str, message: impl Into<String>) -> Self {
        Error::Tool {
            tool: tool.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::DbError;

    fn history_lookup() -> Result<()> {
        Err(DbError::Connection("database is locked".to_string()))?;
        Ok(())
    }

    #[test]
    fn test_storage_failures_lift_into_error() {
        let err = history_lookup().unwrap_err();
        assert!(matches!(err, Error::Storage(DbError::Connection(_))));
        assert_eq!(err.to_string(), "storage error: Connection error: database is locked");
    }

    #[test]
    fn test_tool_error_display() {
        assert_eq!(Error::tool("ffprobe", "no video stream").to_string(), "ffprobe failed: no video stream");
    }
}
