use std::io;
use std::path::PathBuf;

/// Transport-level failures. Any of these aborts the whole run.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error("connection failed: {0}")]
    Connection(String),

    #[error("mailbox error: {0}")]
    Mailbox(String),

    #[error("search failed: {0}")]
    Search(String),

    #[error("fetch failed: {0}")]
    Fetch(String),

    #[error("body stream failed: {0}")]
    Stream(String),
}

/// Per-message extraction failures. Logged, counted, and the run moves on.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    #[error("failed to decode base64 payload for {filename}: {source}")]
    Decode {
        filename: String,
        #[source]
        source: base64::DecodeError,
    },

    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}
