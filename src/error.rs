//! Error types for track enrichment.
//!
//! `EnrichError` covers job-scope failures (files, manifest, configuration).
//! `RemoteError` covers a single call to the catalog or a lyric page and is
//! never fatal to the job.

use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Job-scope error. Anything surfacing as this stops the run.
#[derive(Error, Debug)]
pub enum EnrichError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("Manifest database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A committed chunk no longer matches what the manifest recorded.
    #[error("Chunk {sequence} ({path}) does not match the manifest: {reason}")]
    ManifestMismatch {
        sequence: u64,
        path: PathBuf,
        reason: String,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Unsafe output layout: {0}")]
    UnsafeOutput(String),
}

pub type Result<T> = std::result::Result<T, EnrichError>;

/// Failure of one remote call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RemoteError {
    #[error("request timed out: {0}")]
    Timeout(String),

    /// HTTP 429. `retry_after` is the server's requested wait, when given.
    #[error("rate limited: {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("HTTP status {0}: {1}")]
    Status(u16, String),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl RemoteError {
    /// Whether retrying the same call can succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            RemoteError::Timeout(_) | RemoteError::RateLimited { .. } => true,
            RemoteError::Status(code, _) => matches!(code, 408 | 500 | 502 | 503 | 504),
            RemoteError::Transport(_) | RemoteError::Malformed(_) => false,
        }
    }

    /// Minimum wait the server asked for before the next attempt.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            RemoteError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }

    /// Classifies a `ureq` failure.
    pub fn from_ureq(error: ureq::Error) -> Self {
        match error {
            ureq::Error::Status(429, response) => RemoteError::RateLimited {
                url: response.get_url().to_string(),
                retry_after: response.header("Retry-After").and_then(parse_retry_after),
            },
            ureq::Error::Status(code, response) => {
                RemoteError::Status(code, response.get_url().to_string())
            }
            ureq::Error::Transport(transport) => {
                let message = transport.to_string();
                let lowered = message.to_ascii_lowercase();
                if lowered.contains("timed out") || lowered.contains("timeout") {
                    RemoteError::Timeout(message)
                } else {
                    RemoteError::Transport(message)
                }
            }
        }
    }

    /// Classifies a body read failure.
    pub fn from_io(error: std::io::Error) -> Self {
        let timed_out = matches!(
            error.kind(),
            std::io::ErrorKind::TimedOut | std::io::ErrorKind::WouldBlock
        ) || error.to_string().to_ascii_lowercase().contains("timed out");
        if timed_out {
            RemoteError::Timeout(error.to_string())
        } else {
            RemoteError::Transport(error.to_string())
        }
    }
}

/// `Retry-After` in its delay-seconds form. HTTP-date values are ignored and
/// fall back to the normal backoff.
pub fn parse_retry_after(value: &str) -> Option<Duration> {
    value.trim().parse::<u64>().ok().map(Duration::from_secs)
}
