//! Error types for sync operations

use std::time::Duration;
use thiserror::Error;

use crate::models::SubjectId;

/// Errors a sync can fail with
///
/// Plumbing errors (storage, config, I/O) travel as `anyhow::Error` and are
/// folded into one of these variants at the sync boundary.
#[derive(Debug, Error)]
pub enum SyncError {
    /// Missing or rejected API token. Not retried.
    #[error("authentication failed: {0}")]
    Auth(String),

    /// WaniKani asked us to slow down
    #[error("rate limited by WaniKani{}", retry_after_suffix(.retry_after))]
    RateLimited {
        /// How long the server asked us to wait, if it said
        retry_after: Option<Duration>,
    },

    /// Transient transport or server failure that outlived its retries
    #[error("network error: {0}")]
    Network(String),

    /// Response that could not be understood. Not retried.
    #[error("unexpected API response: {0}")]
    Api(String),

    /// Pronunciation audio could not be fetched or cached for one subject
    #[error("audio download failed for subject {subject_id}: {message}")]
    MediaDownload {
        subject_id: SubjectId,
        message: String,
    },

    /// Writing to the card store (or persisting the watermark) failed
    #[error("failed to commit cards ({committed} committed before the failure): {message}")]
    Commit { committed: usize, message: String },

    /// The host cancelled the sync
    #[error("sync cancelled ({committed} cards committed)")]
    Cancelled { committed: usize },

    /// Another sync is already running
    #[error("a sync is already in progress")]
    Busy,
}

fn retry_after_suffix(retry_after: &Option<Duration>) -> String {
    match retry_after {
        Some(wait) => format!(" (retry after {}s)", wait.as_secs()),
        None => String::new(),
    }
}

impl SyncError {
    /// Whether the failed request may succeed if issued again
    pub fn is_retryable(&self) -> bool {
        matches!(self, SyncError::Network(_) | SyncError::RateLimited { .. })
    }

    /// Whether the error affects only a single item and the sync continues
    pub fn is_per_item(&self) -> bool {
        matches!(self, SyncError::MediaDownload { .. })
    }

    /// Number of cards committed before the failure
    pub fn committed(&self) -> usize {
        match self {
            SyncError::Commit { committed, .. } | SyncError::Cancelled { committed } => *committed,
            _ => 0,
        }
    }

    /// Message suitable for showing to the user
    pub fn user_message(&self) -> String {
        match self {
            SyncError::Auth(_) => format!(
                "Burnki: {}. Set your WaniKani API token in the Burnki config, then run Sync Now again.",
                self
            ),
            SyncError::Busy => "Burnki: a sync is already running.".to_string(),
            SyncError::RateLimited { .. } => format!(
                "Burnki: {}. Nothing was lost; run Sync Now again in a minute.",
                self
            ),
            _ => format!(
                "Burnki sync failed after syncing {} items: {}. Run Sync Now again to retry.",
                self.committed(),
                self
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(SyncError::Network("connection reset".into()).is_retryable());
        assert!(SyncError::RateLimited { retry_after: None }.is_retryable());
        assert!(!SyncError::Auth("bad token".into()).is_retryable());
        assert!(!SyncError::Api("bad json".into()).is_retryable());
        assert!(!SyncError::Busy.is_retryable());
    }

    #[test]
    fn test_committed_count() {
        let err = SyncError::Commit {
            committed: 3,
            message: "disk full".into(),
        };
        assert_eq!(err.committed(), 3);
        assert_eq!(SyncError::Cancelled { committed: 2 }.committed(), 2);
        assert_eq!(SyncError::Network("timeout".into()).committed(), 0);
    }

    #[test]
    fn test_user_message_reports_progress() {
        let err = SyncError::Commit {
            committed: 5,
            message: "disk full".into(),
        };
        let msg = err.user_message();
        assert!(msg.contains("after syncing 5 items"));
        assert!(msg.contains("Sync Now"));
    }

    #[test]
    fn test_rate_limited_display() {
        let err = SyncError::RateLimited {
            retry_after: Some(Duration::from_secs(12)),
        };
        assert_eq!(err.to_string(), "rate limited by WaniKani (retry after 12s)");
        assert_eq!(
            SyncError::RateLimited { retry_after: None }.to_string(),
            "rate limited by WaniKani"
        );
    }

    #[test]
    fn test_media_download_is_per_item() {
        let err = SyncError::MediaDownload {
            subject_id: SubjectId(42),
            message: "404".into(),
        };
        assert!(err.is_per_item());
        assert!(err.to_string().contains("42"));
    }
}
