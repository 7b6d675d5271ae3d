//! Sync progress events and reports

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::models::{SubjectId, Watermark};

/// Which entry point started a sync
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Continue from the stored watermark
    Incremental,
    /// Fetch everything, ignoring the stored watermark
    FullResync,
}

impl fmt::Display for SyncMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncMode::Incremental => f.write_str("incremental sync"),
            SyncMode::FullResync => f.write_str("full re-sync"),
        }
    }
}

/// Where a sync currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncPhase {
    #[default]
    Idle,
    Fetching,
    Building,
    Committing,
}

/// Progress events emitted while a sync runs
#[derive(Debug, Clone, PartialEq)]
pub enum SyncProgress {
    Started { mode: SyncMode, since: Watermark },
    PhaseChanged(SyncPhase),
    /// An assignment page was fetched and its subjects resolved
    PageFetched { page: usize, items: usize },
    /// Waiting for WaniKani's rate limit window
    RateLimited { wait: Duration },
    Building { done: usize, total: usize, characters: String },
    AudioFailed { subject_id: SubjectId, message: String },
    Committed { done: usize, total: usize },
    Finished { committed: usize },
}

/// Receives progress events; called on the syncing thread
pub type ProgressCallback = Arc<dyn Fn(&SyncProgress) + Send + Sync>;

/// Statistics from a sync operation
#[derive(Debug, Clone, PartialEq)]
pub struct SyncReport {
    pub mode: SyncMode,
    /// Burned assignments returned by WaniKani
    pub assignments_fetched: usize,
    /// Distinct subjects after deduplication
    pub unique_items: usize,
    pub cards_created: usize,
    pub cards_updated: usize,
    pub audio_downloaded: usize,
    pub audio_cached: usize,
    pub audio_failed: usize,
    /// Assignments whose subject could not be loaded
    pub subjects_missing: usize,
    pub rate_limit_pauses: u32,
    pub watermark_before: Watermark,
    pub watermark_after: Watermark,
    /// Duration of the sync operation
    pub duration_ms: u64,
}

impl SyncReport {
    pub fn new(mode: SyncMode, watermark: Watermark) -> Self {
        Self {
            mode,
            assignments_fetched: 0,
            unique_items: 0,
            cards_created: 0,
            cards_updated: 0,
            audio_downloaded: 0,
            audio_cached: 0,
            audio_failed: 0,
            subjects_missing: 0,
            rate_limit_pauses: 0,
            watermark_before: watermark,
            watermark_after: watermark,
            duration_ms: 0,
        }
    }

    /// Cards written to the store
    pub fn committed(&self) -> usize {
        self.cards_created + self.cards_updated
    }

    /// One-line summary for the user
    pub fn summary(&self) -> String {
        if self.committed() == 0 {
            return "Burnki: no new burned items.".to_string();
        }

        let mut summary = format!(
            "Burnki: {} new, {} updated",
            self.cards_created, self.cards_updated
        );
        if self.audio_failed > 0 {
            summary.push_str(&format!(", {} without audio", self.audio_failed));
        }
        if self.subjects_missing > 0 {
            summary.push_str(&format!(", {} skipped", self.subjects_missing));
        }
        summary.push('.');
        summary
    }
}
