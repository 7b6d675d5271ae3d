//! Sync orchestration
//!
//! Runs fetch, build and commit as one batch and advances the watermark
//! only once every card in the batch is stored.

use anyhow::Context;
use chrono::{DateTime, Utc};
use log::{debug, error, info, warn};
use rayon::ThreadPool;
use rayon::prelude::*;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Arc, Mutex, TryLockError};
use std::time::{Duration, Instant};

use super::audio::{AudioResolution, AudioResolver};
use super::cancel::CancelToken;
use super::fetch::{BurnedItem, IncrementalFetcher};
use super::progress::{ProgressCallback, SyncMode, SyncPhase, SyncProgress, SyncReport};
use crate::cards::build_card;
use crate::config::Settings;
use crate::error::SyncError;
use crate::models::{CardRecord, SubjectId, Watermark};
use crate::storage::{AudioCache, CardStore, UpsertOutcome, WatermarkStore};
use crate::wanikani::{HttpTransport, RetryPolicy, WaniKaniClient};

/// Rate limit pauses accepted within one sync before giving up
const MAX_RATE_LIMIT_PAUSES: u32 = 5;

/// Pause used when WaniKani throttles without saying for how long
const DEFAULT_RATE_LIMIT_PAUSE: Duration = Duration::from_secs(10);

/// Granularity of cancellable sleeps
const CANCEL_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Coordinates a WaniKani to deck sync
///
/// Only one sync runs at a time: a call made while another is in flight
/// fails with [`SyncError::Busy`].
pub struct SyncOrchestrator<T: HttpTransport> {
    client: WaniKaniClient<T>,
    cards: Arc<dyn CardStore>,
    watermarks: Arc<dyn WatermarkStore>,
    audio_cache: Arc<dyn AudioCache>,
    pool: ThreadPool,
    download_audio: bool,
    max_rate_limit_wait: Duration,
    progress: Option<ProgressCallback>,
    sync_lock: Mutex<()>,
    phase: Mutex<SyncPhase>,
}

impl<T: HttpTransport> SyncOrchestrator<T> {
    /// Create an orchestrator from validated settings
    ///
    /// # Arguments
    /// * `settings` - Token, audio flag and network tuning
    /// * `transport` - HTTP transport used for every request
    /// * `cards` - Deck the cards are upserted into
    /// * `watermarks` - Where the last-sync watermark is persisted
    /// * `audio_cache` - Local store for pronunciation files
    pub fn new(
        settings: &Settings,
        transport: T,
        cards: Arc<dyn CardStore>,
        watermarks: Arc<dyn WatermarkStore>,
        audio_cache: Arc<dyn AudioCache>,
    ) -> anyhow::Result<Self> {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(settings.concurrency.max(1))
            .thread_name(|i| format!("burnki-net-{}", i))
            .build()
            .context("Failed to start network worker pool")?;

        let client = WaniKaniClient::new(transport, settings.api_token.clone())
            .with_base_url(settings.api_base_url.clone())
            .with_retry(RetryPolicy::new(settings.max_attempts))
            .with_max_rate_limit_wait(settings.max_rate_limit_wait);

        Ok(Self {
            client,
            cards,
            watermarks,
            audio_cache,
            pool,
            download_audio: settings.download_audio,
            max_rate_limit_wait: settings.max_rate_limit_wait,
            progress: None,
            sync_lock: Mutex::new(()),
            phase: Mutex::new(SyncPhase::Idle),
        })
    }

    /// Report progress events to `callback`
    pub fn with_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&SyncProgress) + Send + Sync + 'static,
    {
        self.progress = Some(Arc::new(callback));
        self
    }

    /// Override the retry policy (tests use immediate retries)
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.client = self.client.with_retry(retry);
        self
    }

    pub fn client(&self) -> &WaniKaniClient<T> {
        &self.client
    }

    /// Current phase; Idle when no sync is running
    pub fn phase(&self) -> SyncPhase {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// The watermark a sync would start from
    pub fn watermark(&self) -> anyhow::Result<Watermark> {
        self.watermarks.load_watermark()
    }

    /// Sync items burned since the stored watermark
    pub fn sync_now(&self, cancel: &CancelToken) -> Result<SyncReport, SyncError> {
        self.run(SyncMode::Incremental, cancel)
    }

    /// Sync every burned item, ignoring the stored watermark
    ///
    /// The stored watermark is not cleared up front; it only changes once
    /// the whole batch has been committed, and never moves backwards.
    pub fn full_resync(&self, cancel: &CancelToken) -> Result<SyncReport, SyncError> {
        self.run(SyncMode::FullResync, cancel)
    }

    fn run(&self, mode: SyncMode, cancel: &CancelToken) -> Result<SyncReport, SyncError> {
        let _lock = match self.sync_lock.try_lock() {
            Ok(guard) => guard,
            Err(TryLockError::WouldBlock) => {
                warn!("Rejecting {}: another sync is in progress", mode);
                return Err(SyncError::Busy);
            }
            // A panicked sync never got to the watermark, so the state is fine
            Err(TryLockError::Poisoned(poisoned)) => poisoned.into_inner(),
        };
        let _phase = PhaseGuard { orchestrator: self };

        let start = Instant::now();
        let stored = self.watermarks.load_watermark().map_err(|e| SyncError::Commit {
            committed: 0,
            message: format!("failed to load watermark: {:#}", e),
        })?;
        let since = match mode {
            SyncMode::Incremental => stored,
            SyncMode::FullResync => Watermark::empty(),
        };

        info!("Starting {} from {}", mode, since);
        self.emit(SyncProgress::Started { mode, since });

        let mut report = SyncReport::new(mode, stored);
        let result = self.run_batch(since, cancel, &mut report);
        report.duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!(
                    "Finished {} in {}ms: {} created, {} updated, watermark {}",
                    mode,
                    report.duration_ms,
                    report.cards_created,
                    report.cards_updated,
                    report.watermark_after
                );
                self.emit(SyncProgress::Finished {
                    committed: report.committed(),
                });
                Ok(report)
            }
            Err(e) => {
                warn!(
                    "{} failed after {} cards: {}",
                    mode,
                    report.committed(),
                    e
                );
                Err(e)
            }
        }
    }

    fn run_batch(
        &self,
        since: Watermark,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        // 1. Fetch everything burned after the watermark
        self.set_phase(SyncPhase::Fetching);
        let user = loop {
            match self.client.authenticate() {
                Err(SyncError::RateLimited { retry_after }) => {
                    self.pause_for_rate_limit(retry_after, cancel, report)?;
                }
                result => break result?,
            }
        };
        info!("Authenticated as {} (level {})", user.username, user.level);

        let (items, earliest_missing) = self.fetch_items(since, cancel, report)?;
        report.unique_items = items.len();
        if items.is_empty() {
            info!("No new burned items");
            return Ok(());
        }

        // 2. Resolve audio and render cards
        self.check_cancelled(cancel, 0)?;
        self.set_phase(SyncPhase::Building);
        let cards = self.build_cards(&items, report);

        // 3. Commit cards, then advance the watermark
        self.set_phase(SyncPhase::Committing);
        self.commit_cards(&cards, cancel, report)?;

        // Stay strictly below any burn whose subject could not be loaded, so
        // the next sync fetches it again
        let newest = items
            .iter()
            .filter_map(|item| item.assignment.burned_at)
            .filter(|burned_at| earliest_missing.is_none_or(|missing| *burned_at < missing))
            .fold(report.watermark_before, Watermark::advanced_to);
        if let Some(missing) = earliest_missing {
            warn!(
                "{} subjects could not be loaded; holding the watermark below {}",
                report.subjects_missing,
                Watermark::at(missing)
            );
        }

        self.check_cancelled(cancel, report.committed())?;
        if newest != report.watermark_before {
            self.watermarks
                .save_watermark(newest)
                .map_err(|e| {
                    error!("Failed to save watermark {}: {:#}", newest, e);
                    SyncError::Commit {
                        committed: report.committed(),
                        message: format!("failed to save watermark: {:#}", e),
                    }
                })?;
            report.watermark_after = newest;
        }

        Ok(())
    }

    /// Drain the fetcher into a deduplicated batch in ascending burn order
    fn fetch_items(
        &self,
        since: Watermark,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> Result<(Vec<BurnedItem>, Option<DateTime<Utc>>), SyncError> {
        let fetcher = IncrementalFetcher::new(&self.client, &self.pool);
        let mut burned = fetcher.fetch(since);
        let mut latest: HashMap<SubjectId, BurnedItem> = HashMap::new();
        let mut pages_seen = 0;

        loop {
            self.check_cancelled(cancel, 0)?;

            match burned.next() {
                None => break,
                Some(Ok(item)) => match latest.entry(item.subject.id) {
                    Entry::Occupied(mut existing) => {
                        if item.assignment.burned_at > existing.get().assignment.burned_at {
                            existing.insert(item);
                        }
                    }
                    Entry::Vacant(slot) => {
                        slot.insert(item);
                    }
                },
                Some(Err(SyncError::RateLimited { retry_after })) => {
                    self.pause_for_rate_limit(retry_after, cancel, report)?;
                }
                Some(Err(e)) => return Err(e),
            }

            let stats = burned.stats();
            if stats.pages > pages_seen {
                pages_seen = stats.pages;
                self.emit(SyncProgress::PageFetched {
                    page: stats.pages,
                    items: stats.assignments_new,
                });
            }
        }

        let stats = burned.stats();
        report.assignments_fetched = stats.assignments_seen;
        report.subjects_missing = stats.subjects_missing;
        info!(
            "Fetched {} pages, {} new burned assignments",
            stats.pages, stats.assignments_new
        );

        let mut items: Vec<BurnedItem> = latest.into_values().collect();
        items.sort_by_key(BurnedItem::sort_key);
        Ok((items, stats.earliest_missing))
    }

    /// Wait out a rate limit window, or give up if it's too long
    fn pause_for_rate_limit(
        &self,
        retry_after: Option<Duration>,
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let wait = retry_after.unwrap_or(DEFAULT_RATE_LIMIT_PAUSE);
        if report.rate_limit_pauses >= MAX_RATE_LIMIT_PAUSES || wait > self.max_rate_limit_wait {
            warn!("Rate limited by WaniKani; giving up (wait {:?})", wait);
            return Err(SyncError::RateLimited { retry_after });
        }

        report.rate_limit_pauses += 1;
        info!("Rate limited by WaniKani; resuming in {:?}", wait);
        self.emit(SyncProgress::RateLimited { wait });

        let deadline = Instant::now() + wait;
        loop {
            self.check_cancelled(cancel, 0)?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(CANCEL_POLL_INTERVAL.min(deadline - now));
        }
    }

    /// Resolve audio on the worker pool, then render cards in batch order
    fn build_cards(&self, items: &[BurnedItem], report: &mut SyncReport) -> Vec<CardRecord> {
        let resolver = AudioResolver::new(&self.client, self.audio_cache.as_ref(), self.download_audio);
        let resolutions: Vec<AudioResolution> = self
            .pool
            .install(|| items.par_iter().map(|item| resolver.resolve(&item.subject)).collect());

        let total = items.len();
        let mut cards = Vec::with_capacity(total);
        for (i, (item, resolution)) in items.iter().zip(&resolutions).enumerate() {
            match resolution {
                AudioResolution::Downloaded(_) => report.audio_downloaded += 1,
                AudioResolution::Cached(_) => report.audio_cached += 1,
                AudioResolution::Failed(e) => {
                    warn!("Building card without audio: {}", e);
                    report.audio_failed += 1;
                    self.emit(SyncProgress::AudioFailed {
                        subject_id: item.subject.id,
                        message: e.to_string(),
                    });
                }
                AudioResolution::None => {}
            }

            let card = build_card(&item.assignment, &item.subject, resolution.audio_ref());
            self.emit(SyncProgress::Building {
                done: i + 1,
                total,
                characters: card.characters.clone(),
            });
            cards.push(card);
        }
        cards
    }

    /// Upsert every card, stopping at the first failure
    fn commit_cards(
        &self,
        cards: &[CardRecord],
        cancel: &CancelToken,
        report: &mut SyncReport,
    ) -> Result<(), SyncError> {
        let commit_error = |committed: usize, e: anyhow::Error| SyncError::Commit {
            committed,
            message: format!("{:#}", e),
        };

        if self.cards.ensure_note_type().map_err(|e| commit_error(0, e))? {
            info!("Created or updated the Burnki note type");
        }

        let total = cards.len();
        for (i, card) in cards.iter().enumerate() {
            self.check_cancelled(cancel, report.committed())?;

            match self.cards.upsert_card(card) {
                Ok(UpsertOutcome::Created) => report.cards_created += 1,
                Ok(UpsertOutcome::Updated) => report.cards_updated += 1,
                Err(e) => {
                    error!("Failed to store card for subject {}: {:#}", card.subject_id, e);
                    return Err(commit_error(report.committed(), e));
                }
            }
            debug!("Committed card {}/{} (subject {})", i + 1, total, card.subject_id);
            self.emit(SyncProgress::Committed { done: i + 1, total });
        }

        Ok(())
    }

    fn check_cancelled(&self, cancel: &CancelToken, committed: usize) -> Result<(), SyncError> {
        if cancel.is_cancelled() {
            info!("Sync cancelled after {} cards", committed);
            return Err(SyncError::Cancelled { committed });
        }
        Ok(())
    }

    fn set_phase(&self, phase: SyncPhase) {
        *self.phase.lock().unwrap_or_else(|e| e.into_inner()) = phase;
        self.emit(SyncProgress::PhaseChanged(phase));
    }

    fn emit(&self, event: SyncProgress) {
        if let Some(progress) = &self.progress {
            progress(&event);
        }
    }
}

/// Returns the orchestrator to Idle however the sync ends
struct PhaseGuard<'a, T: HttpTransport> {
    orchestrator: &'a SyncOrchestrator<T>,
}

impl<T: HttpTransport> Drop for PhaseGuard<'_, T> {
    fn drop(&mut self) {
        self.orchestrator.set_phase(SyncPhase::Idle);
    }
}
