//! Incremental fetch of burned items
//!
//! Walks burned assignment pages after a watermark and resolves each page's
//! subjects and study materials in one batched lookup.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use rayon::ThreadPool;
use std::collections::{HashMap, VecDeque};

use crate::error::SyncError;
use crate::models::{Assignment, Subject, SubjectId, Watermark};
use crate::wanikani::{AssignmentPage, AssignmentPages, HttpTransport, WaniKaniClient};

/// A burned assignment together with its subject
#[derive(Debug, Clone, PartialEq)]
pub struct BurnedItem {
    pub assignment: Assignment,
    pub subject: Subject,
}

impl BurnedItem {
    /// Ordering key: ascending burn time, ties broken by subject id
    pub fn sort_key(&self) -> (Option<DateTime<Utc>>, SubjectId) {
        (self.assignment.burned_at, self.subject.id)
    }
}

/// Statistics from fetching
#[derive(Debug, Default, Clone, PartialEq)]
pub struct FetchStats {
    pub pages: usize,
    /// Assignments returned by WaniKani
    pub assignments_seen: usize,
    /// Assignments burned after the watermark
    pub assignments_new: usize,
    /// Assignments whose subject WaniKani did not return
    pub subjects_missing: usize,
    /// Earliest burn among those assignments; the watermark must stay below it
    pub earliest_missing: Option<DateTime<Utc>>,
}

/// Fetches burned items newer than a watermark
pub struct IncrementalFetcher<'a, T: HttpTransport> {
    client: &'a WaniKaniClient<T>,
    pool: &'a ThreadPool,
}

impl<'a, T: HttpTransport> IncrementalFetcher<'a, T> {
    pub fn new(client: &'a WaniKaniClient<T>, pool: &'a ThreadPool) -> Self {
        Self { client, pool }
    }

    /// Lazily fetch every item burned after `since`
    pub fn fetch(&self, since: Watermark) -> BurnedItems<'a, T> {
        BurnedItems {
            client: self.client,
            pool: self.pool,
            since,
            pages: self.client.burned_assignment_pages(since),
            pending: None,
            ready: VecDeque::new(),
            stats: FetchStats::default(),
        }
    }
}

/// Lazy, finite sequence of burned items
///
/// Items within a page come out in ascending burn order. After an error the
/// sequence can be polled again: the failed page (or subject lookup) is
/// retried rather than skipped.
pub struct BurnedItems<'a, T: HttpTransport> {
    client: &'a WaniKaniClient<T>,
    pool: &'a ThreadPool,
    since: Watermark,
    pages: AssignmentPages<'a, T>,
    /// Page fetched but whose subjects are not resolved yet
    pending: Option<AssignmentPage>,
    ready: VecDeque<BurnedItem>,
    stats: FetchStats,
}

impl<T: HttpTransport> BurnedItems<'_, T> {
    pub fn stats(&self) -> &FetchStats {
        &self.stats
    }

    /// Resolve subjects for the pending page
    fn resolve_pending(&mut self) -> Result<(), SyncError> {
        let Some(page) = self.pending.as_ref() else {
            return Ok(());
        };

        let assignments = latest_per_subject(
            page.assignments
                .iter()
                .filter(|a| a.burned_after(&self.since))
                .cloned(),
        );
        let ids: Vec<SubjectId> = assignments.iter().map(|a| a.subject_id).collect();

        let client = self.client;
        let (subjects, materials) = self.pool.join(
            || client.get_subjects(&ids),
            || client.get_study_materials(&ids),
        );
        let mut subjects = subjects?;
        let mut materials = materials?;

        let mut items = Vec::with_capacity(assignments.len());
        let mut missing = 0;
        let mut earliest_missing = self.stats.earliest_missing;
        for assignment in assignments {
            let Some(subject) = subjects.remove(&assignment.subject_id) else {
                warn!(
                    "Subject {} for assignment {} not found; will retry next sync",
                    assignment.subject_id, assignment.id
                );
                missing += 1;
                if let Some(burned_at) = assignment.burned_at {
                    let earliest = earliest_missing.map_or(burned_at, |t: DateTime<Utc>| t.min(burned_at));
                    earliest_missing = Some(earliest);
                }
                continue;
            };
            let subject = match materials.remove(&assignment.subject_id) {
                Some(material) => subject.with_study_material(material),
                None => subject,
            };
            items.push(BurnedItem {
                assignment,
                subject,
            });
        }
        items.sort_by_key(BurnedItem::sort_key);

        self.stats.pages += 1;
        self.stats.assignments_seen += page.assignments.len();
        self.stats.assignments_new += ids.len();
        self.stats.subjects_missing += missing;
        self.stats.earliest_missing = earliest_missing;
        debug!(
            "Page {}: {} assignments, {} new burned items",
            self.stats.pages,
            page.assignments.len(),
            items.len()
        );

        self.pending = None;
        self.ready.extend(items);
        Ok(())
    }
}

impl<T: HttpTransport> Iterator for BurnedItems<'_, T> {
    type Item = Result<BurnedItem, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if let Some(item) = self.ready.pop_front() {
                return Some(Ok(item));
            }

            if self.pending.is_some() {
                if let Err(e) = self.resolve_pending() {
                    return Some(Err(e));
                }
                continue;
            }

            match self.pages.next()? {
                Ok(page) => self.pending = Some(page),
                Err(e) => return Some(Err(e)),
            }
        }
    }
}

/// Keep only the most recent burn per subject
///
/// A subject that was resurrected and burned again shows up once, with
/// its latest burn time.
pub fn latest_per_subject(assignments: impl IntoIterator<Item = Assignment>) -> Vec<Assignment> {
    let mut latest: HashMap<SubjectId, Assignment> = HashMap::new();
    for assignment in assignments {
        match latest.get(&assignment.subject_id) {
            Some(existing) if existing.burned_at >= assignment.burned_at => {}
            _ => {
                latest.insert(assignment.subject_id, assignment);
            }
        }
    }

    let mut assignments: Vec<Assignment> = latest.into_values().collect();
    assignments.sort_by_key(|a| (a.burned_at, a.subject_id));
    assignments
}
