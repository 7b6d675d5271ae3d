//! WaniKani API HTTP client
//!
//! Read-only access to the assignment, subject and study material
//! endpoints. Transient failures are retried with backoff; throttling and
//! authentication failures are surfaced to the caller.

use log::{debug, info, warn};
use serde::de::DeserializeOwned;
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

use super::api::{AssignmentData, Collection, Resource, Single, StudyMaterialData, SubjectData, UserData};
use super::normalize::{normalize_assignment, normalize_study_material, normalize_subject};
use super::retry::RetryPolicy;
use super::transport::{HttpResponse, HttpTransport};
use crate::error::SyncError;
use crate::models::{Assignment, BURNED_SRS_STAGE, StudyMaterial, Subject, SubjectId, Watermark};

/// WaniKani API base URL
pub const DEFAULT_BASE_URL: &str = "https://api.wanikani.com/v2";

/// The authenticated user
#[derive(Debug, Clone, PartialEq)]
pub struct UserProfile {
    pub username: String,
    pub level: u32,
}

/// One page of burned assignments
#[derive(Debug, Clone)]
pub struct AssignmentPage {
    pub assignments: Vec<Assignment>,
    /// Page token (absolute URL) of the next page; None on the last page
    pub next_page: Option<String>,
    pub total_count: Option<u64>,
}

/// WaniKani API v2 client
pub struct WaniKaniClient<T: HttpTransport> {
    transport: T,
    token: String,
    base_url: String,
    retry: RetryPolicy,
    max_rate_limit_wait: Duration,
}

impl<T: HttpTransport> WaniKaniClient<T> {
    /// Maximum ids per request, to keep URLs from getting too long
    pub const BATCH_SIZE: usize = 500;

    /// API revision this client speaks
    const REVISION: &'static str = "20170710";

    /// Below this many remaining requests we wait for the window to reset
    const LOW_RATE_LIMIT_REMAINING: u64 = 5;

    /// Create a new client using the given API token
    pub fn new(transport: T, token: impl Into<String>) -> Self {
        Self {
            transport,
            token: token.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            retry: RetryPolicy::default(),
            max_rate_limit_wait: Duration::from_secs(60),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Cap on how long the client will sleep to respect rate limit headers
    pub fn with_max_rate_limit_wait(mut self, wait: Duration) -> Self {
        self.max_rate_limit_wait = wait;
        self
    }

    pub fn has_token(&self) -> bool {
        !self.token.trim().is_empty()
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// Check the token by fetching the user profile
    ///
    /// # Errors
    /// Returns `SyncError::Auth` if no token is configured or WaniKani
    /// answers 401.
    pub fn authenticate(&self) -> Result<UserProfile, SyncError> {
        if !self.has_token() {
            return Err(SyncError::Auth("no WaniKani API token configured".to_string()));
        }
        let url = self.endpoint("user", &[])?;
        let user: Single<UserData> = self.get_json(&url)?;
        Ok(UserProfile {
            username: user.data.username,
            level: user.data.level,
        })
    }

    /// Fetch one page of burned assignments updated after `since`
    ///
    /// # Arguments
    /// * `since` - Watermark used as the `updated_after` filter
    /// * `page_token` - `next_page` of a previous page, or None for the first page
    pub fn list_burned_assignments(
        &self,
        since: &Watermark,
        page_token: Option<&str>,
    ) -> Result<AssignmentPage, SyncError> {
        let url = match page_token {
            Some(next_url) => next_url.to_string(),
            None => self.burned_assignments_url(since)?,
        };

        let collection: Collection<AssignmentData> = self.get_json(&url)?;
        let assignments = collection
            .data
            .into_iter()
            .map(normalize_assignment)
            .collect::<anyhow::Result<Vec<_>>>()
            .map_err(|e| SyncError::Api(format!("{:#}", e)))?;

        debug!("Fetched assignment page with {} entries", assignments.len());

        Ok(AssignmentPage {
            assignments,
            next_page: collection.pages.and_then(|p| p.next_url),
            total_count: collection.total_count,
        })
    }

    /// Lazily walk every page of burned assignments updated after `since`
    pub fn burned_assignment_pages(&self, since: Watermark) -> AssignmentPages<'_, T> {
        AssignmentPages::new(self, since)
    }

    /// Fetch subjects by id, returns {subject_id: Subject}
    ///
    /// Ids are sent in batches of [`Self::BATCH_SIZE`]. Subjects of a type
    /// Burnki doesn't know are skipped.
    pub fn get_subjects(&self, ids: &[SubjectId]) -> Result<HashMap<SubjectId, Subject>, SyncError> {
        let mut subjects = HashMap::new();

        for batch in ids.chunks(Self::BATCH_SIZE) {
            let url = self.endpoint("subjects", &[("ids", join_ids(batch))])?;
            self.paginate(&url, |resource: Resource<SubjectData>| {
                let id = resource.id;
                match normalize_subject(resource) {
                    Ok(subject) => {
                        subjects.insert(subject.id, subject);
                    }
                    Err(e) => warn!("Skipping subject {}: {:#}", id, e),
                }
            })?;
        }

        Ok(subjects)
    }

    /// Fetch the user's study materials (synonyms, notes) for the given subjects
    pub fn get_study_materials(
        &self,
        ids: &[SubjectId],
    ) -> Result<HashMap<SubjectId, StudyMaterial>, SyncError> {
        let mut materials = HashMap::new();

        for batch in ids.chunks(Self::BATCH_SIZE) {
            let url = self.endpoint("study_materials", &[("subject_ids", join_ids(batch))])?;
            self.paginate(&url, |resource: Resource<StudyMaterialData>| {
                let material = normalize_study_material(resource);
                materials.insert(material.subject_id, material);
            })?;
        }

        Ok(materials)
    }

    /// Download a pronunciation audio file
    ///
    /// Audio lives on a CDN, so no credentials are sent.
    pub fn download_audio(&self, url: &str) -> Result<Vec<u8>, SyncError> {
        let response = self.get_with_retry(url, false)?;
        Ok(response.body)
    }

    fn burned_assignments_url(&self, since: &Watermark) -> Result<String, SyncError> {
        let mut query = vec![("srs_stages", BURNED_SRS_STAGE.to_string())];
        if !since.is_empty() {
            query.push(("updated_after", since.to_api_string()));
        }
        self.endpoint("assignments", &query)
    }

    fn endpoint(&self, path: &str, query: &[(&str, String)]) -> Result<String, SyncError> {
        let mut url = Url::parse(&format!("{}/{}", self.base_url.trim_end_matches('/'), path))
            .map_err(|e| SyncError::Api(format!("invalid API URL: {}", e)))?;
        if !query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url.into())
    }

    /// Follow `next_url` until there are no more pages
    fn paginate<D, F>(&self, url: &str, mut on_resource: F) -> Result<(), SyncError>
    where
        D: DeserializeOwned,
        F: FnMut(Resource<D>),
    {
        let mut next_url = Some(url.to_string());
        while let Some(url) = next_url {
            let collection: Collection<D> = self.get_json(&url)?;
            next_url = collection.pages.and_then(|p| p.next_url);
            for resource in collection.data {
                on_resource(resource);
            }
        }
        Ok(())
    }

    fn get_json<D: DeserializeOwned>(&self, url: &str) -> Result<D, SyncError> {
        let response = self.get_with_retry(url, true)?;
        serde_json::from_slice(&response.body)
            .map_err(|e| SyncError::Api(format!("failed to parse response from {}: {}", url, e)))
    }

    /// Issue a GET, retrying network failures and 5xx with backoff
    fn get_with_retry(&self, url: &str, authorized: bool) -> Result<HttpResponse, SyncError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.send_once(url, authorized) {
                Ok(response) => return Ok(response),
                Err(SyncError::Network(message)) if attempt < self.retry.max_attempts => {
                    let delay = self.retry.delay_for_retry(attempt);
                    warn!(
                        "Request failed (attempt {}/{}): {}; retrying in {:?}",
                        attempt, self.retry.max_attempts, message, delay
                    );
                    std::thread::sleep(delay);
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn send_once(&self, url: &str, authorized: bool) -> Result<HttpResponse, SyncError> {
        let mut headers = Vec::new();
        if authorized {
            headers.push(("Authorization", format!("Bearer {}", self.token)));
            headers.push(("Wanikani-Revision", Self::REVISION.to_string()));
        }

        let response = self
            .transport
            .get(url, &headers)
            .map_err(|e| SyncError::Network(e.to_string()))?;

        match response.status {
            200..=299 => {
                self.respect_rate_limit(&response);
                Ok(response)
            }
            401 => Err(SyncError::Auth(
                "WaniKani rejected the API token (HTTP 401)".to_string(),
            )),
            429 => Err(SyncError::RateLimited {
                retry_after: rate_limit_wait(&response),
            }),
            500..=599 => Err(SyncError::Network(format!(
                "server error (HTTP {})",
                response.status
            ))),
            status => Err(SyncError::Api(format!("HTTP {} for {}", status, url))),
        }
    }

    /// Back off if we're about to hit the rate limit
    fn respect_rate_limit(&self, response: &HttpResponse) {
        let remaining = response
            .header("ratelimit-remaining")
            .and_then(|v| v.trim().parse::<u64>().ok());
        if let Some(remaining) = remaining
            && remaining < Self::LOW_RATE_LIMIT_REMAINING
            && let Some(wait) = rate_limit_wait(response)
        {
            let wait = wait.min(self.max_rate_limit_wait);
            info!(
                "Rate limit nearly exhausted ({} left); pausing {:?}",
                remaining, wait
            );
            std::thread::sleep(wait);
        }
    }
}

/// Lazy, restartable sequence of burned assignment pages
///
/// A failed page does not advance the cursor: calling `next` again retries
/// the same page. [`AssignmentPages::page_token`] can be kept to resume the
/// walk later with [`AssignmentPages::resume`].
pub struct AssignmentPages<'a, T: HttpTransport> {
    client: &'a WaniKaniClient<T>,
    since: Watermark,
    cursor: Cursor,
}

enum Cursor {
    Start,
    Next(String),
    Done,
}

impl<'a, T: HttpTransport> AssignmentPages<'a, T> {
    fn new(client: &'a WaniKaniClient<T>, since: Watermark) -> Self {
        Self {
            client,
            since,
            cursor: Cursor::Start,
        }
    }

    /// Continue a walk from a saved page token
    pub fn resume(client: &'a WaniKaniClient<T>, since: Watermark, page_token: Option<String>) -> Self {
        let cursor = match page_token {
            Some(token) => Cursor::Next(token),
            None => Cursor::Start,
        };
        Self {
            client,
            since,
            cursor,
        }
    }

    /// Token of the page the next call to `next` will fetch
    pub fn page_token(&self) -> Option<&str> {
        match &self.cursor {
            Cursor::Next(url) => Some(url),
            _ => None,
        }
    }

    pub fn is_exhausted(&self) -> bool {
        matches!(self.cursor, Cursor::Done)
    }
}

impl<T: HttpTransport> Iterator for AssignmentPages<'_, T> {
    type Item = Result<AssignmentPage, SyncError>;

    fn next(&mut self) -> Option<Self::Item> {
        let token = match &self.cursor {
            Cursor::Done => return None,
            Cursor::Start => None,
            Cursor::Next(url) => Some(url.as_str()),
        };

        match self.client.list_burned_assignments(&self.since, token) {
            Ok(page) => {
                self.cursor = match &page.next_page {
                    Some(next_url) => Cursor::Next(next_url.clone()),
                    None => Cursor::Done,
                };
                Some(Ok(page))
            }
            Err(e) => Some(Err(e)),
        }
    }
}

/// How long the server wants us to wait, from rate limit headers
fn rate_limit_wait(response: &HttpResponse) -> Option<Duration> {
    if let Some(reset) = response
        .header("ratelimit-reset")
        .and_then(|v| v.trim().parse::<i64>().ok())
    {
        let now = chrono::Utc::now().timestamp();
        let secs = (reset - now).max(0) as u64 + 1;
        return Some(Duration::from_secs(secs));
    }
    response
        .header("retry-after")
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

fn join_ids(ids: &[SubjectId]) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::wanikani::transport::{MockTransport, TransportError};
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const BASE: &str = "https://api.test/v2";

    fn client(mock: MockTransport) -> WaniKaniClient<MockTransport> {
        WaniKaniClient::new(mock, "secret-token")
            .with_base_url(BASE)
            .with_retry(RetryPolicy::immediate(3))
    }

    fn assignment_json(id: u64, subject_id: u64, burned_at: &str) -> serde_json::Value {
        json!({
            "id": id,
            "object": "assignment",
            "data_updated_at": burned_at,
            "data": {
                "subject_id": subject_id,
                "subject_type": "kanji",
                "srs_stage": 9,
                "burned_at": burned_at
            }
        })
    }

    fn collection(data: Vec<serde_json::Value>, next_url: Option<&str>) -> serde_json::Value {
        json!({
            "object": "collection",
            "pages": { "next_url": next_url, "per_page": 500 },
            "total_count": data.len(),
            "data": data
        })
    }

    #[test]
    fn test_authenticate_sends_bearer_token() {
        let mock = MockTransport::new(|_| {
            Ok(HttpResponse::json(&json!({ "data": { "username": "koichi", "level": 12 } })))
        });
        let client = client(mock);

        let profile = client.authenticate().unwrap();
        assert_eq!(profile.username, "koichi");
        assert_eq!(profile.level, 12);

        let requests = client.transport().requests();
        assert_eq!(requests[0].url, "https://api.test/v2/user");
        assert_eq!(requests[0].authorization.as_deref(), Some("Bearer secret-token"));
    }

    #[test]
    fn test_authenticate_rejected_token() {
        let client = client(MockTransport::new(|_| Ok(HttpResponse::new(401, "{}"))));
        assert!(matches!(client.authenticate(), Err(SyncError::Auth(_))));
        // 401 is never retried
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[test]
    fn test_authenticate_without_token() {
        let mock = MockTransport::new(|_| Ok(HttpResponse::new(200, "{}")));
        let client = WaniKaniClient::new(mock, "  ");
        assert!(matches!(client.authenticate(), Err(SyncError::Auth(_))));
        assert!(client.transport().requests().is_empty());
    }

    #[test]
    fn test_retries_server_errors() {
        let calls = AtomicUsize::new(0);
        let mock = MockTransport::new(move |_| {
            if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                Ok(HttpResponse::new(503, "unavailable"))
            } else {
                Ok(HttpResponse::json(&json!({ "data": { "username": "u", "level": 1 } })))
            }
        });
        let client = client(mock);

        assert!(client.authenticate().is_ok());
        assert_eq!(client.transport().requests().len(), 3);
    }

    #[test]
    fn test_gives_up_after_max_attempts() {
        let mock = MockTransport::new(|_| Err(TransportError::Timeout("30s elapsed".into())));
        let client = client(mock);

        let err = client.authenticate().unwrap_err();
        assert!(matches!(err, SyncError::Network(_)));
        assert_eq!(client.transport().requests().len(), 3);
    }

    #[test]
    fn test_rate_limited_is_not_retried() {
        let mock = MockTransport::new(|_| {
            Ok(HttpResponse::new(429, "slow down").with_header("Retry-After", "7"))
        });
        let client = client(mock);

        match client.authenticate() {
            Err(SyncError::RateLimited { retry_after }) => {
                assert_eq!(retry_after, Some(Duration::from_secs(7)));
            }
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert_eq!(client.transport().requests().len(), 1);
    }

    #[test]
    fn test_burned_assignments_url_includes_watermark() {
        let mock = MockTransport::new(|_| Ok(HttpResponse::json(&collection(vec![], None))));
        let client = client(mock);
        let since = Watermark::parse("2024-01-01T00:00:00Z").unwrap();

        client.list_burned_assignments(&since, None).unwrap();
        client.list_burned_assignments(&Watermark::empty(), None).unwrap();

        let requests = client.transport().requests();
        assert!(requests[0].url.starts_with("https://api.test/v2/assignments?srs_stages=9"));
        assert!(requests[0].url.contains("updated_after=2024-01-01T00%3A00%3A00Z"));
        assert!(!requests[1].url.contains("updated_after"));
    }

    #[test]
    fn test_pages_follow_next_url() {
        let mock = MockTransport::new(|url| {
            if url.contains("page_after_id") {
                Ok(HttpResponse::json(&collection(
                    vec![assignment_json(2, 20, "2024-01-03T00:00:00Z")],
                    None,
                )))
            } else {
                Ok(HttpResponse::json(&collection(
                    vec![assignment_json(1, 10, "2024-01-02T00:00:00Z")],
                    Some("https://api.test/v2/assignments?srs_stages=9&page_after_id=1"),
                )))
            }
        });
        let client = client(mock);

        let pages: Vec<_> = client
            .burned_assignment_pages(Watermark::empty())
            .collect::<Result<_, _>>()
            .unwrap();

        assert_eq!(pages.len(), 2);
        assert_eq!(pages[0].assignments[0].subject_id, SubjectId(10));
        assert_eq!(pages[1].assignments[0].subject_id, SubjectId(20));
        assert!(pages[1].next_page.is_none());
    }

    #[test]
    fn test_pages_restart_after_failure() {
        let fail_second_page = AtomicUsize::new(1);
        let mock = MockTransport::new(move |url| {
            if url.contains("page_after_id") {
                if fail_second_page.fetch_sub(1, Ordering::SeqCst) > 0 {
                    return Ok(HttpResponse::new(400, "bad request"));
                }
                Ok(HttpResponse::json(&collection(
                    vec![assignment_json(2, 20, "2024-01-03T00:00:00Z")],
                    None,
                )))
            } else {
                Ok(HttpResponse::json(&collection(
                    vec![assignment_json(1, 10, "2024-01-02T00:00:00Z")],
                    Some("https://api.test/v2/assignments?srs_stages=9&page_after_id=1"),
                )))
            }
        });
        let client = client(mock);
        let mut pages = client.burned_assignment_pages(Watermark::empty());

        assert!(pages.next().unwrap().is_ok());
        assert!(matches!(pages.next(), Some(Err(SyncError::Api(_)))));
        let token = pages.page_token().map(str::to_string);
        assert!(token.as_deref().unwrap().contains("page_after_id=1"));

        // Resume from the saved token instead of starting over
        let mut resumed = AssignmentPages::resume(&client, Watermark::empty(), token);
        let page = resumed.next().unwrap().unwrap();
        assert_eq!(page.assignments[0].subject_id, SubjectId(20));
        assert!(resumed.next().is_none());
        assert!(resumed.is_exhausted());
    }

    #[test]
    fn test_get_subjects_batches_ids() {
        let mock = MockTransport::new(|_| Ok(HttpResponse::json(&collection(vec![], None))));
        let client = client(mock);
        let ids: Vec<SubjectId> = (1..=750).map(SubjectId).collect();

        let subjects = client.get_subjects(&ids).unwrap();
        assert!(subjects.is_empty());
        assert_eq!(client.transport().count_matching("/subjects?ids="), 2);
    }

    #[test]
    fn test_get_subjects_with_no_ids_makes_no_request() {
        let mock = MockTransport::new(|_| Ok(HttpResponse::json(&collection(vec![], None))));
        let client = client(mock);

        assert!(client.get_subjects(&[]).unwrap().is_empty());
        assert!(client.get_study_materials(&[]).unwrap().is_empty());
        assert!(client.transport().requests().is_empty());
    }

    #[test]
    fn test_download_audio_sends_no_credentials() {
        let mock = MockTransport::new(|_| Ok(HttpResponse::new(200, b"ID3audio".to_vec())));
        let client = client(mock);

        let bytes = client.download_audio("https://files.test/a.mp3").unwrap();
        assert_eq!(bytes, b"ID3audio");
        assert!(client.transport().requests()[0].authorization.is_none());
    }

    #[test]
    fn test_malformed_json_is_api_error() {
        let client = client(MockTransport::new(|_| Ok(HttpResponse::new(200, "not json"))));
        assert!(matches!(client.authenticate(), Err(SyncError::Api(_))));
        assert_eq!(client.transport().requests().len(), 1);
    }
}
