//! Test utilities: mock fetcher, recording reporter and fixture builders.
//!
//! Handwritten mocks for dependency injection in unit tests.
//! All mocks use `Arc<Mutex<_>>` for interior mutability, allowing
//! test assertions on recorded calls.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::{CityConfig, TechnologyConfig};
use crate::error::AppError;
use crate::executor::{RunEvent, RunReporter};
use crate::traits::Fetcher;

// ---------------------------------------------------------------------------
// MockFetcher
// ---------------------------------------------------------------------------

type Responses = VecDeque<Result<String, AppError>>;

/// Mock fetcher with scripted responses.
///
/// Responses scripted for a specific URL are served first, then the shared
/// queue, then the fallback body. Every call is recorded, and the number of
/// calls in flight at once is tracked.
#[derive(Clone)]
pub struct MockFetcher {
    routes: Arc<Mutex<HashMap<String, Responses>>>,
    responses: Arc<Mutex<Responses>>,
    fallback: Arc<String>,
    delay: Duration,
    calls: Arc<Mutex<Vec<String>>>,
    in_flight: Arc<AtomicUsize>,
    max_in_flight: Arc<AtomicUsize>,
}

impl MockFetcher {
    /// Returns `body` for every call that has nothing scripted.
    pub fn always(body: &str) -> Self {
        Self {
            routes: Arc::new(Mutex::new(HashMap::new())),
            responses: Arc::new(Mutex::new(VecDeque::new())),
            fallback: Arc::new(body.to_string()),
            delay: Duration::ZERO,
            calls: Arc::new(Mutex::new(Vec::new())),
            in_flight: Arc::new(AtomicUsize::new(0)),
            max_in_flight: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Serves `responses` in order, then empty pages.
    pub fn with_responses(responses: Vec<Result<String, AppError>>) -> Self {
        let fetcher = Self::always("<html></html>");
        fetcher.responses.lock().unwrap().extend(responses);
        fetcher
    }

    /// Script responses for one URL.
    pub fn route(self, url: &str, responses: Vec<Result<String, AppError>>) -> Self {
        self.routes
            .lock()
            .unwrap()
            .insert(url.to_string(), responses.into());
        self
    }

    /// Hold each call for `delay` so calls overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// Highest number of calls observed in flight at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    fn next_response(&self, url: &str) -> Result<String, AppError> {
        if let Some(queue) = self.routes.lock().unwrap().get_mut(url) {
            if let Some(response) = queue.pop_front() {
                return response;
            }
        }
        if let Some(response) = self.responses.lock().unwrap().pop_front() {
            return response;
        }
        Ok(self.fallback.as_ref().clone())
    }
}

impl Fetcher for MockFetcher {
    async fn fetch(&self, url: &str) -> Result<String, AppError> {
        self.calls.lock().unwrap().push(url.to_string());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = self.next_response(url);

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        response
    }
}

// ---------------------------------------------------------------------------
// MockReporter
// ---------------------------------------------------------------------------

/// Mock run reporter that records event labels.
#[derive(Default)]
pub struct MockReporter {
    pub events: Arc<Mutex<Vec<String>>>,
}

impl MockReporter {
    pub fn new() -> Self {
        Self::default()
    }
}

impl RunReporter for MockReporter {
    fn report(&self, event: RunEvent<'_>) {
        let label = match &event {
            RunEvent::Started { .. } => "Started",
            RunEvent::TaskAdmitted { .. } => "TaskAdmitted",
            RunEvent::TaskResolved { .. } => "TaskResolved",
            RunEvent::TaskExhausted { .. } => "TaskExhausted",
            RunEvent::TaskFailed { .. } => "TaskFailed",
            RunEvent::Cancelled { .. } => "Cancelled",
            RunEvent::Finished { .. } => "Finished",
        };
        self.events.lock().unwrap().push(label.to_string());
    }
}

// ---------------------------------------------------------------------------
// Test helpers
// ---------------------------------------------------------------------------

/// A search page embedding `count` the way the real endpoint does.
pub fn counts_body(count: u64) -> String {
    format!(
        r#"<html><body><script>window.__INITIAL_STATE__={{"vacancySearchResult":{{"searchCounts":{{"isLoad":false,"value":{count},"nested":{{"a":1}}}},"items":[]}}}};</script></body></html>"#
    )
}

pub fn city(name: &str, code: u32) -> CityConfig {
    CityConfig {
        name: name.to_string(),
        code,
        enabled: true,
    }
}

pub fn technology(name: &str, search: &str) -> TechnologyConfig {
    TechnologyConfig {
        name: name.to_string(),
        search: search.to_string(),
        category: String::new(),
        enabled: true,
    }
}
