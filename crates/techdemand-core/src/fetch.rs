use std::fmt;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use url::form_urlencoded;

use crate::error::AppError;
use crate::pacing::Pacer;
use crate::task::{Task, TaskFailure, TaskStatus};
use crate::traits::{CountExtractor, Fetcher};

const SEARCH_PLACEHOLDER: &str = "{search}";
const CITY_PLACEHOLDER: &str = "{city}";

/// Query URL with `{search}` and `{city}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlTemplate(String);

impl UrlTemplate {
    pub fn parse(template: &str) -> Result<Self, AppError> {
        if !template.contains(SEARCH_PLACEHOLDER) || !template.contains(CITY_PLACEHOLDER) {
            return Err(AppError::ConfigError(format!(
                "URL template must contain {{search}} and {{city}} placeholders: {template}"
            )));
        }
        if !(template.starts_with("http://") || template.starts_with("https://")) {
            return Err(AppError::ConfigError(format!(
                "URL template must be an http(s) URL: {template}"
            )));
        }
        Ok(Self(template.to_string()))
    }

    /// Substitute the URL-encoded search term and the city code.
    pub fn render(&self, search_term: &str, city_code: u32) -> String {
        let search: String = form_urlencoded::byte_serialize(search_term.as_bytes()).collect();
        self.0
            .replace(SEARCH_PLACEHOLDER, &search)
            .replace(CITY_PLACEHOLDER, &city_code.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for UrlTemplate {
    fn default() -> Self {
        Self("https://hh.ru/search/vacancy?text={search}&area={city}".to_string())
    }
}

impl fmt::Display for UrlTemplate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Result of a single fetch-and-extract attempt.
#[derive(Debug)]
pub enum AttemptOutcome {
    /// A strictly positive count.
    Resolved(u64),
    /// The endpoint answered but no positive count was extracted.
    Empty,
    /// Transient fetch failure; another attempt may succeed.
    Retryable(AppError),
    /// Fetch failure that another attempt will not fix.
    Fatal(AppError),
}

/// Resolves the count of one task: fetch → extract, repeated until a
/// positive count is found or attempts run out.
///
/// Generic over the fetcher and extractor so tests can run without HTTP.
#[derive(Clone)]
pub struct CountService<F, E>
where
    F: Fetcher,
    E: CountExtractor,
{
    fetcher: F,
    extractor: E,
    template: UrlTemplate,
    max_attempts: u32,
    attempt_interval: Option<Duration>,
}

impl<F, E> CountService<F, E>
where
    F: Fetcher,
    E: CountExtractor,
{
    pub fn new(fetcher: F, extractor: E, template: UrlTemplate, max_attempts: u32) -> Self {
        Self {
            fetcher,
            extractor,
            template,
            max_attempts,
            attempt_interval: None,
        }
    }

    /// Keep successive attempts of one task at least `interval` apart.
    pub fn with_attempt_interval(mut self, interval: Duration) -> Self {
        self.attempt_interval = Some(interval);
        self
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Run one attempt for the task without touching its state.
    pub async fn attempt(&self, task: &Task) -> AttemptOutcome {
        let url = self.template.render(&task.search_term, task.city_code);
        tracing::debug!(%url, attempt = task.attempts, "Fetching search page");

        let body = match self.fetcher.fetch(&url).await {
            Ok(body) => body,
            Err(e) if e.is_retryable() => return AttemptOutcome::Retryable(e),
            Err(e) => return AttemptOutcome::Fatal(e),
        };

        match self.extractor.extract(&body) {
            Ok(0) => AttemptOutcome::Empty,
            Ok(count) => AttemptOutcome::Resolved(count),
            Err(e) => {
                tracing::debug!(
                    technology = %task.technology_name,
                    city = task.city_code,
                    error = %e,
                    "Count not extracted"
                );
                AttemptOutcome::Empty
            }
        }
    }

    /// Attempt the task until it resolves, fails fatally, runs out of
    /// attempts, or `cancel` fires. A cancelled task stays `Pending`.
    pub async fn resolve(&self, task: &mut Task, cancel: &CancellationToken) -> TaskStatus {
        let pacer = self.attempt_interval.map(Pacer::new);

        while task.can_retry(self.max_attempts) {
            if cancel.is_cancelled() {
                return task.status;
            }
            if let Some(pacer) = &pacer {
                pacer.wait().await;
            }
            task.attempts += 1;

            match self.attempt(task).await {
                AttemptOutcome::Resolved(count) => {
                    task.record_count(count);
                    return task.status;
                }
                AttemptOutcome::Empty => {
                    task.failure = None;
                }
                AttemptOutcome::Retryable(e) => {
                    tracing::warn!(
                        technology = %task.technology_name,
                        city = task.city_code,
                        attempt = task.attempts,
                        error = %e,
                        "Fetch failed, will retry if attempts remain"
                    );
                    task.failure = Some(failure_from(&e));
                }
                AttemptOutcome::Fatal(e) => {
                    task.failure = Some(failure_from(&e));
                    task.status = TaskStatus::Failed;
                    return task.status;
                }
            }
        }

        if task.status == TaskStatus::Pending {
            task.status = if task.failure.is_some() {
                TaskStatus::Failed
            } else {
                TaskStatus::Exhausted
            };
        }
        task.status
    }
}

fn failure_from(error: &AppError) -> TaskFailure {
    TaskFailure {
        kind: error.failure_kind(),
        message: error.to_string(),
    }
}
