pub mod aggregate;
pub mod config;
pub mod error;
pub mod executor;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod pacing;
pub mod report;
pub mod task;
pub mod traits;

#[cfg(test)]
pub(crate) mod testutil;

pub use aggregate::build_report;
pub use config::{AppConfig, RunConfig};
pub use error::AppError;
pub use executor::{CompletedRun, Executor, RunReporter, TracingRunReporter};
pub use extract::SearchCountsExtractor;
pub use report::Report;
pub use task::{Task, build_tasks};
pub use traits::{CountExtractor, Fetcher};
