use std::future::Future;

use crate::error::AppError;

/// Fetches the raw body of a search results page.
pub trait Fetcher: Send + Sync + Clone + 'static {
    fn fetch(&self, url: &str) -> impl Future<Output = Result<String, AppError>> + Send;
}

/// Pulls the result count out of a response body.
///
/// `Ok(0)` means nothing matched; an `Err` means something matched but could
/// not be parsed. Callers treat both as "no count this attempt".
pub trait CountExtractor: Send + Sync + Clone + 'static {
    fn extract(&self, body: &str) -> Result<u64, AppError>;
}
