//! Count extraction from search result pages.
//!
//! The search page embeds its result counter in a script blob that is not
//! valid standalone JSON, so the counter object is located by scanning text
//! rather than by parsing the document:
//!
//! ```text
//! ..."searchCounts":{"isLoad":false,"value":306,"other":{...}}...
//!                   ^ start = marker + 15       ^ balance back to 0
//! ```
//!
//! Within that span the literal between `"value":` and the next comma is
//! parsed as the count.

use crate::error::AppError;
use crate::traits::CountExtractor;

/// Marker preceding the embedded counter object.
pub const SEARCH_COUNTS_MARKER: &str = "searchCounts";

/// Distance from the start of the marker to the first byte inside the object
/// (skips `searchCounts":{`).
pub const SEARCH_COUNTS_OFFSET: usize = 15;

/// Key whose value holds the count.
pub const VALUE_KEY: &str = "\"value\":";

/// Extractor for the `searchCounts` object of a search results page.
#[derive(Debug, Clone, Default)]
pub struct SearchCountsExtractor;

impl SearchCountsExtractor {
    pub fn new() -> Self {
        Self
    }
}

impl CountExtractor for SearchCountsExtractor {
    fn extract(&self, body: &str) -> Result<u64, AppError> {
        match embedded_object(body.as_bytes()) {
            Some(object) => parse_value(object),
            None => {
                tracing::debug!(bytes = body.len(), "No searchCounts object in response");
                Ok(0)
            }
        }
    }
}

/// Locate the marker and return the bytes of the object that follows it,
/// up to (not including) the brace that closes it.
///
/// Returns `None` if the marker is absent or the object never closes.
fn embedded_object(content: &[u8]) -> Option<&[u8]> {
    let marker = find(content, SEARCH_COUNTS_MARKER.as_bytes())?;
    let start = marker + SEARCH_COUNTS_OFFSET;
    if start > content.len() {
        return None;
    }

    let mut balance: u32 = 1;
    for (end, byte) in content.iter().enumerate().skip(start) {
        match byte {
            b'{' => balance += 1,
            b'}' => balance -= 1,
            _ => {}
        }
        if balance == 0 {
            return Some(&content[start..end]);
        }
    }
    None
}

/// Parse the literal between `"value":` and the next comma.
fn parse_value(object: &[u8]) -> Result<u64, AppError> {
    let literal = find(object, VALUE_KEY.as_bytes())
        .map(|key| key + VALUE_KEY.len())
        .and_then(|start| {
            let rest = &object[start..];
            rest.iter().position(|&b| b == b',').map(|comma| &rest[..comma])
        })
        .unwrap_or_default();

    let literal = String::from_utf8_lossy(literal);
    literal
        .parse::<u64>()
        .map_err(|_| AppError::NotANumber(literal.into_owned()))
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack.windows(needle.len()).position(|w| w == needle)
}
