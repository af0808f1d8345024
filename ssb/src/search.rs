//! Flattening of the table search hit list.

use chrono::{DateTime, NaiveDate};
use ssb_api::models::{SearchEntry, TableHit, TableSearchResponse};

use crate::error::{Result, StatbankError};
use crate::model::{SearchHit, TableId};

/// Largest page size the search endpoint accepts.
pub const MAX_PAGE_SIZE: u32 = 10_000;

/// Validate the caller's query before anything goes on the wire.
pub(crate) fn validate_query(query: &str, page_size: Option<u32>) -> Result<String> {
    let query = query.trim();
    if query.is_empty() {
        return Err(StatbankError::invalid_argument("search query must not be empty"));
    }
    if let Some(size) = page_size
        && !(1..=MAX_PAGE_SIZE).contains(&size)
    {
        return Err(StatbankError::invalid_argument(format!(
            "pageSize must be between 1 and {MAX_PAGE_SIZE}, got {size}"
        )));
    }
    Ok(query.to_string())
}

/// Turn the upstream hit list into [`SearchHit`]s, keeping upstream order.
///
/// Entries without a usable identifier are skipped and logged; the rest of
/// the page is still returned.
pub(crate) fn flatten_hits(response: TableSearchResponse) -> Vec<SearchHit> {
    let total = response.tables.len();
    let hits: Vec<SearchHit> = response
        .tables
        .into_iter()
        .enumerate()
        .filter_map(|(position, entry)| match entry {
            SearchEntry::Hit(hit) => to_search_hit(position, hit),
            SearchEntry::Malformed(value) => {
                tracing::warn!(position, entry = %value, "skipping malformed search result");
                None
            }
        })
        .collect();

    if hits.len() < total {
        tracing::debug!(kept = hits.len(), total, "search results were skipped");
    }
    hits
}

fn to_search_hit(position: usize, hit: TableHit) -> Option<SearchHit> {
    let id = match hit.id.as_deref().map(TableId::new) {
        Some(Ok(id)) => id,
        Some(Err(err)) => {
            tracing::warn!(position, error = %err, "skipping search result with unusable id");
            return None;
        }
        None => {
            tracing::warn!(position, label = ?hit.label, "skipping search result without id");
            return None;
        }
    };

    Some(SearchHit {
        last_updated: hit.updated.as_deref().and_then(parse_updated),
        id,
        title: hit.label.unwrap_or_default(),
        description: hit.description.unwrap_or_default(),
        first_period: hit.first_period,
        last_period: hit.last_period,
    })
}

/// Accepts RFC 3339 timestamps and plain ISO dates.
fn parse_updated(raw: &str) -> Option<NaiveDate> {
    DateTime::parse_from_rfc3339(raw)
        .map(|timestamp| timestamp.date_naive())
        .or_else(|_| NaiveDate::parse_from_str(raw, "%Y-%m-%d"))
        .map_err(|err| tracing::debug!(raw, error = %err, "unparseable update timestamp"))
        .ok()
}
