//! Sequential page accumulation for one join tuple.

use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{debug, warn};

use crate::api::SchoolApi;
use crate::error::Result;
use crate::models::{DetailItem, JoinTuple};

#[derive(Debug, Default)]
pub struct PageCounters {
    /// Every detail page request, successful or not.
    pub attempts: AtomicU64,
    /// Transient page failures (network, status, empty body).
    pub failures: AtomicU64,
    /// Tuples that ended with fewer items than `numFound` promised.
    pub short_results: AtomicU64,
}

impl PageCounters {
    pub fn new() -> Self {
        Default::default()
    }
}

/// `ceil(total / page_size)`.
pub fn page_count(total: u64, page_size: u64) -> u64 {
    if page_size == 0 {
        return 0;
    }
    total.div_ceil(page_size)
}

/// Fetches page 1, then pages `2..=pages` one after another.
///
/// A failed first page yields no items; a failed later page is skipped and
/// the remaining pages are still fetched. Only fatal errors are returned.
pub async fn fetch_all_pages<A: SchoolApi + ?Sized>(
    api: &A,
    tuple: &JoinTuple,
    page_size: u64,
    counters: &PageCounters,
) -> Result<Vec<DetailItem>> {
    counters.attempts.fetch_add(1, Ordering::Relaxed);
    let first = match api.detail_page(tuple, 1).await {
        Ok(page) => page,
        Err(e) if e.is_fatal() => return Err(e),
        Err(e) => {
            counters.failures.fetch_add(1, Ordering::Relaxed);
            debug!(%tuple, error = %e, "first detail page unavailable");
            return Ok(Vec::new());
        }
    };

    let num_found = first.num_found;
    let pages = page_count(num_found, page_size);
    let mut items = first.item;

    for page in 2..=pages {
        counters.attempts.fetch_add(1, Ordering::Relaxed);
        match api.detail_page(tuple, page).await {
            Ok(next) => items.extend(next.item),
            Err(e) if e.is_fatal() => return Err(e),
            Err(e) => {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                warn!(%tuple, page, pages, error = %e, "detail page skipped");
            }
        }
    }

    if (items.len() as u64) < num_found {
        counters.short_results.fetch_add(1, Ordering::Relaxed);
        debug!(%tuple, collected = items.len(), num_found, "fewer items than announced");
    }
    Ok(items)
}
