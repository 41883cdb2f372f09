//! Sequential offset pagination over a ticket table.
//!
//! Pages are requested one at a time: whether another page is requested
//! depends on the rows accumulated so far, and the remote API does not
//! guarantee stable cursors across concurrently issued pages.

use log::debug;
use snowgeo_core_common::{RawRecord, TableQuery, TableSource};

use crate::error::{QueryError, Result};

/// Cursor state of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingState {
    /// Offset of the next page.
    pub offset: usize,
    /// Requested page size.
    pub limit: usize,
    /// Rows accumulated so far.
    pub record_count: usize,
    /// Maximum rows to accumulate before stopping.
    pub cap: usize,
}

impl PagingState {
    /// Starts at offset zero. A zero page size is treated as one.
    #[must_use]
    pub fn new(limit: usize, cap: usize) -> Self {
        Self {
            offset: 0,
            limit: limit.max(1),
            record_count: 0,
            cap,
        }
    }

    /// Records a non-empty page and returns `true` if another page should be requested.
    ///
    /// The cap is compared with the count including this page, before the
    /// next request is issued, so the total can overshoot the cap by at most
    /// one page.
    pub fn advance(&mut self, page_len: usize) -> bool {
        self.record_count += page_len;
        if self.record_count < self.cap && page_len == self.limit {
            self.offset += page_len;
            true
        } else {
            false
        }
    }
}

/// All rows fetched for a request, in server order.
#[derive(Debug, Clone, Default)]
pub struct FetchResult {
    /// Raw rows.
    pub records: Vec<RawRecord>,
    /// Number of page requests issued.
    pub pages: usize,
}

/// Pages through a table with a fixed field list.
pub struct PaginatedFetcher<'a, S: ?Sized> {
    source: &'a S,
    page_size: usize,
    cap: usize,
}

impl<'a, S> PaginatedFetcher<'a, S>
where
    S: TableSource + ?Sized,
{
    /// Creates a fetcher with the given page size and record cap.
    #[must_use]
    pub fn new(source: &'a S, page_size: usize, cap: usize) -> Self {
        Self {
            source,
            page_size,
            cap,
        }
    }

    /// Fetches pages until a short or empty page, or until the cap is reached.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError`] on the first failed page; rows fetched before
    /// the failure are discarded.
    pub async fn fetch_all(&self, table: &str, fields: &[String]) -> Result<FetchResult> {
        let mut state = PagingState::new(self.page_size, self.cap);
        let mut result = FetchResult::default();

        loop {
            let query = TableQuery {
                table: table.to_string(),
                fields: fields.to_vec(),
                limit: state.limit,
                offset: state.offset,
            };
            debug!(
                "Querying {table} offset={} limit={}",
                query.offset, query.limit
            );
            let page = self
                .source
                .query_table(&query)
                .await
                .map_err(|source| QueryError {
                    table: table.to_string(),
                    offset: state.offset,
                    source,
                })?;
            result.pages += 1;

            if page.is_empty() {
                break;
            }
            let page_len = page.len();
            result.records.extend(page);
            if !state.advance(page_len) {
                break;
            }
        }

        debug!(
            "Fetched {} row(s) from {table} in {} page(s)",
            result.records.len(),
            result.pages
        );
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::json;
    use snowgeo_core_common::{DictionaryQuery, SourceError};
    use std::sync::Mutex;

    /// Serves `total` rows and records every requested offset.
    struct Rows {
        total: usize,
        fail_at: Option<usize>,
        offsets: Mutex<Vec<usize>>,
    }

    impl Rows {
        fn new(total: usize) -> Self {
            Self {
                total,
                fail_at: None,
                offsets: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl TableSource for Rows {
        async fn query_dictionary(
            &self,
            _query: &DictionaryQuery,
        ) -> std::result::Result<Vec<RawRecord>, SourceError> {
            Ok(Vec::new())
        }

        async fn query_table(
            &self,
            query: &TableQuery,
        ) -> std::result::Result<Vec<RawRecord>, SourceError> {
            self.offsets.lock().unwrap().push(query.offset);
            if self.fail_at == Some(query.offset) {
                return Err(SourceError::Remote {
                    message: "Transaction cancelled".to_string(),
                    detail: None,
                });
            }
            let end = (query.offset + query.limit).min(self.total);
            Ok((query.offset..end)
                .map(|i| json!({"sys_id": format!("id{i}")}).as_object().unwrap().clone())
                .collect())
        }
    }

    #[test]
    fn test_paging_state_advance() {
        let mut state = PagingState::new(100, 250);
        assert!(state.advance(100));
        assert_eq!(state.offset, 100);
        assert!(state.advance(100));
        assert!(!state.advance(100));
        assert_eq!(state.record_count, 300);

        let mut short = PagingState::new(100, 1000);
        assert!(!short.advance(40));
        assert_eq!(short.offset, 0);
    }

    #[test]
    fn test_zero_page_size() {
        assert_eq!(PagingState::new(0, 10).limit, 1);
    }

    #[tokio::test]
    async fn test_cap_overshoots_by_one_page() {
        let source = Rows::new(301);
        let fetcher = PaginatedFetcher::new(&source, 100, 250);
        let result = fetcher.fetch_all("incident", &[]).await.unwrap();
        assert_eq!(result.records.len(), 300);
        assert_eq!(result.pages, 3);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 100, 200]);
    }

    #[tokio::test]
    async fn test_short_page_stops() {
        let source = Rows::new(150);
        let fetcher = PaginatedFetcher::new(&source, 100, 10_000);
        let result = fetcher.fetch_all("incident", &[]).await.unwrap();
        assert_eq!(result.records.len(), 150);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 100]);
        assert_eq!(result.records[149]["sys_id"], "id149");
    }

    #[tokio::test]
    async fn test_exact_multiple_ends_with_empty_page() {
        let source = Rows::new(200);
        let fetcher = PaginatedFetcher::new(&source, 100, 10_000);
        let result = fetcher.fetch_all("incident", &[]).await.unwrap();
        assert_eq!(result.records.len(), 200);
        assert_eq!(result.pages, 3);
    }

    #[tokio::test]
    async fn test_empty_table() {
        let source = Rows::new(0);
        let fetcher = PaginatedFetcher::new(&source, 100, 10_000);
        let result = fetcher.fetch_all("incident", &[]).await.unwrap();
        assert!(result.records.is_empty());
        assert_eq!(result.pages, 1);
    }

    #[tokio::test]
    async fn test_failure_discards_rows() {
        let mut source = Rows::new(500);
        source.fail_at = Some(200);
        let fetcher = PaginatedFetcher::new(&source, 100, 10_000);
        let err = fetcher.fetch_all("incident", &[]).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "Failed to query table 'incident' at offset 200: Transaction cancelled"
        );
    }
}
