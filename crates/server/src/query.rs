//! Paged queries over records and sets.

use crate::arguments::ListFilter;
use crate::error::ApiResult;
use harvest_metadata::MetadataStore;
use harvest_metadata::models::{RecordRow, SetRow};
use std::sync::Arc;

/// One page of a list together with the size of the whole list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page<T> {
    pub items: Vec<T>,
    /// Number of matching rows across all pages.
    pub total: u64,
    /// Offset of the first item in the whole list.
    pub cursor: u64,
}

impl<T> Page<T> {
    /// Whether rows remain after this page.
    pub fn has_more(&self) -> bool {
        self.total > self.cursor + self.items.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

/// A record with the specs of the sets it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordEntry {
    pub record: RecordRow,
    pub set_specs: Vec<String>,
}

/// Runs filtered, paged queries with a fixed page size.
///
/// Records are ordered by identifier so a page index addresses the same
/// rows on every call while the data is unchanged.
#[derive(Clone)]
pub struct RecordQueryEngine {
    metadata: Arc<dyn MetadataStore>,
    page_size: u64,
}

impl RecordQueryEngine {
    pub fn new(metadata: Arc<dyn MetadataStore>, page_size: u64) -> Self {
        Self {
            metadata,
            page_size: page_size.max(1),
        }
    }

    /// Offset of the first row of page `counter`.
    pub fn cursor(&self, counter: u64) -> u64 {
        counter.saturating_mul(self.page_size)
    }

    /// Fetch page `counter` of the records matching `filter`, with their sets.
    pub async fn query_records(
        &self,
        filter: &ListFilter,
        counter: u64,
    ) -> ApiResult<Page<RecordEntry>> {
        let records = filter.record_filter();
        let cursor = self.cursor(counter);

        let rows = self
            .metadata
            .query_records_page(&records, cursor, self.page_size)
            .await?;
        let total = self.metadata.count_records(&records).await?;

        let identifiers: Vec<String> = rows.iter().map(|row| row.identifier.clone()).collect();
        let mut memberships = self
            .metadata
            .get_sets_for_records(&records.metadata_prefix, &identifiers)
            .await?;

        let items = rows
            .into_iter()
            .map(|record| {
                let set_specs = memberships.remove(&record.identifier).unwrap_or_default();
                RecordEntry { record, set_specs }
            })
            .collect();

        Ok(Page {
            items,
            total,
            cursor,
        })
    }

    /// Fetch page `counter` of all sets, ordered by spec.
    pub async fn query_sets(&self, counter: u64) -> ApiResult<Page<SetRow>> {
        let cursor = self.cursor(counter);
        let items = self.metadata.list_sets_page(cursor, self.page_size).await?;
        let total = self.metadata.count_sets().await?;
        Ok(Page {
            items,
            total,
            cursor,
        })
    }
}
