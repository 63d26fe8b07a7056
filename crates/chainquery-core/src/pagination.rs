//! Cursor pagination engine.
//!
//! Turns a [`Pageable`] filter plus [`PageOptions`] into one
//! filter+sort+skip/limit request and wraps the result in a [`Page`] envelope.
//!
//! Two modes share the same request:
//! - page-number mode: skip `(pageNumber - 1) * pageSize`
//! - offset mode: an `offset` boundary on the sort field adds `> offset`
//!   (ascending) or `< offset` (descending), so deep pages don't pay for
//!   skipping everything before them.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::config::PageSizeBounds;
use crate::error::QueryError;
use crate::query::{Condition, FieldPath, FindQuery, Projection, Sort, SortDirection, SortField};
use crate::sanitize;
use crate::store::DocumentStore;
use crate::types::{Document, EntityKind, StorageId};

// ─── Options ──────────────────────────────────────────────────────────────────

/// Caller-supplied paging parameters.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PageOptions {
    pub sort_field: SortField,
    pub sort_direction: SortDirection,
    /// Requested size; clamped by [`PageSizeBounds::effective`].
    pub page_size: Option<u64>,
    /// 1-based. Zero is read as 1.
    pub page_number: u64,
    /// Boundary value on the sort field for offset mode.
    pub offset: Option<u64>,
}

impl Default for PageOptions {
    fn default() -> Self {
        Self {
            sort_field: SortField::Id,
            sort_direction: SortDirection::Ascending,
            page_size: None,
            page_number: 1,
            offset: None,
        }
    }
}

impl PageOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn page(mut self, page_number: u64, page_size: u64) -> Self {
        self.page_number = page_number;
        self.page_size = Some(page_size);
        self
    }

    pub fn sorted_by(mut self, field: SortField, direction: SortDirection) -> Self {
        self.sort_field = field;
        self.sort_direction = direction;
        self
    }

    pub fn offset(mut self, boundary: u64) -> Self {
        self.offset = Some(boundary);
        self
    }

    pub fn sort(&self) -> Sort {
        Sort::new(self.sort_field.clone(), self.sort_direction)
    }

    fn page_number(&self) -> u64 {
        self.page_number.max(1)
    }

    /// The offset-mode boundary condition, if an offset was given.
    pub fn offset_condition(&self) -> Option<Condition> {
        let boundary = self.offset?;
        Some(match (&self.sort_field, self.sort_direction) {
            (SortField::Id, SortDirection::Ascending) => Condition::IdGt(StorageId(boundary)),
            (SortField::Id, SortDirection::Descending) => Condition::IdLt(StorageId(boundary)),
            (SortField::Path(path), SortDirection::Ascending) => {
                Condition::Gt(path.clone(), Value::from(boundary))
            }
            (SortField::Path(path), SortDirection::Descending) => {
                Condition::Lt(path.clone(), Value::from(boundary))
            }
        })
    }
}

// ─── Envelope ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub total_entries: u64,
    pub page_number: u64,
    pub page_size: u64,
    pub total_pages: u64,
}

impl Pagination {
    /// `page_size` must be non-zero (guaranteed by [`PageSizeBounds::validate`]).
    pub fn new(total_entries: u64, page_number: u64, page_size: u64) -> Self {
        Self {
            total_entries,
            page_number,
            page_size,
            total_pages: total_entries.div_ceil(page_size),
        }
    }
}

/// The `{data, pagination}` envelope returned by every paged operation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page<T = Document> {
    pub data: Vec<T>,
    pub pagination: Pagination,
}

impl<T> Page<T> {
    pub fn empty(page_number: u64, page_size: u64) -> Self {
        Self {
            data: Vec::new(),
            pagination: Pagination::new(0, page_number, page_size),
        }
    }
}

// ─── Pageable ─────────────────────────────────────────────────────────────────

/// A filter that can be run through the pagination engine.
///
/// Implemented by the entity builders in [`crate::builders`].
pub trait Pageable: Send + Sync {
    fn kind(&self) -> EntityKind;

    fn collection(&self) -> &'static str;

    /// Entity predicates, ANDed with the offset boundary by the engine.
    fn conditions(&self) -> Vec<Condition>;

    /// Fields never returned to callers.
    fn stripped_fields(&self) -> Vec<FieldPath> {
        Vec::new()
    }
}

/// Run one paged query and build the envelope.
pub async fn query_page<P: Pageable + ?Sized>(
    store: &dyn DocumentStore,
    filter: &P,
    options: &PageOptions,
    bounds: &PageSizeBounds,
) -> Result<Page, QueryError> {
    let page_size = bounds.effective(options.page_size);
    let page_number = options.page_number();

    let mut conditions: Vec<Condition> = options.offset_condition().into_iter().collect();
    conditions.extend(filter.conditions());

    let stripped = filter.stripped_fields();
    let query = FindQuery {
        filter: conditions,
        sort: Some(options.sort()),
        skip: (page_number - 1).saturating_mul(page_size),
        limit: Some(page_size),
        projection: Projection::excluding(stripped.iter().cloned()),
    };

    let collection = filter.collection();
    let (total_entries, rows) = store.find_with_count(collection, &query).await?;
    debug!(
        collection,
        total_entries,
        returned = rows.len(),
        page_number,
        page_size,
        "paged query"
    );

    if total_entries == 0 {
        return Ok(Page::empty(page_number, page_size));
    }

    let data = rows
        .into_iter()
        .map(|row| sanitize::to_listing(filter.kind(), row, &stripped))
        .collect();
    Ok(Page {
        data,
        pagination: Pagination::new(total_entries, page_number, page_size),
    })
}
