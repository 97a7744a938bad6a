//! Per-verb request handlers.
//!
//! Each handler receives a request whose argument shape is already valid,
//! performs its lookups through the [`Dispatcher`](crate::dispatch::Dispatcher)
//! and returns the response body, or None after raising protocol errors.

pub mod get_record;
pub mod identify;
pub mod list_metadata_formats;
pub mod list_records;
pub mod list_sets;

use crate::response::{RecordBody, RecordHeader};
use harvest_metadata::models::RecordRow;

/// Header of a stored record.
pub(crate) fn record_header(record: &RecordRow, set_specs: Vec<String>) -> RecordHeader {
    RecordHeader {
        identifier: record.identifier.clone(),
        datestamp: record.datestamp,
        deleted: record.is_deleted(),
        set_specs,
    }
}

/// Header and metadata of a stored record.
pub(crate) fn record_body(record: RecordRow, set_specs: Vec<String>) -> RecordBody {
    RecordBody {
        header: record_header(&record, set_specs),
        metadata: record.content,
    }
}
