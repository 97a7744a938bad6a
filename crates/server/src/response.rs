//! Structured protocol responses, independent of their XML form.

use crate::arguments::Arguments;
use harvest_core::{DeletedRecords, ErrorCode};
use harvest_metadata::models::{FormatRow, SetRow};
use time::OffsetDateTime;

/// A complete protocol response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OaiResponse {
    pub response_date: OffsetDateTime,
    pub base_url: String,
    /// Arguments echoed in the request element; None when they were rejected.
    pub arguments: Option<Arguments>,
    pub body: ResponseBody,
}

/// The verb-specific part of a response, or the errors replacing it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResponseBody {
    Errors(Vec<ErrorCode>),
    Identify(IdentifyBody),
    GetRecord(RecordBody),
    ListIdentifiers(ListBody<RecordHeader>),
    ListRecords(ListBody<RecordBody>),
    ListMetadataFormats(Vec<FormatRow>),
    ListSets(ListBody<SetRow>),
}

/// Repository description returned by Identify.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifyBody {
    pub repository_name: String,
    pub protocol_version: &'static str,
    pub admin_emails: Vec<String>,
    pub earliest_datestamp: String,
    pub deleted_record: DeletedRecords,
    pub granularity: &'static str,
}

/// Record header.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordHeader {
    pub identifier: String,
    pub datestamp: OffsetDateTime,
    pub deleted: bool,
    pub set_specs: Vec<String>,
}

/// Record header plus its metadata; deleted records carry no metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordBody {
    pub header: RecordHeader,
    pub metadata: Option<String>,
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListBody<T> {
    pub items: Vec<T>,
    pub resumption_token: Option<ResumptionTokenElement>,
}

/// The `resumptionToken` element closing a list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumptionTokenElement {
    /// Token value; None on the last page of a resumed list.
    pub value: Option<String>,
    pub complete_list_size: u64,
    pub cursor: u64,
    pub expiration_date: Option<OffsetDateTime>,
}

impl ResumptionTokenElement {
    /// Element announcing another page.
    pub fn issued(
        value: String,
        expiration_date: OffsetDateTime,
        complete_list_size: u64,
        cursor: u64,
    ) -> Self {
        Self {
            value: Some(value),
            complete_list_size,
            cursor,
            expiration_date: Some(expiration_date),
        }
    }

    /// Empty element closing a resumed list.
    pub fn terminal(complete_list_size: u64, cursor: u64) -> Self {
        Self {
            value: None,
            complete_list_size,
            cursor,
            expiration_date: None,
        }
    }
}
