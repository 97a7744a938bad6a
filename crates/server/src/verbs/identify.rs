//! Identify.

use crate::dispatch::Dispatcher;
use crate::error::ApiResult;
use crate::response::{IdentifyBody, ResponseBody};
use harvest_core::datestamp::{EPOCH_DATESTAMP, REPOSITORY_GRANULARITY};
use harvest_core::{PROTOCOL_VERSION, format_datestamp};

pub async fn handle(dispatcher: &Dispatcher) -> ApiResult<ResponseBody> {
    let repository = &dispatcher.config.repository;
    let earliest_datestamp = dispatcher
        .metadata
        .earliest_datestamp()
        .await?
        .map(format_datestamp)
        .unwrap_or_else(|| EPOCH_DATESTAMP.to_string());

    Ok(ResponseBody::Identify(IdentifyBody {
        repository_name: repository.name.clone(),
        protocol_version: PROTOCOL_VERSION,
        admin_emails: repository.admin_emails.clone(),
        earliest_datestamp,
        deleted_record: repository.deleted_records,
        granularity: REPOSITORY_GRANULARITY,
    }))
}
