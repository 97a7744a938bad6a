//! GetRecord.

use super::record_body;
use crate::accumulator::ProtocolErrors;
use crate::dispatch::Dispatcher;
use crate::error::ApiResult;
use crate::response::ResponseBody;
use harvest_core::ErrorCode;

pub async fn handle(
    dispatcher: &Dispatcher,
    identifier: &str,
    metadata_prefix: &str,
    errors: &mut ProtocolErrors,
) -> ApiResult<Option<ResponseBody>> {
    dispatcher
        .validator()
        .check_format(metadata_prefix, errors)
        .await?;
    if errors.has_errors() {
        return Ok(None);
    }

    let metadata = &dispatcher.metadata;
    let Some(record) = metadata.get_record(identifier, metadata_prefix).await? else {
        // The item exists, just not in this format
        let code = if metadata.identifier_exists(identifier).await? {
            ErrorCode::CannotDisseminateFormat
        } else {
            ErrorCode::IdDoesNotExist
        };
        errors.with_error(code);
        return Ok(None);
    };

    let set_specs = metadata
        .get_record_sets(identifier, metadata_prefix)
        .await?;
    Ok(Some(ResponseBody::GetRecord(record_body(record, set_specs))))
}
