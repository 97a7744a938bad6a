//! ListMetadataFormats.

use crate::accumulator::ProtocolErrors;
use crate::dispatch::Dispatcher;
use crate::error::ApiResult;
use crate::response::ResponseBody;
use harvest_core::ErrorCode;

pub async fn handle(
    dispatcher: &Dispatcher,
    identifier: Option<&str>,
    errors: &mut ProtocolErrors,
) -> ApiResult<Option<ResponseBody>> {
    let metadata = &dispatcher.metadata;
    let formats = match identifier {
        Some(identifier) => {
            if !metadata.identifier_exists(identifier).await? {
                errors.with_error(ErrorCode::IdDoesNotExist);
                return Ok(None);
            }
            metadata.list_formats_for_identifier(identifier).await?
        }
        None => metadata.list_formats().await?,
    };

    if formats.is_empty() {
        errors.with_error(ErrorCode::NoMetadataFormats);
        return Ok(None);
    }
    Ok(Some(ResponseBody::ListMetadataFormats(formats)))
}
