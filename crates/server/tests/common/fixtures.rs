//! Test fixtures for seeding repositories and reading responses.

use harvest_core::DeletedRecords;
use harvest_metadata::MetadataStore;
use harvest_metadata::models::{FormatRow, RecordRow};
use time::OffsetDateTime;

/// The Dublin Core format every repository carries.
#[allow(dead_code)]
pub fn oai_dc() -> FormatRow {
    FormatRow {
        prefix: "oai_dc".to_string(),
        namespace: "http://www.openarchives.org/OAI/2.0/oai_dc/".to_string(),
        schema_url: "http://www.openarchives.org/OAI/2.0/oai_dc.xsd".to_string(),
    }
}

/// A second format for cross-format tests.
#[allow(dead_code)]
pub fn marcxml() -> FormatRow {
    FormatRow {
        prefix: "marcxml".to_string(),
        namespace: "http://www.loc.gov/MARC21/slim".to_string(),
        schema_url: "http://www.loc.gov/standards/marcxml/schema/MARC21slim.xsd".to_string(),
    }
}

/// Minimal Dublin Core payload.
#[allow(dead_code)]
pub fn dc_metadata(title: &str) -> String {
    format!(
        "<oai_dc:dc xmlns:oai_dc=\"http://www.openarchives.org/OAI/2.0/oai_dc/\" \
         xmlns:dc=\"http://purl.org/dc/elements/1.1/\"><dc:title>{title}</dc:title></oai_dc:dc>"
    )
}

/// A live record in `metadata_prefix`.
#[allow(dead_code)]
pub fn record(identifier: &str, metadata_prefix: &str, datestamp: OffsetDateTime) -> RecordRow {
    RecordRow {
        identifier: identifier.to_string(),
        metadata_prefix: metadata_prefix.to_string(),
        datestamp,
        content: Some(dc_metadata(identifier)),
    }
}

#[allow(dead_code)]
pub fn specs(specs: &[&str]) -> Vec<String> {
    specs.iter().map(|spec| spec.to_string()).collect()
}

/// Store a live oai_dc record in `sets`.
#[allow(dead_code)]
pub async fn seed_record(
    store: &dyn MetadataStore,
    identifier: &str,
    datestamp: OffsetDateTime,
    sets: &[&str],
) {
    store
        .add_or_update_record(
            &record(identifier, "oai_dc", datestamp),
            &specs(sets),
            DeletedRecords::Transient,
        )
        .await
        .expect("Failed to seed record");
}

/// Error codes of an error document, in document order.
#[allow(dead_code)]
pub fn error_codes(xml: &str) -> Vec<String> {
    xml.split("<error code=\"")
        .skip(1)
        .filter_map(|rest| rest.split('"').next())
        .map(String::from)
        .collect()
}

/// Identifiers in document order.
#[allow(dead_code)]
pub fn identifiers(xml: &str) -> Vec<String> {
    element_texts(xml, "identifier")
}

/// Text of every `<name>text</name>` element.
#[allow(dead_code)]
pub fn element_texts(xml: &str, name: &str) -> Vec<String> {
    let open = format!("<{name}>");
    let close = format!("</{name}>");
    xml.split(&open)
        .skip(1)
        .filter_map(|rest| rest.split(&close).next())
        .map(String::from)
        .collect()
}

/// The resumptionToken element of a list page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenElement {
    /// Empty on the terminal element.
    pub value: String,
    pub complete_list_size: u64,
    pub cursor: u64,
    pub has_expiration: bool,
}

#[allow(dead_code)]
pub fn resumption_token(xml: &str) -> Option<TokenElement> {
    let start = xml.find("<resumptionToken")?;
    let rest = &xml[start..];
    let tag_end = rest.find('>')?;
    let tag = &rest[..tag_end];

    let attr = |name: &str| -> Option<u64> {
        let key = format!("{name}=\"");
        let from = tag.find(&key)? + key.len();
        tag[from..].split('"').next()?.parse().ok()
    };

    let value = if tag.ends_with('/') {
        String::new()
    } else {
        rest[tag_end + 1..]
            .split("</resumptionToken>")
            .next()?
            .to_string()
    };

    Some(TokenElement {
        value,
        complete_list_size: attr("completeListSize")?,
        cursor: attr("cursor")?,
        has_expiration: tag.contains("expirationDate=\""),
    })
}
