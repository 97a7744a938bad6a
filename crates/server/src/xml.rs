//! XML rendering of protocol responses.

use crate::response::{
    IdentifyBody, ListBody, OaiResponse, RecordBody, RecordHeader, ResponseBody,
    ResumptionTokenElement,
};
use harvest_core::{format_datestamp, metadata_fragment};
use harvest_metadata::models::{FormatRow, SetRow};
use std::borrow::Cow;

/// Protocol namespace of the response envelope.
pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";

/// Schema location of the response envelope.
pub const OAI_SCHEMA_LOCATION: &str =
    "http://www.openarchives.org/OAI/2.0/ http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd";

/// Content type of every protocol response.
pub const CONTENT_TYPE: &str = "text/xml; charset=utf-8";

/// Escape text for use in element content or a double-quoted attribute.
///
/// Characters XML 1.0 does not allow anywhere in a document are dropped.
pub fn escape(text: &str) -> Cow<'_, str> {
    if !text.contains(|c: char| matches!(c, '&' | '<' | '>' | '"' | '\'') || !is_xml_char(c)) {
        return Cow::Borrowed(text);
    }
    let mut escaped = String::with_capacity(text.len() + 16);
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&apos;"),
            c if is_xml_char(c) => escaped.push(c),
            _ => {}
        }
    }
    Cow::Owned(escaped)
}

/// Whether `c` matches the XML 1.0 `Char` production.
fn is_xml_char(c: char) -> bool {
    matches!(c, '\t' | '\n' | '\r' | '\u{20}'..='\u{D7FF}' | '\u{E000}'..='\u{FFFD}')
        || c >= '\u{10000}'
}

/// Indenting element writer over a string buffer.
struct XmlWriter {
    out: String,
    depth: usize,
}

impl XmlWriter {
    fn new() -> Self {
        Self {
            out: String::from("<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n"),
            depth: 0,
        }
    }

    fn indent(&mut self) {
        for _ in 0..self.depth {
            self.out.push_str("  ");
        }
    }

    fn start_tag(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.out.push('<');
        self.out.push_str(name);
        for (key, value) in attrs {
            self.out.push_str(&format!(" {}=\"{}\"", key, escape(value)));
        }
    }

    fn open(&mut self, name: &str, attrs: &[(&str, &str)]) {
        self.indent();
        self.start_tag(name, attrs);
        self.out.push_str(">\n");
        self.depth += 1;
    }

    fn close(&mut self, name: &str) {
        self.depth = self.depth.saturating_sub(1);
        self.indent();
        self.out.push_str(&format!("</{name}>\n"));
    }

    /// `<name attrs>text</name>`, or `<name attrs/>` for empty text.
    fn element(&mut self, name: &str, attrs: &[(&str, &str)], text: &str) {
        self.indent();
        self.start_tag(name, attrs);
        if text.is_empty() {
            self.out.push_str("/>\n");
        } else {
            self.out.push_str(&format!(">{}</{name}>\n", escape(text)));
        }
    }

    /// Wrap stored XML, writing its root element unchanged.
    ///
    /// Content that is not an element is written as escaped text.
    fn raw_element(&mut self, name: &str, xml: &str) {
        self.open(name, &[]);
        self.indent();
        match metadata_fragment(xml) {
            Some(fragment) => self.out.push_str(fragment),
            None => self.out.push_str(&escape(xml.trim())),
        }
        self.out.push('\n');
        self.close(name);
    }

    fn finish(self) -> String {
        self.out
    }
}

/// Render a response as an OAI-PMH XML document.
pub fn render(response: &OaiResponse) -> String {
    let mut xml = XmlWriter::new();
    xml.open(
        "OAI-PMH",
        &[
            ("xmlns", OAI_NAMESPACE),
            ("xmlns:xsi", "http://www.w3.org/2001/XMLSchema-instance"),
            ("xsi:schemaLocation", OAI_SCHEMA_LOCATION),
        ],
    );
    xml.element(
        "responseDate",
        &[],
        &format_datestamp(response.response_date),
    );

    let echoed = response
        .arguments
        .as_ref()
        .map(|arguments| arguments.pairs())
        .unwrap_or_default();
    xml.element("request", &echoed, &response.base_url);

    match &response.body {
        ResponseBody::Errors(codes) => {
            for code in codes {
                xml.element("error", &[("code", code.as_str())], code.message());
            }
        }
        ResponseBody::Identify(body) => write_identify(&mut xml, body, &response.base_url),
        ResponseBody::GetRecord(record) => {
            xml.open("GetRecord", &[]);
            write_record(&mut xml, record);
            xml.close("GetRecord");
        }
        ResponseBody::ListIdentifiers(list) => {
            write_list(&mut xml, "ListIdentifiers", list, write_header);
        }
        ResponseBody::ListRecords(list) => {
            write_list(&mut xml, "ListRecords", list, write_record);
        }
        ResponseBody::ListMetadataFormats(formats) => {
            xml.open("ListMetadataFormats", &[]);
            for format in formats {
                write_format(&mut xml, format);
            }
            xml.close("ListMetadataFormats");
        }
        ResponseBody::ListSets(list) => write_list(&mut xml, "ListSets", list, write_set),
    }

    xml.close("OAI-PMH");
    xml.finish()
}

fn write_identify(xml: &mut XmlWriter, body: &IdentifyBody, base_url: &str) {
    xml.open("Identify", &[]);
    xml.element("repositoryName", &[], &body.repository_name);
    xml.element("baseURL", &[], base_url);
    xml.element("protocolVersion", &[], body.protocol_version);
    for email in &body.admin_emails {
        xml.element("adminEmail", &[], email);
    }
    xml.element("earliestDatestamp", &[], &body.earliest_datestamp);
    xml.element("deletedRecord", &[], body.deleted_record.as_str());
    xml.element("granularity", &[], body.granularity);
    xml.close("Identify");
}

fn write_header(xml: &mut XmlWriter, header: &RecordHeader) {
    if header.deleted {
        xml.open("header", &[("status", "deleted")]);
    } else {
        xml.open("header", &[]);
    }
    xml.element("identifier", &[], &header.identifier);
    xml.element("datestamp", &[], &format_datestamp(header.datestamp));
    for spec in &header.set_specs {
        xml.element("setSpec", &[], spec);
    }
    xml.close("header");
}

fn write_record(xml: &mut XmlWriter, record: &RecordBody) {
    xml.open("record", &[]);
    write_header(xml, &record.header);
    if let Some(metadata) = &record.metadata {
        xml.raw_element("metadata", metadata);
    }
    xml.close("record");
}

fn write_format(xml: &mut XmlWriter, format: &FormatRow) {
    xml.open("metadataFormat", &[]);
    xml.element("metadataPrefix", &[], &format.prefix);
    xml.element("schema", &[], &format.schema_url);
    xml.element("metadataNamespace", &[], &format.namespace);
    xml.close("metadataFormat");
}

fn write_set(xml: &mut XmlWriter, set: &SetRow) {
    xml.open("set", &[]);
    xml.element("setSpec", &[], &set.spec);
    xml.element("setName", &[], &set.name);
    if let Some(description) = &set.description {
        xml.raw_element("setDescription", description);
    }
    xml.close("set");
}

fn write_list<T>(
    xml: &mut XmlWriter,
    name: &str,
    list: &ListBody<T>,
    write_item: fn(&mut XmlWriter, &T),
) {
    xml.open(name, &[]);
    for item in &list.items {
        write_item(xml, item);
    }
    if let Some(token) = &list.resumption_token {
        write_resumption_token(xml, token);
    }
    xml.close(name);
}

fn write_resumption_token(xml: &mut XmlWriter, token: &ResumptionTokenElement) {
    let expiration = token.expiration_date.map(format_datestamp);
    let complete_list_size = token.complete_list_size.to_string();
    let cursor = token.cursor.to_string();

    let mut attrs = Vec::with_capacity(3);
    if let Some(expiration) = &expiration {
        attrs.push(("expirationDate", expiration.as_str()));
    }
    attrs.push(("completeListSize", complete_list_size.as_str()));
    attrs.push(("cursor", cursor.as_str()));

    xml.element(
        "resumptionToken",
        &attrs,
        token.value.as_deref().unwrap_or_default(),
    );
}
