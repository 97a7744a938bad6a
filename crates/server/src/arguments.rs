//! Request argument validation.
//!
//! Validation runs in three gates, each only reached when the previous one
//! raised nothing:
//! 1. argument names and the verb (`badArgument` / `badVerb`),
//! 2. the per-verb argument shape (`badArgument`),
//! 3. argument values and references to formats and sets in the store
//!    (`cannotDisseminateFormat`, `badArgument`, `noSetHierarchy`).
//!    Every failing check of this gate is reported.

use crate::accumulator::ProtocolErrors;
use harvest_core::{Datestamp, ErrorCode, SetSpec, Verb};
use harvest_metadata::repos::RecordFilter;
use harvest_metadata::{MetadataResult, MetadataStore};
use std::collections::HashSet;

/// The only argument names the protocol defines.
pub const ARGUMENT_NAMES: [&str; 7] = [
    "verb",
    "identifier",
    "metadataPrefix",
    "from",
    "until",
    "set",
    "resumptionToken",
];

/// Request arguments that passed the name and verb gate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arguments {
    pub verb: Verb,
    pub identifier: Option<String>,
    pub metadata_prefix: Option<String>,
    pub from: Option<String>,
    pub until: Option<String>,
    pub set: Option<String>,
    pub resumption_token: Option<String>,
}

impl Arguments {
    /// Build from raw key/value pairs in request order.
    ///
    /// Unknown or repeated names raise `badArgument`; a missing, repeated or
    /// unknown verb raises `badVerb`.
    pub fn from_pairs(pairs: &[(String, String)]) -> Result<Self, ProtocolErrors> {
        let mut errors = ProtocolErrors::new();
        let mut seen = HashSet::new();
        let mut verb = None;
        let mut identifier = None;
        let mut metadata_prefix = None;
        let mut from = None;
        let mut until = None;
        let mut set = None;
        let mut resumption_token = None;

        for (key, value) in pairs {
            if !ARGUMENT_NAMES.contains(&key.as_str()) {
                errors.with_error(ErrorCode::BadArgument);
                continue;
            }
            if !seen.insert(key.as_str()) {
                errors.with_error(if key == "verb" {
                    ErrorCode::BadVerb
                } else {
                    ErrorCode::BadArgument
                });
                continue;
            }
            let slot = match key.as_str() {
                "verb" => &mut verb,
                "identifier" => &mut identifier,
                "metadataPrefix" => &mut metadata_prefix,
                "from" => &mut from,
                "until" => &mut until,
                "set" => &mut set,
                _ => &mut resumption_token,
            };
            *slot = Some(value.clone());
        }

        let verb = match verb.as_deref().map(Verb::parse) {
            Some(Ok(verb)) => Some(verb),
            Some(Err(_)) | None => {
                errors.with_error(ErrorCode::BadVerb);
                None
            }
        };

        match verb {
            Some(verb) if !errors.has_errors() => Ok(Self {
                verb,
                identifier,
                metadata_prefix,
                from,
                until,
                set,
                resumption_token,
            }),
            _ => Err(errors),
        }
    }

    /// Number of arguments, counting the verb.
    pub fn count(&self) -> usize {
        1 + [
            &self.identifier,
            &self.metadata_prefix,
            &self.from,
            &self.until,
            &self.set,
            &self.resumption_token,
        ]
        .iter()
        .filter(|value| value.is_some())
        .count()
    }

    /// Arguments as (name, value) in canonical order, for echoing in responses.
    pub fn pairs(&self) -> Vec<(&'static str, &str)> {
        let mut pairs = vec![("verb", self.verb.as_str())];
        let optional = [
            ("identifier", &self.identifier),
            ("metadataPrefix", &self.metadata_prefix),
            ("from", &self.from),
            ("until", &self.until),
            ("set", &self.set),
            ("resumptionToken", &self.resumption_token),
        ];
        for (name, value) in optional {
            if let Some(value) = value {
                pairs.push((name, value.as_str()));
            }
        }
        pairs
    }

    /// Check the per-verb argument shape.
    pub fn into_request(self) -> Result<VerbRequest, ProtocolErrors> {
        let bad = || ProtocolErrors::single(ErrorCode::BadArgument);
        let count = self.count();

        match self.verb {
            Verb::Identify => (count == 1).then_some(VerbRequest::Identify).ok_or_else(bad),
            Verb::GetRecord => match (self.identifier, self.metadata_prefix) {
                (Some(identifier), Some(metadata_prefix)) if count == 3 => {
                    Ok(VerbRequest::GetRecord {
                        identifier,
                        metadata_prefix,
                    })
                }
                _ => Err(bad()),
            },
            Verb::ListMetadataFormats => {
                if count == 1 + usize::from(self.identifier.is_some()) {
                    Ok(VerbRequest::ListMetadataFormats {
                        identifier: self.identifier,
                    })
                } else {
                    Err(bad())
                }
            }
            Verb::ListSets => {
                if count == 1 + usize::from(self.resumption_token.is_some()) {
                    Ok(VerbRequest::ListSets {
                        resumption_token: self.resumption_token,
                    })
                } else {
                    Err(bad())
                }
            }
            Verb::ListIdentifiers | Verb::ListRecords => {
                let list = if let Some(token) = self.resumption_token {
                    if count != 2 {
                        return Err(bad());
                    }
                    ListArguments::Resume(token)
                } else {
                    let Some(metadata_prefix) = self.metadata_prefix else {
                        return Err(bad());
                    };
                    if self.identifier.is_some() {
                        return Err(bad());
                    }
                    ListArguments::Select(Selection {
                        metadata_prefix,
                        from: self.from,
                        until: self.until,
                        set: self.set,
                    })
                };
                Ok(if self.verb == Verb::ListRecords {
                    VerbRequest::ListRecords(list)
                } else {
                    VerbRequest::ListIdentifiers(list)
                })
            }
        }
    }
}

/// A request whose argument shape is valid for its verb.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbRequest {
    Identify,
    GetRecord {
        identifier: String,
        metadata_prefix: String,
    },
    ListMetadataFormats {
        identifier: Option<String>,
    },
    ListSets {
        resumption_token: Option<String>,
    },
    ListIdentifiers(ListArguments),
    ListRecords(ListArguments),
}

/// Arguments of a record list request: a first page or a continuation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ListArguments {
    Select(Selection),
    Resume(String),
}

/// Unchecked selection arguments of a first-page list request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    pub metadata_prefix: String,
    pub from: Option<String>,
    pub until: Option<String>,
    pub set: Option<String>,
}

/// Parsed selection arguments of ListIdentifiers / ListRecords.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListFilter {
    pub metadata_prefix: String,
    pub from: Option<Datestamp>,
    pub until: Option<Datestamp>,
    pub set: Option<SetSpec>,
}

impl ListFilter {
    /// Parse the selection arguments.
    ///
    /// `from` and `until` must use the same granularity and be ordered.
    pub fn parse(
        metadata_prefix: &str,
        from: Option<&str>,
        until: Option<&str>,
        set: Option<&str>,
    ) -> Result<Self, ErrorCode> {
        let (from, until) = parse_bounds(from, until)?;
        let set = set
            .map(SetSpec::parse)
            .transpose()
            .map_err(|_| ErrorCode::BadArgument)?;

        Ok(Self {
            metadata_prefix: metadata_prefix.to_string(),
            from,
            until,
            set,
        })
    }

    /// Store-level filter with inclusive datestamp bounds.
    pub fn record_filter(&self) -> RecordFilter {
        RecordFilter {
            metadata_prefix: self.metadata_prefix.clone(),
            from: self.from.map(|from| from.lower_bound()),
            until: self.until.map(|until| until.upper_bound()),
            set_spec: self.set.as_ref().map(|set| set.as_str().to_string()),
        }
    }
}

/// Parse `from` and `until`, which must share a granularity and be ordered.
pub fn parse_bounds(
    from: Option<&str>,
    until: Option<&str>,
) -> Result<(Option<Datestamp>, Option<Datestamp>), ErrorCode> {
    let from = from
        .map(Datestamp::parse)
        .transpose()
        .map_err(|_| ErrorCode::BadArgument)?;
    let until = until
        .map(Datestamp::parse)
        .transpose()
        .map_err(|_| ErrorCode::BadArgument)?;

    if let (Some(from), Some(until)) = (&from, &until)
        && (from.granularity() != until.granularity()
            || from.lower_bound() > until.lower_bound())
    {
        return Err(ErrorCode::BadArgument);
    }
    Ok((from, until))
}

/// Arguments together with the request shape they form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedRequest {
    pub arguments: Arguments,
    pub request: VerbRequest,
}

/// Validates request arguments, including references into the store.
pub struct ArgumentValidator<'a> {
    metadata: &'a dyn MetadataStore,
}

impl<'a> ArgumentValidator<'a> {
    pub fn new(metadata: &'a dyn MetadataStore) -> Self {
        Self { metadata }
    }

    /// Run the name, verb and shape gates.
    pub fn check_syntax(
        &self,
        pairs: &[(String, String)],
    ) -> Result<ValidatedRequest, ProtocolErrors> {
        let arguments = Arguments::from_pairs(pairs)?;
        let request = arguments.clone().into_request()?;
        Ok(ValidatedRequest { arguments, request })
    }

    /// Raise `cannotDisseminateFormat` unless the format exists.
    pub async fn check_format(
        &self,
        metadata_prefix: &str,
        errors: &mut ProtocolErrors,
    ) -> MetadataResult<()> {
        if self.metadata.get_format(metadata_prefix).await?.is_none() {
            errors.with_error(ErrorCode::CannotDisseminateFormat);
        }
        Ok(())
    }

    /// Raise `noSetHierarchy` when the repository has no sets, or
    /// `badArgument` when this set does not exist.
    pub async fn check_set(
        &self,
        set: &SetSpec,
        errors: &mut ProtocolErrors,
    ) -> MetadataResult<()> {
        if !self.metadata.any_set_exists().await? {
            errors.with_error(ErrorCode::NoSetHierarchy);
        } else if self.metadata.get_set(set.as_str()).await?.is_none() {
            errors.with_error(ErrorCode::BadArgument);
        }
        Ok(())
    }

    /// Check the selection of a first-page list request.
    ///
    /// Every failing check is recorded; the filter is returned only when
    /// none failed.
    pub async fn check_selection(
        &self,
        selection: &Selection,
        errors: &mut ProtocolErrors,
    ) -> MetadataResult<Option<ListFilter>> {
        self.check_format(&selection.metadata_prefix, errors).await?;

        let bounds = match parse_bounds(selection.from.as_deref(), selection.until.as_deref()) {
            Ok(bounds) => Some(bounds),
            Err(code) => {
                errors.with_error(code);
                None
            }
        };

        let set = match selection.set.as_deref().map(SetSpec::parse).transpose() {
            Ok(set) => set,
            Err(_) => {
                errors.with_error(ErrorCode::BadArgument);
                None
            }
        };
        if let Some(set) = &set {
            self.check_set(set, errors).await?;
        }

        match bounds {
            Some((from, until)) if !errors.has_errors() => Ok(Some(ListFilter {
                metadata_prefix: selection.metadata_prefix.clone(),
                from,
                until,
                set,
            })),
            _ => Ok(None),
        }
    }

    /// Check the references of a list filter.
    pub async fn check_filter(
        &self,
        filter: &ListFilter,
        errors: &mut ProtocolErrors,
    ) -> MetadataResult<()> {
        self.check_format(&filter.metadata_prefix, errors).await?;
        if let Some(set) = &filter.set {
            self.check_set(set, errors).await?;
        }
        Ok(())
    }

    /// Whether every format and set a filter references still exists.
    pub async fn references_exist(&self, filter: &ListFilter) -> MetadataResult<bool> {
        let mut errors = ProtocolErrors::new();
        self.check_filter(filter, &mut errors).await?;
        Ok(!errors.has_errors())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_metadata::SqliteStore;
    use harvest_metadata::models::FormatRow;
    use harvest_metadata::repos::FormatRepo;
    use tempfile::TempDir;

    fn pairs(args: &[(&str, &str)]) -> Vec<(String, String)> {
        args.iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn request(args: &[(&str, &str)]) -> Result<VerbRequest, ProtocolErrors> {
        Arguments::from_pairs(&pairs(args))?.into_request()
    }

    fn codes(result: Result<VerbRequest, ProtocolErrors>) -> Vec<ErrorCode> {
        match result {
            Ok(request) => panic!("expected errors, got {request:?}"),
            Err(errors) => errors.codes().to_vec(),
        }
    }

    #[test]
    fn unknown_argument_is_bad_argument() {
        let result = request(&[("verb", "Identify"), ("foo", "bar")]);
        assert_eq!(codes(result), vec![ErrorCode::BadArgument]);
    }

    #[test]
    fn missing_or_unknown_verb_is_bad_verb() {
        assert_eq!(codes(request(&[])), vec![ErrorCode::BadVerb]);
        assert_eq!(
            codes(request(&[("verb", "ListThings")])),
            vec![ErrorCode::BadVerb]
        );
        assert_eq!(
            codes(request(&[("verb", "identify")])),
            vec![ErrorCode::BadVerb]
        );
    }

    #[test]
    fn repeated_arguments_are_rejected() {
        assert_eq!(
            codes(request(&[("verb", "Identify"), ("verb", "Identify")])),
            vec![ErrorCode::BadVerb]
        );
        assert_eq!(
            codes(request(&[
                ("verb", "ListRecords"),
                ("metadataPrefix", "oai_dc"),
                ("metadataPrefix", "marc"),
            ])),
            vec![ErrorCode::BadArgument]
        );
    }

    #[test]
    fn name_and_verb_errors_coexist() {
        let result = request(&[("verb", "Nope"), ("bogus", "1")]);
        assert_eq!(
            codes(result),
            vec![ErrorCode::BadArgument, ErrorCode::BadVerb]
        );
    }

    #[test]
    fn identify_takes_no_arguments() {
        assert_eq!(request(&[("verb", "Identify")]).unwrap(), VerbRequest::Identify);
        assert_eq!(
            codes(request(&[("verb", "Identify"), ("identifier", "x")])),
            vec![ErrorCode::BadArgument]
        );
    }

    #[test]
    fn get_record_requires_exactly_identifier_and_prefix() {
        assert_eq!(
            request(&[
                ("verb", "GetRecord"),
                ("identifier", "oai:x:1"),
                ("metadataPrefix", "oai_dc"),
            ])
            .unwrap(),
            VerbRequest::GetRecord {
                identifier: "oai:x:1".to_string(),
                metadata_prefix: "oai_dc".to_string(),
            }
        );
        for args in [
            vec![("verb", "GetRecord"), ("identifier", "oai:x:1")],
            vec![("verb", "GetRecord"), ("metadataPrefix", "oai_dc")],
            vec![
                ("verb", "GetRecord"),
                ("identifier", "oai:x:1"),
                ("metadataPrefix", "oai_dc"),
                ("set", "a"),
            ],
        ] {
            assert_eq!(codes(request(&args)), vec![ErrorCode::BadArgument]);
        }
    }

    #[test]
    fn list_metadata_formats_accepts_optional_identifier() {
        assert_eq!(
            request(&[("verb", "ListMetadataFormats")]).unwrap(),
            VerbRequest::ListMetadataFormats { identifier: None }
        );
        assert_eq!(
            request(&[("verb", "ListMetadataFormats"), ("identifier", "id")]).unwrap(),
            VerbRequest::ListMetadataFormats {
                identifier: Some("id".to_string())
            }
        );
        assert_eq!(
            codes(request(&[
                ("verb", "ListMetadataFormats"),
                ("metadataPrefix", "oai_dc")
            ])),
            vec![ErrorCode::BadArgument]
        );
    }

    #[test]
    fn list_sets_accepts_only_resumption_token() {
        assert_eq!(
            request(&[("verb", "ListSets"), ("resumptionToken", "abc")]).unwrap(),
            VerbRequest::ListSets {
                resumption_token: Some("abc".to_string())
            }
        );
        assert_eq!(
            codes(request(&[("verb", "ListSets"), ("set", "a")])),
            vec![ErrorCode::BadArgument]
        );
    }

    #[test]
    fn list_records_requires_prefix_xor_token() {
        assert_eq!(
            codes(request(&[("verb", "ListRecords")])),
            vec![ErrorCode::BadArgument]
        );
        assert_eq!(
            codes(request(&[
                ("verb", "ListRecords"),
                ("metadataPrefix", "oai_dc"),
                ("resumptionToken", "abc"),
            ])),
            vec![ErrorCode::BadArgument]
        );
        assert_eq!(
            codes(request(&[
                ("verb", "ListIdentifiers"),
                ("resumptionToken", "abc"),
                ("from", "2024-01-01"),
            ])),
            vec![ErrorCode::BadArgument]
        );
        assert_eq!(
            request(&[("verb", "ListIdentifiers"), ("resumptionToken", "abc")]).unwrap(),
            VerbRequest::ListIdentifiers(ListArguments::Resume("abc".to_string()))
        );
    }

    #[test]
    fn list_records_never_takes_identifier() {
        assert_eq!(
            codes(request(&[
                ("verb", "ListRecords"),
                ("metadataPrefix", "oai_dc"),
                ("identifier", "oai:x:1"),
            ])),
            vec![ErrorCode::BadArgument]
        );
    }

    #[test]
    fn list_selection_values_pass_the_shape_gate() {
        let result = request(&[
            ("verb", "ListRecords"),
            ("metadataPrefix", "oai_dc"),
            ("from", "2024-13-45"),
            ("set", "bad set"),
        ]);
        assert_eq!(
            result.unwrap(),
            VerbRequest::ListRecords(ListArguments::Select(Selection {
                metadata_prefix: "oai_dc".to_string(),
                from: Some("2024-13-45".to_string()),
                until: None,
                set: Some("bad set".to_string()),
            }))
        );
    }

    #[test]
    fn date_bounds_must_parse_share_granularity_and_be_ordered() {
        assert!(parse_bounds(Some("2024-01-01"), Some("2024-01-31")).is_ok());
        assert!(parse_bounds(Some("2024-01-01"), Some("2024-01-01")).is_ok());
        assert!(parse_bounds(Some("2024-01-01T00:00:00Z"), Some("2024-01-01T10:00:00Z")).is_ok());
        assert!(parse_bounds(None, Some("2024-01-01")).is_ok());
        for (from, until) in [
            ("2024-01-01", "2024-01-31T00:00:00Z"),
            ("2024-02-01", "2024-01-01"),
            ("2024-13-01", "2024-12-01"),
        ] {
            assert_eq!(
                parse_bounds(Some(from), Some(until)),
                Err(ErrorCode::BadArgument),
                "{from} / {until}"
            );
        }
    }

    #[test]
    fn set_spec_syntax_is_checked() {
        assert_eq!(
            ListFilter::parse("oai_dc", None, None, Some("bad set")),
            Err(ErrorCode::BadArgument)
        );
    }

    async fn validator_store() -> (TempDir, SqliteStore) {
        let temp = tempfile::tempdir().unwrap();
        let store = SqliteStore::new(temp.path().join("metadata.db"), None)
            .await
            .unwrap();
        store
            .upsert_format(&FormatRow {
                prefix: "oai_dc".to_string(),
                namespace: "http://www.openarchives.org/OAI/2.0/oai_dc/".to_string(),
                schema_url: "http://www.openarchives.org/OAI/2.0/oai_dc.xsd".to_string(),
            })
            .await
            .unwrap();
        (temp, store)
    }

    fn selection(prefix: &str, from: Option<&str>, set: Option<&str>) -> Selection {
        Selection {
            metadata_prefix: prefix.to_string(),
            from: from.map(String::from),
            until: None,
            set: set.map(String::from),
        }
    }

    #[tokio::test]
    async fn selection_reports_every_failing_check() {
        let (_temp, store) = validator_store().await;
        let validator = ArgumentValidator::new(&store);

        let mut errors = ProtocolErrors::new();
        let filter = validator
            .check_selection(&selection("nope", Some("2024-13-45"), Some("math")), &mut errors)
            .await
            .unwrap();
        assert_eq!(filter, None);
        assert_eq!(
            errors.codes(),
            &[
                ErrorCode::CannotDisseminateFormat,
                ErrorCode::BadArgument,
                ErrorCode::NoSetHierarchy,
            ]
        );
    }

    #[tokio::test]
    async fn valid_selection_yields_filter() {
        let (_temp, store) = validator_store().await;
        let validator = ArgumentValidator::new(&store);

        let mut errors = ProtocolErrors::new();
        let filter = validator
            .check_selection(&selection("oai_dc", Some("2024-01-01"), None), &mut errors)
            .await
            .unwrap();
        assert!(!errors.has_errors());
        assert_eq!(
            filter,
            ListFilter::parse("oai_dc", Some("2024-01-01"), None, None).ok()
        );
    }

    #[test]
    fn record_filter_covers_whole_until_day() {
        let filter = ListFilter::parse("oai_dc", Some("2024-03-01"), Some("2024-03-02"), Some("a:b"))
            .unwrap();
        let records = filter.record_filter();
        assert_eq!(
            records.from,
            Some(time::macros::datetime!(2024-03-01 00:00:00 UTC))
        );
        assert_eq!(
            records.until,
            Some(time::macros::datetime!(2024-03-02 23:59:59 UTC))
        );
        assert_eq!(records.set_spec.as_deref(), Some("a:b"));
    }

    #[test]
    fn echo_pairs_use_canonical_order() {
        let args = Arguments::from_pairs(&pairs(&[
            ("set", "a"),
            ("metadataPrefix", "oai_dc"),
            ("verb", "ListRecords"),
        ]))
        .unwrap();
        assert_eq!(
            args.pairs(),
            vec![("verb", "ListRecords"), ("metadataPrefix", "oai_dc"), ("set", "a")]
        );
        assert_eq!(args.count(), 3);
    }
}
