//! Metadata format prefixes and stored metadata content.

/// Validate a metadata prefix (non-empty, unreserved URI characters only).
pub fn validate_metadata_prefix(prefix: &str) -> crate::Result<()> {
    let valid = !prefix.is_empty()
        && prefix.chars().all(|c| {
            c.is_ascii_alphanumeric()
                || matches!(c, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
        });
    if valid {
        Ok(())
    } else {
        Err(crate::Error::InvalidMetadataPrefix(prefix.to_string()))
    }
}

/// Reduce stored metadata to its root element.
///
/// Surrounding whitespace, a byte order mark and a leading XML declaration
/// are dropped. Returns None unless what remains starts with an element tag.
pub fn metadata_fragment(content: &str) -> Option<&str> {
    let mut rest = content.trim_start_matches('\u{feff}').trim();
    if let Some(after) = rest.strip_prefix("<?xml")
        && after.starts_with(|c: char| c.is_ascii_whitespace() || c == '?')
    {
        let end = after.find("?>")?;
        rest = after[end + 2..].trim_start();
    }
    let starts_element = rest
        .strip_prefix('<')
        .and_then(|tag| tag.chars().next())
        .is_some_and(|c| c.is_alphabetic() || c == '_' || c == ':');
    (starts_element && rest.ends_with('>')).then_some(rest)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_grammar() {
        assert!(validate_metadata_prefix("oai_dc").is_ok());
        assert!(validate_metadata_prefix("marc21.xml").is_ok());
        assert!(validate_metadata_prefix("").is_err());
        assert!(validate_metadata_prefix("oai dc").is_err());
        assert!(validate_metadata_prefix("a:b").is_err());
    }

    #[test]
    fn fragment_drops_declaration_and_whitespace() {
        let content = "\u{feff}<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
                       <oai_dc:dc>\n  <dc:title>T</dc:title>\n</oai_dc:dc>\n";
        assert_eq!(
            metadata_fragment(content),
            Some("<oai_dc:dc>\n  <dc:title>T</dc:title>\n</oai_dc:dc>")
        );
        assert_eq!(metadata_fragment("  <record/>  "), Some("<record/>"));
    }

    #[test]
    fn fragment_requires_an_element() {
        for bad in [
            "",
            "   ",
            "plain text",
            "<?xml version=\"1.0\"?>",
            "<?xml version=\"1.0\"",
            "<!-- note -->",
            "<a",
        ] {
            assert_eq!(metadata_fragment(bad), None, "accepted {bad:?}");
        }
    }
}
