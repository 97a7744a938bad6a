//! Set specs: colon-separated hierarchical set identifiers (e.g. `a:b:c`).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Separator between hierarchy levels.
pub const HIERARCHY_SEPARATOR: char = ':';

/// A validated set spec.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SetSpec(String);

impl SetSpec {
    /// Parse and validate a set spec.
    ///
    /// Each component must be non-empty and consist only of unreserved URI
    /// characters.
    pub fn parse(s: &str) -> crate::Result<Self> {
        let valid = !s.is_empty()
            && s.split(HIERARCHY_SEPARATOR)
                .all(|part| !part.is_empty() && part.chars().all(is_unreserved));
        if valid {
            Ok(Self(s.to_string()))
        } else {
            Err(crate::Error::InvalidSetSpec(s.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn is_unreserved(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | '!' | '~' | '*' | '\'' | '(' | ')')
}

impl TryFrom<String> for SetSpec {
    type Error = crate::Error;

    fn try_from(value: String) -> crate::Result<Self> {
        Self::parse(&value)
    }
}

impl From<SetSpec> for String {
    fn from(spec: SetSpec) -> Self {
        spec.0
    }
}

impl fmt::Display for SetSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_hierarchies_of_unreserved_chars() {
        for ok in ["a", "a:b", "math:algebra:linear", "x_y.z-1", "it's(ok)!~*"] {
            assert!(SetSpec::parse(ok).is_ok(), "rejected {ok:?}");
        }
    }

    #[test]
    fn rejects_empty_components_and_reserved_chars() {
        for bad in ["", ":", "a:", ":a", "a::b", "a b", "a/b", "a%20", "ä"] {
            assert!(SetSpec::parse(bad).is_err(), "accepted {bad:?}");
        }
    }

    #[test]
    fn serde_validates() {
        let ok: SetSpec = serde_json::from_str("\"a:b\"").unwrap();
        assert_eq!(ok.as_str(), "a:b");
        assert!(serde_json::from_str::<SetSpec>("\"a::b\"").is_err());
    }
}
