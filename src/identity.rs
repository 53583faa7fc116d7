//! File identity tokens.
//!
//! Every generated file carries `@generated-id: <12 lowercase hex>` in a
//! comment near the top. The token survives moves and renames, so the
//! scanner can tell "moved" apart from "deleted + created".
//!
//! Only the short 12-hex form is recognised. UUID-shaped values after the
//! marker are ignored.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Marker that precedes the identifier on the header line.
pub const MARKER: &str = "@generated-id:";

/// Number of hex characters in an identity.
pub const ID_LEN: usize = 12;

/// A stable file identity: 12 lowercase hex characters.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

/// Error from parsing an [`Identity`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IdentityError {
    /// The rejected value.
    pub value: String,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "invalid identity {:?}: expected {ID_LEN} lowercase hex characters",
            self.value
        )
    }
}

impl std::error::Error for IdentityError {}

impl Identity {
    /// Generate a fresh random identity.
    #[must_use]
    pub fn generate() -> Self {
        let bytes: [u8; ID_LEN / 2] = rand::random();
        Self(bytes.iter().map(|b| format!("{b:02x}")).collect())
    }

    /// Parse an identity string.
    ///
    /// # Errors
    /// Returns an error unless `s` is exactly 12 lowercase hex characters.
    pub fn parse(s: &str) -> Result<Self, IdentityError> {
        if s.len() == ID_LEN && s.bytes().all(is_lower_hex) {
            Ok(Self(s.to_owned()))
        } else {
            Err(IdentityError {
                value: s.to_owned(),
            })
        }
    }

    /// The identity as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Find an identity token on a single line.
    #[must_use]
    pub fn find_in_line(line: &str) -> Option<Self> {
        let start = line.find(MARKER)? + MARKER.len();
        let rest = line[start..].trim_start();
        let token = rest.get(..ID_LEN)?;
        let boundary_ok = rest
            .as_bytes()
            .get(ID_LEN)
            .is_none_or(|&b| !b.is_ascii_hexdigit() && b != b'-');
        if boundary_ok {
            Self::parse(token).ok()
        } else {
            None
        }
    }

    /// Find an identity token within the first `max_lines` lines of `content`.
    #[must_use]
    pub fn find_in_header(content: &[u8], max_lines: usize) -> Option<Self> {
        content
            .split(|&b| b == b'\n')
            .take(max_lines)
            .find_map(|line| Self::find_in_line(&String::from_utf8_lossy(line)))
    }

    /// Render a header comment line, e.g. `// @generated-id: 0123456789ab`.
    #[must_use]
    pub fn header_line(&self, comment_prefix: &str) -> String {
        format!("{comment_prefix} {MARKER} {}", self.0)
    }
}

const fn is_lower_hex(b: u8) -> bool {
    matches!(b, b'0'..=b'9' | b'a'..=b'f')
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = IdentityError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = IdentityError;
    fn try_from(s: String) -> Result<Self, Self::Error> {
        Self::parse(&s)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_valid_and_distinct() {
        let a = Identity::generate();
        let b = Identity::generate();
        assert!(Identity::parse(a.as_str()).is_ok());
        assert_ne!(a, b);
    }

    #[test]
    fn finds_token_in_comment_styles() {
        for line in [
            "// @generated-id: 0123456789ab",
            "# @generated-id:0123456789ab",
            "/* @generated-id: 0123456789ab */",
            "<!-- @generated-id: 0123456789ab -->",
        ] {
            assert_eq!(
                Identity::find_in_line(line).map(|i| i.to_string()),
                Some("0123456789ab".to_owned()),
                "{line}"
            );
        }
    }

    #[test]
    fn rejects_uuid_and_uppercase() {
        assert_eq!(
            Identity::find_in_line("// @generated-id: 550e8400-e29b-41d4-a716-446655440000"),
            None
        );
        assert_eq!(
            Identity::find_in_line("// @generated-id: 0123456789abcdef"),
            None
        );
        assert_eq!(Identity::find_in_line("// @generated-id: 0123456789AB"), None);
    }

    #[test]
    fn header_search_is_bounded() {
        let mut content = "line\n".repeat(20);
        content.push_str("// @generated-id: 0123456789ab\n");
        assert_eq!(Identity::find_in_header(content.as_bytes(), 20), None);
        assert!(Identity::find_in_header(content.as_bytes(), 21).is_some());
    }

    #[test]
    fn header_line_roundtrips() {
        let id = Identity::parse("a1b2c3d4e5f6").unwrap();
        let line = id.header_line("//");
        assert_eq!(line, "// @generated-id: a1b2c3d4e5f6");
        assert_eq!(Identity::find_in_line(&line), Some(id));
    }

    #[test]
    fn serde_validates() {
        let id: Identity = serde_json::from_str("\"a1b2c3d4e5f6\"").unwrap();
        assert_eq!(serde_json::to_string(&id).unwrap(), "\"a1b2c3d4e5f6\"");
        assert!(serde_json::from_str::<Identity>("\"nope\"").is_err());
    }
}
