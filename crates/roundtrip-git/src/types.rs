//! Value types shared between the [`GitRepo`](crate::GitRepo) trait and its
//! callers.
//!
//! They contain no gix types; the backend is an implementation detail.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

// ---------------------------------------------------------------------------
// GitOid
// ---------------------------------------------------------------------------

/// A git object identifier (SHA-1, 20 bytes).
///
/// Displays as 40 lowercase hex characters.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GitOid([u8; 20]);

impl GitOid {
    /// The zero OID, used as a sentinel for "ref does not exist."
    pub const ZERO: Self = Self([0; 20]);

    /// Create a `GitOid` from raw bytes.
    #[must_use]
    pub const fn from_bytes(bytes: [u8; 20]) -> Self {
        Self(bytes)
    }

    /// Return the raw bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; 20] {
        &self.0
    }

    /// Return `true` if this is the zero OID.
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

impl fmt::Display for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for byte in &self.0 {
            write!(f, "{byte:02x}")?;
        }
        Ok(())
    }
}

impl fmt::Debug for GitOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "GitOid({self})")
    }
}

impl FromStr for GitOid {
    type Err = OidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = |reason: String| OidParseError {
            value: s.to_owned(),
            reason,
        };
        if s.len() != 40 {
            return Err(invalid(format!("expected 40 hex characters, got {}", s.len())));
        }
        let mut bytes = [0u8; 20];
        for (slot, pair) in bytes.iter_mut().zip(s.as_bytes().chunks_exact(2)) {
            let hi = hex_digit(pair[0])
                .ok_or_else(|| invalid(format!("invalid hex digit '{}'", pair[0] as char)))?;
            let lo = hex_digit(pair[1])
                .ok_or_else(|| invalid(format!("invalid hex digit '{}'", pair[1] as char)))?;
            *slot = (hi << 4) | lo;
        }
        Ok(Self(bytes))
    }
}

/// Error from parsing a hex string into a [`GitOid`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OidParseError {
    /// The raw value that failed.
    pub value: String,
    /// Why it failed.
    pub reason: String,
}

impl fmt::Display for OidParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid OID {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for OidParseError {}

const fn hex_digit(b: u8) -> Option<u8> {
    match b {
        b'0'..=b'9' => Some(b - b'0'),
        b'a'..=b'f' => Some(b - b'a' + 10),
        b'A'..=b'F' => Some(b - b'A' + 10),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// RefName
// ---------------------------------------------------------------------------

/// A validated git ref name.
///
/// Must start with `refs/` (or be `HEAD`) and obey the subset of
/// `git check-ref-format` rules that generation ids can violate.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct RefName(String);

impl RefName {
    /// Create a new `RefName`.
    ///
    /// # Errors
    /// Returns an error for empty names, names outside `refs/`, and names
    /// containing characters or sequences git forbids.
    pub fn new(name: &str) -> Result<Self, RefNameError> {
        Self::validate(name)?;
        Ok(Self(name.to_owned()))
    }

    /// Return the ref name as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), RefNameError> {
        let reject = |reason: &str| {
            Err(RefNameError {
                value: name.to_owned(),
                reason: reason.to_owned(),
            })
        };
        if name.is_empty() {
            return reject("ref name must not be empty");
        }
        if name == "HEAD" {
            return Ok(());
        }
        if !name.starts_with("refs/") {
            return reject("ref name must start with 'refs/'");
        }
        if name.ends_with('/') || name.ends_with('.') || name.ends_with(".lock") {
            return reject("ref name must not end with '/', '.' or '.lock'");
        }
        if name.contains("..") || name.contains("//") || name.contains("@{") {
            return reject("ref name must not contain '..', '//' or '@{'");
        }
        if name
            .chars()
            .any(|c| c.is_ascii_control() || matches!(c, ' ' | '~' | '^' | ':' | '?' | '*' | '[' | '\\'))
        {
            return reject("ref name contains a forbidden character");
        }
        Ok(())
    }
}

impl fmt::Display for RefName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for RefName {
    type Err = RefNameError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

/// Error from validating a [`RefName`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefNameError {
    /// The invalid value.
    pub value: String,
    /// Why it was rejected.
    pub reason: String,
}

impl fmt::Display for RefNameError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid ref name {:?}: {}", self.value, self.reason)
    }
}

impl std::error::Error for RefNameError {}

// ---------------------------------------------------------------------------
// RefEdit
// ---------------------------------------------------------------------------

/// A single compare-and-swap ref update.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefEdit {
    /// The ref to update.
    pub name: RefName,
    /// The new OID to set the ref to.
    pub new_oid: GitOid,
    /// The expected current OID. Use [`GitOid::ZERO`] to assert that the ref
    /// must not already exist.
    pub expected_old_oid: GitOid,
}

// ---------------------------------------------------------------------------
// Tree types
// ---------------------------------------------------------------------------

/// The file mode of a tree entry (analogous to `git ls-tree` mode column).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryMode {
    /// Regular file (`100644`).
    Blob,
    /// Executable file (`100755`).
    BlobExecutable,
    /// Subdirectory (`040000`).
    Tree,
    /// Symbolic link (`120000`).
    Link,
    /// Gitlink / submodule (`160000`).
    Commit,
}

impl EntryMode {
    /// `true` for [`EntryMode::Tree`].
    #[must_use]
    pub const fn is_tree(self) -> bool {
        matches!(self, Self::Tree)
    }
}

/// A single entry in a git tree object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TreeEntry {
    /// File or directory name (just the basename, not a full path).
    pub name: String,
    /// The entry mode.
    pub mode: EntryMode,
    /// The OID of the blob, tree, or commit this entry points to.
    pub oid: GitOid,
}

/// Canonical git ordering of tree entries.
///
/// Names compare bytewise, with directories compared as if their name had a
/// trailing `/`. So `a.txt` sorts before the directory `a`, while the file `a`
/// sorts before `a.txt`.
#[must_use]
pub fn git_tree_order(a: &TreeEntry, b: &TreeEntry) -> Ordering {
    let key = |e: &TreeEntry| {
        e.name
            .as_bytes()
            .iter()
            .copied()
            .chain(e.mode.is_tree().then_some(b'/'))
            .collect::<Vec<u8>>()
    };
    key(a).cmp(&key(b))
}

// ---------------------------------------------------------------------------
// Index types
// ---------------------------------------------------------------------------

/// A single entry in the git index (staging area).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IndexEntry {
    /// Path relative to the repository root.
    pub path: String,
    /// The file mode.
    pub mode: EntryMode,
    /// OID of the blob in the index.
    pub oid: GitOid,
    /// Merge stage: 0 for a resolved entry, 1 ancestor, 2 ours, 3 theirs.
    pub stage: u8,
}

// ---------------------------------------------------------------------------
// Commit types
// ---------------------------------------------------------------------------

/// Information about a commit object.
///
/// Returned by [`GitRepo::read_commit`](crate::GitRepo::read_commit).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CommitInfo {
    /// OID of the tree this commit points to.
    pub tree_oid: GitOid,
    /// OIDs of parent commits (empty for root commits).
    pub parents: Vec<GitOid>,
    /// The commit message.
    pub message: String,
    /// Author identity string (e.g., `"Alice <alice@example.com>"`).
    pub author: String,
    /// Committer identity string.
    pub committer: String,
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(name: &str, mode: EntryMode) -> TreeEntry {
        TreeEntry {
            name: name.to_owned(),
            mode,
            oid: GitOid::ZERO,
        }
    }

    // -- GitOid --

    #[test]
    fn oid_roundtrip_hex() {
        let hex = "0123456789abcdef0123456789abcdef01234567";
        let oid: GitOid = hex.parse().unwrap();
        assert_eq!(oid.to_string(), hex);
    }

    #[test]
    fn oid_rejects_short_and_non_hex() {
        assert!("abc".parse::<GitOid>().is_err());
        assert!("g".repeat(40).parse::<GitOid>().is_err());
    }

    #[test]
    fn oid_zero() {
        assert!(GitOid::ZERO.is_zero());
        assert_eq!(GitOid::ZERO.to_string(), "0".repeat(40));
    }

    // -- RefName --

    #[test]
    fn refname_accepts_pristine_and_generation_refs() {
        assert!(RefName::new("refs/heads/sdk-pristine").is_ok());
        assert!(RefName::new("refs/speakeasy/gen/2024-06-01.abc_1").is_ok());
        assert!(RefName::new("HEAD").is_ok());
    }

    #[test]
    fn refname_rejects_malformed() {
        for bad in [
            "",
            "main",
            "refs/heads/",
            "refs/heads/a..b",
            "refs/heads/a b",
            "refs/heads/x.lock",
            "refs/speakeasy/gen/a~1",
            "refs/heads/a:b",
        ] {
            assert!(RefName::new(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    // -- Tree ordering --

    #[test]
    fn tree_order_treats_directories_as_trailing_slash() {
        let mut entries = vec![
            entry("a", EntryMode::Tree),
            entry("a.txt", EntryMode::Blob),
            entry("a-b", EntryMode::Blob),
        ];
        entries.sort_by(git_tree_order);
        let names: Vec<_> = entries.iter().map(|e| e.name.as_str()).collect();
        // '-' (0x2d) < '.' (0x2e) < '/' (0x2f)
        assert_eq!(names, ["a-b", "a.txt", "a"]);
    }

    #[test]
    fn tree_order_file_prefix_sorts_first() {
        let mut entries = vec![entry("ab", EntryMode::Blob), entry("a", EntryMode::Blob)];
        entries.sort_by(git_tree_order);
        assert_eq!(entries[0].name, "a");
    }
}
