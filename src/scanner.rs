//! Identity scanner: walks the output tree and maps identity tokens to paths.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader, Read as _, Seek as _, SeekFrom};
use std::path::Path;

use walkdir::{DirEntry, WalkDir};

use crate::config::ScanConfig;
use crate::diff::{BINARY_SNIFF_LEN, is_binary};
use crate::error::RteError;
use crate::identity::Identity;
use crate::merge::{FileMode, VirtualFile};

/// Bidirectional identity ↔ path map for one scan. Never persisted.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScanResult {
    /// Identity → path (slash-separated, relative to the scan root).
    pub id_to_path: BTreeMap<Identity, String>,
    /// Path → identity.
    pub path_to_id: BTreeMap<String, Identity>,
    /// Later files claiming an identity already seen (copies), in walk order.
    pub duplicates: Vec<(Identity, String)>,
}

impl ScanResult {
    /// Where `id` currently lives, if anywhere.
    #[must_use]
    pub fn path_of(&self, id: &Identity) -> Option<&str> {
        self.id_to_path.get(id).map(String::as_str)
    }
}

/// Walks an output directory looking for identity tokens.
pub struct Scanner<'a> {
    root: &'a Path,
    config: &'a ScanConfig,
}

impl<'a> Scanner<'a> {
    /// A scanner over `root`.
    #[must_use]
    pub const fn new(root: &'a Path, config: &'a ScanConfig) -> Self {
        Self { root, config }
    }

    fn skipped(&self, entry: &DirEntry) -> bool {
        entry.depth() > 0
            && entry.file_type().is_dir()
            && entry
                .file_name()
                .to_str()
                .is_some_and(|name| self.config.skip_dirs.iter().any(|s| s == name))
    }

    /// Visit every regular file outside skipped directories, in file-name
    /// order, with its slash path relative to the root.
    fn walk(
        &self,
        mut visit: impl FnMut(&DirEntry, String) -> Result<(), RteError>,
    ) -> Result<(), RteError> {
        let walker = WalkDir::new(self.root)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(|e| !self.skipped(e));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) if e.depth() == 0 => {
                    return Err(RteError::io(
                        self.root,
                        e.into_io_error()
                            .unwrap_or_else(|| std::io::Error::other("walk failed")),
                    ));
                }
                Err(e) => {
                    tracing::debug!(error = %e, "skipping unreadable entry");
                    continue;
                }
            };
            if !entry.file_type().is_file() {
                continue;
            }
            if let Some(rel) = relative_slash_path(self.root, entry.path()) {
                visit(&entry, rel)?;
            }
        }
        Ok(())
    }

    /// Scan the tree. Unreadable files are skipped; a missing root yields an
    /// empty result.
    ///
    /// # Errors
    /// Returns [`RteError::Io`] only if the root itself cannot be walked.
    #[tracing::instrument(skip(self), fields(root = %self.root.display()))]
    pub fn scan(&self) -> Result<ScanResult, RteError> {
        let mut result = ScanResult::default();
        if !self.root.exists() {
            return Ok(result);
        }

        self.walk(|entry, rel| {
            match read_identity(entry.path(), self.config.header_lines) {
                Ok(Some(id)) => {
                    if let Some(first) = result.id_to_path.get(&id) {
                        tracing::warn!(%id, first = %first, copy = %rel, "identity appears in more than one file; keeping the first");
                        result.duplicates.push((id, rel));
                    } else {
                        result.path_to_id.insert(rel.clone(), id.clone());
                        result.id_to_path.insert(id, rel);
                    }
                }
                Ok(None) => {}
                Err(e) => tracing::debug!(path = %rel, error = %e, "skipping unreadable file"),
            }
            Ok(())
        })?;

        tracing::debug!(identities = result.id_to_path.len(), "scan complete");
        Ok(result)
    }

    /// Read every file under the root as generator output.
    ///
    /// Executable bits are carried over on unix.
    ///
    /// # Errors
    /// Any walk or read failure; generator output is never partially loaded.
    pub fn load_files(&self) -> Result<Vec<VirtualFile>, RteError> {
        let mut files = Vec::new();
        self.walk(|entry, rel| {
            let content = std::fs::read(entry.path()).map_err(|e| RteError::io(entry.path(), e))?;
            let metadata = entry
                .metadata()
                .map_err(|e| RteError::io(entry.path(), e.into()))?;
            let binary = is_binary(&content);
            let mut file = VirtualFile::new(rel, content).with_mode(mode_of(&metadata));
            file.is_binary = binary;
            files.push(file);
            Ok(())
        })?;
        Ok(files)
    }
}

#[cfg(unix)]
fn mode_of(metadata: &std::fs::Metadata) -> FileMode {
    use std::os::unix::fs::PermissionsExt as _;
    if metadata.permissions().mode() & 0o111 != 0 {
        FileMode::Executable
    } else {
        FileMode::Regular
    }
}

#[cfg(not(unix))]
const fn mode_of(_: &std::fs::Metadata) -> FileMode {
    FileMode::Regular
}

/// Slash-separated path of `path` relative to `root`.
pub(crate) fn relative_slash_path(root: &Path, path: &Path) -> Option<String> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Option<Vec<&str>> = rel.components().map(|c| c.as_os_str().to_str()).collect();
    Some(parts?.join("/"))
}

/// Identity in the file header, or `None` for binary or unmarked files.
fn read_identity(path: &Path, header_lines: usize) -> std::io::Result<Option<Identity>> {
    let mut file = File::open(path)?;
    let mut sniff = Vec::with_capacity(BINARY_SNIFF_LEN);
    (&mut file)
        .take(BINARY_SNIFF_LEN as u64)
        .read_to_end(&mut sniff)?;
    if is_binary(&sniff) {
        return Ok(None);
    }
    file.seek(SeekFrom::Start(0))?;

    let mut reader = BufReader::new(file);
    let mut line = Vec::new();
    for _ in 0..header_lines {
        line.clear();
        if reader.read_until(b'\n', &mut line)? == 0 {
            break;
        }
        if let Some(id) = Identity::find_in_line(&String::from_utf8_lossy(&line)) {
            return Ok(Some(id));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write(root: &Path, rel: &str, content: &[u8]) {
        let path = root.join(rel);
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        std::fs::write(path, content).unwrap();
    }

    #[test]
    fn builds_bidirectional_map() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/pet.go", b"// @generated-id: 0123456789ab\npackage models\n");
        write(dir.path(), "README.md", b"no token here\n");

        let config = ScanConfig::default();
        let scan = Scanner::new(dir.path(), &config).scan().unwrap();
        let id = Identity::parse("0123456789ab").unwrap();
        assert_eq!(scan.path_of(&id), Some("models/pet.go"));
        assert_eq!(scan.path_to_id.get("models/pet.go"), Some(&id));
        assert_eq!(scan.path_to_id.len(), 1);
    }

    #[test]
    fn skips_dependency_dirs_and_binaries() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "node_modules/x.js", b"// @generated-id: 111111111111\n");
        write(dir.path(), "vendor/y.go", b"// @generated-id: 222222222222\n");
        let mut binary = b"// @generated-id: 333333333333\n".to_vec();
        binary.push(0);
        write(dir.path(), "img.bin", &binary);

        let config = ScanConfig::default();
        let scan = Scanner::new(dir.path(), &config).scan().unwrap();
        assert!(scan.id_to_path.is_empty(), "{scan:?}");
    }

    #[test]
    fn token_past_header_window_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut content = "x\n".repeat(25);
        content.push_str("// @generated-id: 0123456789ab\n");
        write(dir.path(), "late.go", content.as_bytes());
        let config = ScanConfig::default();
        assert!(Scanner::new(dir.path(), &config).scan().unwrap().id_to_path.is_empty());
    }

    #[test]
    fn duplicate_identity_keeps_first_in_walk_order() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "a/pet.go", b"// @generated-id: 0123456789ab\n");
        write(dir.path(), "b/pet.go", b"// @generated-id: 0123456789ab\n");
        let config = ScanConfig::default();
        let scan = Scanner::new(dir.path(), &config).scan().unwrap();
        let id = Identity::parse("0123456789ab").unwrap();
        assert_eq!(scan.path_of(&id), Some("a/pet.go"));
        assert_eq!(scan.duplicates, [(id, "b/pet.go".to_owned())]);
    }

    #[test]
    fn load_files_reads_generator_output() {
        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "models/pet.go", b"package models\n");
        write(dir.path(), "node_modules/x.js", b"skip\n");
        write(dir.path(), "README.md", b"readme\n");

        let config = ScanConfig::default();
        let files = Scanner::new(dir.path(), &config).load_files().unwrap();
        let paths: Vec<&str> = files.iter().map(|f| f.path.as_str()).collect();
        assert_eq!(paths, ["README.md", "models/pet.go"]);
        assert_eq!(files[1].content, b"package models\n");
        assert!(!files[1].is_binary);
    }

    #[cfg(unix)]
    #[test]
    fn load_files_keeps_executable_bit() {
        use std::os::unix::fs::PermissionsExt as _;

        let dir = tempfile::tempdir().unwrap();
        write(dir.path(), "run.sh", b"#!/bin/sh\n");
        std::fs::set_permissions(
            dir.path().join("run.sh"),
            std::fs::Permissions::from_mode(0o755),
        )
        .unwrap();
        let config = ScanConfig::default();
        let files = Scanner::new(dir.path(), &config).load_files().unwrap();
        assert_eq!(files[0].mode, FileMode::Executable);
    }

    #[test]
    fn missing_root_is_empty() {
        let config = ScanConfig::default();
        let scan = Scanner::new(Path::new("/nonexistent/out"), &config)
            .scan()
            .unwrap();
        assert_eq!(scan, ScanResult::default());
    }
}
