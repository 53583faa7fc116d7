//! Round-trip configuration (`.rte/config.toml`).
//!
//! Controls merge concurrency, the shadow-branch refs and retry budget, and
//! which directories the identity scanner skips.

use std::fmt;
use std::path::Path;
use std::time::Duration;

use serde::Deserialize;

/// Hard ceiling on per-file merge workers.
pub const MAX_CONCURRENCY: usize = 10;

// ---------------------------------------------------------------------------
// Top-level config
// ---------------------------------------------------------------------------

/// Top-level round-trip configuration.
///
/// Missing file → all defaults (no error).
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct RteConfig {
    /// Merge engine settings.
    #[serde(default)]
    pub merge: MergeConfig,

    /// Pristine snapshot settings.
    #[serde(default)]
    pub shadow: ShadowConfig,

    /// Identity scanner settings.
    #[serde(default)]
    pub scan: ScanConfig,
}

// ---------------------------------------------------------------------------
// MergeConfig
// ---------------------------------------------------------------------------

/// Merge engine settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MergeConfig {
    /// Number of files merged in parallel (clamped to `1..=10`).
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl MergeConfig {
    /// The configured concurrency clamped to the supported range.
    #[must_use]
    pub fn effective_concurrency(&self) -> usize {
        self.concurrency.clamp(1, MAX_CONCURRENCY)
    }
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            concurrency: default_concurrency(),
        }
    }
}

const fn default_concurrency() -> usize {
    8
}

// ---------------------------------------------------------------------------
// ShadowConfig
// ---------------------------------------------------------------------------

/// Where pristine snapshots live and how hard to fight for the ref.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ShadowConfig {
    /// Branch holding pristine generated trees.
    #[serde(default = "default_branch")]
    pub branch: String,

    /// Namespace for per-generation refs; the generation id is appended.
    #[serde(default = "default_generation_prefix")]
    pub generation_prefix: String,

    /// Total CAS attempts before the batch fails.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Base backoff between attempts, in milliseconds. Attempt `n` waits
    /// `n * backoff_ms`.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Commit message for snapshot commits.
    #[serde(default = "default_message")]
    pub message: String,

    /// Remote used for generation refs.
    #[serde(default = "default_remote")]
    pub remote: Option<String>,

    /// Push each generation ref to `remote` in the background.
    #[serde(default)]
    pub push: bool,
}

impl ShadowConfig {
    /// Backoff unit as a [`Duration`].
    #[must_use]
    pub const fn backoff(&self) -> Duration {
        Duration::from_millis(self.backoff_ms)
    }
}

impl Default for ShadowConfig {
    fn default() -> Self {
        Self {
            branch: default_branch(),
            generation_prefix: default_generation_prefix(),
            max_attempts: default_max_attempts(),
            backoff_ms: default_backoff_ms(),
            message: default_message(),
            remote: default_remote(),
            push: false,
        }
    }
}

fn default_branch() -> String {
    "refs/heads/sdk-pristine".to_owned()
}

fn default_generation_prefix() -> String {
    "refs/speakeasy/gen/".to_owned()
}

const fn default_max_attempts() -> u32 {
    3
}

const fn default_backoff_ms() -> u64 {
    50
}

fn default_message() -> String {
    "Update sdk-pristine state".to_owned()
}

#[allow(clippy::unnecessary_wraps)]
fn default_remote() -> Option<String> {
    Some("origin".to_owned())
}

// ---------------------------------------------------------------------------
// ScanConfig
// ---------------------------------------------------------------------------

/// Identity scanner settings.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ScanConfig {
    /// Directory names never descended into.
    #[serde(default = "default_skip_dirs")]
    pub skip_dirs: Vec<String>,

    /// How many leading lines are searched for an identity token.
    #[serde(default = "default_header_lines")]
    pub header_lines: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            skip_dirs: default_skip_dirs(),
            header_lines: default_header_lines(),
        }
    }
}

fn default_skip_dirs() -> Vec<String> {
    [
        ".git",
        ".rte",
        "node_modules",
        "vendor",
        ".venv",
        "__pycache__",
        "target",
    ]
    .into_iter()
    .map(str::to_owned)
    .collect()
}

const fn default_header_lines() -> usize {
    20
}

// ---------------------------------------------------------------------------
// Loading
// ---------------------------------------------------------------------------

/// Error loading a round-trip configuration file.
#[derive(Debug)]
pub struct ConfigError {
    /// The path that was being loaded (if available).
    pub path: Option<std::path::PathBuf>,
    /// Human-readable message with line-level detail when possible.
    pub message: String,
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(p) = &self.path {
            write!(f, "{}: {}", p.display(), self.message)
        } else {
            write!(f, "config error: {}", self.message)
        }
    }
}

impl std::error::Error for ConfigError {}

impl RteConfig {
    /// Load configuration for an output directory (`<out>/.rte/config.toml`).
    ///
    /// # Errors
    /// See [`RteConfig::load`].
    pub fn load_for(out_dir: &Path) -> Result<Self, ConfigError> {
        Self::load(&crate::state_dir(out_dir).join("config.toml"))
    }

    /// Load configuration from a TOML file.
    ///
    /// - If the file does not exist, returns all defaults (not an error).
    /// - Invalid TOML or unknown fields produce a [`ConfigError`] with the
    ///   offending line.
    ///
    /// # Errors
    /// Returns `ConfigError` on I/O errors (other than not-found) or parse errors.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(ConfigError {
                    path: Some(path.to_owned()),
                    message: format!("could not read file: {e}"),
                });
            }
        };
        Self::parse(&contents).map_err(|mut e| {
            e.path = Some(path.to_owned());
            e
        })
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    /// Returns `ConfigError` on invalid TOML, unknown fields, or values that
    /// cannot work (zero attempts, a ref outside `refs/`).
    pub fn parse(toml_str: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(toml_str).map_err(|e| {
            let mut message = e.message().to_owned();
            if let Some(span) = e.span() {
                let line = toml_str[..span.start]
                    .chars()
                    .filter(|&c| c == '\n')
                    .count()
                    + 1;
                message = format!("line {line}: {message}");
            }
            ConfigError {
                path: None,
                message,
            }
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |message: String| {
            Err(ConfigError {
                path: None,
                message,
            })
        };
        if self.shadow.max_attempts == 0 {
            return invalid("shadow.max_attempts must be at least 1".to_owned());
        }
        if !self.shadow.branch.starts_with("refs/") {
            return invalid(format!(
                "shadow.branch must be a full ref name, got '{}'",
                self.shadow.branch
            ));
        }
        if !self.shadow.generation_prefix.starts_with("refs/")
            || !self.shadow.generation_prefix.ends_with('/')
        {
            return invalid(format!(
                "shadow.generation_prefix must start with 'refs/' and end with '/', got '{}'",
                self.shadow.generation_prefix
            ));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_all_fields() {
        let cfg = RteConfig::default();
        assert_eq!(cfg.merge.concurrency, 8);
        assert_eq!(cfg.shadow.branch, "refs/heads/sdk-pristine");
        assert_eq!(cfg.shadow.generation_prefix, "refs/speakeasy/gen/");
        assert_eq!(cfg.shadow.max_attempts, 3);
        assert_eq!(cfg.shadow.backoff(), Duration::from_millis(50));
        assert_eq!(cfg.shadow.remote.as_deref(), Some("origin"));
        assert!(!cfg.shadow.push);
        assert!(cfg.scan.skip_dirs.iter().any(|d| d == "node_modules"));
        assert_eq!(cfg.scan.header_lines, 20);
    }

    #[test]
    fn parse_empty_string() {
        assert_eq!(RteConfig::parse("").unwrap(), RteConfig::default());
    }

    #[test]
    fn parse_partial_config_uses_defaults() {
        let cfg = RteConfig::parse(
            r#"
[shadow]
push = true
remote = "upstream"
"#,
        )
        .unwrap();
        assert!(cfg.shadow.push);
        assert_eq!(cfg.shadow.remote.as_deref(), Some("upstream"));
        assert_eq!(cfg.shadow.max_attempts, 3);
        assert_eq!(cfg.merge, MergeConfig::default());
    }

    #[test]
    fn concurrency_is_clamped() {
        let cfg = RteConfig::parse("[merge]\nconcurrency = 64\n").unwrap();
        assert_eq!(cfg.merge.effective_concurrency(), MAX_CONCURRENCY);
        let cfg = RteConfig::parse("[merge]\nconcurrency = 0\n").unwrap();
        assert_eq!(cfg.merge.effective_concurrency(), 1);
    }

    #[test]
    fn parse_rejects_unknown_nested_field() {
        let err = RteConfig::parse("[shadow]\nbranchh = \"x\"\n").unwrap_err();
        assert!(err.message.contains("line 2"), "{}", err.message);
    }

    #[test]
    fn parse_rejects_zero_attempts_and_short_refs() {
        assert!(RteConfig::parse("[shadow]\nmax_attempts = 0\n").is_err());
        assert!(RteConfig::parse("[shadow]\nbranch = \"sdk-pristine\"\n").is_err());
        assert!(RteConfig::parse("[shadow]\ngeneration_prefix = \"refs/gen\"\n").is_err());
    }

    #[test]
    fn load_missing_file_returns_defaults() {
        let cfg = RteConfig::load(Path::new("/nonexistent/config.toml")).unwrap();
        assert_eq!(cfg, RteConfig::default());
    }

    #[test]
    fn load_for_reads_state_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".rte")).unwrap();
        std::fs::write(
            dir.path().join(".rte/config.toml"),
            "[scan]\nheader_lines = 5\n",
        )
        .unwrap();
        let cfg = RteConfig::load_for(dir.path()).unwrap();
        assert_eq!(cfg.scan.header_lines, 5);
    }

    #[test]
    fn load_invalid_file_shows_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.toml");
        std::fs::write(&path, "not valid [[[toml").unwrap();
        let err = RteConfig::load(&path).unwrap_err();
        assert_eq!(err.path.as_deref(), Some(path.as_path()));
        assert!(err.to_string().contains("bad.toml"));
    }
}
