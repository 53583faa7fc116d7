use std::path::Path;

use anyhow::{Context, Result};
use roundtrip::{Lockfile, RteConfig};
use roundtrip_git::GixRepo;

pub mod detect;
pub mod diff;
pub mod patch;
pub mod pristine;
pub mod regen;

/// Finish with a specific exit code and no further message.
#[derive(Debug)]
pub struct ExitCodeError(pub u8);

impl std::fmt::Display for ExitCodeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "exit code {}", self.0)
    }
}

impl std::error::Error for ExitCodeError {}

/// Regeneration finished but left conflict markers.
pub const EXIT_CONFLICTS: u8 = 2;
/// `detect` found user edits.
pub const EXIT_DIRTY: u8 = 3;

pub fn load_config(out: &Path) -> Result<RteConfig> {
    RteConfig::load_for(out).with_context(|| format!("loading config for {}", out.display()))
}

pub fn load_lockfile(out: &Path) -> Result<Lockfile> {
    Lockfile::load(out).context("loading lockfile")
}

pub fn open_repo(out: &Path) -> Result<GixRepo> {
    let out = out
        .canonicalize()
        .with_context(|| format!("resolving {}", out.display()))?;
    GixRepo::open(&out).with_context(|| format!("no git repository at or above {}", out.display()))
}
