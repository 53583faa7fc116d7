use std::path::Path;

use anyhow::{Context, Result};
use clap::Args;
use roundtrip::pregeneration::{FileChangeSummary, detect_file_changes};

use super::{EXIT_DIRTY, ExitCodeError, load_config, load_lockfile};

#[derive(Args, Debug)]
pub struct DetectArgs {
    /// Maximum entries to list before summarizing
    #[arg(long, default_value_t = 20)]
    pub max_lines: usize,

    /// Report only; don't record moves and deletions in the lockfile
    #[arg(long)]
    pub dry_run: bool,
}

pub fn run(out: &Path, args: &DetectArgs) -> Result<()> {
    let config = load_config(out)?;
    let mut lock = load_lockfile(out)?;

    let report = detect_file_changes(out, &mut lock, &config.scan)
        .context("scanning output directory")?;
    if !args.dry_run {
        lock.save(out).context("saving lockfile")?;
    }

    let summary = FileChangeSummary::new(&lock, &report);
    if summary.is_empty() {
        println!("No user edits in {}", out.display());
        return Ok(());
    }
    println!("{} file(s) touched since the last generation:", summary.len());
    println!("{}", summary.format(args.max_lines));

    if report.dirty {
        return Err(ExitCodeError(EXIT_DIRTY).into());
    }
    Ok(())
}
