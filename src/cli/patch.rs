use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use roundtrip::patch::{
    ApplyReport, apply_patch, capture_patch, load_patch, patch_path, revert_patch, save_patch,
};

use super::{load_lockfile, open_repo};

#[derive(Subcommand, Debug)]
pub enum PatchCommands {
    /// Record every user edit into the custom-code patch
    ///
    /// The patch is removed when there are no edits left.
    Capture,

    /// Re-apply the custom-code patch onto the output tree
    Apply,

    /// Undo a previously applied custom-code patch
    Revert,
}

pub fn run(out: &Path, cmd: &PatchCommands) -> Result<()> {
    match cmd {
        PatchCommands::Capture => capture(out),
        PatchCommands::Apply => apply(out, false),
        PatchCommands::Revert => apply(out, true),
    }
}

fn capture(out: &Path) -> Result<()> {
    let lock = load_lockfile(out)?;
    let repo = open_repo(out)?;
    let text = capture_patch(&repo, out, &lock).context("capturing custom code")?;
    match save_patch(out, &text)? {
        Some(path) => println!("Saved custom-code patch to {}", path.display()),
        None => println!("No custom code; removed {}", patch_path(out).display()),
    }
    Ok(())
}

fn apply(out: &Path, revert: bool) -> Result<()> {
    let Some(text) = load_patch(out)? else {
        println!("No custom-code patch at {}", patch_path(out).display());
        return Ok(());
    };
    let report = if revert {
        revert_patch(out, &text)?
    } else {
        apply_patch(out, &text)?
    };
    print_report(&report);
    if !report.is_clean() {
        bail!("{} file(s) did not apply cleanly", report.rejected.len());
    }
    Ok(())
}

fn print_report(report: &ApplyReport) {
    for path in &report.applied {
        println!("  patched  {path}");
    }
    for (path, reason) in &report.rejected {
        eprintln!("  rejected {path}: {reason}");
    }
}
