use std::path::Path;

use anyhow::{Result, bail};
use clap::Args;
use roundtrip::diff::{DiffOutcome, FileDiff, compute_file_diff, compute_tracked_diffs};
use roundtrip_git::GitRepo;

use super::{load_lockfile, open_repo};

#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Tracked path to diff (default: every edited file)
    pub path: Option<String>,

    /// Print added/removed line counts instead of the diff
    #[arg(long)]
    pub stat: bool,
}

pub fn run(out: &Path, args: &DiffArgs) -> Result<()> {
    let lock = load_lockfile(out)?;
    let repo = open_repo(out)?;

    let diffs = match &args.path {
        Some(path) => {
            let Some(tracked) = lock.tracked_files.get(path) else {
                bail!("{path} is not tracked");
            };
            let mut diff = compute_file_diff(
                out,
                tracked.disk_path(path),
                tracked.pristine_blob_hash.as_deref(),
                Some(&repo as &dyn GitRepo),
            );
            diff.path.clone_from(path);
            vec![diff]
        }
        None => compute_tracked_diffs(out, &lock, &repo),
    };

    if diffs.is_empty() {
        println!("No user edits.");
        return Ok(());
    }
    for diff in &diffs {
        if args.stat {
            print_stat(diff);
        } else if let DiffOutcome::Changed { text, .. } = &diff.outcome {
            print!("{text}");
        } else {
            println!("{}: {}", diff.path, diff.outcome);
        }
    }
    Ok(())
}

fn print_stat(diff: &FileDiff) {
    match &diff.outcome {
        DiffOutcome::Changed { stats, .. } => {
            println!(" {} | +{} -{}", diff.path, stats.added, stats.removed);
        }
        other => println!(" {} | {other}", diff.path),
    }
}
