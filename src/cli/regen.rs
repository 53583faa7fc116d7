use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::Args;
use roundtrip::scanner::Scanner;
use roundtrip::{BatchOptions, Engine, MergeStatus};

use super::{EXIT_CONFLICTS, ExitCodeError, load_config, load_lockfile};

#[derive(Args, Debug)]
pub struct RegenArgs {
    /// Directory holding the generator's fresh output
    #[arg(long, short = 'g')]
    pub generated: PathBuf,

    /// Publish the pristine snapshot as refs/speakeasy/gen/<ID>
    #[arg(long, value_name = "ID")]
    pub generation_id: Option<String>,

    /// Stop tracking files the generator no longer emits
    #[arg(long)]
    pub prune: bool,
}

pub fn run(out: &Path, args: &RegenArgs) -> Result<()> {
    if !args.generated.is_dir() {
        bail!("generated output {} is not a directory", args.generated.display());
    }
    let config = load_config(out)?;
    let files = Scanner::new(&args.generated, &config.scan)
        .load_files()
        .with_context(|| format!("reading {}", args.generated.display()))?;

    std::fs::create_dir_all(out).with_context(|| format!("creating {}", out.display()))?;
    let engine = Engine::open(out, &config).context("opening repository")?;
    let mut lock = load_lockfile(out)?;

    let options = BatchOptions {
        generation_id: args.generation_id.clone(),
        prune: args.prune,
    };
    let report = engine
        .process_batch(&files, &mut lock, &options)
        .context("regeneration failed; nothing was recorded")?;

    if options.generation_id.is_some() {
        lock.generation_id.clone_from(&options.generation_id);
    }
    lock.save(out).context("saving lockfile")?;

    for result in &report.results {
        if !matches!(result.status, MergeStatus::Clean) {
            println!("{:>12}  {}", result.status, result.disk_path);
        }
    }
    for path in &report.pruned {
        println!("{:>12}  {path}", "untracked");
    }
    println!(
        "{} file(s): {} created, {} fast-forward, {} clean, {} conflict, {} binary, {} skipped",
        report.results.len(),
        report.count(MergeStatus::Created),
        report.count(MergeStatus::FastForward),
        report.count(MergeStatus::Clean),
        report.count(MergeStatus::Conflict),
        report.count(MergeStatus::Binary),
        report.count(MergeStatus::Skipped),
    );

    let conflicted = report.conflicted_paths().len();
    if let Some(handle) = report.publish
        && handle.join().is_err()
    {
        eprintln!("warning: generation push thread panicked");
    }

    if conflicted > 0 {
        eprintln!("{conflicted} file(s) have conflicts; resolve them and commit");
        return Err(ExitCodeError(EXIT_CONFLICTS).into());
    }
    Ok(())
}
