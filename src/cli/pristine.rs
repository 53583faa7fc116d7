use std::io::Write as _;
use std::path::Path;

use anyhow::{Context, Result, bail};
use clap::Subcommand;
use roundtrip::pristine::{restore_pristine_all, restore_pristine_file, show_pristine};

use super::{load_lockfile, open_repo};

#[derive(Subcommand, Debug)]
pub enum PristineCommands {
    /// Print the pristine (generated) version of a tracked file
    Show {
        /// Tracked path, relative to the output directory
        path: String,
    },

    /// Discard user edits by rewriting files with their pristine content
    Restore {
        /// Tracked path to restore
        #[arg(required_unless_present = "all", conflicts_with = "all")]
        path: Option<String>,

        /// Restore every tracked file
        #[arg(long)]
        all: bool,
    },
}

pub fn run(out: &Path, cmd: PristineCommands) -> Result<()> {
    let lock = load_lockfile(out)?;
    let repo = open_repo(out)?;

    match cmd {
        PristineCommands::Show { path } => {
            let content = show_pristine(&repo, &lock, &path)?;
            std::io::stdout()
                .lock()
                .write_all(&content)
                .context("writing to stdout")?;
        }
        PristineCommands::Restore { path: Some(path), .. } => {
            let outcome = restore_pristine_file(&repo, out, &lock, &path)?;
            println!("{path}: {outcome}");
        }
        PristineCommands::Restore { path: None, all } => {
            if !all {
                bail!("pass a path or --all");
            }
            for (path, outcome) in restore_pristine_all(&repo, out, &lock)? {
                println!("{path}: {outcome}");
            }
        }
    }
    Ok(())
}
