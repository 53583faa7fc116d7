use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};

mod cli;

/// Round-trip engineering for generated SDKs
///
/// Regenerates code without losing hand-written edits. Each generated file
/// carries an `@generated-id:` header; rte tracks the pristine version of
/// every file on a hidden git branch and three-way merges new generator
/// output with whatever the user changed.
///
/// WORKFLOW:
///
///   1. rte detect                      # what did users touch?
///   2. rte regen --generated <dir>     # merge fresh output into the tree
///   3. resolve conflicts (git status shows them as UU), commit
///
/// State lives in <out>/.rte/ (lock.json, config.toml, patches/).
///
/// EXIT CODES:
///   0 success, 1 error, 2 regeneration left conflicts, 3 detect found edits
#[derive(Parser)]
#[command(name = "rte")]
#[command(version, about)]
#[command(propagate_version = true)]
#[command(after_help = "See 'rte <command> --help' for more information on a specific command.")]
struct Cli {
    /// Generated output directory (the SDK root)
    #[arg(long, short = 'o', global = true, default_value = ".", env = "RTE_OUT_DIR")]
    out: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconcile tracking with the tree and list user edits
    ///
    /// Finds moved and deleted files by identity, records them in the
    /// lockfile, and lists files whose content differs from the last write.
    Detect(cli::detect::DetectArgs),

    /// Merge freshly generated files into the output tree
    Regen(cli::regen::RegenArgs),

    /// Show user edits as a unified diff against the pristine version
    Diff(cli::diff::DiffArgs),

    /// Inspect or restore pristine file versions
    #[command(subcommand)]
    Pristine(cli::pristine::PristineCommands),

    /// Manage the custom-code patch (.rte/patches/custom-code.diff)
    #[command(subcommand)]
    Patch(cli::patch::PatchCommands),
}

fn main() -> ExitCode {
    let _telemetry = roundtrip::telemetry::init();
    let Cli { out, command } = Cli::parse();

    let result = match command {
        Commands::Detect(args) => cli::detect::run(&out, &args),
        Commands::Regen(args) => cli::regen::run(&out, &args),
        Commands::Diff(args) => cli::diff::run(&out, &args),
        Commands::Pristine(cmd) => cli::pristine::run(&out, cmd),
        Commands::Patch(cmd) => cli::patch::run(&out, &cmd),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            if let Some(cli::ExitCodeError(code)) = e.downcast_ref() {
                return ExitCode::from(*code);
            }
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}
