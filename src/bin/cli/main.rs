//! CLI tool for arcx archive operations.

mod commands;
mod exit_codes;
mod file_selector;
mod logger;
mod output;
mod password;
mod progress;
mod prompt;

use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use clap_complete::{Shell, generate};
use std::path::PathBuf;

use exit_codes::ExitCode;

/// Detect and extract archives
#[derive(Parser)]
#[command(name = "arcx")]
#[command(author, version, about = "Detect and extract archives", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[command(flatten)]
    global: GlobalArgs,
}

/// Flags shared by every command.
#[derive(Args)]
pub struct GlobalArgs {
    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    /// Suppress progress and summary output
    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// More log output (repeatable)
    #[arg(long, short = 'v', action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Never prompt: overwrite, ignore errors, pick the most nested format
    #[arg(long, short = 'y', global = true)]
    yes: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every format chain the file opens as (alias: d)
    #[command(alias = "d")]
    Detect {
        /// File to probe
        archive: PathBuf,

        /// Password for encrypted headers
        #[arg(short = 'p', long)]
        password: Option<String>,
    },

    /// List archive contents (alias: l)
    #[command(alias = "l")]
    List {
        /// Archive file to list
        archive: PathBuf,

        /// Index of the format chain to open, as printed by `detect`
        #[arg(long, value_name = "N")]
        format: Option<usize>,

        /// Password (will prompt if needed)
        #[arg(short = 'p', long)]
        password: Option<String>,
    },

    /// Extract files from archive (alias: x)
    #[command(alias = "x")]
    Extract {
        /// Archive file to extract
        archive: PathBuf,

        /// Output directory
        #[arg(short = 'o', long, default_value = ".")]
        output: PathBuf,

        /// File patterns to extract (glob patterns supported)
        #[arg(short = 'i', long)]
        include: Vec<String>,

        /// File patterns to exclude
        #[arg(short = 'e', long)]
        exclude: Vec<String>,

        /// What to do with existing files
        #[arg(long, value_enum, default_value = "ask")]
        overwrite: OverwriteMode,

        /// Skip failures without asking
        #[arg(long)]
        ignore_errors: bool,

        /// Password (will prompt if needed and not provided)
        #[arg(short = 'p', long)]
        password: Option<String>,

        /// Index of the format chain to open, as printed by `detect`
        #[arg(long, value_name = "N")]
        format: Option<usize>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}

#[derive(Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum OverwriteMode {
    Ask,
    Always,
    Never,
}

fn main() {
    let cli = Cli::parse();
    let global = cli.global;

    logger::init(logger::level(global.verbose, global.quiet));
    progress::install_interrupt_handler();

    let exit_code = match cli.command {
        Commands::Detect { archive, password } => commands::detect(&archive, password, &global),

        Commands::List {
            archive,
            format,
            password,
        } => commands::list(&archive, password, format, &global),

        Commands::Extract {
            archive,
            output,
            include,
            exclude,
            overwrite,
            ignore_errors,
            password,
            format,
        } => commands::extract(
            commands::ExtractConfig {
                archive_path: &archive,
                output_dir: output,
                include: &include,
                exclude: &exclude,
                overwrite,
                ignore_errors,
                password,
                format,
            },
            &global,
        ),

        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            generate(shell, &mut cmd, name, &mut std::io::stdout());
            ExitCode::Success
        }
    };

    std::process::exit(exit_code.code());
}
