use clap::{Parser, Subcommand};
use omni_constraints::{compare_snapshots, ConstraintProfile};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, Level};

mod logging;

#[derive(Parser, Debug)]
#[command(author, version, about = "Pin GPU/ML packages from environment snapshots", long_about = None)]
struct Cli {
    #[arg(long, default_value = "info")]
    log_level: Level,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Write a constraints file from a snapshot
    Build {
        #[arg(long, value_enum, default_value = "protected")]
        profile: ConstraintProfile,
        /// Directory the default snapshot and output paths are resolved against
        #[arg(long, default_value = ".")]
        root: PathBuf,
        #[arg(long = "in")]
        input: Option<PathBuf>,
        #[arg(long)]
        out: Option<PathBuf>,
    },
    /// Compare protected fields of pre- and post-install snapshots
    Drift {
        #[arg(long)]
        pre: PathBuf,
        #[arg(long)]
        post: PathBuf,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init_logging(cli.log_level);

    match cli.command {
        Commands::Build { profile, root, input, out } => {
            let input = input.unwrap_or_else(|| profile.default_input(&root));
            let out = out.unwrap_or_else(|| profile.default_output(&root));
            match omni_constraints::run(&input, &out, profile) {
                Ok(_) => {
                    println!("constraints_written={}", out.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{}", e);
                    eprintln!("{}", e);
                    ExitCode::from(e.exit_code() as u8)
                }
            }
        }
        Commands::Drift { pre, post } => {
            let report = compare_snapshots(&pre, &post);
            match serde_json::to_string_pretty(&report) {
                Ok(text) => println!("{}", text),
                Err(e) => eprintln!("{}", e),
            }
            if report.protected_env_ok {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
    }
}
