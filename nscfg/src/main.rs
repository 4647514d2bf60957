use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use nscfg::config::NscfgConfig;
use nscfg::dispatch::{self, Invocation, Operation, EXIT_FAILURE};

/// Synchronize name service configuration between SMF and the legacy files
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args, Debug)]
struct Common {
    /// Increase verbosity (repeatable)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only print errors
    #[arg(short, long)]
    quiet: bool,

    /// Service FMRI, e.g. svc:/network/dns/client:default
    fmri: String,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Load the legacy file(s) into the service's properties
    Import {
        /// Import even if the service is already configured
        #[arg(short, long)]
        force: bool,

        /// Parse and check only; do not change the store
        #[arg(short = 'n', long)]
        no_write: bool,

        #[command(flatten)]
        common: Common,
    },

    /// Write the service's properties out to the legacy file(s)
    Export {
        /// Render and compare only; do not write files
        #[arg(short = 'n', long)]
        no_write: bool,

        #[command(flatten)]
        common: Common,
    },

    /// Reset the service's properties to their defaults
    Unconfig {
        #[command(flatten)]
        common: Common,
    },

    /// Check the service's stored properties
    Validate {
        #[command(flatten)]
        common: Common,
    },
}

impl Commands {
    fn into_invocation(self) -> (Invocation, u8) {
        let (operation, force, no_write, common) = match self {
            Commands::Import {
                force,
                no_write,
                common,
            } => (Operation::Import, force, no_write, common),
            Commands::Export { no_write, common } => (Operation::Export, false, no_write, common),
            Commands::Unconfig { common } => (Operation::Unconfig, false, false, common),
            Commands::Validate { common } => (Operation::Validate, false, false, common),
        };
        let invocation = Invocation {
            operation,
            fmri: common.fmri,
            force,
            no_write,
            quiet: common.quiet,
        };
        (invocation, common.verbose)
    }
}

fn init_tracing(verbose: u8) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(match verbose {
            0 => "warn",
            1 => "info",
            2 => "debug",
            _ => "trace",
        })
    });
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let code = if e.use_stderr() { EXIT_FAILURE } else { 0 };
            let _ = e.print();
            return ExitCode::from(code);
        }
    };

    let (invocation, verbose) = cli.command.into_invocation();
    init_tracing(verbose);

    let cfg = match NscfgConfig::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("{:?}", miette::Report::new(e));
            return ExitCode::from(EXIT_FAILURE);
        }
    };

    ExitCode::from(dispatch::run(&invocation, &cfg))
}
