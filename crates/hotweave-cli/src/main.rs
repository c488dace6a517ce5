//! Hotweave command-line tool
//!
//! Weaves compiled `.hwm` modules so their methods can be replaced while the
//! program runs, and inspects or verifies modules before and after weaving.

mod commands;
mod output;

use clap::{Parser, Subcommand};
use commands::weave::WeaveArgs;
use output::{resolve_color_choice, StyledOutput};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "hotweave")]
#[command(about = "Hot-reload weaver for hotweave modules", long_about = None)]
#[command(version)]
struct Cli {
    /// When to use colors: auto, always, never
    #[arg(long, global = true)]
    color: Option<String>,

    /// Print debug diagnostics
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Make every eligible method of a module replaceable at runtime
    Weave(WeaveArgs),

    /// Show the contents of a module
    Inspect {
        /// Module file (.hwm)
        module: PathBuf,
        /// Show one type in detail, including method bodies
        #[arg(short, long = "type")]
        type_name: Option<String>,
    },

    /// Check a module's structure and checksums
    Verify {
        /// Module file (.hwm)
        module: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let mut out = StyledOutput::new(resolve_color_choice(cli.color.as_deref()));
    let result = match cli.command {
        Commands::Weave(args) => commands::weave::execute(args, cli.verbose, &mut out),
        Commands::Inspect { module, type_name } => {
            commands::inspect::execute(&module, type_name.as_deref(), &mut out)
        }
        Commands::Verify { module } => commands::verify::execute(&module, &mut out),
    };
    out.flush();

    if let Err(e) = result {
        out.error(&format!("{:#}", e));
        std::process::exit(1);
    }
}
