//! `hotweave weave`: Make a module's methods replaceable at runtime.

use crate::output::StyledOutput;
use anyhow::Context;
use clap::Args;
use hotweave_weaver::{WeaveConfig, WeaveOptions, WeavePolicy, WeaveReport, Weaver};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Config file picked up from the project directory when `--config` is absent
pub const CONFIG_FILE: &str = "weave.toml";

/// Arguments of `hotweave weave`
#[derive(Debug, Args)]
pub struct WeaveArgs {
    /// Module to weave (.hwm), relative to --project-dir when given
    pub assembly: PathBuf,

    /// Directory the module path is resolved against
    #[arg(long)]
    pub project_dir: Option<PathBuf>,

    /// Semicolon-delimited paths of referenced modules
    #[arg(short, long, default_value = "")]
    pub references: String,

    /// Write the woven module here instead of weaving in place
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Add overrides for inherited virtual methods
    #[arg(long)]
    pub allow_override: bool,

    /// Write debug symbols next to the output
    #[arg(long)]
    pub debug_symbols: bool,

    /// Debug symbol flavor; "none" disables symbols
    #[arg(long)]
    pub debug_type: Option<String>,

    /// Config file (defaults to weave.toml in the project directory)
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

pub fn execute(args: WeaveArgs, verbose: bool, out: &mut StyledOutput) -> anyhow::Result<()> {
    let config = load_config(args.config.as_deref(), args.project_dir.as_deref())?;

    let mut options = WeaveOptions::new(args.assembly);
    options.project_dir = args.project_dir;
    options.output = args.output;
    options.references = args.references;
    options.allow_override = args.allow_override;
    options.debug_symbols = args.debug_symbols;
    options.debug_type = args.debug_type;

    let policy = match config {
        Some(config) => {
            options.apply_config(&config.options);
            config.policy
        }
        None => WeavePolicy::default(),
    };

    let input = options.input_path();
    let output = options.output_path();
    let weaver = Weaver::new(options, policy);
    let report = weaver
        .execute()
        .with_context(|| format!("failed to weave {}", input.display()))?;

    print_report(out, &output, &report, verbose);
    Ok(())
}

fn load_config(explicit: Option<&Path>, project_dir: Option<&Path>) -> anyhow::Result<Option<WeaveConfig>> {
    let path = match explicit {
        Some(path) => path.to_path_buf(),
        None => {
            let candidate = project_dir.unwrap_or(Path::new(".")).join(CONFIG_FILE);
            if !candidate.is_file() {
                return Ok(None);
            }
            candidate
        }
    };
    debug!("Using config {}", path.display());
    let config = WeaveConfig::from_file(&path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(Some(config))
}

fn print_report(out: &mut StyledOutput, output: &Path, report: &WeaveReport, verbose: bool) {
    out.status("Woven", &output.display().to_string());

    let rows = [
        ("types", report.types_woven),
        ("methods", report.methods_woven),
        ("overrides", report.overrides_synthesized),
        ("shims", report.shims_emitted),
        ("skipped", report.skipped.len()),
    ];
    for (label, count) in rows {
        out.row(label, &count.to_string());
    }

    if verbose {
        for entry in &report.skipped {
            out.warning("  skip ");
            match &entry.method {
                Some(method) => out.plain(&format!("{}::{}", entry.type_name, method)),
                None => out.plain(&entry.type_name),
            }
            out.dim(&format!(" ({})", entry.reason));
            out.newline();
        }
    }
}
