//! runtime-sweep command-line entry point

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use runtime_sweep::plan::builtin::{builtin, unresolved, BUILTIN_FAMILIES};
use runtime_sweep::plan::{SweepPlan, DEFAULT_BENCH_DIR};

#[derive(Parser, Debug)]
#[command(
    name = "runtime-sweep",
    version,
    about = "Run parameter sweeps over benchmark binaries and collect their reports."
)]
struct Cli {
    /// Subcommand to execute.
    #[command(subcommand)]
    command: Command,
    /// Directory result tables, charts and manifests are written to.
    #[arg(long, global = true, value_name = "DIR")]
    output_dir: Option<PathBuf>,
    /// Kill any single invocation running longer than this.
    #[arg(long, global = true, value_name = "SECS")]
    timeout_secs: Option<u64>,
    /// Skip dropping the page cache before I/O invocations.
    #[arg(long, global = true)]
    no_drop_caches: bool,
    /// Directory relative subject paths are resolved against.
    #[arg(long, global = true, value_name = "DIR", default_value = DEFAULT_BENCH_DIR)]
    bench_dir: PathBuf,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a plan loaded from a JSON file.
    Run {
        /// Plan file.
        #[arg(value_name = "FILE")]
        plan: PathBuf,
    },
    /// Run a built-in benchmark family.
    Builtin {
        /// Family name.
        #[arg(value_parser = clap::builder::PossibleValuesParser::new(BUILTIN_FAMILIES))]
        family: String,
    },
    /// Print a built-in family as an editable JSON plan.
    PrintPlan {
        /// Family name.
        #[arg(value_parser = clap::builder::PossibleValuesParser::new(BUILTIN_FAMILIES))]
        family: String,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();
    match &cli.command {
        Command::Run { plan } => {
            let loaded = SweepPlan::from_json_file(plan)
                .with_context(|| format!("failed to load plan {}", plan.display()))?;
            execute(&cli, loaded.with_bench_dir(&cli.bench_dir))
        }
        Command::Builtin { family } => execute(&cli, builtin(family, &cli.bench_dir)?),
        Command::PrintPlan { family } => {
            // Bare program names; `run` resolves them against --bench-dir.
            println!("{}", unresolved(family)?.to_json()?);
            Ok(())
        }
    }
}

fn execute(cli: &Cli, mut plan: SweepPlan) -> Result<()> {
    if let Some(dir) = &cli.output_dir {
        plan.output_dir.clone_from(dir);
    }
    if cli.timeout_secs.is_some() {
        plan.timeout_secs = cli.timeout_secs;
    }
    if cli.no_drop_caches {
        plan.environment.drop_caches = false;
    }

    let outcomes = plan
        .execute()
        .with_context(|| format!("sweep plan `{}` failed", plan.name))?;
    for outcome in &outcomes {
        for artifact in &outcome.artifacts {
            info!(axis = %outcome.axis, kind = artifact.kind(), path = %artifact.path().display(), "artifact");
        }
        println!("{}", outcome.manifest.display());
    }
    Ok(())
}
