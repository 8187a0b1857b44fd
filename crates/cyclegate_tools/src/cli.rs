#![forbid(unsafe_code)]

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use cyclegate_engines::executor::SimulatedExecutor;
use cyclegate_os::cycle::{run_cycle, CycleRequest};
use cyclegate_os::evaluate::evaluate_registry;
use cyclegate_os::probe_flow::run_probe;
use cyclegate_os::summary::Summary;
use cyclegate_os::{CycleContext, OrchestratorConfig, OrchestratorError};
use tracing::debug;

/// Probe the host, run candidate units in shadow, and gate their promotion.
#[derive(Parser, Debug)]
#[command(name = "cyclegate", version, about, long_about = None)]
pub struct Cli {
    /// Print the summary as JSON instead of text
    #[arg(long, global = true)]
    pub json: bool,

    /// Unit registry document
    #[arg(long, global = true, env = "CYCLEGATE_REGISTRY")]
    pub registry: Option<PathBuf>,

    /// Compatibility matrix document
    #[arg(long, global = true, env = "CYCLEGATE_MATRIX")]
    pub matrix: Option<PathBuf>,

    /// Probe report cache
    #[arg(long, global = true, env = "CYCLEGATE_PROBE_REPORT")]
    pub probe_report: Option<PathBuf>,

    /// Directory of cycle records
    #[arg(long, global = true, env = "CYCLEGATE_CYCLES_DIR")]
    pub cycles: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Probe host capabilities and match the compatibility matrix
    Probe {
        /// Reuse a cached report younger than the TTL
        #[arg(long)]
        use_cache: bool,
    },
    /// Execute one cycle for a unit
    RunCycle {
        /// Unit to run; defaults to the first eligible unit
        #[arg(long)]
        unit: Option<String>,
        /// Stop after lane selection; write nothing
        #[arg(long)]
        dry_run: bool,
        /// Evaluate gates for all units after recording the cycle
        #[arg(long)]
        evaluate: bool,
        /// Seed for the simulated executor
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Evaluate activation gates for every unit in the registry
    Evaluate {
        /// Report recommendations without applying transitions
        #[arg(long)]
        dry_run: bool,
    },
}

impl Cli {
    /// Environment config with this invocation's path flags applied on top.
    pub fn config(&self) -> Result<OrchestratorConfig, OrchestratorError> {
        let mut config = OrchestratorConfig::from_env()?;
        self.apply_overrides(&mut config);
        Ok(config)
    }

    pub fn apply_overrides(&self, config: &mut OrchestratorConfig) {
        if let Some(path) = &self.registry {
            config.registry_path = path.clone();
        }
        if let Some(path) = &self.matrix {
            config.matrix_path = path.clone();
        }
        if let Some(path) = &self.probe_report {
            config.probe_report_path = path.clone();
        }
        if let Some(path) = &self.cycles {
            config.cycles_dir = path.clone();
        }
    }
}

/// Runs one command against a prepared context.
pub fn execute(
    ctx: &CycleContext,
    command: &Command,
    now: DateTime<Utc>,
) -> Result<Summary, OrchestratorError> {
    debug!(?command, "dispatching");
    match command {
        Command::Probe { use_cache } => run_probe(ctx, now, *use_cache).map(Summary::Probe),
        Command::RunCycle {
            unit,
            dry_run,
            evaluate,
            seed,
        } => {
            let mut executor = match seed {
                Some(seed) => SimulatedExecutor::seeded(*seed),
                None => SimulatedExecutor::from_entropy(),
            };
            let request = CycleRequest {
                unit_id: unit.clone(),
                dry_run: *dry_run,
                evaluate: *evaluate,
            };
            run_cycle(ctx, &mut executor, &request, now).map(Summary::RunCycle)
        }
        Command::Evaluate { dry_run } => {
            evaluate_registry(ctx, now, *dry_run).map(Summary::Evaluate)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn at_cli_01_command_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn at_cli_02_run_cycle_flags_parse() {
        let cli = Cli::try_parse_from([
            "cyclegate",
            "run-cycle",
            "--unit",
            "unit_a",
            "--dry-run",
            "--json",
        ])
        .unwrap();
        assert!(cli.json);
        assert_eq!(
            cli.command,
            Command::RunCycle {
                unit: Some("unit_a".to_string()),
                dry_run: true,
                evaluate: false,
                seed: None,
            }
        );
    }

    #[test]
    fn at_cli_03_path_flags_override_config() {
        let cli = Cli::try_parse_from([
            "cyclegate",
            "--registry",
            "/tmp/reg.json",
            "evaluate",
            "--dry-run",
        ])
        .unwrap();
        let mut config = OrchestratorConfig::mvp_v1(std::path::Path::new("/srv"));
        cli.apply_overrides(&mut config);
        assert_eq!(config.registry_path, PathBuf::from("/tmp/reg.json"));
        assert_eq!(
            config.matrix_path,
            PathBuf::from("/srv/artifacts/compatibility/matrix.json")
        );
        assert_eq!(cli.command, Command::Evaluate { dry_run: true });
    }

    #[test]
    fn at_cli_04_missing_matrix_maps_to_exit_three() {
        let dir = tempfile::tempdir().unwrap();
        let config = OrchestratorConfig::mvp_v1(dir.path());
        let ctx = CycleContext::with_checks(config, Vec::new());
        let err = execute(&ctx, &Command::Probe { use_cache: false }, Utc::now()).unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }
}
