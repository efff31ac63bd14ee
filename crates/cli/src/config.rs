//! Turning command-line arguments into engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use wurmloch_engine::EngineConfig;

use crate::cli::CliArgs;

/// `<config dir>/Wurmloch/rules.yaml` for the current user.
pub fn default_rules_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .context("could not determine user config directory; pass --rules")?;
    Ok(config_dir.join("Wurmloch").join("rules.yaml"))
}

/// The rules file named on the command line, or the per-user default.
pub fn resolve_rules_path(args: &CliArgs) -> Result<PathBuf> {
    match &args.rules {
        Some(path) => Ok(path.clone()),
        None => default_rules_path(),
    }
}

pub fn engine_config(args: &CliArgs, rules_path: PathBuf) -> EngineConfig {
    EngineConfig::new(&args.watch_dir, rules_path)
        .with_quiet_period(Duration::from_secs(args.watch_delay))
        .with_poll_interval(Duration::from_millis(args.poll_interval_ms.max(1)))
        .with_workers(args.workers)
        .with_case_sensitivity(args.case.resolve())
        .with_sweep_on_start(!args.no_sweep)
}
