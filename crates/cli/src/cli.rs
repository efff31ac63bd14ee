use std::path::PathBuf;

use clap::{Parser, ValueEnum};
use wurmloch_rules::CaseSensitivity;

/// Moves files dropped into a watched directory to where your rules say.
///
/// Each file is matched by name against the glob patterns in the rules file;
/// the first matching rule decides the target directory. The rules file is
/// reloaded whenever it changes.
#[derive(Parser, Debug)]
#[command(name = "wurmloch", version, about)]
pub struct CliArgs {
    /// Directory to watch (absolute path).
    #[arg(value_name = "WATCH_DIR", env = "WURMLOCH_WATCH_DIR")]
    pub watch_dir: PathBuf,

    /// Rules file (default: <config dir>/Wurmloch/rules.yaml).
    #[arg(long, env = "WURMLOCH_RULES")]
    pub rules: Option<PathBuf>,

    /// Seconds a file must stay unchanged before it is moved.
    #[arg(long, env = "WURMLOCH_WATCH_DELAY", default_value_t = 2)]
    pub watch_delay: u64,

    /// How often a pending file is checked, in milliseconds.
    #[arg(long, env = "WURMLOCH_POLL_INTERVAL_MS", default_value_t = 250)]
    pub poll_interval_ms: u64,

    /// Number of files handled concurrently.
    #[arg(long, env = "WURMLOCH_WORKERS", default_value_t = 4)]
    pub workers: usize,

    /// Pattern case matching.
    #[arg(long, value_enum, env = "WURMLOCH_CASE", default_value_t = CaseArg::Auto)]
    pub case: CaseArg,

    /// Leave files already in the directory at startup alone.
    #[arg(long)]
    pub no_sweep: bool,
}

#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum CaseArg {
    /// Follow the platform: insensitive on Windows and macOS.
    Auto,
    Sensitive,
    Insensitive,
}

impl CaseArg {
    pub fn resolve(self) -> CaseSensitivity {
        match self {
            Self::Auto => CaseSensitivity::host(),
            Self::Sensitive => CaseSensitivity::Sensitive,
            Self::Insensitive => CaseSensitivity::Insensitive,
        }
    }
}
