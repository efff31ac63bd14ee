//! Engine configuration.

use std::path::PathBuf;
use std::time::Duration;

use wurmloch_rules::CaseSensitivity;

/// Everything the [`Watcher`](crate::Watcher) needs to run.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// The watched drop directory. Must be absolute and exist.
    pub wormhole: PathBuf,
    /// The YAML rules file. Its parent directory is watched for changes.
    pub rules_path: PathBuf,
    /// Delay between size/mtime checks of a pending file.
    pub poll_interval: Duration,
    /// How long a file must stay unchanged before it is dispatched.
    pub quiet_period: Duration,
    /// Number of dispatch workers.
    pub workers: usize,
    /// Rules-file events closer together than this collapse into one reload.
    pub reload_debounce: Duration,
    /// Enqueue files already present in the wormhole at startup and after a
    /// watch re-arm.
    pub sweep_on_start: bool,
    pub case_sensitivity: CaseSensitivity,
    pub rearm: RearmPolicy,
}

impl EngineConfig {
    pub fn new(wormhole: impl Into<PathBuf>, rules_path: impl Into<PathBuf>) -> Self {
        Self {
            wormhole: wormhole.into(),
            rules_path: rules_path.into(),
            poll_interval: Duration::from_millis(250),
            quiet_period: Duration::from_secs(2),
            workers: 4,
            reload_debounce: Duration::from_millis(300),
            sweep_on_start: true,
            case_sensitivity: CaseSensitivity::host(),
            rearm: RearmPolicy::default(),
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_quiet_period(mut self, quiet: Duration) -> Self {
        self.quiet_period = quiet;
        self
    }

    /// Set the worker count (at least one worker always runs).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_reload_debounce(mut self, debounce: Duration) -> Self {
        self.reload_debounce = debounce;
        self
    }

    pub fn with_sweep_on_start(mut self, sweep: bool) -> Self {
        self.sweep_on_start = sweep;
        self
    }

    pub fn with_case_sensitivity(mut self, case: CaseSensitivity) -> Self {
        self.case_sensitivity = case;
        self
    }

    pub fn with_rearm(mut self, rearm: RearmPolicy) -> Self {
        self.rearm = rearm;
        self
    }

    /// Print a summary for startup logs.
    pub fn log_summary(&self) {
        tracing::info!("Engine config:");
        tracing::info!("  wormhole:     {}", self.wormhole.display());
        tracing::info!("  rules:        {}", self.rules_path.display());
        tracing::info!(
            "  stability:    quiet={:?} poll={:?}",
            self.quiet_period,
            self.poll_interval
        );
        tracing::info!("  workers:      {}", self.workers);
        tracing::info!("  matching:     {}", self.case_sensitivity);
    }
}

/// Bounded exponential backoff for re-arming a lost watch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RearmPolicy {
    pub max_attempts: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl RearmPolicy {
    /// Delay before retry number `attempt` (1-based): doubles each time,
    /// capped at `max_delay`.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1).min(16));
        self.initial_delay
            .checked_mul(factor)
            .unwrap_or(self.max_delay)
            .min(self.max_delay)
    }
}

impl Default for RearmPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}
