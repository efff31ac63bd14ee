//! The [`Watcher`]: owns both notify watches, the active rules, and the
//! dispatch workers.

use std::fmt;
use std::fs;
use std::future::Future;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};
use wurmloch_rules::RuleSetLoader;

use crate::active::ActiveRules;
use crate::config::EngineConfig;
use crate::dispatch::{DispatchReport, Dispatcher};
use crate::error::{EngineError, Result};
use crate::queue::PendingQueue;
use crate::stability::{CompletionSignal, StabilityTracker};

use super::events::{
    classify_wormhole_event, sweep_wormhole, touches_rules_file, warn_directory, WormholeAction,
};
use super::worker::{run_poller, run_worker, WorkerContext};

type EventTx = mpsc::UnboundedSender<notify::Result<Event>>;

/// Lifecycle of a [`Watcher::run`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Starting,
    Running,
    ShuttingDown,
    Stopped,
}

impl fmt::Display for EngineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Starting => write!(f, "starting"),
            Self::Running => write!(f, "running"),
            Self::ShuttingDown => write!(f, "shutting down"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

/// Watches the wormhole and the rules file and dispatches settled files.
pub struct Watcher {
    config: EngineConfig,
    loader: RuleSetLoader,
    rules: Arc<ActiveRules>,
    queue: Arc<PendingQueue>,
    signal: Arc<dyn CompletionSignal>,
    reports: Option<mpsc::UnboundedSender<DispatchReport>>,
    state: watch::Sender<EngineState>,
}

impl Watcher {
    pub fn new(config: EngineConfig) -> Self {
        let signal: Arc<dyn CompletionSignal> =
            Arc::new(StabilityTracker::new(config.quiet_period));
        let (state, _) = watch::channel(EngineState::Starting);
        Self {
            loader: RuleSetLoader::new(config.case_sensitivity),
            rules: Arc::new(ActiveRules::default()),
            queue: Arc::new(PendingQueue::new()),
            signal,
            reports: None,
            state,
            config,
        }
    }

    /// Send a [`DispatchReport`] for every dispatched file to `tx`.
    pub fn with_reports(mut self, tx: mpsc::UnboundedSender<DispatchReport>) -> Self {
        self.reports = Some(tx);
        self
    }

    /// Replace the default size/mtime polling strategy.
    pub fn with_completion_signal(mut self, signal: Arc<dyn CompletionSignal>) -> Self {
        self.signal = signal;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Follow the engine's lifecycle.
    pub fn state(&self) -> watch::Receiver<EngineState> {
        self.state.subscribe()
    }

    /// The rule set workers dispatch against.
    pub fn active_rules(&self) -> Arc<ActiveRules> {
        Arc::clone(&self.rules)
    }

    /// Run until `shutdown` resolves or the wormhole watch is lost for good.
    ///
    /// Fails fast if the wormhole is not an existing absolute directory or
    /// cannot be watched. A broken rules file never stops the engine: the
    /// previous rules stay active and the error is logged.
    pub async fn run<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        let wormhole = validate_wormhole(&self.config.wormhole)?;
        let rules_path = normalize_rules_path(&self.config.rules_path);
        self.config.log_summary();

        self.load_initial_rules(&rules_path);

        let (wormhole_tx, mut wormhole_rx) = mpsc::unbounded_channel();
        let (config_tx, mut config_rx) = mpsc::unbounded_channel();

        let mut wormhole_watch = watch_dir(&wormhole, wormhole_tx.clone())?;
        info!(path = %wormhole.display(), "watching wormhole");

        let config_watch = match rules_path.parent() {
            Some(dir) => match watch_dir(dir, config_tx.clone()) {
                Ok(w) => {
                    info!(path = %rules_path.display(), "watching rules file");
                    Some(w)
                }
                Err(e) => {
                    warn!(
                        path = %dir.display(),
                        error = %e,
                        "cannot watch rules directory, hot reload disabled"
                    );
                    None
                }
            },
            None => None,
        };

        let (stop_tx, stop_rx) = watch::channel(false);
        let ctx = Arc::new(WorkerContext {
            queue: Arc::clone(&self.queue),
            rules: Arc::clone(&self.rules),
            signal: Arc::clone(&self.signal),
            dispatcher: Dispatcher::new(),
            poll_interval: self.config.poll_interval,
            reports: self.reports.clone(),
        });
        let (ready_tx, ready_rx) = mpsc::unbounded_channel();
        let ready_rx = Arc::new(tokio::sync::Mutex::new(ready_rx));
        let mut workers = JoinSet::new();
        workers.spawn(run_poller(Arc::clone(&ctx), ready_tx, stop_rx));
        for id in 0..self.config.workers.max(1) {
            workers.spawn(run_worker(id, Arc::clone(&ctx), Arc::clone(&ready_rx)));
        }

        if self.config.sweep_on_start {
            self.sweep(&wormhole, &rules_path);
        }

        self.state.send_replace(EngineState::Running);
        info!(workers = self.config.workers, "engine running");

        tokio::pin!(shutdown);
        let mut reload_at: Option<Instant> = None;

        let result = loop {
            let reload_due = async move {
                match reload_at {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending().await,
                }
            };

            tokio::select! {
                _ = &mut shutdown => {
                    info!("shutdown requested");
                    break Ok(());
                }

                Some(res) = wormhole_rx.recv() => {
                    let lost = match res {
                        Ok(event) => match classify_wormhole_event(&event, &wormhole, &rules_path) {
                            WormholeAction::Enqueue(paths) => {
                                for path in paths {
                                    self.queue.push(path);
                                }
                                false
                            }
                            WormholeAction::Rescan => {
                                debug!("watch backend asked for a rescan");
                                self.sweep(&wormhole, &rules_path);
                                false
                            }
                            WormholeAction::RootLost => true,
                            WormholeAction::SkipDirectories(dirs) => {
                                dirs.iter().for_each(|dir| warn_directory(dir));
                                false
                            }
                            WormholeAction::Ignore => false,
                        },
                        Err(e) => {
                            warn!(path = %wormhole.display(), error = %e, "wormhole watch error");
                            !wormhole.is_dir()
                        }
                    };

                    if lost {
                        warn!(path = %wormhole.display(), "lost watch on wormhole");
                        let rearmed = tokio::select! {
                            rearmed = self.rearm(&wormhole, &wormhole_tx) => rearmed,
                            _ = &mut shutdown => {
                                info!("shutdown requested");
                                break Ok(());
                            }
                        };
                        match rearmed {
                            Ok(w) => {
                                wormhole_watch = w;
                                self.sweep(&wormhole, &rules_path);
                            }
                            Err(e) => break Err(e),
                        }
                    }
                }

                Some(res) = config_rx.recv() => {
                    match res {
                        Ok(event) if touches_rules_file(&event, &rules_path) => {
                            reload_at = Some(Instant::now() + self.config.reload_debounce);
                        }
                        Ok(_) => {}
                        Err(e) => warn!(error = %e, "rules watch error"),
                    }
                }

                _ = reload_due => {
                    reload_at = None;
                    self.reload_rules(&rules_path);
                }
            }
        };

        self.state.send_replace(EngineState::ShuttingDown);
        drop(wormhole_watch);
        drop(config_watch);
        let _ = stop_tx.send(true);
        self.queue.close();

        while let Some(joined) = workers.join_next().await {
            if let Err(e) = joined {
                error!(error = %e, "dispatch task panicked");
            }
        }

        self.state.send_replace(EngineState::Stopped);
        match &result {
            Ok(()) => info!("engine stopped"),
            Err(e) => error!(error = %e, "engine stopped"),
        }
        result
    }

    fn load_initial_rules(&self, rules_path: &Path) {
        match self.loader.load_file(rules_path) {
            Ok(set) => {
                let count = set.len();
                self.rules.replace(set);
                info!(rules = count, path = %rules_path.display(), "loaded rules");
            }
            Err(e) => {
                error!(
                    path = %rules_path.display(),
                    error = %e,
                    "rules file is invalid, starting with no rules"
                );
            }
        }
    }

    /// Reload after a change. The previous set stays active on any failure.
    fn reload_rules(&self, rules_path: &Path) {
        match fs::metadata(rules_path) {
            Err(e) if e.kind() == ErrorKind::NotFound => {
                warn!(path = %rules_path.display(), "rules file removed, keeping current rules");
                return;
            }
            _ => {}
        }

        match self.loader.load_file(rules_path) {
            Ok(set) => {
                let count = set.len();
                let previous = self.rules.replace(set);
                info!(
                    rules = count,
                    previous = previous.len(),
                    path = %rules_path.display(),
                    "reloaded rules"
                );
            }
            Err(e) => {
                error!(
                    path = %rules_path.display(),
                    error = %e,
                    "rules reload failed, keeping previous rules"
                );
            }
        }
    }

    fn sweep(&self, wormhole: &Path, rules_path: &Path) {
        let queued = sweep_wormhole(wormhole, rules_path)
            .into_iter()
            .filter(|path| self.queue.push(path.clone()))
            .count();
        if queued > 0 {
            info!(queued, "queued files already in the wormhole");
        }
    }

    /// Retry arming the wormhole watch with exponential backoff.
    async fn rearm(&self, wormhole: &Path, tx: &EventTx) -> Result<RecommendedWatcher> {
        let policy = self.config.rearm;
        for attempt in 1..=policy.max_attempts {
            let delay = policy.delay_for(attempt);
            warn!(
                attempt,
                max_attempts = policy.max_attempts,
                delay_ms = delay.as_millis() as u64,
                "re-arming wormhole watch"
            );
            tokio::time::sleep(delay).await;

            if !wormhole.is_dir() {
                continue;
            }
            match watch_dir(wormhole, tx.clone()) {
                Ok(w) => {
                    info!(path = %wormhole.display(), attempt, "wormhole watch re-armed");
                    return Ok(w);
                }
                Err(e) => warn!(attempt, error = %e, "re-arm failed"),
            }
        }
        Err(EngineError::WatchLost {
            path: wormhole.to_path_buf(),
            attempts: policy.max_attempts,
        })
    }
}

/// Check the wormhole and return its canonical form.
pub(crate) fn validate_wormhole(path: &Path) -> Result<PathBuf> {
    let invalid = |reason: String| EngineError::InvalidWormhole {
        path: path.to_path_buf(),
        reason,
    };

    if !path.is_absolute() {
        return Err(invalid("path must be absolute".to_string()));
    }
    let meta = match fs::metadata(path) {
        Ok(meta) => meta,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(invalid("directory does not exist".to_string()))
        }
        Err(e) => return Err(invalid(e.to_string())),
    };
    if !meta.is_dir() {
        return Err(invalid("not a directory".to_string()));
    }
    Ok(fs::canonicalize(path)?)
}

/// Resolve the rules file's directory so event paths compare equal to it.
/// The file itself may not exist yet.
pub(crate) fn normalize_rules_path(path: &Path) -> PathBuf {
    let (Some(dir), Some(name)) = (path.parent(), path.file_name()) else {
        return path.to_path_buf();
    };
    let dir = if dir.as_os_str().is_empty() { Path::new(".") } else { dir };
    fs::canonicalize(dir)
        .map(|dir| dir.join(name))
        .unwrap_or_else(|_| path.to_path_buf())
}

fn watch_dir(path: &Path, tx: EventTx) -> notify::Result<RecommendedWatcher> {
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
        // The receiver only goes away during shutdown.
        let _ = tx.send(res);
    })?;
    watcher.watch(path, RecursiveMode::NonRecursive)?;
    Ok(watcher)
}
