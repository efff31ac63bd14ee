//! Settling and moving files.
//!
//! One poller owns every pending file and checks them all on each tick, so a
//! file that keeps growing only costs a stat per tick. Workers see a file
//! only once it is stable, and spend their time on the move itself.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, trace};

use crate::active::ActiveRules;
use crate::dispatch::{DispatchOutcome, DispatchReport, Dispatcher};
use crate::queue::PendingQueue;
use crate::stability::{CompletionSignal, Observation, PendingEntry};

/// Stable files waiting for a worker.
pub(crate) type ReadyRx = Arc<Mutex<mpsc::UnboundedReceiver<PendingEntry>>>;

/// Shared state the poller and the workers read from.
pub(crate) struct WorkerContext {
    pub queue: Arc<PendingQueue>,
    pub rules: Arc<ActiveRules>,
    pub signal: Arc<dyn CompletionSignal>,
    pub dispatcher: Dispatcher,
    pub poll_interval: Duration,
    pub reports: Option<mpsc::UnboundedSender<DispatchReport>>,
}

/// Claim queued paths and poll them until each settles or vanishes.
///
/// Paths stay claimed in the queue until a worker has moved them, so events
/// for a file already being handled are dropped. Dropping `ready` on exit
/// lets the workers finish what they hold and stop.
pub(crate) async fn run_poller(
    ctx: Arc<WorkerContext>,
    ready: mpsc::UnboundedSender<PendingEntry>,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut pending: HashSet<PathBuf> = HashSet::new();
    let mut tick = tokio::time::interval(ctx.poll_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            claimed = ctx.queue.claim() => match claimed {
                Some(path) => {
                    trace!(path = %path.display(), "now pending");
                    if observe(&ctx, &ready, &path) {
                        pending.insert(path);
                    }
                }
                None => break,
            },
            _ = tick.tick() => {
                pending.retain(|path| observe(&ctx, &ready, path));
            }
            _ = stopped(&mut shutdown) => break,
        }
    }

    for path in pending.drain() {
        ctx.signal.forget(&path);
        ctx.queue.release(&path);
    }
    debug!("stability poller stopped");
}

/// Check one path. Returns `true` while it is still pending.
fn observe(ctx: &WorkerContext, ready: &mpsc::UnboundedSender<PendingEntry>, path: &Path) -> bool {
    match ctx.signal.observe(path) {
        Observation::Pending => true,
        Observation::Vanished => {
            debug!(path = %path.display(), "file vanished before it settled");
            ctx.queue.release(path);
            false
        }
        Observation::Stable(entry) => {
            if ready.send(entry).is_err() {
                // Workers are gone; the file stays for the next run's sweep.
                ctx.queue.release(path);
            }
            false
        }
    }
}

pub(crate) async fn run_worker(id: usize, ctx: Arc<WorkerContext>, ready: ReadyRx) {
    debug!(worker = id, "dispatch worker started");
    loop {
        let next = ready.lock().await.recv().await;
        let Some(entry) = next else {
            break;
        };
        let path = entry.path.clone();
        dispatch(&ctx, entry).await;
        ctx.queue.release(&path);
    }
    debug!(worker = id, "dispatch worker stopped");
}

/// Resolves once the shutdown flag is set or its sender is gone.
pub(crate) async fn stopped(shutdown: &mut watch::Receiver<bool>) {
    let _ = shutdown.wait_for(|stop| *stop).await;
}

/// Move one stable file. A started move always runs to completion, even
/// during shutdown.
async fn dispatch(ctx: &WorkerContext, entry: PendingEntry) {
    let rules = ctx.rules.snapshot();
    let dispatcher = ctx.dispatcher.clone();
    let source = entry.path.clone();

    let outcome = match tokio::task::spawn_blocking(move || dispatcher.dispatch(&entry, &rules))
        .await
    {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(path = %source.display(), error = %e, "dispatch task failed");
            DispatchOutcome::MoveFailed {
                reason: format!("dispatch task failed: {e}"),
            }
        }
    };

    let report = DispatchReport::new(source, outcome);
    report.log();
    if let Some(reports) = &ctx.reports {
        // A dropped receiver just means nobody is listening.
        let _ = reports.send(report);
    }
}
