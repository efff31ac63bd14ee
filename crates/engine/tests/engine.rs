//! End-to-end runs of the watcher against real directories.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tempfile::TempDir;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use wurmloch_engine::{
    ActiveRules, CompletionSignal, DispatchOutcome, DispatchReport, EngineConfig, EngineError,
    EngineState, Observation, PendingEntry, RearmPolicy, Watcher,
};

const WAIT: Duration = Duration::from_secs(10);

struct Harness {
    _root: TempDir,
    wormhole: PathBuf,
    rules_path: PathBuf,
    out: PathBuf,
    reports: mpsc::UnboundedReceiver<DispatchReport>,
    active: Arc<ActiveRules>,
    stop: Option<oneshot::Sender<()>>,
    handle: JoinHandle<wurmloch_engine::Result<()>>,
}

fn layout() -> (TempDir, PathBuf, PathBuf, PathBuf) {
    let root = TempDir::new().unwrap();
    let base = fs::canonicalize(root.path()).unwrap();
    let wormhole = base.join("drop");
    let config = base.join("config");
    let out = base.join("out");
    fs::create_dir_all(&wormhole).unwrap();
    fs::create_dir_all(&config).unwrap();
    (root, wormhole, config.join("rules.yaml"), out)
}

fn rules_yaml(rules: &[(&str, &Path)]) -> String {
    rules
        .iter()
        .map(|(pattern, target)| {
            format!("- pattern: '{pattern}'\n  target: '{}'\n", target.display())
        })
        .collect()
}

fn config(wormhole: &Path, rules_path: &Path) -> EngineConfig {
    EngineConfig::new(wormhole, rules_path)
        .with_quiet_period(Duration::from_millis(150))
        .with_poll_interval(Duration::from_millis(25))
        .with_reload_debounce(Duration::from_millis(50))
        .with_workers(2)
}

async fn start(
    root: TempDir,
    wormhole: PathBuf,
    rules_path: PathBuf,
    out: PathBuf,
    watcher: Watcher,
) -> Harness {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("wurmloch_engine=debug")
        .with_test_writer()
        .try_init();

    let (tx, reports) = mpsc::unbounded_channel();
    let watcher = watcher.with_reports(tx);
    let active = watcher.active_rules();
    let mut state = watcher.state();
    let (stop, stopped) = oneshot::channel::<()>();

    let handle = tokio::spawn(watcher.run(async move {
        let _ = stopped.await;
    }));

    tokio::time::timeout(WAIT, state.wait_for(|s| *s == EngineState::Running))
        .await
        .expect("engine never reached running")
        .expect("state channel closed");

    Harness {
        _root: root,
        wormhole,
        rules_path,
        out,
        reports,
        active,
        stop: Some(stop),
        handle,
    }
}

impl Harness {
    async fn next_report(&mut self) -> DispatchReport {
        tokio::time::timeout(WAIT, self.reports.recv())
            .await
            .expect("no dispatch report in time")
            .expect("report channel closed")
    }

    /// Wait until the active set resolves `name` to `target`.
    async fn wait_for_target(&self, name: &str, target: &Path) {
        let deadline = tokio::time::Instant::now() + WAIT;
        loop {
            if self.active.snapshot().resolve_target(name) == Some(target) {
                return;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "rules never reloaded to {}",
                target.display()
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }

    /// Wait for the engine to stop on its own.
    async fn finish(self) -> wurmloch_engine::Result<()> {
        tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("engine did not stop")
            .expect("engine task panicked")
    }

    async fn shutdown(mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        let result = tokio::time::timeout(WAIT, self.handle)
            .await
            .expect("engine did not stop")
            .expect("engine task panicked");
        assert!(result.is_ok(), "{result:?}");
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn dispatches_dropped_file() {
    let (root, wormhole, rules_path, out) = layout();
    let pics = out.join("pics");
    fs::write(&rules_path, rules_yaml(&[("*.jpg", &pics)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    fs::write(h.wormhole.join("photo.jpg"), b"jpeg bytes").unwrap();

    let report = h.next_report().await;
    assert_eq!(report.source, h.wormhole.join("photo.jpg"));
    assert_eq!(
        report.outcome,
        DispatchOutcome::Moved {
            destination: pics.join("photo.jpg")
        }
    );
    assert!(!h.wormhole.join("photo.jpg").exists());
    assert_eq!(fs::read(pics.join("photo.jpg")).unwrap(), b"jpeg bytes");

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn unmatched_file_stays() {
    let (root, wormhole, rules_path, out) = layout();
    fs::write(&rules_path, rules_yaml(&[("*.jpg", &out)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    fs::write(h.wormhole.join("notes.txt"), "keep me").unwrap();

    let report = h.next_report().await;
    assert_eq!(report.outcome, DispatchOutcome::NoMatch);
    assert!(h.wormhole.join("notes.txt").exists());

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn files_present_at_startup_are_swept() {
    let (root, wormhole, rules_path, out) = layout();
    let docs = out.join("docs");
    fs::write(&rules_path, rules_yaml(&[("*.pdf", &docs)])).unwrap();
    fs::write(wormhole.join("waiting.pdf"), "pdf").unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    let report = h.next_report().await;
    assert_eq!(report.outcome.destination(), Some(docs.join("waiting.pdf").as_path()));

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn conflicting_name_gets_suffix() {
    let (root, wormhole, rules_path, out) = layout();
    fs::create_dir_all(&out).unwrap();
    fs::write(out.join("report.pdf"), "existing").unwrap();
    fs::write(&rules_path, rules_yaml(&[("*.pdf", &out)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    fs::write(h.wormhole.join("report.pdf"), "new").unwrap();

    let report = h.next_report().await;
    assert_eq!(
        report.outcome,
        DispatchOutcome::MoveConflict {
            requested: h.out.join("report.pdf"),
            destination: h.out.join("report (1).pdf"),
        }
    );
    assert_eq!(fs::read_to_string(h.out.join("report.pdf")).unwrap(), "existing");
    assert_eq!(fs::read_to_string(h.out.join("report (1).pdf")).unwrap(), "new");

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn hot_reload_changes_routing() {
    let (root, wormhole, rules_path, out) = layout();
    let old = out.join("old");
    let new = out.join("new");
    fs::write(&rules_path, rules_yaml(&[("*.pdf", &old)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;
    assert_eq!(h.active.snapshot().resolve_target("a.pdf"), Some(old.as_path()));

    fs::write(&h.rules_path, rules_yaml(&[("*.pdf", &new)])).unwrap();
    h.wait_for_target("a.pdf", &new).await;

    fs::write(h.wormhole.join("a.pdf"), "pdf").unwrap();
    let report = h.next_report().await;
    assert_eq!(report.outcome.destination(), Some(new.join("a.pdf").as_path()));
    assert!(!old.exists());

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn broken_reload_keeps_previous_rules() {
    let (root, wormhole, rules_path, out) = layout();
    let docs = out.join("docs");
    fs::write(&rules_path, rules_yaml(&[("*.pdf", &docs)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    fs::write(&h.rules_path, "- pattern: '[unclosed'\n  target: relative/dir\n").unwrap();
    // Several debounce windows.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.active.snapshot().resolve_target("a.pdf"), Some(docs.as_path()));

    fs::write(h.wormhole.join("a.pdf"), "pdf").unwrap();
    let report = h.next_report().await;
    assert_eq!(report.outcome.destination(), Some(docs.join("a.pdf").as_path()));

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn fixed_rules_load_after_broken_reload() {
    let (root, wormhole, rules_path, out) = layout();
    let docs = out.join("docs");
    let archive = out.join("archive");
    fs::write(&rules_path, rules_yaml(&[("*.pdf", &docs)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    fs::write(&h.rules_path, "- pattern: '*.pdf'\n  target: relative/dir\n").unwrap();
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert_eq!(h.active.snapshot().resolve_target("a.pdf"), Some(docs.as_path()));

    fs::write(&h.rules_path, rules_yaml(&[("*.pdf", &archive)])).unwrap();
    h.wait_for_target("a.pdf", &archive).await;

    fs::write(h.wormhole.join("a.pdf"), "pdf").unwrap();
    let report = h.next_report().await;
    assert_eq!(report.outcome.destination(), Some(archive.join("a.pdf").as_path()));

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn invalid_rules_at_startup_run_empty_until_fixed() {
    let (root, wormhole, rules_path, out) = layout();
    let pics = out.join("pics");
    fs::write(&rules_path, "- pattern: '[unclosed'\n  target: relative/dir\n").unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;
    assert!(h.active.snapshot().is_empty());

    fs::write(h.wormhole.join("early.jpg"), "jpg").unwrap();
    let report = h.next_report().await;
    assert_eq!(report.outcome, DispatchOutcome::NoMatch);
    assert!(h.wormhole.join("early.jpg").exists());

    fs::write(&h.rules_path, rules_yaml(&[("*.jpg", &pics)])).unwrap();
    h.wait_for_target("x.jpg", &pics).await;

    fs::write(h.wormhole.join("late.jpg"), "jpg").unwrap();
    let report = h.next_report().await;
    assert_eq!(report.outcome.destination(), Some(pics.join("late.jpg").as_path()));

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn missing_rules_file_starts_empty_then_loads() {
    let (root, wormhole, rules_path, out) = layout();
    let pics = out.join("pics");

    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let h = start(root, wormhole, rules_path, out, watcher).await;
    assert!(h.active.snapshot().is_empty());

    fs::write(&h.rules_path, rules_yaml(&[("*.jpg", &pics)])).unwrap();
    h.wait_for_target("x.jpg", &pics).await;

    h.shutdown().await;
}

/// Treats every file as finished on first sight.
struct Immediate;

impl CompletionSignal for Immediate {
    fn observe(&self, path: &Path) -> Observation {
        if !path.exists() {
            return Observation::Vanished;
        }
        let now = std::time::Instant::now();
        Observation::Stable(PendingEntry {
            path: path.to_path_buf(),
            last_observed_size: 0,
            last_observed_modified: None,
            last_observed_time: now,
            stable_since: Some(now),
        })
    }

    fn forget(&self, _path: &Path) {}
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn custom_completion_signal() {
    let (root, wormhole, rules_path, out) = layout();
    fs::write(&rules_path, rules_yaml(&[("*", &out)])).unwrap();
    fs::write(wormhole.join("now.bin"), "x").unwrap();

    let watcher = Watcher::new(
        config(&wormhole, &rules_path).with_quiet_period(Duration::from_secs(3600)),
    )
    .with_completion_signal(Arc::new(Immediate));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    let report = h.next_report().await;
    assert_eq!(report.outcome.destination(), Some(h.out.join("now.bin").as_path()));

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn growing_file_does_not_hold_up_others() {
    let (root, wormhole, rules_path, out) = layout();
    fs::write(&rules_path, rules_yaml(&[("*", &out)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path).with_workers(1));
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    let big = h.wormhole.join("big.iso");
    let writer = thread::spawn({
        let big = big.clone();
        move || {
            let mut file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&big)
                .unwrap();
            for _ in 0..40 {
                file.write_all(&[0u8; 4096]).unwrap();
                file.flush().unwrap();
                thread::sleep(Duration::from_millis(50));
            }
        }
    });

    tokio::time::sleep(Duration::from_millis(100)).await;
    fs::write(h.wormhole.join("small.txt"), "small").unwrap();

    let first = h.next_report().await;
    assert_eq!(first.source, h.wormhole.join("small.txt"));
    assert!(big.exists(), "big.iso moved while still growing");

    writer.join().unwrap();
    let second = h.next_report().await;
    assert_eq!(second.source, big);
    assert_eq!(
        fs::metadata(h.out.join("big.iso")).unwrap().len(),
        40 * 4096
    );

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn recreated_wormhole_is_watched_again() {
    let (root, wormhole, rules_path, out) = layout();
    fs::write(&rules_path, rules_yaml(&[("*", &out)])).unwrap();

    let watcher = Watcher::new(config(&wormhole, &rules_path).with_rearm(RearmPolicy {
        max_attempts: 20,
        initial_delay: Duration::from_millis(50),
        max_delay: Duration::from_millis(200),
    }));
    let mut state = watcher.state();
    let mut h = start(root, wormhole, rules_path, out, watcher).await;

    fs::remove_dir(&h.wormhole).unwrap();
    tokio::time::sleep(Duration::from_millis(150)).await;
    fs::create_dir(&h.wormhole).unwrap();
    fs::write(h.wormhole.join("after.txt"), "back").unwrap();

    // Picked up by the post re-arm sweep or by the new watch.
    let report = h.next_report().await;
    assert_eq!(report.source, h.wormhole.join("after.txt"));
    assert_eq!(report.outcome.destination(), Some(h.out.join("after.txt").as_path()));
    assert_eq!(*state.borrow_and_update(), EngineState::Running);

    h.shutdown().await;
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn wormhole_gone_for_good_stops_engine() {
    let (root, wormhole, rules_path, out) = layout();

    let watcher = Watcher::new(config(&wormhole, &rules_path).with_rearm(RearmPolicy {
        max_attempts: 3,
        initial_delay: Duration::from_millis(20),
        max_delay: Duration::from_millis(50),
    }));
    let state = watcher.state();
    let h = start(root, wormhole.clone(), rules_path, out, watcher).await;

    fs::remove_dir(&wormhole).unwrap();

    match h.finish().await {
        Err(EngineError::WatchLost { path, attempts }) => {
            assert_eq!(path, wormhole);
            assert_eq!(attempts, 3);
        }
        other => panic!("expected WatchLost, got {other:?}"),
    }
    assert_eq!(*state.borrow(), EngineState::Stopped);
}

#[tokio::test]
async fn invalid_wormhole_fails_fast() {
    let (_root, wormhole, rules_path, _out) = layout();
    let missing = wormhole.join("nope");

    let watcher = Watcher::new(config(&missing, &rules_path));
    let state = watcher.state();
    let err = watcher.run(std::future::pending()).await.unwrap_err();

    assert!(matches!(err, EngineError::InvalidWormhole { .. }), "{err}");
    assert_eq!(*state.borrow(), EngineState::Starting);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn shutdown_reaches_stopped() {
    let (root, wormhole, rules_path, out) = layout();
    let watcher = Watcher::new(config(&wormhole, &rules_path));
    let mut state = watcher.state();
    let h = start(root, wormhole, rules_path, out, watcher).await;

    h.shutdown().await;

    state
        .wait_for(|s| *s == EngineState::Stopped)
        .await
        .expect("state channel closed");
}
