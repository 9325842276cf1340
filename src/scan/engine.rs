// src/scan/engine.rs
// =============================================================================
// The scan coordinator and its worker pool.
//
// How a run goes:
// 1. Seeding:  one depth-0 task per (dictionary entry, method) is queued and
//              the outstanding-work counter is set to that number
// 2. Running:  N workers loop: take a task, probe it, publish the outcome,
//              queue its children (if any), then mark the task finished
// 3. Draining: once the counter hits zero (or the run is cancelled) the
//              queue is closed, which releases every idle worker
// 4. Done:     after all workers exit the result channel is closed
//
// The counter is the only completion signal. An empty queue means nothing
// on its own, because a busy worker may be about to push children. To keep
// the counter honest a worker ALWAYS adds its children to the counter
// before it subtracts itself, so it can never read zero while work remains.
//
// Rust concepts:
// - Arc: every worker shares one RunContext
// - Atomics: the counter is updated without a lock
// - tokio::select!: wait on "next task" and "cancelled" at the same time
// - JoinSet: owns the worker tasks so we can wait for all of them
// =============================================================================

use super::config::ScanConfig;
use super::error::ScanError;
use super::policy::{RecursionPolicy, VisitedSet};
use super::prober::{HttpProber, Prober};
use super::queue::TaskQueue;
use super::retry::RetryingProber;
use super::task::{HttpMethod, ProbeOutcome};
use crate::dictionary::Dictionary;
use futures::Stream;
use std::fmt;
use std::pin::Pin;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Notify};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Backoff step between retries of a failed HTTP probe.
const RETRY_BACKOFF: Duration = Duration::from_millis(100);

/// Lifecycle of a run. Phases only move forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanPhase {
    Seeding,
    Running,
    Draining,
    Done,
}

impl fmt::Display for ScanPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ScanPhase::Seeding => "seeding",
            ScanPhase::Running => "running",
            ScanPhase::Draining => "draining",
            ScanPhase::Done => "done",
        };
        f.write_str(name)
    }
}

/// Tasks queued or in flight, including ones not yet probed.
///
/// Reaches zero only when nothing is pending anywhere in the run.
#[derive(Debug, Default)]
pub struct OutstandingCounter {
    value: AtomicI64,
}

impl OutstandingCounter {
    /// Must be called before the `n` tasks are pushed onto the queue.
    pub fn add(&self, n: usize) {
        self.value.fetch_add(n as i64, Ordering::AcqRel);
    }

    /// Marks one task fully processed. Returns true if that was the last one.
    pub fn complete_one(&self) -> bool {
        let previous = self.value.fetch_sub(1, Ordering::AcqRel);
        debug_assert!(previous >= 1, "outstanding counter went negative");
        previous == 1
    }

    pub fn get(&self) -> i64 {
        self.value.load(Ordering::Acquire)
    }
}

/// Running totals, read once at the end for the summary.
#[derive(Debug, Default)]
struct ScanStats {
    probes: AtomicUsize,
    expandable: AtomicUsize,
    errors: AtomicUsize,
}

impl ScanStats {
    fn record(&self, outcome: &ProbeOutcome) {
        self.probes.fetch_add(1, Ordering::Relaxed);
        if outcome.expandable {
            self.expandable.fetch_add(1, Ordering::Relaxed);
        }
        if outcome.is_error() {
            self.errors.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// What a finished run reports besides its outcomes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanSummary {
    /// Outcomes published (one per probed task)
    pub probes: usize,
    pub expandable: usize,
    pub errors: usize,
    /// True if the run stopped before reaching quiescence
    pub cancelled: bool,
    pub elapsed: Duration,
}

// Everything the workers share. Scoped to one run: dropped when it ends.
struct RunContext {
    queue: TaskQueue,
    visited: VisitedSet,
    outstanding: OutstandingCounter,
    quiescent: Notify,
    policy: RecursionPolicy,
    stats: ScanStats,
    cancel: CancellationToken,
    #[cfg(test)]
    enqueue_hold: Option<Arc<tests::EnqueueHold>>,
}

/// Sending half of the result stream.
///
/// Workers publish through clones; the coordinator keeps the original and
/// drops it last, which is what closes the stream.
#[derive(Clone)]
struct ResultSink {
    tx: mpsc::UnboundedSender<ProbeOutcome>,
}

impl ResultSink {
    fn publish(&self, outcome: ProbeOutcome) {
        // The caller may have stopped listening; the run still finishes
        if self.tx.send(outcome).is_err() {
            debug!("result receiver dropped, outcome discarded");
        }
    }

    fn close(self) {
        drop(self.tx);
    }
}

/// A validated, ready-to-start scan.
pub struct Scanner {
    config: ScanConfig,
    dictionary: Dictionary,
    prober: Arc<dyn Prober>,
    #[cfg(test)]
    enqueue_hold: Option<Arc<tests::EnqueueHold>>,
}

impl fmt::Debug for Scanner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scanner")
            .field("config", &self.config)
            .field("dictionary_len", &self.dictionary.len())
            .finish()
    }
}

impl Scanner {
    /// Validates the configuration. No network traffic happens here.
    pub fn new(
        config: ScanConfig,
        dictionary: Dictionary,
        prober: Arc<dyn Prober>,
    ) -> Result<Self, ScanError> {
        config.validate()?;
        Ok(Self {
            config,
            dictionary,
            prober,
            #[cfg(test)]
            enqueue_hold: None,
        })
    }

    /// Same as `new`, probing over HTTP with the settings in `config`.
    pub fn with_http(config: ScanConfig, dictionary: Dictionary) -> Result<Self, ScanError> {
        config.validate()?;
        let http = HttpProber::new(&config)?;

        let prober: Arc<dyn Prober> = if config.retries > 0 {
            Arc::new(RetryingProber::new(http, config.retries, RETRY_BACKOFF))
        } else {
            Arc::new(http)
        };

        Self::new(config, dictionary, prober)
    }

    /// Starts the run in the background and returns the result stream.
    ///
    /// Cancelling `cancel` stops the run early; outcomes already produced
    /// are still delivered. Fails only if the preflight check fails.
    pub async fn start(self, cancel: CancellationToken) -> Result<ScanHandle, ScanError> {
        if self.config.preflight {
            self.prober.preflight().await?;
        }

        let (tx, rx) = mpsc::unbounded_channel();
        let workers = self.config.workers;
        let methods = self.config.methods.clone();

        let ctx = Arc::new(RunContext {
            queue: TaskQueue::new(),
            visited: VisitedSet::new(),
            outstanding: OutstandingCounter::default(),
            quiescent: Notify::new(),
            policy: RecursionPolicy::new(self.dictionary, self.config.max_depth),
            stats: ScanStats::default(),
            // A child token: a crashed worker cancels this run only
            cancel: cancel.child_token(),
            #[cfg(test)]
            enqueue_hold: self.enqueue_hold,
        });

        let coordinator = tokio::spawn(coordinate(
            ctx,
            self.prober,
            methods,
            workers,
            ResultSink { tx },
        ));

        Ok(ScanHandle {
            outcomes: rx,
            coordinator,
        })
    }
}

async fn coordinate(
    ctx: Arc<RunContext>,
    prober: Arc<dyn Prober>,
    methods: Vec<HttpMethod>,
    workers: usize,
    sink: ResultSink,
) -> ScanSummary {
    let started = Instant::now();

    info!(phase = %ScanPhase::Seeding, "scan starting");
    let seeds = ctx.policy.seed(&methods, &ctx.visited);
    let seed_count = seeds.len();
    ctx.outstanding.add(seed_count);
    ctx.queue.enqueue(seeds);

    let mut pool = JoinSet::new();
    let mut cancelled = false;

    if seed_count == 0 {
        info!("nothing to scan");
    } else {
        info!(
            phase = %ScanPhase::Running,
            seeds = seed_count,
            workers,
            max_depth = ctx.policy.max_depth(),
            "scan running"
        );

        for id in 0..workers {
            pool.spawn(work(id, ctx.clone(), prober.clone(), sink.clone()));
        }

        cancelled = wait_for_quiescence(&ctx, &mut pool).await;
    }

    info!(phase = %ScanPhase::Draining, cancelled, "closing task queue");
    ctx.queue.close();

    while let Some(joined) = pool.join_next().await {
        if let Err(e) = joined {
            error!(error = %e, "scan worker panicked");
        }
    }

    // Every worker clone is gone, so this is the drop that ends the stream
    sink.close();

    let summary = ScanSummary {
        probes: ctx.stats.probes.load(Ordering::Relaxed),
        expandable: ctx.stats.expandable.load(Ordering::Relaxed),
        errors: ctx.stats.errors.load(Ordering::Relaxed),
        cancelled,
        elapsed: started.elapsed(),
    };
    info!(
        phase = %ScanPhase::Done,
        probes = summary.probes,
        expandable = summary.expandable,
        errors = summary.errors,
        "scan finished"
    );
    summary
}

// Returns true if the run was cancelled rather than completed.
async fn wait_for_quiescence(ctx: &RunContext, pool: &mut JoinSet<()>) -> bool {
    loop {
        tokio::select! {
            biased;

            _ = ctx.quiescent.notified() => {
                // Zero can only be observed once nothing is queued or in
                // flight; anything else is a stale wakeup
                if ctx.outstanding.get() == 0 {
                    return false;
                }
            }

            _ = ctx.cancel.cancelled() => {
                info!(outstanding = ctx.outstanding.get(), "scan cancelled");
                return true;
            }

            // Workers only return after the queue closes, so an early exit
            // is a panic. Its task is lost and the counter can never reach
            // zero: stop the run instead of hanging.
            Some(joined) = pool.join_next() => {
                if let Err(e) = joined {
                    error!(error = %e, "scan worker panicked, cancelling run");
                }
                ctx.cancel.cancel();
                return true;
            }
        }
    }
}

async fn work(id: usize, ctx: Arc<RunContext>, prober: Arc<dyn Prober>, sink: ResultSink) {
    debug!(worker = id, "worker started");

    loop {
        let task = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            next = ctx.queue.dequeue() => match next {
                Some(task) => task,
                None => break,
            },
        };

        // Cancellation abandons the request in flight
        let outcome = tokio::select! {
            biased;
            _ = ctx.cancel.cancelled() => break,
            outcome = prober.probe(&task) => outcome,
        };

        if let Some(error) = &outcome.error {
            warn!(task = %task, error = %error, "probe failed");
        }

        ctx.stats.record(&outcome);
        let children = ctx.policy.expand(&outcome, &ctx.visited);
        sink.publish(outcome);

        // Children are counted before they become visible, and before this
        // task is subtracted
        if !children.is_empty() {
            debug!(task = %task, children = children.len(), "expanding directory");
            ctx.outstanding.add(children.len());
            #[cfg(test)]
            tests::hold_before_enqueue(&ctx, &task).await;
            ctx.queue.enqueue(children);
        }

        if ctx.outstanding.complete_one() {
            ctx.quiescent.notify_one();
        }
    }

    debug!(worker = id, "worker stopped");
}

/// Receiving side of a running scan.
///
/// Yields outcomes in completion order and ends when the run is over.
/// Implements `Stream`, or use `next()` in a `while let` loop.
#[derive(Debug)]
pub struct ScanHandle {
    outcomes: mpsc::UnboundedReceiver<ProbeOutcome>,
    coordinator: JoinHandle<ScanSummary>,
}

impl ScanHandle {
    /// Next outcome, or `None` once the run has finished.
    pub async fn next(&mut self) -> Option<ProbeOutcome> {
        self.outcomes.recv().await
    }

    /// Waits for the run to end and returns its summary.
    /// Outcomes not yet read are dropped.
    pub async fn finish(self) -> Result<ScanSummary, ScanError> {
        drop(self.outcomes);
        Ok(self.coordinator.await?)
    }

    /// Reads every outcome, then returns them with the summary.
    pub async fn collect_outcomes(mut self) -> Result<(Vec<ProbeOutcome>, ScanSummary), ScanError> {
        let mut outcomes = Vec::new();
        while let Some(outcome) = self.next().await {
            outcomes.push(outcome);
        }
        let summary = self.coordinator.await?;
        Ok((outcomes, summary))
    }
}

impl Stream for ScanHandle {
    type Item = ProbeOutcome;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.outcomes.poll_recv(cx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scan::config::StatusSet;
    use crate::scan::task::{ProbeError, ProbeErrorKind, ScanTask};
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::{HashMap, HashSet};
    use std::sync::Mutex;
    use url::Url;

    // Scripted in-memory target: status per path (404 by default), optional
    // per-path delay, and a log of everything probed.
    #[derive(Default)]
    struct FakeTarget {
        statuses: HashMap<String, u16>,
        delays: HashMap<String, Duration>,
        unreachable: HashSet<String>,
        expandable: StatusSet,
        probed: Mutex<Vec<ScanTask>>,
        gate: Option<Arc<Gate>>,
    }

    // Holds back one path's probe until `release` other probes completed
    struct Gate {
        path: String,
        release: usize,
        others_done: AtomicUsize,
        opened: Notify,
    }

    impl FakeTarget {
        fn new() -> Self {
            Self {
                expandable: StatusSet::default(),
                ..Self::default()
            }
        }

        fn status(mut self, path: &str, status: u16) -> Self {
            self.statuses.insert(path.to_string(), status);
            self
        }

        fn delay(mut self, path: &str, delay: Duration) -> Self {
            self.delays.insert(path.to_string(), delay);
            self
        }

        fn unreachable(mut self, path: &str) -> Self {
            self.unreachable.insert(path.to_string());
            self
        }

        fn probed_paths(&self) -> Vec<String> {
            let mut paths: Vec<String> = self
                .probed
                .lock()
                .unwrap()
                .iter()
                .map(|t| t.path.clone())
                .collect();
            paths.sort();
            paths
        }
    }

    #[async_trait]
    impl Prober for FakeTarget {
        async fn probe(&self, task: &ScanTask) -> ProbeOutcome {
            self.probed.lock().unwrap().push(task.clone());

            if let Some(delay) = self.delays.get(&task.path) {
                tokio::time::sleep(*delay).await;
            }

            if let Some(gate) = &self.gate {
                if gate.path == task.path {
                    loop {
                        let opened = gate.opened.notified();
                        if gate.others_done.load(Ordering::SeqCst) >= gate.release {
                            break;
                        }
                        opened.await;
                    }
                }
            }

            let url = format!("http://target/{}", task.path);
            let outcome = if self.unreachable.contains(&task.path) {
                ProbeOutcome::failed(
                    task.clone(),
                    url,
                    ProbeError::new(ProbeErrorKind::Connect, "Connection failed"),
                )
            } else {
                let status = self.statuses.get(&task.path).copied().unwrap_or(404);
                let expandable = self.expandable.marks_expandable(task.method, status);
                ProbeOutcome::response(task.clone(), url, status, None, expandable)
            };

            if let Some(gate) = &self.gate {
                if gate.path != task.path {
                    gate.others_done.fetch_add(1, Ordering::SeqCst);
                    gate.opened.notify_waiters();
                }
            }

            outcome
        }
    }

    // Parks the worker that expands `path` after it counted the children
    // but before they are queued
    pub(super) struct EnqueueHold {
        path: String,
        reached: Notify,
        release: Notify,
    }

    pub(super) async fn hold_before_enqueue(ctx: &RunContext, task: &ScanTask) {
        if let Some(hold) = &ctx.enqueue_hold {
            if hold.path == task.path {
                hold.reached.notify_one();
                hold.release.notified().await;
            }
        }
    }

    fn dictionary(entries: &[&str]) -> Dictionary {
        Dictionary::from(entries.iter().map(|e| e.to_string()).collect::<Vec<_>>())
    }

    fn config(workers: usize, max_depth: usize) -> ScanConfig {
        let mut config = ScanConfig::new(Url::parse("http://target").unwrap());
        config.workers = workers;
        config.max_depth = max_depth;
        config
    }

    async fn run(
        target: Arc<FakeTarget>,
        config: ScanConfig,
        dict: Dictionary,
    ) -> (Vec<ProbeOutcome>, ScanSummary) {
        let scanner = Scanner::new(config, dict, target).unwrap();
        let handle = scanner.start(CancellationToken::new()).await.unwrap();
        tokio::time::timeout(Duration::from_secs(10), handle.collect_outcomes())
            .await
            .expect("scan did not terminate")
            .unwrap()
    }

    #[tokio::test]
    async fn test_all_not_found_probes_each_entry_once() {
        let target = Arc::new(FakeTarget::new());
        let (outcomes, summary) = run(
            target.clone(),
            config(3, 3),
            dictionary(&["home", "home/index.php", "blabla"]),
        )
        .await;

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| !o.expandable));
        assert_eq!(target.probed_paths(), vec!["blabla", "home", "home/index.php"]);
        assert_eq!(summary.probes, 3);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_redirect_expands_one_level() {
        let mut target = FakeTarget::new().status("admin", 301);
        target.expandable = StatusSet::from_codes([301]);
        let target = Arc::new(target);

        let mut cfg = config(2, 1);
        cfg.expandable = StatusSet::from_codes([301]);
        let (outcomes, _) = run(target.clone(), cfg, dictionary(&["admin", "login"])).await;

        // admin, login, admin/admin, admin/login
        let probed = target.probed_paths();
        assert_eq!(probed, vec!["admin", "admin/admin", "admin/login", "login"]);
        assert_eq!(outcomes.len(), 4);

        let child = outcomes.iter().find(|o| o.task.path == "admin/login").unwrap();
        assert_eq!(child.task.depth, 1);
    }

    #[tokio::test]
    async fn test_single_entry_redirect_scenario() {
        let target = Arc::new(FakeTarget::new().status("admin", 301));
        let (outcomes, _) = run(target.clone(), config(4, 1), dictionary(&["admin"])).await;

        // The only child of "admin" is "admin/admin"
        assert_eq!(target.probed_paths(), vec!["admin", "admin/admin"]);
        assert_eq!(outcomes.len(), 2);
    }

    #[tokio::test]
    async fn test_depth_limit_is_never_exceeded() {
        // Every path looks like a directory
        let mut target = FakeTarget::new();
        target.expandable = StatusSet::from_codes([404]);
        let target = Arc::new(target);

        let (outcomes, _) = run(target.clone(), config(8, 2), dictionary(&["a", "b"])).await;

        let max_seen = target.probed.lock().unwrap().iter().map(|t| t.depth).max();
        assert_eq!(max_seen, Some(2));
        // 2 + 4 + 8 distinct paths
        assert_eq!(outcomes.len(), 14);
    }

    #[tokio::test]
    async fn test_cyclic_target_terminates_without_duplicates() {
        let mut target = FakeTarget::new();
        target.expandable = StatusSet::from_codes([404]);
        let target = Arc::new(target);

        let dict = dictionary(&["a", "a/", "./a", "b/../a", "..", "a//b"]);
        run(target.clone(), config(4, 2), dict).await;

        let probed = target.probed_paths();
        let unique: HashSet<&String> = probed.iter().collect();
        assert_eq!(unique.len(), probed.len(), "a path was probed twice");
    }

    #[tokio::test]
    async fn test_same_child_from_two_parents_is_probed_once() {
        // "x/a" is reached from the seed "x/a" and as child "a" of "x"
        let target = Arc::new(FakeTarget::new().status("x", 200));
        run(target.clone(), config(4, 1), dictionary(&["x", "a", "x/a"])).await;

        let probed = target.probed_paths();
        assert_eq!(probed.iter().filter(|p| *p == "x/a").count(), 1);
    }

    #[tokio::test]
    async fn test_empty_dictionary_is_an_empty_run() {
        let target = Arc::new(FakeTarget::new());
        let (outcomes, summary) = run(target.clone(), config(3, 3), Dictionary::default()).await;

        assert!(outcomes.is_empty());
        assert_eq!(summary.probes, 0);
        assert!(!summary.cancelled);
    }

    #[tokio::test]
    async fn test_transport_errors_are_outcomes_not_failures() {
        let target = Arc::new(
            FakeTarget::new()
                .status("ok", 200)
                .unreachable("down"),
        );
        let (outcomes, summary) = run(target, config(2, 0), dictionary(&["ok", "down"])).await;

        assert_eq!(outcomes.len(), 2);
        assert_eq!(summary.errors, 1);
        let down = outcomes.iter().find(|o| o.task.path == "down").unwrap();
        assert!(down.error.is_some());
        assert!(!down.expandable);
    }

    #[tokio::test]
    async fn test_each_method_is_seeded_and_expanded_separately() {
        let target = Arc::new(FakeTarget::new().status("api", 200));
        let mut cfg = config(2, 1);
        cfg.methods = vec![HttpMethod::Get, HttpMethod::Options];
        let (outcomes, _) = run(target, cfg, dictionary(&["api"])).await;

        // GET api -> GET api/api; OPTIONS api never expands
        let mut seen: Vec<String> = outcomes
            .iter()
            .map(|o| format!("{} {}", o.task.method, o.task.path))
            .collect();
        seen.sort();
        assert_eq!(seen, vec!["GET api", "GET api/api", "OPTIONS api"]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_pool_size_does_not_change_results() {
        let words: Vec<String> = (0..100).map(|i| format!("w{}", i)).collect();
        let dict = Dictionary::from(words);

        let build = || {
            let mut target = FakeTarget::new();
            for dir in ["w3", "w42", "w99"] {
                target = target.status(dir, 301);
            }
            Arc::new(target.delay("w7", Duration::from_millis(5)))
        };

        let (single, _) = run(build(), config(1, 1), dict.clone()).await;
        let (pooled, _) = run(build(), config(8, 1), dict).await;

        let key = |outcomes: &[ProbeOutcome]| {
            let mut keys: Vec<(String, Option<u16>, usize)> = outcomes
                .iter()
                .map(|o| (o.task.path.clone(), o.status, o.task.depth))
                .collect();
            keys.sort();
            keys
        };

        assert_eq!(single.len(), 100 + 3 * 100);
        assert_eq!(key(&single), key(&pooled));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_last_in_flight_parent_still_gets_its_children_probed() {
        // "slow" is held until every other seed finished, so at that moment
        // it is the only outstanding task. If the run closed on an empty
        // queue it would stop here and never probe slow's children.
        let words: Vec<String> = std::iter::once("slow".to_string())
            .chain((0..20).map(|i| format!("f{}", i)))
            .collect();

        let mut target = FakeTarget::new().status("slow", 301);
        target.gate = Some(Arc::new(Gate {
            path: "slow".to_string(),
            release: 20,
            others_done: AtomicUsize::new(0),
            opened: Notify::new(),
        }));
        let target = Arc::new(target);

        let (outcomes, summary) = run(target.clone(), config(8, 1), Dictionary::from(words)).await;

        assert_eq!(outcomes.len(), 21 + 21);
        assert!(outcomes.iter().any(|o| o.task.path == "slow/f19"));
        assert_eq!(summary.expandable, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_run_stays_open_while_children_are_counted_but_not_queued() {
        let words: Vec<String> = std::iter::once("slow".to_string())
            .chain((0..20).map(|i| format!("f{}", i)))
            .collect();
        let target = Arc::new(FakeTarget::new().status("slow", 301));
        let hold = Arc::new(EnqueueHold {
            path: "slow".to_string(),
            reached: Notify::new(),
            release: Notify::new(),
        });

        let mut scanner = Scanner::new(config(8, 1), Dictionary::from(words), target).unwrap();
        scanner.enqueue_hold = Some(hold.clone());
        let mut handle = scanner.start(CancellationToken::new()).await.unwrap();

        tokio::time::timeout(Duration::from_secs(5), hold.reached.notified())
            .await
            .expect("expanding worker never reached the hold");

        // Every seed outcome, "slow" included, is out; the queue is empty and
        // the only pending work is the 21 children nobody can see yet
        let mut outcomes = Vec::new();
        for _ in 0..21 {
            outcomes.push(handle.next().await.unwrap());
        }
        let early = tokio::time::timeout(Duration::from_millis(200), handle.next()).await;
        assert!(early.is_err(), "run ended while children were still pending");

        hold.release.notify_one();
        let (rest, summary) = tokio::time::timeout(Duration::from_secs(5), handle.collect_outcomes())
            .await
            .expect("scan did not terminate")
            .unwrap();

        assert_eq!(rest.len(), 21);
        assert!(rest.iter().all(|o| o.task.path.starts_with("slow/")));
        assert_eq!(summary.probes, 42);
        assert!(!summary.cancelled);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_repeated_runs_never_stop_early() {
        for round in 0..20 {
            let mut target = FakeTarget::new();
            for i in 0..10 {
                if i % 3 == 0 {
                    target = target.status(&format!("d{}", i), 200);
                }
                target = target.delay(&format!("d{}", i), Duration::from_millis((i * round % 4) as u64));
            }
            let words: Vec<String> = (0..10).map(|i| format!("d{}", i)).collect();

            let (outcomes, _) =
                run(Arc::new(target), config(4, 1), Dictionary::from(words)).await;
            // 10 seeds + 4 directories (d0, d3, d6, d9) * 10 children
            assert_eq!(outcomes.len(), 50, "round {}", round);
        }
    }

    #[tokio::test]
    async fn test_cancellation_delivers_a_prefix_and_closes() {
        let words: Vec<String> = (0..50).map(|i| format!("p{}", i)).collect();
        let mut target = FakeTarget::new();
        for i in 5..50 {
            target = target.delay(&format!("p{}", i), Duration::from_secs(30));
        }
        let target = Arc::new(target);

        let cancel = CancellationToken::new();
        let scanner = Scanner::new(config(5, 3), Dictionary::from(words), target).unwrap();
        let mut handle = scanner.start(cancel.clone()).await.unwrap();

        let mut received = Vec::new();
        for _ in 0..5 {
            received.push(handle.next().await.unwrap());
        }
        cancel.cancel();

        let rest = tokio::time::timeout(Duration::from_secs(2), async {
            let mut rest = Vec::new();
            while let Some(outcome) = handle.next().await {
                rest.push(outcome);
            }
            rest
        })
        .await
        .expect("result stream did not close after cancellation");

        let summary = handle.finish().await.unwrap();
        assert!(summary.cancelled);
        assert_eq!(received.len() + rest.len(), summary.probes);
        assert!(summary.probes < 50);
    }

    #[tokio::test]
    async fn test_handle_works_as_a_stream() {
        let target = Arc::new(FakeTarget::new());
        let scanner = Scanner::new(config(2, 0), dictionary(&["a", "b", "c"]), target).unwrap();
        let handle = scanner.start(CancellationToken::new()).await.unwrap();

        let outcomes: Vec<ProbeOutcome> = handle.collect::<Vec<_>>().await;
        assert_eq!(outcomes.len(), 3);
    }

    #[tokio::test]
    async fn test_setup_errors_fail_before_any_probe() {
        let target = Arc::new(FakeTarget::new());
        let result = Scanner::new(config(0, 1), dictionary(&["a"]), target.clone());
        assert!(matches!(result, Err(ScanError::NoWorkers)));
        assert!(target.probed_paths().is_empty());
    }

    #[tokio::test]
    async fn test_failed_preflight_aborts_run() {
        struct Down;

        #[async_trait]
        impl Prober for Down {
            async fn probe(&self, _task: &ScanTask) -> ProbeOutcome {
                unreachable!("no probe should run after a failed preflight")
            }

            async fn preflight(&self) -> Result<(), ScanError> {
                Err(ScanError::Unreachable {
                    url: "http://target/".to_string(),
                    reason: "Connection refused".to_string(),
                })
            }
        }

        let scanner = Scanner::new(config(1, 1), dictionary(&["a"]), Arc::new(Down)).unwrap();
        let result = scanner.start(CancellationToken::new()).await;
        assert!(matches!(result, Err(ScanError::Unreachable { .. })));
    }

    #[tokio::test]
    async fn test_http_scan_against_local_server() {
        use httptest::matchers::*;
        use httptest::responders::status_code;
        use httptest::{Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/"))
                .respond_with(status_code(200)),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/admin"),
                request::headers(contains(("user-agent", "my_test_user_agent"))),
            ])
            .respond_with(status_code(301).insert_header("Location", "/admin/")),
        );
        server.expect(
            Expectation::matching(all_of![
                request::method_path("GET", "/admin/login"),
                request::headers(contains(("user-agent", "my_test_user_agent"))),
            ])
            .respond_with(status_code(200)),
        );
        for missing in ["/login", "/admin/admin"] {
            server.expect(
                Expectation::matching(request::method_path("GET", missing))
                    .respond_with(status_code(404)),
            );
        }

        let mut cfg = ScanConfig::new(Url::parse(&server.url("/").to_string()).unwrap());
        cfg.user_agent = "my_test_user_agent".to_string();
        cfg.max_depth = 1;
        cfg.workers = 4;
        cfg.preflight = true;
        let scanner = Scanner::with_http(cfg, dictionary(&["admin", "login"])).unwrap();
        let (outcomes, summary) = scanner
            .start(CancellationToken::new())
            .await
            .unwrap()
            .collect_outcomes()
            .await
            .unwrap();

        // admin, login, admin/admin, admin/login
        assert_eq!(outcomes.len(), 4);
        assert_eq!(summary.expandable, 2);
        let admin = outcomes.iter().find(|o| o.task.path == "admin").unwrap();
        assert_eq!(admin.status, Some(301));
        assert_eq!(admin.location.as_deref(), Some("/admin/"));
    }

    #[tokio::test]
    async fn test_default_http_run_sends_one_request_per_entry() {
        use httptest::matchers::*;
        use httptest::responders::status_code;
        use httptest::{Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method("GET"))
                .times(3)
                .respond_with(status_code(404)),
        );

        let cfg = ScanConfig::new(Url::parse(&server.url("/").to_string()).unwrap());
        let scanner =
            Scanner::with_http(cfg, dictionary(&["home", "home/index.php", "blabla"])).unwrap();
        let (outcomes, summary) = scanner
            .start(CancellationToken::new())
            .await
            .unwrap()
            .collect_outcomes()
            .await
            .unwrap();

        assert_eq!(outcomes.len(), 3);
        assert!(outcomes.iter().all(|o| o.status == Some(404)));
        assert_eq!(summary.probes, 3);
    }

    #[tokio::test]
    async fn test_entries_escaping_the_base_produce_no_request() {
        use httptest::matchers::*;
        use httptest::responders::status_code;
        use httptest::{Expectation, Server};

        let server = Server::run();
        server.expect(
            Expectation::matching(request::method_path("GET", "/app/admin"))
                .respond_with(status_code(404)),
        );
        server.expect(
            Expectation::matching(request::path(not(matches("^/app/"))))
                .times(0)
                .respond_with(status_code(404)),
        );

        let cfg = ScanConfig::new(Url::parse(&server.url("/app/").to_string()).unwrap());
        let dict = dictionary(&[
            "admin",
            "https:evil.example/x",
            "..\\..\\etc\\passwd",
            "%2e%2e/secret",
            "admin/%2e%2e/%2e%2e/root",
        ]);
        let scanner = Scanner::with_http(cfg, dict).unwrap();
        let (outcomes, summary) = scanner
            .start(CancellationToken::new())
            .await
            .unwrap()
            .collect_outcomes()
            .await
            .unwrap();

        // Only "admin" is left after normalization
        assert_eq!(outcomes.len(), 1);
        assert_eq!(outcomes[0].task.path, "admin");
        assert_eq!(summary.errors, 0);
    }

    #[test]
    fn test_counter_reports_last_completion() {
        let counter = OutstandingCounter::default();
        counter.add(2);
        counter.add(1);
        assert!(!counter.complete_one());
        assert!(!counter.complete_one());
        assert!(counter.complete_one());
        assert_eq!(counter.get(), 0);
    }
}
