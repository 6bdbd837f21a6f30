//! Refresh coordinator.
//!
//! A [`Monitor`] is a cheap handle to a single actor task that owns the
//! hardware session, the poll timer and the current snapshot. Collections run
//! on the blocking pool, one at a time; their results come back to the actor
//! tagged with the generation that started them so that anything started
//! before a `stop()` is thrown away on arrival.

use chrono::{DateTime, Local};
use hwsense_hw::{collect, Event, EventSink, HardwareSession, Snapshot};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinError;
use tokio::time::{self, Instant, Interval, MissedTickBehavior};
use tracing::debug;

use crate::interval::PollInterval;

/// Errors returned by [`Monitor`] commands.
#[derive(Error, Debug)]
pub enum MonitorError {
    /// The hardware session could not be opened.
    #[error("{0}")]
    Access(hwsense_hw::Error),

    /// A previous collection is still holding the session.
    #[error("A previous collection is still running")]
    Busy,

    /// The monitor task has exited.
    #[error("Monitor is not running")]
    Closed,
}

/// Coordinator state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MonitorState {
    #[default]
    Stopped,
    Running,
}

impl std::fmt::Display for MonitorState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MonitorState::Stopped => write!(f, "stopped"),
            MonitorState::Running => write!(f, "running"),
        }
    }
}

/// Why and when monitoring was last forced to stop.
#[derive(Debug, Clone, PartialEq)]
pub struct Halt {
    pub reason: String,
    pub at: DateTime<Local>,
}

/// Observable coordinator status.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Status {
    pub state: MonitorState,
    pub interval: PollInterval,
    pub last_halt: Option<Halt>,
}

impl Status {
    pub fn is_running(&self) -> bool {
        self.state == MonitorState::Running
    }
}

/// How one requested collection cycle ended.
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// The snapshot was published.
    Applied(Snapshot),
    /// Another collection was in flight; nothing was started.
    Skipped,
    /// Monitoring stopped while the collection ran; its result was dropped.
    Discarded,
    /// Monitoring is stopped.
    NotRunning,
    /// The collection failed as a whole; monitoring continues.
    Failed(String),
    /// The collection failed fatally; monitoring was halted.
    Halted(String),
}

impl CycleOutcome {
    pub fn name(&self) -> &'static str {
        match self {
            CycleOutcome::Applied(_) => "applied",
            CycleOutcome::Skipped => "skipped",
            CycleOutcome::Discarded => "discarded",
            CycleOutcome::NotRunning => "not-running",
            CycleOutcome::Failed(_) => "failed",
            CycleOutcome::Halted(_) => "halted",
        }
    }
}

/// Resolves when the collection cycle it was returned for is over.
#[derive(Debug)]
pub struct CycleHandle {
    rx: oneshot::Receiver<CycleOutcome>,
}

impl CycleHandle {
    fn pending() -> (oneshot::Sender<CycleOutcome>, Self) {
        let (tx, rx) = oneshot::channel();
        (tx, Self { rx })
    }

    fn ready(outcome: CycleOutcome) -> Self {
        let (tx, handle) = Self::pending();
        let _ = tx.send(outcome);
        handle
    }

    /// Waits for the cycle to end.
    pub async fn outcome(self) -> CycleOutcome {
        // The actor only drops a waiter when it exits mid-cycle.
        self.rx.await.unwrap_or(CycleOutcome::Discarded)
    }
}

/// Construction-time coordinator settings.
#[derive(Debug, Clone, Copy)]
pub struct MonitorOptions {
    pub interval: PollInterval,
    /// Longest a collection may run before monitoring halts (`None` = forever).
    pub collection_timeout: Option<Duration>,
}

impl Default for MonitorOptions {
    fn default() -> Self {
        Self {
            interval: PollInterval::default(),
            collection_timeout: Some(Duration::from_secs(30)),
        }
    }
}

type StartReply = oneshot::Sender<Result<Option<CycleHandle>, MonitorError>>;

enum Command {
    Start { reply: StartReply },
    Stop { reply: oneshot::Sender<()> },
    Refresh { reply: oneshot::Sender<CycleHandle> },
    SetInterval { interval: PollInterval, reply: oneshot::Sender<()> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to the refresh coordinator.
#[derive(Clone)]
pub struct Monitor {
    cmd_tx: mpsc::Sender<Command>,
    snapshot_rx: watch::Receiver<Snapshot>,
    status_rx: watch::Receiver<Status>,
}

impl Monitor {
    /// Spawns the coordinator task. Monitoring starts Stopped.
    pub fn spawn(session: HardwareSession, options: MonitorOptions, events: Arc<dyn EventSink>) -> Self {
        let (cmd_tx, cmd_rx) = mpsc::channel(32);
        let (done_tx, done_rx) = mpsc::unbounded_channel();
        let (snapshot_tx, snapshot_rx) = watch::channel(Snapshot::default());
        let (status_tx, status_rx) = watch::channel(Status {
            interval: options.interval,
            ..Status::default()
        });

        let actor = Actor {
            session: Arc::new(Mutex::new(session)),
            events,
            timeout: options.collection_timeout,
            interval: options.interval,
            state: MonitorState::Stopped,
            ticker: None,
            generation: 0,
            in_flight: None,
            close_pending: false,
            pending_starts: Vec::new(),
            sequence: 0,
            last_halt: None,
            cmd_rx,
            done_tx,
            done_rx,
            snapshot_tx,
            status_tx,
        };
        tokio::spawn(actor.run());

        Self {
            cmd_tx,
            snapshot_rx,
            status_rx,
        }
    }

    async fn request<T>(&self, build: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, MonitorError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(build(tx))
            .await
            .map_err(|_| MonitorError::Closed)?;
        rx.await.map_err(|_| MonitorError::Closed)
    }

    /// Opens the session, starts the timer and triggers one collection.
    ///
    /// Returns `Ok(None)` if monitoring was already running.
    pub async fn start(&self) -> Result<Option<CycleHandle>, MonitorError> {
        self.request(|reply| Command::Start { reply }).await?
    }

    /// Stops the timer, closes the session and clears the snapshot.
    pub async fn stop(&self) -> Result<(), MonitorError> {
        self.request(|reply| Command::Stop { reply }).await
    }

    /// Requests an immediate collection.
    pub async fn refresh_now(&self) -> Result<CycleHandle, MonitorError> {
        self.request(|reply| Command::Refresh { reply }).await
    }

    /// Changes the poll interval; the next tick is one new period from now.
    pub async fn set_interval(&self, interval: PollInterval) -> Result<(), MonitorError> {
        self.request(|reply| Command::SetInterval { interval, reply }).await
    }

    /// Stops monitoring and ends the coordinator task.
    pub async fn shutdown(&self) -> Result<(), MonitorError> {
        self.request(|reply| Command::Shutdown { reply }).await
    }

    /// Current snapshot.
    pub fn snapshot(&self) -> Snapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Notifies every time the current snapshot is replaced.
    pub fn subscribe(&self) -> watch::Receiver<Snapshot> {
        self.snapshot_rx.clone()
    }

    pub fn status(&self) -> Status {
        self.status_rx.borrow().clone()
    }

    /// Notifies every time the state, interval or last halt changes.
    pub fn watch_status(&self) -> watch::Receiver<Status> {
        self.status_rx.clone()
    }
}

struct Completion {
    generation: u64,
    result: Result<hwsense_hw::Result<Snapshot>, JoinError>,
}

struct InFlight {
    deadline: Option<Instant>,
    waiter: Option<oneshot::Sender<CycleOutcome>>,
}

struct PendingStart {
    deadline: Option<Instant>,
    reply: StartReply,
}

struct Actor {
    session: Arc<Mutex<HardwareSession>>,
    events: Arc<dyn EventSink>,
    timeout: Option<Duration>,
    interval: PollInterval,
    state: MonitorState,
    ticker: Option<Interval>,
    generation: u64,
    in_flight: Option<InFlight>,
    /// Close the session once the in-flight worker hands it back.
    close_pending: bool,
    /// `start()` calls waiting for a stale worker to return.
    pending_starts: Vec<PendingStart>,
    sequence: u64,
    last_halt: Option<Halt>,
    cmd_rx: mpsc::Receiver<Command>,
    done_tx: mpsc::UnboundedSender<Completion>,
    done_rx: mpsc::UnboundedReceiver<Completion>,
    snapshot_tx: watch::Sender<Snapshot>,
    status_tx: watch::Sender<Status>,
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(ticker) => {
            ticker.tick().await;
        }
        None => std::future::pending().await,
    }
}

async fn sleep_until(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn panic_message(err: JoinError) -> String {
    let payload = err.into_panic();
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

impl Actor {
    async fn run(mut self) {
        loop {
            let flight_deadline = self.in_flight.as_ref().and_then(|f| f.deadline);
            let start_deadline = self.pending_starts.iter().filter_map(|p| p.deadline).min();

            tokio::select! {
                cmd = self.cmd_rx.recv() => {
                    // All handles dropped: same as a shutdown.
                    let Some(cmd) = cmd else {
                        self.stop();
                        break;
                    };
                    if !self.handle(cmd) {
                        break;
                    }
                }
                Some(done) = self.done_rx.recv() => self.complete(done),
                _ = next_tick(&mut self.ticker) => self.on_tick(),
                _ = sleep_until(flight_deadline) => self.on_timeout(),
                _ = sleep_until(start_deadline) => self.expire_starts(),
            }
        }

        for pending in self.pending_starts.drain(..) {
            let _ = pending.reply.send(Err(MonitorError::Closed));
        }
        debug!("Monitor task exited");
    }

    /// Applies one command. Returns false once the task should exit.
    fn handle(&mut self, cmd: Command) -> bool {
        match cmd {
            Command::Start { reply } => {
                if self.state == MonitorState::Stopped && self.in_flight.is_some() {
                    debug!("Start waiting for the previous collection to return");
                    self.pending_starts.push(PendingStart {
                        deadline: self.timeout.map(|t| Instant::now() + t),
                        reply,
                    });
                } else {
                    let _ = reply.send(self.start());
                }
            }
            Command::Stop { reply } => {
                self.stop();
                let _ = reply.send(());
            }
            Command::Refresh { reply } => {
                let handle = if self.state == MonitorState::Running {
                    self.begin_cycle("Refresh")
                } else {
                    CycleHandle::ready(CycleOutcome::NotRunning)
                };
                let _ = reply.send(handle);
            }
            Command::SetInterval { interval, reply } => {
                self.set_interval(interval);
                let _ = reply.send(());
            }
            Command::Shutdown { reply } => {
                self.stop();
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn start(&mut self) -> Result<Option<CycleHandle>, MonitorError> {
        if self.state == MonitorState::Running {
            return Ok(None);
        }

        let opened = self
            .session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .open();
        if let Err(e) = opened {
            self.events.emit(Event::error(format!("Failed to start monitoring: {}", e)));
            return Err(MonitorError::Access(e));
        }

        self.state = MonitorState::Running;
        self.ticker = Some(self.new_ticker());
        self.publish_status();
        self.events.emit(Event::info(format!(
            "Monitoring started ({} interval)",
            self.interval
        )));

        Ok(Some(self.begin_cycle("Start")))
    }

    fn stop(&mut self) {
        if self.state == MonitorState::Stopped {
            return;
        }
        self.shut_down_cycle();
        self.publish_status();
        self.events.emit(Event::info("Monitoring stopped"));
    }

    /// Leaves Running: drops the timer, invalidates the in-flight cycle,
    /// clears the snapshot and closes (or schedules closing) the session.
    fn shut_down_cycle(&mut self) {
        self.state = MonitorState::Stopped;
        self.ticker = None;
        self.generation += 1;
        self.publish_snapshot(Snapshot::default());

        if self.in_flight.is_some() {
            self.close_pending = true;
        } else {
            self.close_session();
        }
    }

    fn close_session(&mut self) {
        self.session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .close();
    }

    fn set_interval(&mut self, interval: PollInterval) {
        self.interval = interval;
        if self.state == MonitorState::Running {
            self.ticker = Some(self.new_ticker());
        }
        self.publish_status();
        self.events.emit(Event::info(format!("Poll interval set to {}", interval)));
    }

    fn new_ticker(&self) -> Interval {
        let period = self.interval.period();
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker
    }

    fn on_tick(&mut self) {
        if self.state == MonitorState::Running {
            // Ticks carry no waiter; a skip only shows up as a warning.
            drop(self.begin_cycle("Tick"));
        }
    }

    /// Spawns a collection unless one is already running.
    fn begin_cycle(&mut self, trigger: &str) -> CycleHandle {
        if self.in_flight.is_some() {
            self.events.emit(Event::warning(format!(
                "{} skipped: previous collection still in progress",
                trigger
            )));
            return CycleHandle::ready(CycleOutcome::Skipped);
        }

        let (waiter, handle) = CycleHandle::pending();
        let generation = self.generation;
        let session = self.session.clone();
        let events = self.events.clone();
        let done_tx = self.done_tx.clone();

        let worker = tokio::task::spawn_blocking(move || {
            let mut session = session.lock().unwrap_or_else(PoisonError::into_inner);
            collect(&mut session, events.as_ref())
        });
        tokio::spawn(async move {
            let result = worker.await;
            let _ = done_tx.send(Completion { generation, result });
        });

        debug!("{} started collection (generation {})", trigger, generation);
        self.in_flight = Some(InFlight {
            deadline: self.timeout.map(|t| Instant::now() + t),
            waiter: Some(waiter),
        });
        handle
    }

    fn complete(&mut self, done: Completion) {
        let Some(flight) = self.in_flight.take() else {
            return;
        };
        if self.close_pending {
            self.close_pending = false;
            self.close_session();
        }

        let outcome = if done.generation != self.generation {
            debug!("Discarding result of generation {}", done.generation);
            CycleOutcome::Discarded
        } else {
            match done.result {
                Ok(Ok(snapshot)) => {
                    let snapshot = self.publish_snapshot(snapshot);
                    CycleOutcome::Applied(snapshot)
                }
                Ok(Err(e)) if e.is_fatal() => {
                    let reason = e.to_string();
                    self.halt(&reason);
                    CycleOutcome::Halted(reason)
                }
                Ok(Err(e)) => {
                    let reason = e.to_string();
                    self.events.emit(Event::error(format!("Sensor collection failed: {}", reason)));
                    CycleOutcome::Failed(reason)
                }
                Err(e) if e.is_panic() => {
                    let reason = format!("backend panicked: {}", panic_message(e));
                    self.events.emit(Event::error(format!("Sensor collection failed: {}", reason)));
                    CycleOutcome::Failed(reason)
                }
                Err(_) => CycleOutcome::Discarded,
            }
        };

        if let Some(waiter) = flight.waiter {
            let _ = waiter.send(outcome);
        }

        for pending in std::mem::take(&mut self.pending_starts) {
            let _ = pending.reply.send(self.start());
        }
    }

    fn on_timeout(&mut self) {
        let Some(timeout) = self.timeout else {
            return;
        };
        let reason = format!("sensor collection did not finish within {:?}", timeout);

        // The worker keeps running with the session; its result will arrive
        // under a stale generation.
        let waiter = self.in_flight.as_mut().and_then(|flight| {
            flight.deadline = None;
            flight.waiter.take()
        });

        self.halt(&reason);
        if let Some(waiter) = waiter {
            let _ = waiter.send(CycleOutcome::Halted(reason));
        }
    }

    fn halt(&mut self, reason: &str) {
        self.shut_down_cycle();
        self.last_halt = Some(Halt {
            reason: reason.to_string(),
            at: Local::now(),
        });
        self.publish_status();
        self.events.emit(Event::fatal(format!("Monitoring halted: {}", reason)));
    }

    fn expire_starts(&mut self) {
        let now = Instant::now();
        let (expired, waiting): (Vec<_>, Vec<_>) = std::mem::take(&mut self.pending_starts)
            .into_iter()
            .partition(|p| p.deadline.is_some_and(|d| d <= now));
        self.pending_starts = waiting;

        for pending in expired {
            let _ = pending.reply.send(Err(MonitorError::Busy));
        }
    }

    fn publish_snapshot(&mut self, snapshot: Snapshot) -> Snapshot {
        self.sequence += 1;
        let snapshot = snapshot.with_sequence(self.sequence);
        self.snapshot_tx.send_replace(snapshot.clone());
        snapshot
    }

    fn publish_status(&self) {
        self.status_tx.send_replace(Status {
            state: self.state,
            interval: self.interval,
            last_halt: self.last_halt.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hwsense_hw::fake::{FakeBackend, FakeDevice, FakeFailure, Gate, RecordingSink};
    use hwsense_hw::{DeviceSelection, EventLevel, HardwareType, SensorType};

    fn spawn_with(backend: FakeBackend, options: MonitorOptions) -> (Monitor, Arc<RecordingSink>) {
        let sink = Arc::new(RecordingSink::new());
        let session = HardwareSession::new(Box::new(backend), DeviceSelection::default());
        let monitor = Monitor::spawn(session, options, sink.clone());
        (monitor, sink)
    }

    fn cpu() -> FakeDevice {
        FakeDevice::new("CPU", HardwareType::Cpu).with_sensor("Tctl", SensorType::Temperature, Some(42.0))
    }

    fn count(sink: &RecordingSink, level: EventLevel) -> usize {
        sink.events().iter().filter(|e| e.level == level).count()
    }

    #[tokio::test]
    async fn test_start_failure_stays_stopped() {
        let backend = FakeBackend::new().with_device(cpu()).fail_open("permission denied");
        let counters = backend.counters();
        let (monitor, _sink) = spawn_with(backend, MonitorOptions::default());

        let err = monitor.start().await.unwrap_err();
        assert!(matches!(err, MonitorError::Access(_)));
        assert!(err.to_string().contains("permission denied"));

        let status = monitor.status();
        assert_eq!(status.state, MonitorState::Stopped);
        assert!(monitor.snapshot().is_empty());
        assert_eq!(monitor.snapshot().sequence(), 0);
        assert_eq!(counters.updates(), 0);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_collects_immediately() {
        let (monitor, _sink) = spawn_with(FakeBackend::new().with_device(cpu()), MonitorOptions::default());

        let handle = monitor.start().await.unwrap().expect("first start returns a handle");
        let CycleOutcome::Applied(snapshot) = handle.outcome().await else {
            panic!("expected applied snapshot");
        };
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot.sequence(), 1);
        assert_eq!(monitor.snapshot(), snapshot);
        assert!(monitor.status().is_running());

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_start_and_stop_are_idempotent() {
        let backend = FakeBackend::new().with_device(cpu());
        let counters = backend.counters();
        let (monitor, _sink) = spawn_with(backend, MonitorOptions::default());

        let first = monitor.start().await.unwrap().unwrap();
        assert!(monitor.start().await.unwrap().is_none());
        first.outcome().await;
        assert_eq!(counters.opens(), 1);

        monitor.stop().await.unwrap();
        monitor.stop().await.unwrap();
        assert_eq!(counters.closes(), 1);
        assert_eq!(monitor.status().state, MonitorState::Stopped);
        assert!(monitor.snapshot().is_empty());

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_when_stopped() {
        let (monitor, _sink) = spawn_with(FakeBackend::new().with_device(cpu()), MonitorOptions::default());
        let handle = monitor.refresh_now().await.unwrap();
        assert_eq!(handle.outcome().await, CycleOutcome::NotRunning);
        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_refresh_while_in_flight_is_skipped() {
        let gate = Gate::closed();
        let backend = FakeBackend::new().with_device(cpu().gated(&gate));
        let counters = backend.counters();
        let (monitor, sink) = spawn_with(backend, MonitorOptions::default());

        let first = monitor.start().await.unwrap().unwrap();
        let second = monitor.refresh_now().await.unwrap();
        assert_eq!(second.outcome().await, CycleOutcome::Skipped);
        assert_eq!(count(&sink, EventLevel::Warning), 1);

        gate.release();
        assert!(matches!(first.outcome().await, CycleOutcome::Applied(_)));
        assert_eq!(counters.updates(), 1);

        let third = monitor.refresh_now().await.unwrap();
        assert!(matches!(third.outcome().await, CycleOutcome::Applied(_)));
        assert_eq!(monitor.snapshot().sequence(), 2);

        monitor.shutdown().await.unwrap();
    }

    fn tick_skips(sink: &RecordingSink) -> usize {
        sink.events()
            .iter()
            .filter(|e| e.level == EventLevel::Warning && e.message.starts_with("Tick skipped"))
            .count()
    }

    /// Lets the monitor task catch up with the paused clock.
    async fn settle(sink: &RecordingSink, skips: usize) {
        for _ in 0..100 {
            if tick_skips(sink) >= skips {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(tick_skips(sink), skips);
    }

    #[tokio::test(start_paused = true)]
    async fn test_ticks_during_collection_are_skipped_not_queued() {
        let gate = Gate::closed();
        let backend = FakeBackend::new().with_device(cpu().gated(&gate));
        let counters = backend.counters();
        let options = MonitorOptions {
            interval: PollInterval::Normal,
            collection_timeout: None,
        };
        let (monitor, sink) = spawn_with(backend, options);
        let mut snapshots = monitor.subscribe();
        let period = PollInterval::Normal.period();

        let first = monitor.start().await.unwrap().unwrap();
        for skips in 1..=3 {
            time::advance(period).await;
            settle(&sink, skips).await;
            assert_eq!(counters.updates(), 1);
        }

        gate.release();
        assert!(matches!(first.outcome().await, CycleOutcome::Applied(_)));
        snapshots.borrow_and_update();

        // The skipped ticks are gone; nothing runs until the next period.
        for _ in 0..20 {
            tokio::task::yield_now().await;
        }
        assert_eq!(counters.updates(), 1);
        assert_eq!(monitor.snapshot().sequence(), 1);

        time::advance(period).await;
        snapshots.changed().await.unwrap();
        assert_eq!(counters.updates(), 2);
        assert_eq!(snapshots.borrow().sequence(), 2);
        assert_eq!(tick_skips(&sink), 3);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_stop_discards_in_flight_result() {
        let gate = Gate::closed();
        let backend = FakeBackend::new().with_device(cpu().gated(&gate));
        let counters = backend.counters();
        let (monitor, _sink) = spawn_with(backend, MonitorOptions::default());

        let handle = monitor.start().await.unwrap().unwrap();
        monitor.stop().await.unwrap();
        assert_eq!(monitor.status().state, MonitorState::Stopped);
        // The worker still holds the session.
        assert_eq!(counters.closes(), 0);

        gate.release();
        assert_eq!(handle.outcome().await, CycleOutcome::Discarded);
        assert!(monitor.snapshot().is_empty());
        assert_eq!(counters.closes(), 1);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_interval_change_restarts_timer() {
        let options = MonitorOptions {
            interval: PollInterval::Slow,
            ..MonitorOptions::default()
        };
        let (monitor, _sink) = spawn_with(FakeBackend::new().with_device(cpu()), options);
        let mut snapshots = monitor.subscribe();

        monitor.start().await.unwrap().unwrap().outcome().await;
        snapshots.borrow_and_update();

        monitor.set_interval(PollInterval::Fast).await.unwrap();
        assert_eq!(monitor.status().interval, PollInterval::Fast);

        // A 10s timer would not fire in time; the new 1s one does.
        time::timeout(Duration::from_secs(3), snapshots.changed())
            .await
            .expect("tick at the new cadence")
            .unwrap();
        assert_eq!(snapshots.borrow().sequence(), 2);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_fatal_error_halts() {
        let backend = FakeBackend::new()
            .with_device(cpu())
            .with_device(FakeDevice::new("GPU", HardwareType::Gpu).fail_update(FakeFailure::Fatal("out of handles".into())));
        let counters = backend.counters();
        let (monitor, sink) = spawn_with(backend, MonitorOptions::default());

        let handle = monitor.start().await.unwrap().unwrap();
        let CycleOutcome::Halted(reason) = handle.outcome().await else {
            panic!("expected halt");
        };
        assert!(reason.contains("out of handles"));

        let status = monitor.status();
        assert_eq!(status.state, MonitorState::Stopped);
        assert!(status.last_halt.unwrap().reason.contains("out of handles"));
        assert!(monitor.snapshot().is_empty());
        assert_eq!(count(&sink, EventLevel::Fatal), 1);
        assert_eq!(counters.closes(), 1);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_backend_panic_keeps_running() {
        let backend = FakeBackend::new()
            .with_device(FakeDevice::new("GPU", HardwareType::Gpu).fail_update(FakeFailure::Panic("driver bug".into())));
        let (monitor, sink) = spawn_with(backend, MonitorOptions::default());

        let handle = monitor.start().await.unwrap().unwrap();
        let CycleOutcome::Failed(reason) = handle.outcome().await else {
            panic!("expected failure");
        };
        assert!(reason.contains("driver bug"));
        assert!(monitor.status().is_running());
        assert_eq!(count(&sink, EventLevel::Error), 1);

        monitor.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_collection_timeout_halts() {
        let gate = Gate::closed();
        let backend = FakeBackend::new().with_device(cpu().gated(&gate));
        let options = MonitorOptions {
            collection_timeout: Some(Duration::from_millis(200)),
            ..MonitorOptions::default()
        };
        let (monitor, sink) = spawn_with(backend, options);

        let handle = monitor.start().await.unwrap().unwrap();
        assert!(matches!(handle.outcome().await, CycleOutcome::Halted(_)));
        assert_eq!(monitor.status().state, MonitorState::Stopped);
        assert!(monitor.status().last_halt.is_some());
        assert_eq!(count(&sink, EventLevel::Fatal), 1);

        // Still wedged: start gives up after one timeout.
        assert!(matches!(monitor.start().await, Err(MonitorError::Busy)));

        // Once the worker returns, start waits for it and succeeds.
        let pending = {
            let monitor = monitor.clone();
            tokio::spawn(async move { monitor.start().await })
        };
        time::sleep(Duration::from_millis(50)).await;
        gate.release();

        let handle = pending.await.unwrap().unwrap().expect("restarted");
        assert!(matches!(handle.outcome().await, CycleOutcome::Applied(_)));
        assert!(monitor.status().is_running());

        monitor.shutdown().await.unwrap();
    }
}
