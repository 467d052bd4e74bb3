use std::sync::Arc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::{
    sync::{Mutex, broadcast, broadcast::error::RecvError, mpsc, oneshot},
    time::{Duration, Instant, MissedTickBehavior},
};
use tracing::{debug, warn};

use crate::{
    core::{
        clock::{ClockState, format_elapsed},
        engine::TimingEngine,
        error::TimingError,
        reconcile::ReconcileReport,
        roster::RosterBoat,
    },
    event::{EventId, TimingEvent},
    feed::ChangeNotice,
    persist::TimingStore,
    results::projector::{RankedResult, ResultsBoard},
    types::{BowNumber, DurationMs, TimestampMs, TimingKind},
};

use super::events::TimingUpdate;

/// Failure of a request sent through [`TimingHandle`].
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The engine rejected the action.
    #[error(transparent)]
    Timing(#[from] TimingError),
    /// The command loop has shut down.
    #[error("timing runtime channel closed")]
    ChannelClosed,
    /// A blocking store call panicked or was cancelled.
    #[error("blocking task failed: {0}")]
    Join(String),
}

/// Runtime tuning, loadable from JSON.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Period of [`TimingUpdate::Tick`] while the clock runs.
    pub tick_interval_ms: u64,
    /// Quiet period that batches bursts of change notices; 0 reconciles on every notice.
    pub reconcile_debounce_ms: u64,
    /// Commands buffered before callers wait.
    pub command_queue_bound: usize,
    /// Updates buffered per subscriber before it lags.
    pub update_queue_bound: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            reconcile_debounce_ms: 250,
            command_queue_bound: 256,
            update_queue_bound: 1024,
        }
    }
}

impl RuntimeConfig {
    /// Parses a JSON object; missing fields take their defaults.
    pub fn from_json_str(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }
}

/// Clock reading for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClockStatus {
    /// Clock state.
    pub state: ClockState,
    /// Elapsed race time.
    pub elapsed_ms: DurationMs,
    /// `HH:MM:SS.t`.
    pub elapsed: String,
}

/// Cloneable front end to a running timing loop.
pub struct TimingHandle {
    cmd_tx: mpsc::Sender<Command>,
    updates_tx: broadcast::Sender<TimingUpdate>,
}

impl Clone for TimingHandle {
    fn clone(&self) -> Self {
        Self {
            cmd_tx: self.cmd_tx.clone(),
            updates_tx: self.updates_tx.clone(),
        }
    }
}

enum Command {
    StartClock {
        resp: oneshot::Sender<Result<TimestampMs, RuntimeError>>,
    },
    StopClock {
        resp: oneshot::Sender<Result<TimestampMs, RuntimeError>>,
    },
    MarkTime {
        kind: TimingKind,
        captured_at: Option<TimestampMs>,
        bow: Option<BowNumber>,
        resp: oneshot::Sender<Result<EventId, RuntimeError>>,
    },
    AssignBow {
        event_id: EventId,
        bow: BowNumber,
        resp: oneshot::Sender<Result<(), RuntimeError>>,
    },
    Clock {
        resp: oneshot::Sender<ClockStatus>,
    },
    Events {
        resp: oneshot::Sender<Vec<TimingEvent>>,
    },
    Roster {
        resp: oneshot::Sender<Vec<RosterBoat>>,
    },
    Results {
        resp: oneshot::Sender<Result<Vec<RankedResult>, RuntimeError>>,
    },
    Reconcile {
        resp: oneshot::Sender<Result<ReconcileReport, RuntimeError>>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

type Shared<S> = Arc<Mutex<TimingEngine<S>>>;

struct LoopState {
    running: bool,
    board: ResultsBoard,
}

/// Moves `engine` into a single-writer task and returns its handle.
///
/// When `feed` is given, change notices trigger debounced reconciliation.
pub fn spawn_timing<S: TimingStore + 'static>(
    engine: TimingEngine<S>,
    feed: Option<broadcast::Receiver<ChangeNotice>>,
    config: RuntimeConfig,
) -> TimingHandle {
    let (cmd_tx, mut cmd_rx) = mpsc::channel::<Command>(config.command_queue_bound.max(1));
    let (updates_tx, _) = broadcast::channel::<TimingUpdate>(config.update_queue_bound.max(1));

    let mut state = LoopState {
        running: engine.clock().is_running(),
        board: ResultsBoard::new(),
    };
    let engine: Shared<S> = Arc::new(Mutex::new(engine));
    let updates_tx_loop = updates_tx.clone();

    tokio::spawn(async move {
        let mut feed = feed;
        let mut feed_open = feed.is_some();
        let mut reconcile_due: Option<Instant> = None;
        let debounce = Duration::from_millis(config.reconcile_debounce_ms);
        let mut ticker = tokio::time::interval(Duration::from_millis(config.tick_interval_ms.max(1)));
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        refresh_results(&engine, &mut state, &updates_tx_loop).await;

        loop {
            tokio::select! {
                cmd = cmd_rx.recv() => {
                    let Some(cmd) = cmd else { break; };
                    if handle_command(cmd, &engine, &mut state, &updates_tx_loop).await {
                        break;
                    }
                }
                notice = recv_notice(&mut feed), if feed_open => {
                    match notice {
                        Some(notice) => {
                            debug!(table = ?notice.map(|n| n.table), "change notice received");
                            if debounce.is_zero() {
                                reconcile_due = None;
                                let _ = reconcile(&engine, &mut state, &updates_tx_loop).await;
                            } else {
                                reconcile_due.get_or_insert_with(|| Instant::now() + debounce);
                            }
                        }
                        None => feed_open = false,
                    }
                }
                _ = tokio::time::sleep_until(reconcile_due.unwrap_or_else(Instant::now)), if reconcile_due.is_some() => {
                    reconcile_due = None;
                    let _ = reconcile(&engine, &mut state, &updates_tx_loop).await;
                }
                _ = ticker.tick(), if state.running => {
                    let status = clock_status(&engine).await;
                    let _ = updates_tx_loop.send(TimingUpdate::Tick { elapsed: status.elapsed });
                }
            }
        }
    });

    TimingHandle { cmd_tx, updates_tx }
}

impl TimingHandle {
    /// Receives updates published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TimingUpdate> {
        self.updates_tx.subscribe()
    }

    /// Starts the race clock; see [`TimingEngine::start_clock`].
    pub async fn start_clock(&self) -> Result<TimestampMs, RuntimeError> {
        self.request(|resp| Command::StartClock { resp }).await?
    }

    /// Stops the race clock.
    pub async fn stop_clock(&self) -> Result<TimestampMs, RuntimeError> {
        self.request(|resp| Command::StopClock { resp }).await?
    }

    /// Marks a time captured now.
    pub async fn mark(&self, kind: TimingKind, bow: Option<BowNumber>) -> Result<EventId, RuntimeError> {
        self.request(|resp| Command::MarkTime {
            kind,
            captured_at: None,
            bow,
            resp,
        })
        .await?
    }

    /// Marks a time captured at an explicit instant.
    pub async fn mark_at(
        &self,
        kind: TimingKind,
        captured_at: TimestampMs,
        bow: Option<BowNumber>,
    ) -> Result<EventId, RuntimeError> {
        self.request(|resp| Command::MarkTime {
            kind,
            captured_at: Some(captured_at),
            bow,
            resp,
        })
        .await?
    }

    /// Binds a pending event to a boat.
    pub async fn assign_bow_number(&self, event_id: EventId, bow: BowNumber) -> Result<(), RuntimeError> {
        self.request(|resp| Command::AssignBow { event_id, bow, resp })
            .await?
    }

    /// Current clock reading.
    pub async fn clock(&self) -> Result<ClockStatus, RuntimeError> {
        self.request(|resp| Command::Clock { resp }).await
    }

    /// Event history, most recent capture first.
    pub async fn events(&self) -> Result<Vec<TimingEvent>, RuntimeError> {
        self.request(|resp| Command::Events { resp }).await
    }

    /// Boats ordered by bow number.
    pub async fn roster(&self) -> Result<Vec<RosterBoat>, RuntimeError> {
        self.request(|resp| Command::Roster { resp }).await
    }

    /// Ranked results from the store.
    pub async fn results(&self) -> Result<Vec<RankedResult>, RuntimeError> {
        self.request(|resp| Command::Results { resp }).await?
    }

    /// Forces a reconciliation pass now.
    pub async fn reconcile(&self) -> Result<ReconcileReport, RuntimeError> {
        self.request(|resp| Command::Reconcile { resp }).await?
    }

    /// Stops the command loop after pending commands.
    pub async fn shutdown(&self) -> Result<(), RuntimeError> {
        self.request(|resp| Command::Shutdown { resp }).await
    }

    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Command) -> Result<T, RuntimeError> {
        let (tx, rx) = oneshot::channel();
        self.cmd_tx
            .send(make(tx))
            .await
            .map_err(|_| RuntimeError::ChannelClosed)?;
        rx.await.map_err(|_| RuntimeError::ChannelClosed)
    }
}

async fn handle_command<S: TimingStore + 'static>(
    cmd: Command,
    engine: &Shared<S>,
    state: &mut LoopState,
    updates_tx: &broadcast::Sender<TimingUpdate>,
) -> bool {
    match cmd {
        Command::StartClock { resp } => {
            let res = run_blocking(engine, |e| e.start_clock()).await;
            // A rejected start may still have adopted another station's start.
            let clock = engine.lock().await.clock();
            if let (false, ClockState::Running { started_at }) = (state.running, clock) {
                state.running = true;
                let _ = updates_tx.send(TimingUpdate::ClockStarted { started_at });
            }
            let _ = resp.send(report_rejection(res, updates_tx));
        }
        Command::StopClock { resp } => {
            let res = run_blocking(engine, |e| e.stop_clock()).await;
            if let Ok(stopped_at) = &res {
                state.running = false;
                let _ = updates_tx.send(TimingUpdate::ClockStopped { stopped_at: *stopped_at });
            }
            let _ = resp.send(report_rejection(res, updates_tx));
        }
        Command::MarkTime {
            kind,
            captured_at,
            bow,
            resp,
        } => {
            let res = run_blocking(engine, move |e| match captured_at {
                Some(at) => e.mark_time(kind, at, bow),
                None => e.mark_now(kind, bow),
            })
            .await;
            report_unsaved_statuses(engine, updates_tx).await;
            if let Ok(event_id) = &res {
                let _ = updates_tx.send(TimingUpdate::EventRecorded {
                    event_id: *event_id,
                    kind,
                    pending: bow.is_none(),
                });
                if bow.is_some() && kind == TimingKind::Finish {
                    refresh_results(engine, state, updates_tx).await;
                }
            }
            let _ = resp.send(report_rejection(res, updates_tx));
        }
        Command::AssignBow { event_id, bow, resp } => {
            let res = run_blocking(engine, move |e| e.assign_bow_number(event_id, bow)).await;
            report_unsaved_statuses(engine, updates_tx).await;
            if res.is_ok() {
                let _ = updates_tx.send(TimingUpdate::EventAssigned {
                    event_id,
                    bow_number: bow,
                });
                refresh_results(engine, state, updates_tx).await;
            }
            let _ = resp.send(report_rejection(res, updates_tx));
        }
        Command::Clock { resp } => {
            let _ = resp.send(clock_status(engine).await);
        }
        Command::Events { resp } => {
            let _ = resp.send(engine.lock().await.events().to_vec());
        }
        Command::Roster { resp } => {
            let guard = engine.lock().await;
            let boats = guard.roster().boats().into_iter().cloned().collect();
            let _ = resp.send(boats);
        }
        Command::Results { resp } => {
            let res = run_blocking(engine, |e| e.results()).await;
            let _ = resp.send(res);
        }
        Command::Reconcile { resp } => {
            let _ = resp.send(reconcile(engine, state, updates_tx).await);
        }
        Command::Shutdown { resp } => {
            let _ = resp.send(());
            return true;
        }
    }

    false
}

/// Runs engine work that may block on the store off the async workers.
async fn run_blocking<S, T>(
    engine: &Shared<S>,
    f: impl FnOnce(&mut TimingEngine<S>) -> Result<T, TimingError> + Send + 'static,
) -> Result<T, RuntimeError>
where
    S: TimingStore + 'static,
    T: Send + 'static,
{
    let engine = Arc::clone(engine);
    tokio::task::spawn_blocking(move || {
        let mut guard = engine.blocking_lock();
        f(&mut guard)
    })
    .await
    .map_err(|e| RuntimeError::Join(e.to_string()))?
    .map_err(RuntimeError::from)
}

fn report_rejection<T>(
    res: Result<T, RuntimeError>,
    updates_tx: &broadcast::Sender<TimingUpdate>,
) -> Result<T, RuntimeError> {
    if let Err(err) = &res {
        let operator_error = matches!(err, RuntimeError::Timing(e) if e.is_operator_error());
        let _ = updates_tx.send(TimingUpdate::ActionRejected {
            reason: err.to_string(),
            operator_error,
        });
    }
    res
}

async fn report_unsaved_statuses<S>(engine: &Shared<S>, updates_tx: &broadcast::Sender<TimingUpdate>) {
    let unsaved = engine.lock().await.take_unsaved_statuses();
    for unsaved in unsaved {
        let _ = updates_tx.send(TimingUpdate::EntryStatusNotSaved {
            entry_id: unsaved.entry_id,
            status: unsaved.status,
            reason: unsaved.reason,
        });
    }
}

async fn reconcile<S: TimingStore + 'static>(
    engine: &Shared<S>,
    state: &mut LoopState,
    updates_tx: &broadcast::Sender<TimingUpdate>,
) -> Result<ReconcileReport, RuntimeError> {
    let report = run_blocking(engine, |e| e.reconcile())
        .await
        .inspect_err(|err| warn!(%err, "reconciliation failed"))?;

    if report.clock_changed() {
        match report.clock_after {
            ClockState::Running { started_at } => {
                let _ = updates_tx.send(TimingUpdate::ClockStarted { started_at });
            }
            ClockState::Stopped { stopped_at, .. } => {
                let _ = updates_tx.send(TimingUpdate::ClockStopped { stopped_at });
            }
            ClockState::NotStarted => {}
        }
    }
    state.running = report.clock_after.is_running();

    let _ = updates_tx.send(TimingUpdate::Reconciled {
        added: report.added,
        removed: report.removed,
        retained: report.retained,
    });
    refresh_results(engine, state, updates_tx).await;
    Ok(report)
}

async fn refresh_results<S: TimingStore + 'static>(
    engine: &Shared<S>,
    state: &mut LoopState,
    updates_tx: &broadcast::Sender<TimingUpdate>,
) {
    match run_blocking(engine, |e| e.result_rows()).await {
        Ok(rows) => {
            if state.board.refresh(&rows) {
                let _ = updates_tx.send(TimingUpdate::ResultsChanged);
            }
        }
        Err(err) => warn!(%err, "failed to refresh results"),
    }
}

async fn clock_status<S>(engine: &Shared<S>) -> ClockStatus {
    let guard = engine.lock().await;
    let elapsed_ms = guard.elapsed_ms();
    ClockStatus {
        state: guard.clock(),
        elapsed_ms,
        elapsed: format_elapsed(elapsed_ms),
    }
}

/// `Some(Some(_))` for a notice, `Some(None)` after lag, `None` once closed.
async fn recv_notice(
    feed: &mut Option<broadcast::Receiver<ChangeNotice>>,
) -> Option<Option<ChangeNotice>> {
    let Some(rx) = feed.as_mut() else {
        return None;
    };
    match rx.recv().await {
        Ok(notice) => Some(Some(notice)),
        Err(RecvError::Lagged(skipped)) => {
            debug!(skipped, "change feed lagged");
            Some(None)
        }
        Err(RecvError::Closed) => None,
    }
}
