use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::background::collaborators::Collaborators;
use crate::background::port_handler::{BackgroundEvent, PortHandler};
use crate::error::{AutofillError, ErrorKind, Result};
use crate::flows::flow_model::{FlowId, SavePolicy};
use crate::messages::message_model::Message;
use crate::messages::port::{PortId, TabId};
use crate::trace::logger::TraceLogger;

// ============================================================================
// Seams
// ============================================================================

/// A message leaving the coordinator towards a connected port.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutboundMessage {
    pub port: PortId,
    pub message: Message,
}

pub trait Outbox: Send + Sync {
    fn post(&mut self, port: PortId, message: Message) -> Result<()>;
}

/// Outbox backed by an unbounded channel.
pub struct ChannelOutbox {
    tx: mpsc::UnboundedSender<OutboundMessage>,
}

impl ChannelOutbox {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundMessage>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl Outbox for ChannelOutbox {
    fn post(&mut self, port: PortId, message: Message) -> Result<()> {
        self.tx
            .send(OutboundMessage { port, message })
            .map_err(|_| AutofillError::invariant("outbox", "outbound channel closed"))
    }
}

/// Millisecond wall clock.
pub trait Clock: Send + Sync {
    fn now_ms(&self) -> u64;
}

/// Epoch time anchored at creation, advanced by tokio's clock (so paused
/// test time moves it too).
pub struct TokioClock {
    base_ms: u64,
    start: tokio::time::Instant,
}

impl TokioClock {
    pub fn new() -> Self {
        let base_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
        Self::starting_at(base_ms)
    }

    pub fn starting_at(base_ms: u64) -> Self {
        Self {
            base_ms,
            start: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now_ms(&self) -> u64 {
        self.base_ms + self.start.elapsed().as_millis() as u64
    }
}

/// Clock moved by hand.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(now_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(now_ms),
        }
    }

    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Flow timers. A fired timer comes back as `BackgroundEvent::TimerFired`.
pub trait Scheduler: Send + Sync {
    fn schedule(&mut self, tab_id: TabId, flow_id: FlowId, after_ms: u64);
    fn cancel(&mut self, flow_id: FlowId);
}

/// Timers as sleeping tokio tasks feeding the inbound channel. Holds the
/// sender weakly so pending timers do not keep the coordinator alive.
pub struct TokioScheduler {
    events: mpsc::WeakUnboundedSender<BackgroundEvent>,
    timers: HashMap<FlowId, JoinHandle<()>>,
}

impl TokioScheduler {
    pub fn new(events: &mpsc::UnboundedSender<BackgroundEvent>) -> Self {
        Self {
            events: events.downgrade(),
            timers: HashMap::new(),
        }
    }
}

impl Scheduler for TokioScheduler {
    fn schedule(&mut self, tab_id: TabId, flow_id: FlowId, after_ms: u64) {
        self.timers.retain(|_, handle| !handle.is_finished());
        let events = self.events.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(after_ms)).await;
            let delivered = events
                .upgrade()
                .is_some_and(|tx| tx.send(BackgroundEvent::TimerFired { tab_id, flow_id }).is_ok());
            if !delivered {
                debug!(tab_id, "timer fired after shutdown");
            }
        });
        if let Some(previous) = self.timers.insert(flow_id, handle) {
            previous.abort();
        }
    }

    fn cancel(&mut self, flow_id: FlowId) {
        if let Some(handle) = self.timers.remove(&flow_id) {
            handle.abort();
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingTimer {
    tab_id: TabId,
    flow_id: FlowId,
    due_ms: u64,
}

/// Timers checked against a `ManualClock`; the driver polls `due`.
#[derive(Clone)]
pub struct ManualScheduler {
    clock: Arc<ManualClock>,
    pending: Arc<Mutex<Vec<PendingTimer>>>,
}

impl ManualScheduler {
    pub fn new(clock: Arc<ManualClock>) -> Self {
        Self {
            clock,
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Remove and return timers that are due, earliest first.
    pub fn due(&self) -> Vec<BackgroundEvent> {
        let now = self.clock.now_ms();
        let Ok(mut pending) = self.pending.lock() else {
            return vec![];
        };
        pending.sort_by_key(|t| t.due_ms);
        let (due, later): (Vec<PendingTimer>, Vec<PendingTimer>) =
            pending.drain(..).partition(|t| t.due_ms <= now);
        *pending = later;
        due.into_iter()
            .map(|t| BackgroundEvent::TimerFired {
                tab_id: t.tab_id,
                flow_id: t.flow_id,
            })
            .collect()
    }

    pub fn pending(&self) -> usize {
        self.pending.lock().map(|p| p.len()).unwrap_or(0)
    }
}

impl Scheduler for ManualScheduler {
    fn schedule(&mut self, tab_id: TabId, flow_id: FlowId, after_ms: u64) {
        let due_ms = self.clock.now_ms() + after_ms;
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|t| t.flow_id != flow_id);
            pending.push(PendingTimer {
                tab_id,
                flow_id,
                due_ms,
            });
        }
    }

    fn cancel(&mut self, flow_id: FlowId) {
        if let Ok(mut pending) = self.pending.lock() {
            pending.retain(|t| t.flow_id != flow_id);
        }
    }
}

// ============================================================================
// Background task
// ============================================================================

/// Channels of a running background coordinator.
pub struct BackgroundHandle {
    pub inbound: mpsc::UnboundedSender<BackgroundEvent>,
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
    pub task: JoinHandle<()>,
}

/// Spawn the coordinator on the current tokio runtime. It serves inbound
/// events in arrival order until every inbound sender is dropped.
pub fn spawn_background(
    collab: Collaborators,
    policy: SavePolicy,
    tracer: Option<TraceLogger>,
) -> BackgroundHandle {
    let (inbound, mut rx) = mpsc::unbounded_channel::<BackgroundEvent>();
    let (outbox, outbound) = ChannelOutbox::channel();
    let scheduler = TokioScheduler::new(&inbound);
    let mut sessions_rx = collab.sessions.on_changed();
    let initial_hosts: Vec<String> = sessions_rx.borrow_and_update().keys().cloned().collect();
    let session_events = inbound.downgrade();

    let mut handler = PortHandler::new(
        collab,
        Box::new(outbox),
        Box::new(scheduler),
        Arc::new(TokioClock::new()),
        policy,
    )
    .with_known_hosts(initial_hosts);
    if let Some(tracer) = tracer {
        handler = handler.with_tracer(tracer);
    }

    // Session changes are folded into the same ordered event stream
    tokio::spawn(async move {
        while sessions_rx.changed().await.is_ok() {
            let hosts: Vec<String> = sessions_rx.borrow_and_update().keys().cloned().collect();
            let Some(tx) = session_events.upgrade() else {
                break;
            };
            if tx.send(BackgroundEvent::SessionsChanged { hosts }).is_err() {
                break;
            }
        }
    });

    let task = tokio::spawn(async move {
        info!("background coordinator started");
        while let Some(event) = rx.recv().await {
            if let Err(e) = handler.handle(event).await {
                log_failure(&e);
            }
        }
        info!("background coordinator stopped");
    });

    BackgroundHandle {
        inbound,
        outbound,
        task,
    }
}

/// Protocol errors are expected noise; anything else is a real fault.
pub fn log_failure(e: &AutofillError) {
    if e.is(ErrorKind::Protocol) {
        warn!(error = %e, "dropped inbound event");
    } else {
        error!(error = %e, "failed to handle inbound event");
    }
}
