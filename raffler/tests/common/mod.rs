//! Shared integration-test harness: an in-process scheduler wired to a
//! recording notifier, plus a child-process driver for `raffler run --stdin`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use raffler::clock::ManualClock;
use raffler::config::{ChainConfig, HumanDuration, SchedulerConfig};
use raffler::error::NotifyError;
use raffler::recovery::{RecoveryManager, RecoveryReport};
use raffler::scheduler::{LifecycleScheduler, Notifier, NotifyResult, SchedulerOptions, TicketSource};
use raffler::store::EntityStore;
use raffler_core::{ActorId, CreateParams, Entity, EntityId};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::mpsc;

/// Default timeout for waiting on a notification or a reply line.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

// ============================================================================
// Recording notifier
// ============================================================================

/// One notifier callback, as observed by a test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    Status(EntityId),
    Terminal {
        id: EntityId,
        winners: Vec<ActorId>,
    },
    Cancelled {
        id: EntityId,
        by: ActorId,
    },
    ChainAdvanced {
        finished: EntityId,
        next: EntityId,
        next_winner_count: u32,
        qualifiers: Vec<ActorId>,
    },
    ChainTerminal {
        last: EntityId,
        winners: Vec<ActorId>,
    },
}

impl Notice {
    /// Returns `true` for everything except status refreshes.
    pub const fn is_lifecycle(&self) -> bool {
        !matches!(self, Self::Status(_))
    }
}

/// Forwards every callback to an unbounded channel.
///
/// Entities whose id appears in `unresolvable` fail `resolve_context`.
pub struct RecordingNotifier {
    tx: mpsc::UnboundedSender<Notice>,
    unresolvable: Vec<EntityId>,
}

impl RecordingNotifier {
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<Notice>) {
        Self::with_unresolvable(Vec::new())
    }

    pub fn with_unresolvable(
        unresolvable: Vec<EntityId>,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<Notice>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Arc::new(Self { tx, unresolvable }), rx)
    }

    fn send(&self, notice: Notice) -> NotifyResult {
        self.tx
            .send(notice)
            .map_err(|_| NotifyError::SurfaceGone("test receiver dropped".into()))
    }
}

#[async_trait::async_trait]
impl Notifier for RecordingNotifier {
    async fn render_status(&self, entity: &Entity) -> NotifyResult {
        self.send(Notice::Status(entity.id.clone()))
    }

    async fn notify_terminal(&self, entity: &Entity, winners: &[ActorId]) -> NotifyResult {
        self.send(Notice::Terminal {
            id: entity.id.clone(),
            winners: winners.to_vec(),
        })
    }

    async fn notify_cancelled(&self, entity: &Entity, cancelled_by: &ActorId) -> NotifyResult {
        self.send(Notice::Cancelled {
            id: entity.id.clone(),
            by: cancelled_by.clone(),
        })
    }

    async fn notify_chain_advanced(
        &self,
        finished: &Entity,
        next: &Entity,
        qualifiers: &[ActorId],
    ) -> NotifyResult {
        self.send(Notice::ChainAdvanced {
            finished: finished.id.clone(),
            next: next.id.clone(),
            next_winner_count: next.winner_count,
            qualifiers: qualifiers.to_vec(),
        })
    }

    async fn notify_chain_terminal(&self, last: &Entity, winners: &[ActorId]) -> NotifyResult {
        self.send(Notice::ChainTerminal {
            last: last.id.clone(),
            winners: winners.to_vec(),
        })
    }

    async fn resolve_context(&self, entity: &Entity) -> NotifyResult {
        if self.unresolvable.contains(&entity.id) {
            return Err(NotifyError::SurfaceGone(format!("no surface for {}", entity.id)));
        }
        Ok(())
    }
}

/// A notifier whose delivery always fails, counting every attempt.
#[derive(Default)]
pub struct FailingNotifier {
    attempts: AtomicUsize,
}

impl FailingNotifier {
    /// Total lifecycle callbacks attempted so far.
    pub fn attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    fn fail(&self) -> NotifyResult {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(NotifyError::Delivery("surface rejected the message".into()))
    }
}

#[async_trait::async_trait]
impl Notifier for FailingNotifier {
    async fn render_status(&self, _entity: &Entity) -> NotifyResult {
        Err(NotifyError::Delivery("status refresh rejected".into()))
    }

    async fn notify_terminal(&self, _entity: &Entity, _winners: &[ActorId]) -> NotifyResult {
        self.fail()
    }

    async fn notify_cancelled(&self, _entity: &Entity, _by: &ActorId) -> NotifyResult {
        self.fail()
    }

    async fn notify_chain_advanced(
        &self,
        _finished: &Entity,
        _next: &Entity,
        _qualifiers: &[ActorId],
    ) -> NotifyResult {
        self.fail()
    }

    async fn notify_chain_terminal(&self, _last: &Entity, _winners: &[ActorId]) -> NotifyResult {
        self.fail()
    }
}

/// Next non-status notice, or a panic after `DEFAULT_TIMEOUT`.
pub async fn next_lifecycle(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Notice {
    next_lifecycle_within(rx, DEFAULT_TIMEOUT).await
}

/// Next non-status notice, or a panic after `limit`.
///
/// Paused-clock tests need a limit past the entity deadlines, because
/// auto-advance fires the earliest pending timer first.
pub async fn next_lifecycle_within(
    rx: &mut mpsc::UnboundedReceiver<Notice>,
    limit: Duration,
) -> Notice {
    let result = tokio::time::timeout(limit, async {
        loop {
            let notice = rx.recv().await.expect("notifier channel closed");
            if notice.is_lifecycle() {
                return notice;
            }
        }
    })
    .await;
    result.expect("timed out waiting for a lifecycle notification")
}

/// Upper bound for paused-clock waits; longer than any test deadline.
pub const PAUSED_LIMIT: Duration = Duration::from_secs(24 * 60 * 60);

/// Drains whatever notices are queued right now, skipping status refreshes.
pub fn drain_lifecycle(rx: &mut mpsc::UnboundedReceiver<Notice>) -> Vec<Notice> {
    let mut out = Vec::new();
    while let Ok(notice) = rx.try_recv() {
        if notice.is_lifecycle() {
            out.push(notice);
        }
    }
    out
}

// ============================================================================
// Ticket source
// ============================================================================

/// Fixed per-actor weights; unknown actors get no answer.
pub struct FixedTickets(pub HashMap<ActorId, u32>);

#[async_trait::async_trait]
impl TicketSource for FixedTickets {
    async fn ticket_weight(&self, actor: &ActorId) -> Option<u32> {
        self.0.get(actor).copied()
    }
}

// ============================================================================
// Scheduler harness
// ============================================================================

/// A scheduler over `store` with a frozen clock, zero join cooldown and a
/// fixed seed.
pub fn scheduler(
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<ManualClock>,
) -> Arc<LifecycleScheduler> {
    scheduler_with_chain(store, notifier, clock, ChainConfig::default())
}

pub fn scheduler_with_chain(
    store: Arc<dyn EntityStore>,
    notifier: Arc<dyn Notifier>,
    clock: Arc<ManualClock>,
    chain: ChainConfig,
) -> Arc<LifecycleScheduler> {
    LifecycleScheduler::new(
        store,
        notifier,
        SchedulerOptions {
            scheduler: SchedulerConfig {
                seed: Some(7),
                join_cooldown: HumanDuration::from_secs(0),
                ..SchedulerConfig::default()
            },
            chain,
            clock,
            ..SchedulerOptions::default()
        },
    )
}

/// Runs recovery and returns its report; the scheduler is then ready.
pub async fn recover(scheduler: &Arc<LifecycleScheduler>) -> RecoveryReport {
    RecoveryManager::new(Arc::clone(scheduler))
        .recover()
        .await
        .expect("recovery failed")
}

/// Giveaway parameters that started an hour before `now` and end after
/// `ends_in`.
pub fn giveaway(now: DateTime<Utc>, winners: u32, ends_in: TimeDelta, people: &[&str]) -> CreateParams {
    CreateParams::new(
        "test prize",
        ActorId::new("organizer"),
        winners,
        now - TimeDelta::hours(1),
        now + ends_in,
    )
    .with_participants(people.iter().map(|p| ActorId::new(*p)))
}

pub fn actors(names: &[&str]) -> Vec<ActorId> {
    names.iter().map(|n| ActorId::new(*n)).collect()
}

// ============================================================================
// Process harness
// ============================================================================

/// A running `raffler run --stdin` process.
///
/// The child process is killed on drop via `kill_on_drop(true)`.
pub struct RafflerProcess {
    child: Child,
    stdin: Option<tokio::process::ChildStdin>,
    reader: BufReader<tokio::process::ChildStdout>,
}

impl RafflerProcess {
    /// Spawns the scheduler with extra `run` arguments.
    pub fn spawn(extra: &[&str]) -> Self {
        let bin = env!("CARGO_BIN_EXE_raffler");
        let mut child = Command::new(bin)
            .arg("--quiet")
            .arg("run")
            .arg("--stdin")
            .args(extra)
            .env_remove("RAFFLER_CONFIG")
            .env_remove("RAFFLER_DATA_DIR")
            .stdin(std::process::Stdio::piped())
            .stdout(std::process::Stdio::piped())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .expect("failed to spawn raffler");

        let stdin = child.stdin.take().expect("stdin not captured");
        let stdout = child.stdout.take().expect("stdout not captured");

        Self {
            child,
            stdin: Some(stdin),
            reader: BufReader::new(stdout),
        }
    }

    /// Sends one request and waits for its reply line.
    pub async fn request(&mut self, request: &Value) -> Value {
        let stdin = self.stdin.as_mut().expect("stdin already closed");
        let mut line = serde_json::to_string(request).unwrap();
        line.push('\n');
        stdin.write_all(line.as_bytes()).await.unwrap();
        stdin.flush().await.unwrap();

        let mut reply = String::new();
        tokio::time::timeout(DEFAULT_TIMEOUT, self.reader.read_line(&mut reply))
            .await
            .expect("timed out waiting for reply")
            .expect("read_line I/O error");
        serde_json::from_str(reply.trim()).expect("reply is not JSON")
    }

    /// Closes stdin and waits for a clean exit.
    pub async fn shutdown(mut self) -> std::process::ExitStatus {
        drop(self.stdin.take());
        tokio::time::timeout(DEFAULT_TIMEOUT, self.child.wait())
            .await
            .expect("process did not exit after stdin closed")
            .expect("wait failed")
    }
}
