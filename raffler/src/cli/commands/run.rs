//! `raffler run`
//!
//! Starts the scheduler: recovery first, then the status refresher, then
//! either the stdin request loop or a plain wait for a shutdown signal.
//!
//! # Stdin protocol
//!
//! With `--stdin`, each input line is one JSON request tagged by `op`:
//!
//! ```text
//! {"op":"create","prize":"mug","winners":1,"duration":"1h","organizer":"org"}
//! {"op":"join","id":"…","actor":"amy"}
//! {"op":"leave","id":"…","actor":"amy"}
//! {"op":"cancel","id":"…","actor":"org"}
//! {"op":"status","id":"…"}
//! ```
//!
//! Each request gets exactly one JSON reply line with an `ok` field.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use raffler_core::{ActorId, CreateParams, EntityId};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cli::args::RunArgs;
use crate::config::loader::ConfigLoader;
use crate::error::{RafflerError, SchedulerError};
use crate::observability::events::{Event, EventEmitter};
use crate::observability::init_metrics;
use crate::recovery::RecoveryManager;
use crate::scheduler::{LifecycleScheduler, LogNotifier, Membership, SchedulerOptions};
use crate::store;

/// Run the scheduler until cancelled or stdin closes.
///
/// # Errors
///
/// Returns an error if configuration is invalid, the store cannot be
/// opened, or recovery cannot enumerate stored rows.
pub async fn run(args: &RunArgs, cancel: CancellationToken) -> Result<(), RafflerError> {
    // Load configuration
    let loader = ConfigLoader::with_defaults();
    let loaded = match &args.config {
        Some(path) => loader.load(path)?,
        None => loader.defaults()?,
    };
    for warning in &loaded.warnings {
        match &warning.location {
            Some(at) => warn!(location = %at, "{}", warning.message),
            None => warn!("{}", warning.message),
        }
    }

    let mut config = (*loaded.config).clone();
    if let Some(kind) = args.store {
        config.store.kind = kind;
    }
    if let Some(dir) = &args.data_dir {
        config.store.path.clone_from(dir);
    }

    if args.metrics_port.is_some() {
        init_metrics(args.metrics_port)?;
    }

    let events = match &args.events_file {
        Some(path) => EventEmitter::from_file(path)?,
        None => EventEmitter::noop(),
    };

    let store = store::open(&config.store).await?;
    info!(kind = ?config.store.kind, path = %config.store.path.display(), "store opened");

    let scheduler = LifecycleScheduler::new(
        store,
        Arc::new(LogNotifier),
        SchedulerOptions {
            scheduler: config.scheduler.clone(),
            chain: config.chain.clone(),
            events: Arc::new(events),
            ..SchedulerOptions::default()
        },
    );

    RecoveryManager::new(Arc::clone(&scheduler)).recover().await?;

    scheduler.events().emit(Event::SchedulerStarted {
        timestamp: Utc::now(),
        live_entities: scheduler.live_count(),
    });
    let status_task = scheduler.start_status_task();

    let reason = if args.stdin {
        serve_stdin(&scheduler, &cancel).await
    } else {
        cancel.cancelled().await;
        "signal"
    };

    info!(reason, live = scheduler.live_count(), "shutting down");
    scheduler.shutdown();
    if let Err(e) = status_task.await {
        debug!(error = %e, "status task ended abnormally");
    }
    scheduler.events().emit(Event::SchedulerStopped {
        timestamp: Utc::now(),
        reason: reason.to_string(),
    });
    Ok(())
}

async fn serve_stdin(scheduler: &Arc<LifecycleScheduler>, cancel: &CancellationToken) -> &'static str {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            () = cancel.cancelled() => return "signal",
            line = lines.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let reply = handle_request(scheduler, &line).await;
                    println!("{reply}");
                }
                Ok(None) => return "stdin closed",
                Err(e) => {
                    warn!(error = %e, "failed to read stdin");
                    return "stdin error";
                }
            },
        }
    }
}

// ============================================================================
// Requests
// ============================================================================

const fn one() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
enum Request {
    Create {
        prize: String,
        organizer: ActorId,
        #[serde(default = "one")]
        winners: u32,
        #[serde(default)]
        duration: Option<String>,
        #[serde(default)]
        end_time: Option<DateTime<Utc>>,
        #[serde(default = "one")]
        phases: u32,
        #[serde(default)]
        participants: Vec<ActorId>,
        #[serde(default)]
        required_role: Option<String>,
        #[serde(default)]
        comment: Option<String>,
        #[serde(default)]
        image: Option<String>,
    },
    Join {
        id: EntityId,
        actor: ActorId,
    },
    Leave {
        id: EntityId,
        actor: ActorId,
    },
    Cancel {
        id: EntityId,
        actor: ActorId,
    },
    Status {
        id: EntityId,
    },
}

/// Handles one request line and returns the reply document.
async fn handle_request(scheduler: &Arc<LifecycleScheduler>, line: &str) -> Value {
    let request: Request = match serde_json::from_str(line) {
        Ok(r) => r,
        Err(e) => return failure("bad_request", &e.to_string()),
    };
    debug!(?request, "request");

    match request {
        Request::Create {
            prize,
            organizer,
            winners,
            duration,
            end_time,
            phases,
            participants,
            required_role,
            comment,
            image,
        } => {
            let now = scheduler.now();
            let end_time = match (end_time, duration) {
                (Some(end), None) => end,
                (None, Some(raw)) => match parse_duration(&raw) {
                    Ok(d) => now + d,
                    Err(msg) => return failure("bad_request", &msg),
                },
                _ => {
                    return failure("bad_request", "exactly one of duration or end_time is required");
                }
            };
            let mut params = CreateParams::new(prize, organizer, winners, now, end_time)
                .with_phases(phases)
                .with_participants(participants);
            params.required_role_id = required_role;
            params.comment = comment;
            params.image_ref = image;

            match scheduler.create(params).await {
                Ok(id) => json!({ "ok": true, "id": id }),
                Err(e) => rejection(&e),
            }
        }
        Request::Join { id, actor } => match scheduler.join(&id, &actor).await {
            Ok(m) => json!({ "ok": true, "membership": membership_label(m) }),
            Err(e) => rejection(&e),
        },
        Request::Leave { id, actor } => match scheduler.leave(&id, &actor).await {
            Ok(m) => json!({ "ok": true, "membership": membership_label(m) }),
            Err(e) => rejection(&e),
        },
        Request::Cancel { id, actor } => match scheduler.cancel(&id, &actor).await {
            Ok(cancelled) => json!({ "ok": true, "cancelled": cancelled }),
            Err(e) => rejection(&e),
        },
        Request::Status { id } => match scheduler.store().get(&id).await {
            Ok(Some(entity)) => json!({
                "ok": true,
                "entity": entity,
                "armed": scheduler.deadline(&id).is_some(),
            }),
            Ok(None) => rejection(&SchedulerError::NotFound(id)),
            Err(e) => rejection(&SchedulerError::Storage(e)),
        },
    }
}

fn parse_duration(raw: &str) -> Result<TimeDelta, String> {
    let std = humantime::parse_duration(raw).map_err(|e| format!("invalid duration '{raw}': {e}"))?;
    TimeDelta::from_std(std).map_err(|_| format!("duration '{raw}' is out of range"))
}

const fn membership_label(m: Membership) -> &'static str {
    match m {
        Membership::Joined => "joined",
        Membership::AlreadyJoined => "already_joined",
        Membership::Left => "left",
        Membership::NotParticipant => "not_participant",
    }
}

fn rejection(err: &SchedulerError) -> Value {
    let code = match err {
        SchedulerError::NotFound(_) => "not_found",
        SchedulerError::Validation(_) => "invalid",
        SchedulerError::Storage(_) => "storage",
        SchedulerError::Closed(_) => "closed",
        SchedulerError::JoinClosed(_) => "join_closed",
        SchedulerError::RateLimited(_) => "rate_limited",
        SchedulerError::NotReady => "not_ready",
    };
    failure(code, &err.to_string())
}

fn failure(code: &str, message: &str) -> Value {
    json!({ "ok": false, "error": code, "message": message })
}
