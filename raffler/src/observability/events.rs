//! Structured lifecycle event stream.
//!
//! Discrete, typed events written as newline-delimited JSON (JSONL), each
//! carrying a monotonically increasing sequence number. Downstream tooling
//! (announcers, audit logs) can tail the stream instead of polling the
//! store.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use raffler_core::{ActorId, ChainId, EntityId};
use serde::Serialize;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A lifecycle event.
///
/// Serialized with a `"type"` tag so consumers can dispatch on the kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// The scheduler accepted new entities.
    SchedulerStarted {
        /// When it became ready.
        timestamp: DateTime<Utc>,
        /// Entities with a live timer at that moment.
        live_entities: usize,
    },

    /// The scheduler stopped; live timers were dropped, rows kept.
    SchedulerStopped {
        /// When it stopped.
        timestamp: DateTime<Utc>,
        /// Human-readable reason.
        reason: String,
    },

    /// An entity was persisted and its timer armed.
    EntityCreated {
        /// When it was created.
        timestamp: DateTime<Utc>,
        /// New entity.
        entity_id: EntityId,
        /// Owning chain, for tournament phases.
        #[serde(skip_serializing_if = "Option::is_none")]
        chain_id: Option<ChainId>,
        /// 1-based phase index.
        phase_index: u32,
        /// Deadline.
        end_time: DateTime<Utc>,
    },

    /// A standalone giveaway drew its winners.
    EntityFinalized {
        /// When it was finalized.
        timestamp: DateTime<Utc>,
        /// Finalized entity.
        entity_id: EntityId,
        /// Winners in draw order.
        winners: Vec<ActorId>,
    },

    /// An entity was cancelled.
    EntityCancelled {
        /// When it was cancelled.
        timestamp: DateTime<Utc>,
        /// Cancelled entity.
        entity_id: EntityId,
        /// Who cancelled it.
        cancelled_by: ActorId,
    },

    /// A chain phase finished and the next phase was scheduled.
    ChainAdvanced {
        /// When the handoff happened.
        timestamp: DateTime<Utc>,
        /// Chain being advanced.
        chain_id: ChainId,
        /// Phase that just finished.
        finished: EntityId,
        /// Phase now running.
        next: EntityId,
        /// Participants carried into the next phase.
        qualifiers: Vec<ActorId>,
    },

    /// A chain reached its end.
    ChainCompleted {
        /// When it completed.
        timestamp: DateTime<Utc>,
        /// Completed chain.
        chain_id: ChainId,
        /// Overall winners (empty if the chain ran out of participants).
        winners: Vec<ActorId>,
    },

    /// Startup recovery finished.
    RecoveryCompleted {
        /// When recovery finished.
        timestamp: DateTime<Utc>,
        /// Overdue entities finalized on the spot.
        finalized: usize,
        /// Entities whose timers were re-armed.
        rearmed: usize,
        /// Rows dropped because their context could not be resolved or
        /// they were already terminal.
        dropped: usize,
        /// Rows that could not be decoded.
        corrupt: usize,
    },
}

// ---------------------------------------------------------------------------
// Envelope
// ---------------------------------------------------------------------------

#[derive(Debug, Serialize)]
struct EventEnvelope {
    sequence: u64,
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Serialization or I/O failures are dropped; the event stream never
/// interferes with a lifecycle transition.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
}

impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl EventEmitter {
    /// Creates an emitter that writes to the given writer.
    #[must_use]
    pub fn new(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: Mutex::new(BufWriter::new(writer)),
            sequence: AtomicU64::new(0),
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that discards every event.
    #[must_use]
    pub fn noop() -> Self {
        Self::new(Box::new(std::io::sink()))
    }

    /// Creates an emitter that appends to the file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        let seq = self.sequence.fetch_add(1, Ordering::SeqCst);
        let envelope = EventEnvelope {
            sequence: seq,
            event,
        };

        if let Ok(mut w) = self.writer.lock() {
            if let Ok(line) = serde_json::to_string(&envelope) {
                let _ = writeln!(w, "{line}");
                let _ = w.flush();
            }
        }
    }

    /// Returns the number of events emitted so far.
    #[must_use]
    pub fn event_count(&self) -> u64 {
        self.sequence.load(Ordering::Relaxed)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex as StdMutex};

    use super::*;

    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn lines(&self) -> Vec<serde_json::Value> {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf)
                .lines()
                .map(|l| serde_json::from_str(l).unwrap())
                .collect()
        }
    }

    impl Write for TestWriter {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_events_are_tagged_and_sequenced() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));

        emitter.emit(Event::EntityFinalized {
            timestamp: Utc::now(),
            entity_id: EntityId::new("g1"),
            winners: vec![ActorId::new("a"), ActorId::new("b")],
        });
        emitter.emit(Event::EntityCancelled {
            timestamp: Utc::now(),
            entity_id: EntityId::new("g2"),
            cancelled_by: ActorId::new("org"),
        });

        let lines = tw.lines();
        assert_eq!(emitter.event_count(), 2);
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[0]["type"], "EntityFinalized");
        assert_eq!(lines[0]["winners"], serde_json::json!(["a", "b"]));
        assert_eq!(lines[1]["sequence"], 1);
        assert_eq!(lines[1]["cancelled_by"], "org");
    }

    #[test]
    fn test_standalone_created_omits_chain() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(Event::EntityCreated {
            timestamp: Utc::now(),
            entity_id: EntityId::new("g1"),
            chain_id: None,
            phase_index: 1,
            end_time: Utc::now(),
        });

        let lines = tw.lines();
        assert!(lines[0].get("chain_id").is_none());
        assert!(lines[0].get("event").is_none(), "envelope must be flat");
    }

    #[test]
    fn test_append_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("events.jsonl");
        for _ in 0..2 {
            let emitter = EventEmitter::from_file(&path).unwrap();
            emitter.emit(Event::SchedulerStopped {
                timestamp: Utc::now(),
                reason: "test".to_owned(),
            });
        }
        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 2);
    }
}
