//! Structured event stream for `lesim`.
//!
//! Discrete, typed events emitted while runs are simulated. Events are
//! serialized as newline-delimited JSON (JSONL) and include a monotonically
//! increasing sequence number, so the interleaved output of parallel
//! subjects can still be ordered.

use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::phase::Stimulus;

// ---------------------------------------------------------------------------
// Event variants
// ---------------------------------------------------------------------------

/// A discrete event emitted during a simulation.
///
/// Each variant is tagged with `"type"` when serialized to JSON so consumers
/// can dispatch on the event kind.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type")]
pub enum Event {
    /// A run has started.
    RunStarted {
        /// When the run started.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Number of subjects.
        subjects: u32,
        /// Phase labels in run order.
        phases: Vec<String>,
        /// Base seed of the run.
        seed: u64,
    },

    /// A subject entered a phase.
    PhaseEntered {
        /// When the transition occurred.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Zero-based subject index.
        subject: u32,
        /// Label of the phase that was entered.
        phase: String,
        /// Zero-based position of the phase in the run.
        phase_index: usize,
    },

    /// A stimulus was presented to a subject.
    StimulusPresented {
        /// When the stimulus was presented.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Zero-based subject index.
        subject: u32,
        /// Phase presenting the stimulus.
        phase: String,
        /// Line presenting the stimulus.
        line: String,
        /// Elements with intensities.
        stimulus: Stimulus,
        /// Help lines passed through on the way.
        #[serde(skip_serializing_if = "Vec::is_empty")]
        help_lines: Vec<String>,
    },

    /// A subject responded.
    ResponseRecorded {
        /// When the response was recorded.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Zero-based subject index.
        subject: u32,
        /// Phase the response was given in.
        phase: String,
        /// The behavior.
        behavior: String,
    },

    /// A subject went through every phase.
    SubjectCompleted {
        /// When the subject finished.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Zero-based subject index.
        subject: u32,
        /// Number of stimuli presented.
        steps: u64,
    },

    /// A subject stopped with an error.
    SubjectFailed {
        /// When the subject failed.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Zero-based subject index.
        subject: u32,
        /// Human-readable error.
        error: String,
    },

    /// Every subject of a run has finished.
    RunCompleted {
        /// When the run finished.
        timestamp: DateTime<Utc>,
        /// Run label.
        run: String,
        /// Subjects that completed.
        completed: u32,
        /// Subjects that failed.
        failed: u32,
        /// Wall-clock duration in milliseconds.
        duration_ms: u64,
    },
}

// ---------------------------------------------------------------------------
// Envelope (adds sequence number via serde flatten)
// ---------------------------------------------------------------------------

/// Wraps an [`Event`] with a monotonically increasing sequence number.
#[derive(Debug, Serialize)]
struct EventEnvelope {
    /// Zero-based, monotonically increasing sequence counter.
    sequence: u64,
    /// The wrapped event (flattened into the same JSON object).
    #[serde(flatten)]
    event: Event,
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// Thread-safe, buffered JSONL event writer.
///
/// Each call to [`emit`](Self::emit) atomically increments the sequence
/// counter, serializes the event as a single JSON line, and flushes the
/// underlying writer. Serialization or I/O failures are dropped: a broken
/// event sink must not fail a simulation.
pub struct EventEmitter {
    writer: Mutex<BufWriter<Box<dyn Write + Send>>>,
    sequence: AtomicU64,
    enabled: bool,
}

// Box<dyn Write> is not Debug, so Debug is written by hand.
impl std::fmt::Debug for EventEmitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventEmitter")
            .field("sequence", &self.sequence.load(Ordering::Relaxed))
            .field("enabled", &self.enabled)
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
            enabled: true,
        }
    }

    /// Creates an emitter that writes to stdout.
    #[must_use]
    pub fn stdout() -> Self {
        Self::new(Box::new(std::io::stdout()))
    }

    /// Creates an emitter that writes to stderr.
    #[must_use]
    pub fn stderr() -> Self {
        Self::new(Box::new(std::io::stderr()))
    }

    /// Creates an emitter that discards all events.
    ///
    /// Events sent to it are not serialized at all.
    #[must_use]
    pub fn noop() -> Self {
        Self {
            enabled: false,
            ..Self::new(Box::new(std::io::sink()))
        }
    }

    /// Creates an emitter that writes to a file at `path`.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the file cannot be created or opened.
    pub fn from_file(path: &Path) -> std::io::Result<Self> {
        let file = std::fs::File::create(path)?;
        Ok(Self::new(Box::new(file)))
    }

    /// Returns `false` for an emitter created with [`EventEmitter::noop`].
    ///
    /// Callers use this to skip building per-step events nobody reads.
    #[must_use]
    pub const fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Emits an event as a single JSONL line.
    pub fn emit(&self, event: Event) {
        if !self.enabled {
            return;
        }
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

    /// In-memory writer for capturing emitter output in tests.
    #[derive(Clone)]
    struct TestWriter(Arc<StdMutex<Vec<u8>>>);

    impl TestWriter {
        fn new() -> Self {
            Self(Arc::new(StdMutex::new(Vec::new())))
        }

        fn contents(&self) -> String {
            let buf = self.0.lock().unwrap();
            String::from_utf8_lossy(&buf).into_owned()
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

    fn sample_event() -> Event {
        Event::RunStarted {
            timestamp: DateTime::parse_from_rfc3339("2026-02-04T10:15:30Z")
                .unwrap()
                .with_timezone(&Utc),
            run: "fixed_ratio".to_owned(),
            subjects: 3,
            phases: vec!["train".to_owned()],
            seed: 7,
        }
    }

    fn stimulus() -> Stimulus {
        let mut stimulus = Stimulus::default();
        stimulus.insert("lever", 1.0);
        stimulus
    }

    #[test]
    fn event_serializes_with_type_tag() {
        let json = serde_json::to_string(&sample_event()).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed["type"], "RunStarted");
        assert_eq!(parsed["run"], "fixed_ratio");
        assert_eq!(parsed["phases"][0], "train");
    }

    #[test]
    fn emitter_writes_valid_jsonl() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(sample_event());

        let output = tw.contents();
        let parsed: serde_json::Value = serde_json::from_str(output.trim()).unwrap();
        assert_eq!(parsed["type"], "RunStarted");
        assert_eq!(parsed["subjects"], 3);
        assert_eq!(parsed["seed"], 7);
        assert_eq!(parsed["sequence"], 0);
    }

    #[test]
    fn emitter_increments_sequence() {
        let tw = TestWriter::new();
        let emitter = EventEmitter::new(Box::new(tw.clone()));
        emitter.emit(sample_event());
        emitter.emit(Event::RunCompleted {
            timestamp: Utc::now(),
            run: "fixed_ratio".to_owned(),
            completed: 3,
            failed: 0,
            duration_ms: 12,
        });

        assert_eq!(emitter.event_count(), 2);

        let lines: Vec<serde_json::Value> = tw
            .contents()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines[0]["sequence"], 0);
        assert_eq!(lines[1]["sequence"], 1);
    }

    #[test]
    fn stimulus_serializes_as_map() {
        let event = Event::StimulusPresented {
            timestamp: Utc::now(),
            run: "r".to_owned(),
            subject: 0,
            phase: "train".to_owned(),
            line: "LEVER".to_owned(),
            stimulus: stimulus(),
            help_lines: Vec::new(),
        };
        let parsed = serde_json::to_value(&event).unwrap();
        assert_eq!(parsed["stimulus"]["lever"], 1.0);
        assert!(parsed.get("help_lines").is_none());
    }

    #[test]
    fn all_event_variants_serialize_to_valid_json() {
        let now = Utc::now();
        let variants: Vec<Event> = vec![
            sample_event(),
            Event::PhaseEntered {
                timestamp: now,
                run: "r".to_owned(),
                subject: 1,
                phase: "extinction".to_owned(),
                phase_index: 1,
            },
            Event::StimulusPresented {
                timestamp: now,
                run: "r".to_owned(),
                subject: 1,
                phase: "train".to_owned(),
                line: "LEVER".to_owned(),
                stimulus: stimulus(),
                help_lines: vec!["COUNT".to_owned()],
            },
            Event::ResponseRecorded {
                timestamp: now,
                run: "r".to_owned(),
                subject: 1,
                phase: "train".to_owned(),
                behavior: "R".to_owned(),
            },
            Event::SubjectCompleted {
                timestamp: now,
                run: "r".to_owned(),
                subject: 1,
                steps: 40,
            },
            Event::SubjectFailed {
                timestamp: now,
                run: "r".to_owned(),
                subject: 2,
                error: "Unknown response 'X'.".to_owned(),
            },
            Event::RunCompleted {
                timestamp: now,
                run: "r".to_owned(),
                completed: 1,
                failed: 1,
                duration_ms: 5,
            },
        ];

        for event in &variants {
            let json = serde_json::to_string(event).unwrap();
            let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert!(parsed["type"].is_string(), "missing type tag in {json}");
            assert!(parsed["timestamp"].is_string(), "missing timestamp in {json}");
        }
    }

    #[test]
    fn noop_emitter_discards_events() {
        let emitter = EventEmitter::noop();
        assert!(!emitter.is_enabled());
        emitter.emit(sample_event());
        assert_eq!(emitter.event_count(), 0);
    }

    #[test]
    fn concurrent_emits_keep_unique_sequences() {
        let tw = TestWriter::new();
        let emitter = Arc::new(EventEmitter::new(Box::new(tw.clone())));
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let emitter = Arc::clone(&emitter);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        emitter.emit(sample_event());
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let mut sequences: Vec<u64> = tw
            .contents()
            .lines()
            .map(|l| {
                let v: serde_json::Value = serde_json::from_str(l).unwrap();
                v["sequence"].as_u64().unwrap()
            })
            .collect();
        sequences.sort_unstable();
        assert_eq!(sequences, (0..100).collect::<Vec<_>>());
    }
}
