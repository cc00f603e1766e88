//! Per-subject record of a simulation.

use serde::Serialize;

use crate::phase::Stimulus;

/// One entry of a subject's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum HistoryEntry {
    /// A stimulus was presented
    Stimulus {
        /// Phase label
        phase: String,
        /// Line label
        line: String,
        /// Elements with intensities
        stimulus: Stimulus,
        /// Help lines passed through before it
        #[serde(skip_serializing_if = "Vec::is_empty")]
        help_lines: Vec<String>,
    },
    /// The subject responded
    Response {
        /// Phase label
        phase: String,
        /// Behavior emitted
        behavior: String,
    },
}

impl HistoryEntry {
    #[must_use]
    pub fn phase(&self) -> &str {
        match self {
            Self::Stimulus { phase, .. } | Self::Response { phase, .. } => phase,
        }
    }
}

/// Ordered stimuli and responses of one subject.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct History {
    entries: Vec<HistoryEntry>,
}

impl History {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    pub fn push(&mut self, entry: HistoryEntry) {
        self.entries.push(entry);
    }

    #[must_use]
    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Line labels of the presented stimuli, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            HistoryEntry::Stimulus { line, .. } => Some(line.as_str()),
            HistoryEntry::Response { .. } => None,
        })
    }

    /// Presented stimuli, in order.
    pub fn stimuli(&self) -> impl Iterator<Item = &Stimulus> {
        self.entries.iter().filter_map(|entry| match entry {
            HistoryEntry::Stimulus { stimulus, .. } => Some(stimulus),
            HistoryEntry::Response { .. } => None,
        })
    }

    /// Emitted behaviors, in order.
    pub fn responses(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().filter_map(|entry| match entry {
            HistoryEntry::Response { behavior, .. } => Some(behavior.as_str()),
            HistoryEntry::Stimulus { .. } => None,
        })
    }

    /// Number of stimuli containing `element`.
    #[must_use]
    pub fn presentations_of(&self, element: &str) -> usize {
        self.stimuli().filter(|s| s.contains(element)).count()
    }
}
