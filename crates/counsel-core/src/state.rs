//! UI-agnostic conversation state
//!
//! This module contains the transcript types shared by every front end
//! (terminal UI today, anything else later) and the append-only turn log.

use serde::{Deserialize, Serialize};
use tokio::sync::watch;

/// Text of the turn every session starts with
pub const WELCOME_TEXT: &str = "# Welcome to Legal Assistant AI\n\nI am your intelligent partner for legal research and drafting. How may I assist you today?";

/// Monotonic turn identifier, unique for the lifetime of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TurnId(u64);

impl TurnId {
    pub fn get(self) -> u64 {
        self.0
    }
}

/// Who authored a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// A labeled source reference attached to a bot turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub source: String,
}

/// One entry in the conversation transcript
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Turn {
    id: TurnId,
    text: String,
    sender: Sender,
    citations: Vec<Citation>,
    is_draft: bool,
    is_error: bool,
}

impl Turn {
    pub fn id(&self) -> TurnId {
        self.id
    }

    /// Markdown-formatted body
    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sender(&self) -> Sender {
        self.sender
    }

    pub fn citations(&self) -> &[Citation] {
        &self.citations
    }

    pub fn is_draft(&self) -> bool {
        self.is_draft
    }

    pub fn is_error(&self) -> bool {
        self.is_error
    }

    /// Only generated drafts offer the export affordance
    pub fn is_exportable(&self) -> bool {
        self.is_draft
    }
}

/// Content of a turn before the log assigns it an identifier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTurn {
    pub text: String,
    pub sender: Sender,
    pub citations: Vec<Citation>,
    pub is_draft: bool,
    pub is_error: bool,
}

impl NewTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::User,
            citations: Vec::new(),
            is_draft: false,
            is_error: false,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            sender: Sender::Bot,
            citations: Vec::new(),
            is_draft: false,
            is_error: false,
        }
    }
}

/// Append-only, ordered transcript.
///
/// Identifiers come from a counter owned by the log, so they are strictly
/// increasing in insertion order. Every append bumps a revision published on a
/// `watch` channel; observers (auto-scroll) see the new revision only after the
/// turn is fully in place.
#[derive(Debug)]
pub struct TurnLog {
    turns: Vec<Turn>,
    next_id: u64,
    revision: watch::Sender<u64>,
}

impl TurnLog {
    pub fn new() -> Self {
        let (revision, _) = watch::channel(0);
        Self {
            turns: Vec::new(),
            next_id: 1,
            revision,
        }
    }

    /// A log seeded with the welcome turn
    pub fn with_welcome() -> Self {
        let mut log = Self::new();
        log.append(NewTurn::bot(WELCOME_TEXT));
        log
    }

    pub fn append(&mut self, turn: NewTurn) -> TurnId {
        let id = TurnId(self.next_id);
        self.next_id += 1;

        self.turns.push(Turn {
            id,
            text: turn.text,
            sender: turn.sender,
            citations: turn.citations,
            is_draft: turn.is_draft,
            is_error: turn.is_error,
        });

        self.revision.send_modify(|rev| *rev += 1);
        id
    }

    /// Ordered view for rendering, oldest first
    pub fn all(&self) -> &[Turn] {
        &self.turns
    }

    pub fn get(&self, id: TurnId) -> Option<&Turn> {
        // ids are sorted, so a binary search is enough
        self.turns
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|idx| &self.turns[idx])
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Subscribe to "log changed" notifications
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.revision.subscribe()
    }
}

impl Default for TurnLog {
    fn default() -> Self {
        Self::new()
    }
}
