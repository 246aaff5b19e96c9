//! Core message and session-state types shared across the crate.
//!
//! A [`Message`] is immutable once produced: the orchestrator appends agent
//! turns, the caller appends human turns (where the participation mode allows
//! it), and nothing is ever rewritten or rolled back afterward.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One of the up-to-three fixed conversational participants.
///
/// A slot is a positional identity bound 1:1 to a model id and a persona at
/// session creation. The binding never changes mid-session; the slot letter
/// itself is never shown to the models (they see generated aliases instead).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Slot {
    A,
    B,
    C,
}

impl Slot {
    /// All slots in fixed positional order.
    pub const ALL: [Slot; 3] = [Slot::A, Slot::B, Slot::C];

    /// The first `count` slots in positional order. `count` is expected to be
    /// 1..=3; anything larger is truncated to 3.
    pub fn active(count: usize) -> Vec<Slot> {
        Slot::ALL.iter().copied().take(count.min(3)).collect()
    }

    pub fn letter(&self) -> char {
        match self {
            Slot::A => 'A',
            Slot::B => 'B',
            Slot::C => 'C',
        }
    }

    /// Parse a single slot letter, case-insensitively.
    pub fn from_letter(c: char) -> Option<Slot> {
        match c.to_ascii_uppercase() {
            'A' => Some(Slot::A),
            'B' => Some(Slot::B),
            'C' => Some(Slot::C),
            _ => None,
        }
    }

    /// Zero-based position of the slot in the fixed order.
    pub fn index(&self) -> usize {
        match self {
            Slot::A => 0,
            Slot::B => 1,
            Slot::C => 2,
        }
    }
}

/// Who produced a message: an agent slot or the human participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Speaker {
    Slot(Slot),
    Human,
}

/// What kind of turn produced a message.
///
/// Regular round turns are `Initial`/`PeerResponse` (round 1) and
/// `Followup`/`Final` (later rounds). `UserResponse` turns come from jump-in
/// bursts and share the current round number without counting toward it;
/// `Human` marks messages supplied by the caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnKind {
    Initial,
    PeerResponse,
    Followup,
    Final,
    UserResponse,
    Human,
}

impl TurnKind {
    /// Whether this kind counts toward a round's per-slot turn quota.
    pub fn is_round_turn(&self) -> bool {
        !matches!(self, TurnKind::UserResponse | TurnKind::Human)
    }
}

/// A single produced message, agent or human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    /// Monotonically increasing, unique within a session, in strict
    /// completion order of the calls that produced the messages.
    pub sequence_index: u64,
    /// 1-based round the message belongs to. Jump-in burst messages carry the
    /// round number that was current when the burst ran.
    pub round_number: u32,
    pub speaker: Speaker,
    pub turn_kind: TurnKind,
    /// Model id of the producing slot; `None` for human messages.
    pub model_id: Option<String>,
    /// Persona id of the producing slot; `None` for human messages.
    pub persona_id: Option<String>,
    /// Generated display name of the producing slot; `None` for human messages.
    pub alias: Option<String>,
    pub text: String,
    pub is_human: bool,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    /// Build a human-authored message. Agent messages are built only by the
    /// orchestrator.
    pub fn human(sequence_index: u64, round_number: u32, text: impl Into<String>) -> Self {
        Message {
            sequence_index,
            round_number,
            speaker: Speaker::Human,
            turn_kind: TurnKind::Human,
            model_id: None,
            persona_id: None,
            alias: None,
            text: text.into(),
            is_human: true,
            timestamp: Utc::now(),
        }
    }
}

/// Lifecycle state of a conversation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    Running,
    /// Only reachable in round-by-round mode, after round 1. The session has
    /// no pending network calls and resumes on a human message or a skip.
    AwaitingHumanInput,
    Finished,
    Failed,
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Finished | SessionState::Failed)
    }
}

/// How many tokens were spent on prompt vs. completion.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TokenUsage {
    pub input_tokens: usize,
    pub output_tokens: usize,
    pub total_tokens: usize,
}

impl TokenUsage {
    pub fn add(&mut self, other: &TokenUsage) {
        self.input_tokens += other.input_tokens;
        self.output_tokens += other.output_tokens;
        self.total_tokens += other.total_tokens;
    }
}
