//! The round orchestrator: the session state machine.
//!
//! A session runs its configured rounds in order and ends `Finished` or
//! `Failed`, with two optional excursions: a single `AwaitingHumanInput`
//! pause after round 1 (round-by-round mode) and human-burst interludes
//! between rounds (jump-in mode). Every agent turn is a blocking awaited
//! call; each prompt embeds the literal text of prior turns, so nothing may
//! run in parallel within one session. Independent sessions share nothing
//! mutable beyond the gateway.
//!
//! The session runs as a spawned tokio task. Callers hold a
//! [`SessionHandle`] for control signals (human messages, skip, cancel) and a
//! [`MessageStream`], a finite, ordered, non-restartable sequence of
//! produced [`Message`]s.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use parley::{AgentBinding, ConversationConfig, ConversationSession};
//! # use parley::{CompletionGateway, CompletionError, ResponseLength};
//! # struct MyGateway;
//! # #[async_trait::async_trait]
//! # impl CompletionGateway for MyGateway {
//! #     async fn complete(&self, _: &str, _: &str, _: &str, _: ResponseLength, _: f32)
//! #         -> Result<String, CompletionError> { Ok(String::new()) }
//! # }
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let config = ConversationConfig::new("Should AI have rights?")
//!     .with_agent(AgentBinding::new("gpt-4o", "optimist"))
//!     .with_agent(AgentBinding::new("claude-sonnet", "skeptic"))
//!     .with_total_rounds(2);
//!
//! let (handle, mut stream) = ConversationSession::start(config, Arc::new(MyGateway), None)?;
//!
//! while let Some(message) = stream.next_message().await {
//!     println!("[{}] {}", message.alias.as_deref().unwrap_or("Human"), message.text);
//! }
//! println!("Session {} ended in state {:?}", handle.id(), handle.state());
//! # Ok(())
//! # }
//! ```

use std::collections::VecDeque;
use std::error::Error;
use std::fmt;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::task::{Context, Poll};

use chrono::Utc;
use futures_util::Stream;
use tokio::sync::{mpsc, watch};
use uuid::Uuid;

use crate::parley::config::{ConfigError, ConversationConfig, ParticipationMode};
use crate::parley::gateway::{CompletionError, CompletionGateway};
use crate::parley::message::{Message, SessionState, Slot, Speaker, TokenUsage, TurnKind};
use crate::parley::prompt::{PromptComposer, PromptRole};
use crate::parley::sequencer::TurnSequencer;
use crate::parley::sink::MessageSink;

/// Error types for a running session.
#[derive(Debug, Clone)]
pub enum SessionError {
    /// A completion call failed during a real agent turn. The round was
    /// aborted and the session marked `Failed`; messages produced before the
    /// failure stand. `slot` and `round` identify the turn so a caller can
    /// resume with identical context via [`ConversationSession::resume`].
    TurnFailed {
        slot: Slot,
        round: u32,
        source: CompletionError,
    },
    /// A human message was supplied in spectator mode.
    HumanInputNotAllowed,
    /// The session already reached a terminal state.
    SessionEnded,
}

impl SessionError {
    /// Whether re-running the failed turn with identical context is
    /// worthwhile. Always `false` for non-turn errors.
    pub fn is_resumable(&self) -> bool {
        match self {
            SessionError::TurnFailed { source, .. } => source.is_resumable(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SessionError::TurnFailed { slot, round, source } => write!(
                f,
                "Agent turn failed in round {} (slot {}): {}",
                round,
                slot.letter(),
                source
            ),
            SessionError::HumanInputNotAllowed => {
                write!(f, "Human input is not allowed in spectator mode")
            }
            SessionError::SessionEnded => write!(f, "Session has already ended"),
        }
    }
}

impl Error for SessionError {}

/// Control signals a caller may send into a running session.
enum ControlSignal {
    Human(String),
    Skip,
    Cancel,
}

/// How a driving loop ended: normally or by caller cancellation.
enum Flow {
    Completed,
    Cancelled,
}

/// The finite, ordered sequence of messages a session produces.
///
/// Ends when the session reaches a terminal state. Not restartable; consume
/// it once.
pub struct MessageStream {
    receiver: mpsc::UnboundedReceiver<Message>,
}

impl MessageStream {
    /// Await the next produced message, or `None` once the session is over.
    pub async fn next_message(&mut self) -> Option<Message> {
        self.receiver.recv().await
    }
}

impl Stream for MessageStream {
    type Item = Message;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Message>> {
        self.receiver.poll_recv(cx)
    }
}

/// Caller-side handle to a running session.
#[derive(Clone)]
pub struct SessionHandle {
    id: Uuid,
    participation: ParticipationMode,
    control: mpsc::UnboundedSender<ControlSignal>,
    state: watch::Receiver<SessionState>,
    usage: Arc<Mutex<TokenUsage>>,
    error: Arc<Mutex<Option<SessionError>>>,
}

impl SessionHandle {
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Current session state.
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Aggregated token usage across all completion calls so far, as far as
    /// the gateway reports it.
    pub fn token_usage(&self) -> TokenUsage {
        self.usage.lock().unwrap().clone()
    }

    /// The error that moved the session to `Failed`, if any.
    pub fn error(&self) -> Option<SessionError> {
        self.error.lock().unwrap().clone()
    }

    /// Inject a human message. In jump-in mode this triggers a burst in which
    /// every agent answers once; in round-by-round mode it resumes a paused
    /// session. Rejected outright in spectator mode.
    pub fn supply_human_message(&self, text: impl Into<String>) -> Result<(), SessionError> {
        if self.participation == ParticipationMode::Spectator {
            return Err(SessionError::HumanInputNotAllowed);
        }
        self.control
            .send(ControlSignal::Human(text.into()))
            .map_err(|_| SessionError::SessionEnded)
    }

    /// Resume a paused round-by-round session without adding a message.
    /// A no-op when the session is not paused.
    pub fn skip_pause(&self) -> Result<(), SessionError> {
        self.control
            .send(ControlSignal::Skip)
            .map_err(|_| SessionError::SessionEnded)
    }

    /// Ask the session to stop between turns. An in-flight completion call is
    /// not interrupted: it either completes with its result discarded or
    /// errors and fails the session.
    pub fn cancel(&self) {
        let _ = self.control.send(ControlSignal::Cancel);
    }

    /// Wait until the session reaches a terminal state and return it.
    pub async fn wait(&self) -> SessionState {
        let mut state = self.state.clone();
        loop {
            let current = *state.borrow();
            if current.is_terminal() {
                return current;
            }
            if state.changed().await.is_err() {
                return *state.borrow();
            }
        }
    }
}

/// Entry points for starting conversation sessions.
pub struct ConversationSession;

impl ConversationSession {
    /// Validate `config` and start a session. Configuration errors are
    /// reported synchronously, before any completion call.
    pub fn start(
        config: ConversationConfig,
        gateway: Arc<dyn CompletionGateway>,
        sink: Option<Arc<dyn MessageSink>>,
    ) -> Result<(SessionHandle, MessageStream), ConfigError> {
        Self::spawn(config, gateway, sink, Vec::new())
    }

    /// Restart a failed session from its surviving transcript. Only the
    /// turns that never ran are executed: prompts are pure functions of the
    /// transcript, so the first re-run turn sees context identical to the
    /// failed attempt. A resumed session does not re-enter the
    /// round-by-round pause.
    pub fn resume(
        config: ConversationConfig,
        gateway: Arc<dyn CompletionGateway>,
        sink: Option<Arc<dyn MessageSink>>,
        transcript: Vec<Message>,
    ) -> Result<(SessionHandle, MessageStream), ConfigError> {
        Self::spawn(config, gateway, sink, transcript)
    }

    fn spawn(
        config: ConversationConfig,
        gateway: Arc<dyn CompletionGateway>,
        sink: Option<Arc<dyn MessageSink>>,
        transcript: Vec<Message>,
    ) -> Result<(SessionHandle, MessageStream), ConfigError> {
        config.validate()?;

        let id = Uuid::new_v4();
        let (out_tx, out_rx) = mpsc::unbounded_channel();
        let (control_tx, control_rx) = mpsc::unbounded_channel();
        let (state_tx, state_rx) = watch::channel(SessionState::Running);
        let usage = Arc::new(Mutex::new(TokenUsage::default()));
        let error = Arc::new(Mutex::new(None));

        let handle = SessionHandle {
            id,
            participation: config.participation,
            control: control_tx,
            state: state_rx,
            usage: usage.clone(),
            error: error.clone(),
        };
        let stream = MessageStream { receiver: out_rx };

        let next_index = transcript
            .iter()
            .map(|m| m.sequence_index + 1)
            .max()
            .unwrap_or(0);
        let last_speaker = transcript
            .iter()
            .rev()
            .find(|m| m.turn_kind.is_round_turn())
            .and_then(|m| match m.speaker {
                Speaker::Slot(slot) => Some(slot),
                Speaker::Human => None,
            });
        let resumed = !transcript.is_empty();

        let worker = SessionWorker {
            id,
            composer: PromptComposer::new(&config),
            sequencer: TurnSequencer::new(&config, gateway.clone()),
            config,
            gateway,
            sink,
            out: out_tx,
            control: control_rx,
            state: state_tx,
            usage,
            error,
            transcript,
            next_index,
            last_speaker,
            pending_human: VecDeque::new(),
            paused: resumed,
        };
        tokio::spawn(worker.run());

        Ok((handle, stream))
    }
}

/// The spawned task driving one session to completion.
struct SessionWorker {
    id: Uuid,
    config: ConversationConfig,
    composer: PromptComposer,
    sequencer: TurnSequencer,
    gateway: Arc<dyn CompletionGateway>,
    sink: Option<Arc<dyn MessageSink>>,
    out: mpsc::UnboundedSender<Message>,
    control: mpsc::UnboundedReceiver<ControlSignal>,
    state: watch::Sender<SessionState>,
    usage: Arc<Mutex<TokenUsage>>,
    error: Arc<Mutex<Option<SessionError>>>,
    transcript: Vec<Message>,
    next_index: u64,
    last_speaker: Option<Slot>,
    /// Jump-in messages that arrived mid-round, held until the round
    /// completes so rounds stay atomic.
    pending_human: VecDeque<String>,
    /// Whether the round-by-round pause has already been taken (or was
    /// skipped because the session resumed from a transcript).
    paused: bool,
}

impl SessionWorker {
    async fn run(mut self) {
        log::debug!(
            "Session {}: starting with {} agents, {} rounds, {:?} order",
            self.id,
            self.config.agent_count(),
            self.config.total_rounds,
            self.config.turn_order
        );

        match self.drive().await {
            Ok(_) => {
                log::debug!("Session {}: finished", self.id);
                let _ = self.state.send(SessionState::Finished);
            }
            Err(e) => {
                log::warn!("Session {}: failed: {}", self.id, e);
                *self.error.lock().unwrap() = Some(e);
                let _ = self.state.send(SessionState::Failed);
            }
        }
        // Dropping the worker closes the output channel and ends the stream.
    }

    async fn drive(&mut self) -> Result<Flow, SessionError> {
        let (first_round, already_spoken) = self.resume_point();
        let mut spoken = already_spoken;

        let mut round = first_round;
        while round <= self.config.total_rounds {
            log::debug!("Session {}: round {} started", self.id, round);
            if let Flow::Cancelled = self.run_round(round, &spoken).await? {
                return Ok(Flow::Cancelled);
            }
            spoken.clear();
            log::debug!("Session {}: round {} completed", self.id, round);

            if let Flow::Cancelled = self.flush_human_bursts(round).await? {
                return Ok(Flow::Cancelled);
            }

            if round == 1
                && !self.paused
                && self.config.participation == ParticipationMode::RoundByRound
                && round < self.config.total_rounds
            {
                if let Flow::Cancelled = self.await_human_pause(round).await? {
                    return Ok(Flow::Cancelled);
                }
            }

            round += 1;
        }

        Ok(Flow::Completed)
    }

    /// Where to pick up: the next unfinished round and the slots that have
    /// already taken their turn in it. A fresh session starts at (1, []).
    fn resume_point(&self) -> (u32, Vec<Slot>) {
        let last_round = self
            .transcript
            .iter()
            .filter(|m| m.turn_kind.is_round_turn() && !m.is_human)
            .map(|m| m.round_number)
            .max()
            .unwrap_or(0);
        if last_round == 0 {
            return (1, Vec::new());
        }

        let spoken: Vec<Slot> = self
            .transcript
            .iter()
            .filter(|m| m.round_number == last_round && m.turn_kind.is_round_turn())
            .filter_map(|m| match m.speaker {
                Speaker::Slot(slot) => Some(slot),
                Speaker::Human => None,
            })
            .collect();

        if spoken.len() >= self.config.agent_count() {
            (last_round + 1, Vec::new())
        } else {
            (last_round, spoken)
        }
    }

    /// Run one round: every pending slot produces exactly one turn, strictly
    /// sequentially. A completion failure aborts the round immediately.
    async fn run_round(&mut self, round: u32, already_spoken: &[Slot]) -> Result<Flow, SessionError> {
        let mut pending: Vec<Slot> = if self.sequencer.is_dynamic() {
            self.config.active_slots()
        } else {
            self.sequencer.round_order()
        };
        pending.retain(|s| !already_spoken.contains(s));

        let mut position = already_spoken.len();
        while !pending.is_empty() {
            if let Flow::Cancelled = self.drain_control() {
                return Ok(Flow::Cancelled);
            }

            let slot = if self.sequencer.is_dynamic() {
                self.sequencer
                    .next_speaker(&pending, self.last_speaker, &self.transcript)
                    .await
            } else {
                pending[0]
            };
            pending.retain(|s| *s != slot);

            let role = match (round, position) {
                (1, 0) => PromptRole::Initial,
                (1, _) => PromptRole::PeerResponse,
                (_, 0) => PromptRole::Followup,
                (_, _) => PromptRole::Final,
            };
            let context = match role {
                PromptRole::Initial => Vec::new(),
                PromptRole::PeerResponse => self.round_messages(round),
                _ => self.latest_context(),
            };

            if let Flow::Cancelled = self.take_turn(slot, round, role, &context, None).await? {
                return Ok(Flow::Cancelled);
            }
            position += 1;
        }

        Ok(Flow::Completed)
    }

    /// Execute one agent turn: compose, call the gateway, emit. A cancel that
    /// arrives while the call is in flight discards the completed result
    /// instead of emitting it.
    async fn take_turn(
        &mut self,
        slot: Slot,
        round: u32,
        role: PromptRole,
        context: &[Message],
        human_text: Option<&str>,
    ) -> Result<Flow, SessionError> {
        let binding = self.config.binding(slot).clone();
        let system_text = self.composer.system_text(slot);
        let prompt = self.composer.compose(role, slot, context, human_text);

        log::debug!(
            "Session {}: slot {} speaking ({:?}, round {})",
            self.id,
            slot.letter(),
            role,
            round
        );

        let text = self
            .gateway
            .complete(
                &prompt,
                &binding.model_id,
                &system_text,
                self.config.response_length,
                self.config.temperature,
            )
            .await
            .map_err(|source| SessionError::TurnFailed { slot, round, source })?;

        if let Some(usage) = self.gateway.last_usage().await {
            self.usage.lock().unwrap().add(&usage);
        }

        // The call ran to completion, but a cancel may have raced it.
        if let Flow::Cancelled = self.drain_control() {
            log::debug!(
                "Session {}: cancelled during an in-flight call; result discarded",
                self.id
            );
            return Ok(Flow::Cancelled);
        }

        let turn_kind = match role {
            PromptRole::Initial => TurnKind::Initial,
            PromptRole::PeerResponse => TurnKind::PeerResponse,
            PromptRole::Followup => TurnKind::Followup,
            PromptRole::Final => TurnKind::Final,
            PromptRole::UserResponse => TurnKind::UserResponse,
        };
        let message = Message {
            sequence_index: self.next_index(),
            round_number: round,
            speaker: Speaker::Slot(slot),
            turn_kind,
            model_id: Some(binding.model_id),
            persona_id: Some(binding.persona_id),
            alias: Some(self.composer.alias_for(slot).to_string()),
            text,
            is_human: false,
            timestamp: Utc::now(),
        };
        self.emit(message).await;
        self.last_speaker = Some(slot);
        Ok(Flow::Completed)
    }

    /// Run every queued jump-in burst. Each burst appends the human message
    /// and then has every active slot answer it exactly once; the round
    /// number is left unchanged and the burst does not count toward the
    /// round total.
    async fn flush_human_bursts(&mut self, round: u32) -> Result<Flow, SessionError> {
        if let Flow::Cancelled = self.drain_control() {
            return Ok(Flow::Cancelled);
        }

        while let Some(text) = self.pending_human.pop_front() {
            log::debug!("Session {}: human burst after round {}", self.id, round);
            let human = Message::human(self.next_index(), round, text.clone());
            self.emit(human).await;

            for slot in self.sequencer.round_order() {
                if let Flow::Cancelled = self.drain_control() {
                    return Ok(Flow::Cancelled);
                }
                let context = self.transcript.clone();
                if let Flow::Cancelled = self
                    .take_turn(slot, round, PromptRole::UserResponse, &context, Some(&text))
                    .await?
                {
                    return Ok(Flow::Cancelled);
                }
            }
        }
        Ok(Flow::Completed)
    }

    /// Suspend with no pending I/O until the caller supplies a human message
    /// or an explicit skip. Entered at most once per session.
    async fn await_human_pause(&mut self, completed_round: u32) -> Result<Flow, SessionError> {
        log::debug!(
            "Session {}: awaiting human input after round {}",
            self.id,
            completed_round
        );
        let _ = self.state.send(SessionState::AwaitingHumanInput);
        self.paused = true;

        loop {
            match self.control.recv().await {
                // Every handle dropped while paused: nothing can ever resume
                // the session, so end it.
                None => return Ok(Flow::Cancelled),
                Some(ControlSignal::Cancel) => return Ok(Flow::Cancelled),
                Some(ControlSignal::Skip) => break,
                Some(ControlSignal::Human(text)) => {
                    let human = Message::human(self.next_index(), completed_round, text);
                    self.emit(human).await;
                    break;
                }
            }
        }

        let _ = self.state.send(SessionState::Running);
        Ok(Flow::Completed)
    }

    /// Drain buffered control signals without blocking. Human messages are
    /// queued for the next round boundary (jump-in) or ignored with a warning
    /// (round-by-round outside the pause).
    fn drain_control(&mut self) -> Flow {
        loop {
            match self.control.try_recv() {
                Ok(ControlSignal::Cancel) => return Flow::Cancelled,
                Ok(ControlSignal::Human(text)) => {
                    if self.config.participation == ParticipationMode::JumpIn {
                        self.pending_human.push_back(text);
                    } else {
                        log::warn!(
                            "Session {}: human message ignored outside the pause point",
                            self.id
                        );
                    }
                }
                Ok(ControlSignal::Skip) => {}
                Err(_) => return Flow::Completed,
            }
        }
    }

    /// Round-turn messages produced so far in `round`, for peer-response
    /// prompts.
    fn round_messages(&self, round: u32) -> Vec<Message> {
        self.transcript
            .iter()
            .filter(|m| m.round_number == round && m.turn_kind.is_round_turn() && !m.is_human)
            .cloned()
            .collect()
    }

    /// Context for followup/final prompts: the most recent message from
    /// every slot, plus the latest human message if the human spoke after
    /// all of them (a pause contribution waiting to be folded in).
    fn latest_context(&self) -> Vec<Message> {
        let mut context: Vec<Message> = self
            .config
            .active_slots()
            .into_iter()
            .filter_map(|slot| {
                self.transcript
                    .iter()
                    .rev()
                    .find(|m| m.speaker == Speaker::Slot(slot))
                    .cloned()
            })
            .collect();

        if let Some(human) = self.transcript.iter().rev().find(|m| m.is_human) {
            let newest_agent = context.iter().map(|m| m.sequence_index).max().unwrap_or(0);
            if human.sequence_index > newest_agent {
                context.push(human.clone());
            }
        }

        context.sort_by_key(|m| m.sequence_index);
        context
    }

    fn next_index(&mut self) -> u64 {
        let index = self.next_index;
        self.next_index += 1;
        index
    }

    /// Record and deliver a produced message: transcript, then optional sink,
    /// then output stream. Sink failures are isolated and logged;
    /// a dropped stream receiver is not an error.
    async fn emit(&mut self, message: Message) {
        self.transcript.push(message.clone());
        if let Some(sink) = &self.sink {
            if let Err(e) = sink.on_message(&message).await {
                log::warn!(
                    "Session {}: message sink failed at sequence {}: {}; continuing",
                    self.id,
                    message.sequence_index,
                    e
                );
            }
        }
        let _ = self.out.send(message);
    }
}
