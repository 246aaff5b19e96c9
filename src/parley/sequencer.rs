//! Turn sequencing: who speaks next.
//!
//! Three interchangeable strategies, selected by
//! [`TurnOrderStrategy`](crate::TurnOrderStrategy):
//!
//! - **Sequential** returns the fixed slot order truncated to the agent count.
//! - **Random** returns a fresh uniform shuffle each time it is invoked.
//! - **Dynamic** ("popcorn") asks a model to pick the next single speaker
//!   after each turn, excluding whoever just spoke.
//!
//! The dynamic meta-call is treated as an untrusted decision oracle: its
//! answer is parsed into `Parsed(slot) | Unparseable`, and every failure path
//! (gateway error, empty output, garbled text, an ineligible letter) falls
//! back to a uniform-random pick among the eligible slots. Selection never
//! propagates an error and never blocks a round.

use std::sync::Arc;

use rand::seq::SliceRandom;

use crate::parley::alias::alias;
use crate::parley::config::{ConversationConfig, ResponseLength, TurnOrderStrategy};
use crate::parley::gateway::CompletionGateway;
use crate::parley::message::{Message, Slot};

/// How many trailing messages the dynamic meta-prompt may quote.
const SELECTION_EXCERPT: usize = 4;

/// How many characters of each quoted message survive truncation.
const SELECTION_SNIPPET_CHARS: usize = 200;

/// Outcome of parsing a dynamic-selection response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Parsed(Slot),
    Unparseable,
}

/// Parse a `LETTER: reason` selection response against the eligible slots.
///
/// The match is strict: after trimming, the first character must be an
/// eligible slot letter immediately followed by a colon. Anything else is
/// [`Selection::Unparseable`].
pub fn parse_selection(response: &str, eligible: &[Slot]) -> Selection {
    let trimmed = response.trim_start();
    let mut chars = trimmed.chars();
    let letter = match chars.next() {
        Some(c) => c,
        None => return Selection::Unparseable,
    };
    if chars.next() != Some(':') {
        return Selection::Unparseable;
    }
    match Slot::from_letter(letter) {
        Some(slot) if eligible.contains(&slot) => Selection::Parsed(slot),
        _ => Selection::Unparseable,
    }
}

/// Decides speaking order for a session.
pub struct TurnSequencer {
    strategy: TurnOrderStrategy,
    config: ConversationConfig,
    gateway: Arc<dyn CompletionGateway>,
}

impl TurnSequencer {
    pub fn new(config: &ConversationConfig, gateway: Arc<dyn CompletionGateway>) -> Self {
        TurnSequencer {
            strategy: config.turn_order,
            config: config.clone(),
            gateway,
        }
    }

    pub fn is_dynamic(&self) -> bool {
        self.strategy == TurnOrderStrategy::Dynamic
    }

    /// Full speaking order for one round under a static strategy. For the
    /// dynamic strategy the orchestrator calls [`next_speaker`] once per
    /// selection point instead.
    ///
    /// [`next_speaker`]: TurnSequencer::next_speaker
    pub fn round_order(&self) -> Vec<Slot> {
        let mut slots = self.config.active_slots();
        if self.strategy == TurnOrderStrategy::Random {
            slots.shuffle(&mut rand::thread_rng());
        }
        slots
    }

    /// Pick the next speaker among `pending` slots, excluding the
    /// immediately preceding speaker when more than one candidate remains.
    ///
    /// Under the dynamic strategy this issues one extra completion call per
    /// selection point; on any failure it silently falls back to a
    /// uniform-random eligible slot. The very first pick of a session (no
    /// prior speaker yet) is uniform-random with no meta-call: there is no
    /// conversation to base a selection on. `pending` must be non-empty.
    pub async fn next_speaker(
        &self,
        pending: &[Slot],
        last_speaker: Option<Slot>,
        recent: &[Message],
    ) -> Slot {
        let eligible: Vec<Slot> = match last_speaker {
            Some(last) if pending.len() > 1 => {
                pending.iter().copied().filter(|s| *s != last).collect()
            }
            _ => pending.to_vec(),
        };

        if eligible.len() == 1
            || self.strategy != TurnOrderStrategy::Dynamic
            || last_speaker.is_none()
        {
            return *eligible
                .choose(&mut rand::thread_rng())
                .expect("eligible slot set must not be empty");
        }

        match self.ask_model(&eligible, recent).await {
            Selection::Parsed(slot) => slot,
            Selection::Unparseable => {
                log::debug!("Dynamic speaker selection fell back to uniform random");
                *eligible
                    .choose(&mut rand::thread_rng())
                    .expect("eligible slot set must not be empty")
            }
        }
    }

    /// Issue the dynamic-selection meta-call and parse its answer. Gateway
    /// errors are folded into `Unparseable`; recovery happens in the caller.
    async fn ask_model(&self, eligible: &[Slot], recent: &[Message]) -> Selection {
        let prompt = self.selection_prompt(eligible, recent);
        // The meta-call rides on slot A's model; the picked speaker's own
        // turn still goes to its bound model afterward.
        let model_id = &self.config.agents[0].model_id;

        let response = self
            .gateway
            .complete(
                &prompt,
                model_id,
                "You decide who speaks next in a group conversation.",
                ResponseLength::Short,
                0.0,
            )
            .await;

        match response {
            Ok(text) => parse_selection(&text, eligible),
            Err(e) => {
                log::debug!("Dynamic selection meta-call failed: {}", e);
                Selection::Unparseable
            }
        }
    }

    fn selection_prompt(&self, eligible: &[Slot], recent: &[Message]) -> String {
        let mut prompt = String::from("Recent conversation:\n\n");
        let start = recent.len().saturating_sub(SELECTION_EXCERPT);
        for message in &recent[start..] {
            let name = message.alias.as_deref().unwrap_or("Human");
            let snippet: String = message.text.chars().take(SELECTION_SNIPPET_CHARS).collect();
            prompt.push_str(&format!("{}: {}\n", name, snippet));
        }

        prompt.push_str("\nCandidates for the next speaker:\n");
        for slot in eligible {
            let binding = self.config.binding(*slot);
            prompt.push_str(&format!(
                "{} - {} ({})\n",
                slot.letter(),
                alias(*slot, &binding.persona_id),
                binding.persona_text
            ));
        }

        prompt.push_str(
            "\nWho should speak next? Answer with exactly one line in the form \
             \"LETTER: reason\", where LETTER is one of the candidate letters.",
        );
        prompt
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parley::config::AgentBinding;
    use crate::parley::gateway::CompletionError;
    use async_trait::async_trait;
    use std::collections::HashSet;

    struct FixedGateway {
        response: Result<String, CompletionError>,
    }

    #[async_trait]
    impl CompletionGateway for FixedGateway {
        async fn complete(
            &self,
            _prompt: &str,
            _model_id: &str,
            _system_text: &str,
            _length: ResponseLength,
            _temperature: f32,
        ) -> Result<String, CompletionError> {
            self.response.clone()
        }
    }

    // A gateway that panics if called proves no meta-call happens.
    struct PanicGateway;

    #[async_trait]
    impl CompletionGateway for PanicGateway {
        async fn complete(
            &self,
            _prompt: &str,
            _model_id: &str,
            _system_text: &str,
            _length: ResponseLength,
            _temperature: f32,
        ) -> Result<String, CompletionError> {
            panic!("no meta-call expected at this selection point");
        }
    }

    fn three_agent_config(strategy: TurnOrderStrategy) -> ConversationConfig {
        ConversationConfig::new("topic")
            .with_agent(AgentBinding::new("m1", "p1"))
            .with_agent(AgentBinding::new("m2", "p2"))
            .with_agent(AgentBinding::new("m3", "p3"))
            .with_turn_order(strategy)
    }

    #[test]
    fn parse_accepts_strict_letter_colon_form() {
        let eligible = [Slot::A, Slot::B];
        assert_eq!(
            parse_selection("B: she has the counterpoint", &eligible),
            Selection::Parsed(Slot::B)
        );
        assert_eq!(
            parse_selection("  a: lowercase works", &eligible),
            Selection::Parsed(Slot::A)
        );
    }

    #[test]
    fn parse_rejects_garbled_and_ineligible_responses() {
        let eligible = [Slot::A, Slot::B];
        assert_eq!(parse_selection("", &eligible), Selection::Unparseable);
        assert_eq!(
            parse_selection("I think B should go", &eligible),
            Selection::Unparseable
        );
        assert_eq!(parse_selection("B should go", &eligible), Selection::Unparseable);
        assert_eq!(parse_selection("C: not eligible", &eligible), Selection::Unparseable);
        assert_eq!(parse_selection("D: no such slot", &eligible), Selection::Unparseable);
    }

    #[test]
    fn sequential_order_is_fixed_per_agent_count() {
        for count in 1..=3 {
            let mut config = three_agent_config(TurnOrderStrategy::Sequential);
            config.agents.truncate(count);
            let sequencer =
                TurnSequencer::new(&config, Arc::new(FixedGateway { response: Ok("".into()) }));
            assert_eq!(sequencer.round_order(), Slot::active(count));
        }
    }

    #[test]
    fn random_order_varies_across_trials() {
        let config = three_agent_config(TurnOrderStrategy::Random);
        let sequencer =
            TurnSequencer::new(&config, Arc::new(FixedGateway { response: Ok("".into()) }));

        let mut seen = HashSet::new();
        for _ in 0..50 {
            let order = sequencer.round_order();
            assert_eq!(order.len(), 3);
            seen.insert(format!("{:?}", order));
        }
        assert!(seen.len() >= 2, "50 shuffles produced a constant ordering");
    }

    #[tokio::test]
    async fn failing_meta_call_still_selects_a_valid_speaker() {
        let config = three_agent_config(TurnOrderStrategy::Dynamic);
        let gateway = Arc::new(FixedGateway {
            response: Err(CompletionError::NetworkError("down".into())),
        });
        let sequencer = TurnSequencer::new(&config, gateway);

        let pending = [Slot::A, Slot::B, Slot::C];
        for _ in 0..20 {
            let picked = sequencer
                .next_speaker(&pending, Some(Slot::A), &[])
                .await;
            assert!(pending.contains(&picked));
            assert_ne!(picked, Slot::A, "previous speaker must be excluded");
        }
    }

    #[tokio::test]
    async fn parsed_meta_call_answer_is_honored() {
        let config = three_agent_config(TurnOrderStrategy::Dynamic);
        let gateway = Arc::new(FixedGateway {
            response: Ok("C: the contrarian should weigh in".into()),
        });
        let sequencer = TurnSequencer::new(&config, gateway);

        let picked = sequencer
            .next_speaker(&[Slot::B, Slot::C], Some(Slot::A), &[])
            .await;
        assert_eq!(picked, Slot::C);
    }

    #[tokio::test]
    async fn sole_pending_slot_skips_the_meta_call() {
        let config = three_agent_config(TurnOrderStrategy::Dynamic);
        let sequencer = TurnSequencer::new(&config, Arc::new(PanicGateway));

        let picked = sequencer
            .next_speaker(&[Slot::B], Some(Slot::A), &[])
            .await;
        assert_eq!(picked, Slot::B);
    }

    #[tokio::test]
    async fn first_pick_of_a_session_is_random_without_a_meta_call() {
        let config = three_agent_config(TurnOrderStrategy::Dynamic);
        let sequencer = TurnSequencer::new(&config, Arc::new(PanicGateway));

        let pending = [Slot::A, Slot::B, Slot::C];
        for _ in 0..20 {
            let picked = sequencer.next_speaker(&pending, None, &[]).await;
            assert!(pending.contains(&picked));
        }
    }
}
