//! Session configuration.
//!
//! A [`ConversationConfig`] is the single source of truth for a session: the
//! topic, the scenario template, the agent slots with their model and persona
//! bindings, the turn-order strategy, and the participation mode. It is
//! validated once at session creation (a bad config is a [`ConfigError`]
//! before any network call) and is immutable once the session starts.
//!
//! # Example
//!
//! ```rust
//! use parley::{AgentBinding, ConversationConfig, ParticipationMode, TurnOrderStrategy};
//!
//! let config = ConversationConfig::new("Should AI have rights?")
//!     .with_agent(AgentBinding::new("gpt-4o", "optimist").with_persona_text("Sees the upside."))
//!     .with_agent(AgentBinding::new("claude-sonnet", "skeptic").with_persona_text("Questions everything."))
//!     .with_total_rounds(2)
//!     .with_turn_order(TurnOrderStrategy::Sequential)
//!     .with_participation(ParticipationMode::Spectator);
//!
//! config.validate().unwrap();
//! ```

use std::error::Error;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::parley::message::Slot;

/// Policy determining speaking order within a round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TurnOrderStrategy {
    /// Fixed slot order A, B, C truncated to the agent count.
    Sequential,
    /// A fresh uniform shuffle of the active slots each round.
    Random,
    /// "Popcorn": after each turn the model itself picks the next speaker,
    /// with a uniform-random fallback when the pick is unusable.
    Dynamic,
}

/// Whether and when a human may inject messages into the conversation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ParticipationMode {
    /// The human never speaks.
    Spectator,
    /// The human may inject a message at any time; each injection triggers a
    /// burst in which every agent answers once.
    JumpIn,
    /// The session pauses once after round 1 and waits for a human message or
    /// an explicit skip.
    RoundByRound,
}

/// Requested response length, forwarded to the completion gateway and
/// reflected in prompt wording.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ResponseLength {
    Short,
    Medium,
    Long,
}

/// The scenario template steering prompt phrasing.
///
/// Only the authorship-analysis scenario has dedicated wording; every other
/// template id falls back to generic topic discussion.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioTemplate {
    Discussion,
    AuthorshipAnalysis,
}

impl ScenarioTemplate {
    pub fn from_id(id: &str) -> ScenarioTemplate {
        match id {
            "authorship-analysis" => ScenarioTemplate::AuthorshipAnalysis,
            _ => ScenarioTemplate::Discussion,
        }
    }
}

/// One agent slot's bindings: which model speaks and which persona steers it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentBinding {
    pub model_id: String,
    pub persona_id: String,
    /// Short behavioral instruction profile injected into the system text.
    /// Optional; an empty persona still gets the identity rules.
    pub persona_text: String,
}

impl AgentBinding {
    pub fn new(model_id: impl Into<String>, persona_id: impl Into<String>) -> Self {
        AgentBinding {
            model_id: model_id.into(),
            persona_id: persona_id.into(),
            persona_text: String::new(),
        }
    }

    pub fn with_persona_text(mut self, text: impl Into<String>) -> Self {
        self.persona_text = text.into();
        self
    }
}

/// Immutable configuration for one conversation session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConversationConfig {
    pub topic: String,
    /// Scenario template id, e.g. `"discussion"` or `"authorship-analysis"`.
    pub scenario_id: String,
    /// Ordered bindings; position 0 is slot A, 1 is B, 2 is C.
    pub agents: Vec<AgentBinding>,
    pub total_rounds: u32,
    pub turn_order: TurnOrderStrategy,
    pub participation: ParticipationMode,
    pub response_length: ResponseLength,
    pub temperature: f32,
}

impl ConversationConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        ConversationConfig {
            topic: topic.into(),
            scenario_id: "discussion".to_string(),
            agents: Vec::new(),
            total_rounds: 1,
            turn_order: TurnOrderStrategy::Sequential,
            participation: ParticipationMode::Spectator,
            response_length: ResponseLength::Medium,
            temperature: 0.7,
        }
    }

    pub fn with_scenario(mut self, scenario_id: impl Into<String>) -> Self {
        self.scenario_id = scenario_id.into();
        self
    }

    pub fn with_agent(mut self, binding: AgentBinding) -> Self {
        self.agents.push(binding);
        self
    }

    pub fn with_total_rounds(mut self, rounds: u32) -> Self {
        self.total_rounds = rounds;
        self
    }

    pub fn with_turn_order(mut self, strategy: TurnOrderStrategy) -> Self {
        self.turn_order = strategy;
        self
    }

    pub fn with_participation(mut self, mode: ParticipationMode) -> Self {
        self.participation = mode;
        self
    }

    pub fn with_response_length(mut self, length: ResponseLength) -> Self {
        self.response_length = length;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    /// Number of active agent slots.
    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// The active slots in positional order.
    pub fn active_slots(&self) -> Vec<Slot> {
        Slot::active(self.agents.len())
    }

    /// The binding for a slot. Only valid for active slots; the orchestrator
    /// never asks for an inactive one.
    pub fn binding(&self, slot: Slot) -> &AgentBinding {
        &self.agents[slot.index()]
    }

    pub fn scenario(&self) -> ScenarioTemplate {
        ScenarioTemplate::from_id(&self.scenario_id)
    }

    /// Validate the configuration. Runs once, before any network call.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.topic.trim().is_empty() {
            return Err(ConfigError::EmptyTopic);
        }
        if self.agents.is_empty() || self.agents.len() > 3 {
            return Err(ConfigError::AgentCountOutOfRange(self.agents.len()));
        }
        if self.total_rounds == 0 {
            return Err(ConfigError::ZeroRounds);
        }
        for (position, binding) in self.agents.iter().enumerate() {
            if binding.model_id.trim().is_empty() {
                return Err(ConfigError::MissingModelId {
                    slot: Slot::ALL[position],
                });
            }
        }
        if !(0.0..=2.0).contains(&self.temperature) {
            return Err(ConfigError::TemperatureOutOfRange(self.temperature));
        }
        Ok(())
    }
}

/// Error types for configuration validation.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    EmptyTopic,
    AgentCountOutOfRange(usize),
    ZeroRounds,
    MissingModelId { slot: Slot },
    TemperatureOutOfRange(f32),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::EmptyTopic => write!(f, "Topic must not be empty"),
            ConfigError::AgentCountOutOfRange(n) => {
                write!(f, "Number of agents must be 1-3, got {}", n)
            }
            ConfigError::ZeroRounds => write!(f, "Total rounds must be at least 1"),
            ConfigError::MissingModelId { slot } => {
                write!(f, "Agent slot {} is missing a model id", slot.letter())
            }
            ConfigError::TemperatureOutOfRange(t) => {
                write!(f, "Temperature must be within 0-2, got {}", t)
            }
        }
    }
}

impl Error for ConfigError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn two_agent_config() -> ConversationConfig {
        ConversationConfig::new("Should AI have rights?")
            .with_agent(AgentBinding::new("gpt-4o", "optimist"))
            .with_agent(AgentBinding::new("claude-sonnet", "skeptic"))
    }

    #[test]
    fn valid_config_passes() {
        assert!(two_agent_config().validate().is_ok());
    }

    #[test]
    fn empty_topic_rejected() {
        let config = ConversationConfig::new("   ")
            .with_agent(AgentBinding::new("gpt-4o", "optimist"));
        assert_eq!(config.validate(), Err(ConfigError::EmptyTopic));
    }

    #[test]
    fn agent_count_bounds_enforced() {
        let none = ConversationConfig::new("topic");
        assert_eq!(none.validate(), Err(ConfigError::AgentCountOutOfRange(0)));

        let mut four = two_agent_config();
        four.agents.push(AgentBinding::new("m3", "p3"));
        four.agents.push(AgentBinding::new("m4", "p4"));
        assert_eq!(four.validate(), Err(ConfigError::AgentCountOutOfRange(4)));
    }

    #[test]
    fn missing_model_id_names_slot() {
        let config = ConversationConfig::new("topic")
            .with_agent(AgentBinding::new("gpt-4o", "optimist"))
            .with_agent(AgentBinding::new("  ", "skeptic"));
        assert_eq!(
            config.validate(),
            Err(ConfigError::MissingModelId { slot: Slot::B })
        );
    }

    #[test]
    fn zero_rounds_rejected() {
        let config = two_agent_config().with_total_rounds(0);
        assert_eq!(config.validate(), Err(ConfigError::ZeroRounds));
    }

    #[test]
    fn temperature_bounds_enforced() {
        let config = two_agent_config().with_temperature(2.5);
        assert_eq!(
            config.validate(),
            Err(ConfigError::TemperatureOutOfRange(2.5))
        );
        assert!(two_agent_config().with_temperature(0.0).validate().is_ok());
        assert!(two_agent_config().with_temperature(2.0).validate().is_ok());
    }

    #[test]
    fn unknown_scenario_falls_back_to_discussion() {
        assert_eq!(
            ScenarioTemplate::from_id("authorship-analysis"),
            ScenarioTemplate::AuthorshipAnalysis
        );
        assert_eq!(
            ScenarioTemplate::from_id("anything-else"),
            ScenarioTemplate::Discussion
        );
    }
}
