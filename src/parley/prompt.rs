//! Prompt composition.
//!
//! The composer builds the literal instruction text sent to a model for a
//! given agent, round type, and slice of conversation history. Everything
//! here is a pure function of its inputs (no clock, no randomness, no I/O),
//! so a failed turn can be retried with byte-identical context.
//!
//! Composition never fails: when an optional input is absent (a peer's prior
//! reply, a human message) an empty placeholder is substituted instead.

use crate::parley::alias::alias;
use crate::parley::config::{ConversationConfig, ResponseLength, ScenarioTemplate};
use crate::parley::message::{Message, Slot};

/// Which kind of prompt to compose.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptRole {
    /// First speaker of round 1: open the discussion.
    Initial,
    /// Later speakers of round 1: react to what this round already produced.
    PeerResponse,
    /// First speaker of rounds 2+: push the discussion forward.
    Followup,
    /// Later speakers of rounds 2+: weigh in on the latest state.
    Final,
    /// Jump-in burst: address a human message directly.
    UserResponse,
}

/// How many trailing messages a user-response prompt may embed. Bounds the
/// prompt size instead of replaying the full history.
const USER_RESPONSE_WINDOW: usize = 6;

/// Builds prompts and system texts for one session's fixed configuration.
///
/// Aliases for every active slot are computed once at construction and reused
/// so prompts for the same session always agree on names.
pub struct PromptComposer {
    config: ConversationConfig,
    aliases: Vec<(Slot, String)>,
}

impl PromptComposer {
    pub fn new(config: &ConversationConfig) -> Self {
        let aliases = config
            .active_slots()
            .into_iter()
            .map(|slot| (slot, alias(slot, &config.binding(slot).persona_id)))
            .collect();
        PromptComposer {
            config: config.clone(),
            aliases,
        }
    }

    /// The generated display name of an active slot.
    pub fn alias_for(&self, slot: Slot) -> &str {
        self.aliases
            .iter()
            .find(|(s, _)| *s == slot)
            .map(|(_, name)| name.as_str())
            .unwrap_or("")
    }

    /// Persona/system text for a slot: the persona profile plus the
    /// self-identification rule. Agents must speak as their alias and refer
    /// to peers by *their* aliases; slot letters never reach the model.
    pub fn system_text(&self, slot: Slot) -> String {
        let binding = self.config.binding(slot);
        let own_alias = self.alias_for(slot);

        let mut text = String::new();
        text.push_str(&format!("You are {}.\n", own_alias));
        if !binding.persona_text.trim().is_empty() {
            text.push_str(&format!("Your persona: {}\n", binding.persona_text));
        }
        text.push_str(&format!(
            "Always identify yourself only as {}. Never call yourself an \"agent\" or use any letter designation.\n",
            own_alias
        ));

        let peers: Vec<&str> = self
            .aliases
            .iter()
            .filter(|(s, _)| *s != slot)
            .map(|(_, name)| name.as_str())
            .collect();
        if !peers.is_empty() {
            text.push_str(&format!(
                "The other participants are {}. Refer to them by these names.\n",
                peers.join(" and ")
            ));
        }

        text
    }

    /// Compose the prompt for one turn.
    ///
    /// `context` is the history slice relevant to the role: the current
    /// round's messages for `PeerResponse`, the latest message per slot for
    /// `Followup`/`Final`, and the recent transcript for `UserResponse`
    /// (internally truncated to a fixed tail window). `Initial` ignores it.
    /// `human_text` is only read for `UserResponse`.
    pub fn compose(
        &self,
        role: PromptRole,
        slot: Slot,
        context: &[Message],
        human_text: Option<&str>,
    ) -> String {
        let mut prompt = match role {
            PromptRole::Initial => self.initial(slot),
            PromptRole::PeerResponse => self.peer_response(slot, context),
            PromptRole::Followup => self.followup(slot, context),
            PromptRole::Final => self.final_word(slot, context),
            PromptRole::UserResponse => self.user_response(slot, context, human_text),
        };

        prompt.push('\n');
        prompt.push_str(&self.length_instruction());
        prompt.push('\n');
        prompt.push_str(&self.language_instruction());
        prompt
    }

    fn initial(&self, _slot: Slot) -> String {
        match self.config.scenario() {
            ScenarioTemplate::AuthorshipAnalysis => format!(
                "The text under analysis is:\n\n{}\n\nGive your opening assessment of who \
                 wrote this text. Name the most likely author profile and the stylistic \
                 evidence that points to it.",
                self.config.topic
            ),
            ScenarioTemplate::Discussion => format!(
                "The discussion topic is:\n\n{}\n\nOpen the discussion with your own \
                 perspective on this topic.",
                self.config.topic
            ),
        }
    }

    fn peer_response(&self, _slot: Slot, round_messages: &[Message]) -> String {
        let transcript = self.transcript_block(round_messages);
        match self.config.scenario() {
            ScenarioTemplate::AuthorshipAnalysis => format!(
                "The text under analysis is:\n\n{}\n\nSo far this round the other analysts \
                 have said:\n\n{}\n\nState whether you agree or disagree with their \
                 attribution of who wrote the text, and defend your own attribution with \
                 stylistic evidence.",
                self.config.topic, transcript
            ),
            ScenarioTemplate::Discussion => format!(
                "The discussion topic is:\n\n{}\n\nSo far this round the other participants \
                 have said:\n\n{}\n\nRespond to their points with your own perspective.",
                self.config.topic, transcript
            ),
        }
    }

    fn followup(&self, _slot: Slot, latest_per_slot: &[Message]) -> String {
        format!(
            "The discussion topic is:\n\n{}\n\nThe most recent statement from each \
             participant:\n\n{}\n\nPush the discussion forward: raise a new angle or \
             deepen an existing one rather than repeating what has been said.",
            self.config.topic,
            self.transcript_block(latest_per_slot)
        )
    }

    fn final_word(&self, _slot: Slot, latest_per_slot: &[Message]) -> String {
        format!(
            "The discussion topic is:\n\n{}\n\nThe most recent statement from each \
             participant:\n\n{}\n\nWeigh in on the current state of the discussion, \
             acknowledging strong points and challenging weak ones.",
            self.config.topic,
            self.transcript_block(latest_per_slot)
        )
    }

    fn user_response(&self, _slot: Slot, recent: &[Message], human_text: Option<&str>) -> String {
        let start = recent.len().saturating_sub(USER_RESPONSE_WINDOW);
        let tail = self.transcript_block(&recent[start..]);
        format!(
            "The discussion topic is:\n\n{}\n\nRecent conversation:\n\n{}\n\nA human \
             participant has just said:\n\n\"{}\"\n\nAddress the human directly in your \
             reply, responding to what they said.",
            self.config.topic,
            tail,
            human_text.unwrap_or("")
        )
    }

    /// Render messages as "Name: text" lines. Human messages are attributed
    /// to "Human"; an empty slice renders as an empty block rather than
    /// failing.
    fn transcript_block(&self, messages: &[Message]) -> String {
        messages
            .iter()
            .map(|m| {
                let name = m.alias.as_deref().unwrap_or("Human");
                format!("{}: {}", name, m.text)
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn length_instruction(&self) -> String {
        match self.config.response_length {
            ResponseLength::Short => {
                "Keep your reply brief: a few sentences at most.".to_string()
            }
            ResponseLength::Medium => {
                "Keep your reply to a moderate length: one or two paragraphs.".to_string()
            }
            ResponseLength::Long => {
                "You may reply at length, with a thorough, well-developed argument.".to_string()
            }
        }
    }

    fn language_instruction(&self) -> String {
        "Respond in the same language as the topic text. If the language cannot be \
         determined, respond in English."
            .to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parley::config::AgentBinding;
    use crate::parley::message::{Speaker, TurnKind};
    use chrono::Utc;

    fn config() -> ConversationConfig {
        ConversationConfig::new("Should AI have rights?")
            .with_agent(AgentBinding::new("gpt-4o", "optimist").with_persona_text("Upbeat."))
            .with_agent(AgentBinding::new("claude-sonnet", "skeptic").with_persona_text("Wary."))
    }

    fn agent_message(slot: Slot, alias: &str, text: &str, index: u64) -> Message {
        Message {
            sequence_index: index,
            round_number: 1,
            speaker: Speaker::Slot(slot),
            turn_kind: TurnKind::Initial,
            model_id: Some("gpt-4o".into()),
            persona_id: Some("optimist".into()),
            alias: Some(alias.into()),
            text: text.into(),
            is_human: false,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn system_text_enforces_alias_identity() {
        let composer = PromptComposer::new(&config());
        let text = composer.system_text(Slot::A);
        let own = composer.alias_for(Slot::A).to_string();
        let peer = composer.alias_for(Slot::B).to_string();

        assert!(text.contains(&format!("You are {}.", own)));
        assert!(text.contains(&peer));
        assert!(!text.contains("slot"));
        assert!(!text.contains("Agent A"));
    }

    #[test]
    fn every_prompt_carries_the_language_rule() {
        let composer = PromptComposer::new(&config());
        for role in [
            PromptRole::Initial,
            PromptRole::PeerResponse,
            PromptRole::Followup,
            PromptRole::Final,
            PromptRole::UserResponse,
        ]
        .iter()
        {
            let prompt = composer.compose(*role, Slot::A, &[], Some("hi"));
            assert!(prompt.contains("same language as the topic"));
        }
    }

    #[test]
    fn peer_response_embeds_round_messages() {
        let composer = PromptComposer::new(&config());
        let a_alias = composer.alias_for(Slot::A).to_string();
        let round = vec![agent_message(Slot::A, &a_alias, "Rights now!", 0)];

        let prompt = composer.compose(PromptRole::PeerResponse, Slot::B, &round, None);
        assert!(prompt.contains("Rights now!"));
        assert!(prompt.contains(&a_alias));
    }

    #[test]
    fn authorship_scenario_changes_peer_wording() {
        let cfg = config().with_scenario("authorship-analysis");
        let composer = PromptComposer::new(&cfg);
        let prompt = composer.compose(PromptRole::PeerResponse, Slot::B, &[], None);
        assert!(prompt.contains("agree or disagree"));
        assert!(prompt.contains("who wrote the text"));

        let generic = PromptComposer::new(&config());
        let prompt = generic.compose(PromptRole::PeerResponse, Slot::B, &[], None);
        assert!(!prompt.contains("who wrote the text"));
    }

    #[test]
    fn user_response_window_is_bounded() {
        let composer = PromptComposer::new(&config());
        let a_alias = composer.alias_for(Slot::A).to_string();
        let history: Vec<Message> = (0..20)
            .map(|i| agent_message(Slot::A, &a_alias, &format!("statement-{}", i), i))
            .collect();

        let prompt = composer.compose(
            PromptRole::UserResponse,
            Slot::B,
            &history,
            Some("What about animals?"),
        );

        assert!(prompt.contains("What about animals?"));
        assert!(prompt.contains("statement-19"));
        assert!(prompt.contains("statement-14"));
        // Older messages fall outside the fixed window.
        assert!(!prompt.contains("statement-13"));
    }

    #[test]
    fn absent_inputs_become_empty_placeholders() {
        let composer = PromptComposer::new(&config());
        let prompt = composer.compose(PromptRole::UserResponse, Slot::A, &[], None);
        assert!(prompt.contains("\"\""));
        let prompt = composer.compose(PromptRole::Followup, Slot::A, &[], None);
        assert!(!prompt.is_empty());
    }
}
