//! First-turn tool-selection policy.
//!
//! A task-oriented first utterance forces the planner to call at least one
//! tool, so the answer is grounded in looked-up data instead of the model's
//! memory of the network. Social acknowledgements ("merci", "salut", "ok")
//! are let through in automatic mode.

use std::sync::LazyLock;

use regex::Regex;

use crate::types::ToolChoice;

static CONVERSATIONAL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?xi)^\s*
        (?:
            merci(?:\s+beaucoup|\s+bien)? | thanks?(?:\s+you)? | thx
          | salut | bonjour | bonsoir | coucou | hello | hi | hey
          | ok(?:ay)? | d'accord | dac | parfait | super | top | cool | g[ée]nial | nickel
          | oui | non | yes | no | yep | nope
          | au\s+revoir | [àa]\s+plus | bye | ciao | bonne\s+(?:journ[ée]e|soir[ée]e)
        )
        [\s!.?…,]*
        (?:\[User\ position:[^\]]*\]\s*)?$",
    )
    .expect("conversational pattern is valid")
});

/// Whether the whole utterance is a social acknowledgement.
pub fn is_conversational(utterance: &str) -> bool {
    CONVERSATIONAL.is_match(utterance)
}

/// Tool-selection mode for the first planner call of a request.
pub fn first_turn_choice(utterance: &str) -> ToolChoice {
    if is_conversational(utterance) {
        ToolChoice::Auto
    } else {
        ToolChoice::Required
    }
}
