//! Change set review.

use serde_json::Value;

/// What to do with a reviewed change set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeSetDecision {
    Execute,
    Discard,
    Keep,
}

impl ChangeSetDecision {
    /// Parse an interactive answer: `e`, `d` or `k`.
    pub fn from_answer(answer: &str) -> Option<Self> {
        match answer.trim() {
            "e" => Some(Self::Execute),
            "d" => Some(Self::Discard),
            "k" => Some(Self::Keep),
            _ => None,
        }
    }
}

/// Decides the fate of a change set given its description.
///
/// The CLI prompts the operator; embedders and tests supply their own.
#[cfg_attr(test, mockall::automock)]
pub trait ChangeSetDecider {
    fn decide(&self, change_set: &Value) -> ChangeSetDecision;
}

/// A fixed decision, for unattended runs.
impl ChangeSetDecider for ChangeSetDecision {
    fn decide(&self, _change_set: &Value) -> ChangeSetDecision {
        *self
    }
}
