//! The internal [`Effect`] lattice, its external [`PolicyResult`] projection,
//! and three-valued [`TriState`] logic shared by the condition algebra.

use serde::{Deserialize, Serialize};

/// A three-valued truth value: `Kleene` logic, not a plain bool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TriState {
    True,
    False,
    Undetermined,
}

impl TriState {
    #[must_use]
    pub fn and(self, other: Self) -> Self {
        match (self, other) {
            (Self::False, _) | (_, Self::False) => Self::False,
            (Self::Undetermined, _) | (_, Self::Undetermined) => Self::Undetermined,
            (Self::True, Self::True) => Self::True,
        }
    }

    #[must_use]
    pub fn or(self, other: Self) -> Self {
        match (self, other) {
            (Self::True, _) | (_, Self::True) => Self::True,
            (Self::Undetermined, _) | (_, Self::Undetermined) => Self::Undetermined,
            (Self::False, Self::False) => Self::False,
        }
    }
}

impl From<bool> for TriState {
    fn from(value: bool) -> Self {
        if value { Self::True } else { Self::False }
    }
}

/// The outcome of evaluating a node in the policy tree.
///
/// `Effect` is the engine's internal seven-valued result; it differs from
/// [`PolicyResult`] only in carrying `Error`, which the external boundary
/// never exposes (fail-closed: an `Error` always surfaces to callers as
/// `Deny`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Effect {
    Permit,
    Deny,
    PromptOneShot,
    PromptSession,
    PromptBlanket,
    NotApplicable,
    Undetermined,
    Error,
}

/// The decision an evaluator returns to a caller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PolicyResult {
    Permit,
    Deny,
    PromptOneShot,
    PromptSession,
    PromptBlanket,
    NotApplicable,
    Undetermined,
}

impl From<Effect> for PolicyResult {
    fn from(effect: Effect) -> Self {
        match effect {
            Effect::Permit => Self::Permit,
            Effect::Deny | Effect::Error => Self::Deny,
            Effect::PromptOneShot => Self::PromptOneShot,
            Effect::PromptSession => Self::PromptSession,
            Effect::PromptBlanket => Self::PromptBlanket,
            Effect::NotApplicable => Self::NotApplicable,
            Effect::Undetermined => Self::Undetermined,
        }
    }
}

impl std::fmt::Display for PolicyResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Permit => "PERMIT",
            Self::Deny => "DENY",
            Self::PromptOneShot => "PROMPT_ONESHOT",
            Self::PromptSession => "PROMPT_SESSION",
            Self::PromptBlanket => "PROMPT_BLANKET",
            Self::NotApplicable => "NOT_APPLICABLE",
            Self::Undetermined => "UNDETERMINED",
        };
        write!(f, "{s}")
    }
}
