//! Combining algorithms that reduce a sequence of child effects to one effect.

use serde::{Deserialize, Serialize};

use crate::effect::Effect;

/// The combining algorithm a `Policy` or `PolicySet` declares for its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CombiningAlgorithm {
    DenyOverrides,
    PermitOverrides,
    FirstApplicable,
    FirstMatchingTarget,
}

impl CombiningAlgorithm {
    /// Combines the effects of a node's already-evaluated children.
    ///
    /// `FirstMatchingTarget` is handled by the caller (it short-circuits at
    /// the target-match step, before a child's effect even exists) and is
    /// accepted here only so the enum stays exhaustive at call sites; it
    /// behaves identically to `FirstApplicable` once it reaches this point
    /// (the first non-`NotApplicable` effect wins).
    #[must_use]
    pub fn combine(self, effects: &[Effect]) -> Effect {
        match self {
            Self::DenyOverrides => Self::deny_overrides(effects),
            Self::PermitOverrides => Self::permit_overrides(effects),
            Self::FirstApplicable | Self::FirstMatchingTarget => Self::first_applicable(effects),
        }
    }

    /// `Error` is viral: a full scan must see every child before the
    /// algorithm decides, since a later `Error` outranks an earlier `Deny`
    /// or `Permit` regardless of how far into the list it appears.
    fn deny_overrides(effects: &[Effect]) -> Effect {
        let mut saw_error = false;
        let mut saw_deny = false;
        let mut saw_undetermined = false;
        let mut saw_permit = false;
        let mut saw_one_shot = false;
        let mut saw_session = false;
        let mut saw_blanket = false;
        for effect in effects {
            match effect {
                Effect::Error => saw_error = true,
                Effect::Deny => saw_deny = true,
                Effect::Undetermined => saw_undetermined = true,
                Effect::Permit => saw_permit = true,
                Effect::PromptOneShot => saw_one_shot = true,
                Effect::PromptSession => saw_session = true,
                Effect::PromptBlanket => saw_blanket = true,
                Effect::NotApplicable => {}
            }
        }
        if saw_error {
            return Effect::Error;
        }
        if saw_deny {
            return Effect::Deny;
        }
        if saw_undetermined {
            return Effect::Undetermined;
        }
        // Most-restrictive prompt wins first: OneShot > Session > Blanket.
        if saw_one_shot {
            return Effect::PromptOneShot;
        }
        if saw_session {
            return Effect::PromptSession;
        }
        if saw_blanket {
            return Effect::PromptBlanket;
        }
        if saw_permit {
            return Effect::Permit;
        }
        Effect::NotApplicable
    }

    fn permit_overrides(effects: &[Effect]) -> Effect {
        let mut saw_error = false;
        let mut saw_permit = false;
        let mut saw_undetermined = false;
        let mut saw_deny = false;
        let mut saw_one_shot = false;
        let mut saw_session = false;
        let mut saw_blanket = false;
        for effect in effects {
            match effect {
                Effect::Error => saw_error = true,
                Effect::Permit => saw_permit = true,
                Effect::Undetermined => saw_undetermined = true,
                Effect::Deny => saw_deny = true,
                Effect::PromptOneShot => saw_one_shot = true,
                Effect::PromptSession => saw_session = true,
                Effect::PromptBlanket => saw_blanket = true,
                Effect::NotApplicable => {}
            }
        }
        if saw_error {
            return Effect::Error;
        }
        if saw_permit {
            return Effect::Permit;
        }
        if saw_undetermined {
            return Effect::Undetermined;
        }
        // Least-restrictive prompt wins first: Blanket > Session > OneShot.
        if saw_blanket {
            return Effect::PromptBlanket;
        }
        if saw_session {
            return Effect::PromptSession;
        }
        if saw_one_shot {
            return Effect::PromptOneShot;
        }
        if saw_deny {
            return Effect::Deny;
        }
        Effect::NotApplicable
    }

    fn first_applicable(effects: &[Effect]) -> Effect {
        for effect in effects {
            if !matches!(effect, Effect::NotApplicable) {
                return *effect;
            }
        }
        Effect::NotApplicable
    }
}
