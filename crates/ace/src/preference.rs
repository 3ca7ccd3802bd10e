//! User preferences and their reconciliation with a policy verdict.

use serde::{Deserialize, Serialize};

use crate::effect::PolicyResult;

/// A widget-feature-wide preference the user has set once and wants applied
/// on every future request for that pairing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UserPreference {
    Default,
    AlwaysPermit,
    AlwaysDeny,
    OneShotPrompt,
    SessionPrompt,
    BlanketPrompt,
}

/// A device-wide preference that can veto or force an outcome ahead of any
/// per-widget-feature preference.
///
/// Carries the same six-value domain as [`UserPreference`] (spec §3: a
/// device-wide preference over the identical `DEFAULT, PERMIT, DENY,
/// ONE_SHOT_PROMPT, SESSION_PROMPT, BLANKET_PROMPT` set), so a device owner
/// can force a blanket permit/deny or escalate every request to a prompt
/// exactly as a per-widget-feature preference can.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GlobalPreference {
    Default,
    AlwaysPermit,
    AlwaysDeny,
    OneShotPrompt,
    SessionPrompt,
    BlanketPrompt,
}

/// Reconciles a policy verdict with the user's global and per-feature
/// preferences into the final result returned to the caller.
///
/// Precedence, most restrictive first (grounded on the original engine's
/// `getMostRestrict`):
///
/// 1. A global `AlwaysDeny` preference denies unconditionally.
/// 2. An `AlwaysDeny` user preference denies unconditionally too — the DENY
///    column of the reconciliation table (§4.4) is DENY in every row,
///    including against an `Undetermined` policy result.
/// 3. A policy `Deny` denies unconditionally, regardless of any remaining preference.
/// 4. A policy `Undetermined` stays `Undetermined` regardless of any remaining preference.
/// 5. The global preference is folded in first (it outranks the per-feature
///    preference), then the per-feature preference is folded in on top of
///    that, both through the same escalate/prompt-rank logic: a `Default`
///    preference passes its input through unchanged; `AlwaysPermit`/a prompt
///    preference escalates `Permit`/a weaker prompt to its own prompt level
///    (`OneShotPrompt` > `SessionPrompt` > `BlanketPrompt` in restrictiveness,
///    matching the combining-algorithm scan order in §4.3) and never
///    de-escalates an already-stronger prompt. Since escalation only ever
///    moves toward the more restrictive of its two inputs, folding global
///    then per-feature always converges on the single most restrictive
///    result among policy/global/per-feature, regardless of which of the two
///    preferences is folded in first.
#[must_use]
pub fn reconcile(
    global: GlobalPreference,
    preference: UserPreference,
    policy_result: PolicyResult,
) -> PolicyResult {
    if global == GlobalPreference::AlwaysDeny {
        return PolicyResult::Deny;
    }
    // A DENY preference wins against every policy result, including
    // UNDETERMINED — the reconciliation table (§4.4) has no row where
    // the DENY column yields anything but DENY.
    if preference == UserPreference::AlwaysDeny {
        return PolicyResult::Deny;
    }
    if policy_result == PolicyResult::Deny {
        return PolicyResult::Deny;
    }
    if policy_result == PolicyResult::Undetermined {
        return PolicyResult::Undetermined;
    }

    let mut result = policy_result;
    if let Some(target) = global_escalation_target(global) {
        result = escalate(result, target);
    }
    if let Some(target) = user_escalation_target(preference) {
        result = escalate(result, target);
    }
    result
}

/// The `PolicyResult` a global preference escalates toward, or `None` for
/// `Default` (pass the input through unchanged). `AlwaysDeny` has already
/// been short-circuited by the caller and never reaches here.
fn global_escalation_target(global: GlobalPreference) -> Option<PolicyResult> {
    match global {
        GlobalPreference::Default => None,
        GlobalPreference::AlwaysDeny => unreachable!("handled above"),
        GlobalPreference::AlwaysPermit => Some(PolicyResult::Permit),
        GlobalPreference::OneShotPrompt => Some(PolicyResult::PromptOneShot),
        GlobalPreference::SessionPrompt => Some(PolicyResult::PromptSession),
        GlobalPreference::BlanketPrompt => Some(PolicyResult::PromptBlanket),
    }
}

/// The `PolicyResult` a per-feature preference escalates toward, or `None`
/// for `Default`. `AlwaysDeny` has already been short-circuited by the
/// caller and never reaches here.
fn user_escalation_target(preference: UserPreference) -> Option<PolicyResult> {
    match preference {
        UserPreference::Default => None,
        UserPreference::AlwaysDeny => unreachable!("handled above"),
        UserPreference::AlwaysPermit => Some(PolicyResult::Permit),
        UserPreference::OneShotPrompt => Some(PolicyResult::PromptOneShot),
        UserPreference::SessionPrompt => Some(PolicyResult::PromptSession),
        UserPreference::BlanketPrompt => Some(PolicyResult::PromptBlanket),
    }
}

/// Ranks a prompt result by restrictiveness, higher is more restrictive:
/// `PromptOneShot > PromptSession > PromptBlanket`, matching the explicit
/// scan order the combining-algorithm tables use (§4.3: `DenyOverrides`
/// checks `PromptOneShot` before `PromptSession` before `PromptBlanket`).
fn prompt_rank(result: PolicyResult) -> Option<u8> {
    match result {
        PolicyResult::PromptOneShot => Some(2),
        PolicyResult::PromptSession => Some(1),
        PolicyResult::PromptBlanket => Some(0),
        _ => None,
    }
}

/// Picks the more restrictive of the policy's own result and the
/// preference-implied result, never downgrading an already-stronger prompt.
fn escalate(policy_result: PolicyResult, preference_result: PolicyResult) -> PolicyResult {
    match (prompt_rank(policy_result), prompt_rank(preference_result)) {
        (Some(p), Some(q)) => {
            if p >= q {
                policy_result
            } else {
                preference_result
            }
        }
        (Some(_), None) => policy_result,
        (None, Some(_)) => preference_result,
        (None, None) => {
            if policy_result == PolicyResult::NotApplicable {
                preference_result
            } else {
                policy_result
            }
        }
    }
}
