//! Target matching and the boolean `Condition` algebra.

use serde::{Deserialize, Serialize};

use crate::attribute::{AttributeValue, MatchOperator, UriAccessor, match_value, uri_component};
use crate::attribute_set::AttributeSet;
use crate::effect::TriState;
use crate::error::AceError;

/// One `attribute_id op literals` comparison inside a [`Target`] or [`Condition`].
///
/// `literals` is the policy-side value bag (a `<Match>`/`<Attribute>` element
/// may carry one or more literal values); matching is existential over both
/// bags, not just the request-side one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Predicate {
    pub attribute_id: String,
    pub operator: MatchOperator,
    pub literals: Vec<String>,
    /// Applies a URI component accessor to each resolved value before the
    /// match operator runs, for attributes declared as URI-valued.
    #[serde(default)]
    pub uri_accessor: Option<UriAccessor>,
}

impl Predicate {
    /// Matches this predicate against the resolved attribute set.
    ///
    /// - An attribute absent from the request-side set is `Undetermined`
    ///   (the PIP never got a chance to resolve it at all).
    /// - An attribute explicitly marked `undetermined` by the PIP is also
    ///   `Undetermined`.
    /// - An attribute present with an empty resolved bag is `False`.
    /// - Otherwise the predicate is `True` iff some literal in the
    ///   policy-side bag matches some value in the request-side bag
    ///   (§4.1 rule 4: existential on both sides). A value that fails its
    ///   `uri_accessor` extraction (not a `scheme://` URI) takes no part in
    ///   the match rather than erroring.
    pub fn evaluate(&self, attrs: &AttributeSet) -> Result<TriState, AceError> {
        let Some(attr) = attrs.get(&self.attribute_id) else {
            return Ok(TriState::Undetermined);
        };
        if attr.undetermined {
            return Ok(TriState::Undetermined);
        }
        for value in &attr.values {
            let candidate = match self.uri_accessor {
                Some(accessor) => match uri_component(&value.to_string(), accessor) {
                    Some(component) => AttributeValue::String(component),
                    None => continue,
                },
                None => value.clone(),
            };
            for literal in &self.literals {
                if match_value(&self.operator, literal, &candidate)? {
                    return Ok(TriState::True);
                }
            }
        }
        Ok(TriState::False)
    }
}

/// A target: the applicability gate of a `Rule`/`Policy`/`PolicySet`.
///
/// Per the matching algebra, a target is a conjunction of predicates — every
/// predicate must hold for the node to apply. An empty target always applies
/// (`True`), matching "no target means applicable to everything".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Target {
    pub predicates: Vec<Predicate>,
}

impl Target {
    pub fn evaluate(&self, attrs: &AttributeSet) -> Result<TriState, AceError> {
        let mut result = TriState::True;
        for predicate in &self.predicates {
            result = result.and(predicate.evaluate(attrs)?);
            if result == TriState::False {
                return Ok(TriState::False);
            }
        }
        Ok(result)
    }
}

/// A boolean expression guarding a `Rule`'s applicability once its target matches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Condition {
    Predicate(Predicate),
    And(Vec<Condition>),
    Or(Vec<Condition>),
    Not(Box<Condition>),
}

impl Condition {
    pub fn evaluate(&self, attrs: &AttributeSet) -> Result<TriState, AceError> {
        match self {
            Self::Predicate(p) => p.evaluate(attrs),
            Self::And(children) => {
                let mut acc = TriState::True;
                for child in children {
                    acc = acc.and(child.evaluate(attrs)?);
                    if acc == TriState::False {
                        return Ok(TriState::False);
                    }
                }
                Ok(acc)
            }
            Self::Or(children) => {
                let mut acc = TriState::False;
                for child in children {
                    acc = acc.or(child.evaluate(attrs)?);
                    if acc == TriState::True {
                        return Ok(TriState::True);
                    }
                }
                Ok(acc)
            }
            Self::Not(inner) => match inner.evaluate(attrs)? {
                TriState::True => Ok(TriState::False),
                TriState::False => Ok(TriState::True),
                TriState::Undetermined => Ok(TriState::Undetermined),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeValue};

    fn attrs_with(id: &str, value: &str) -> AttributeSet {
        AttributeSet::from_iter([Attribute::new(
            id,
            vec![AttributeValue::String(value.into())],
        )])
    }

    fn eq(id: &str, literal: &str) -> Condition {
        Condition::Predicate(Predicate {
            attribute_id: id.to_string(),
            operator: MatchOperator::Equal,
            literals: vec![literal.to_string()],
            uri_accessor: None,
        })
    }

    #[test]
    fn missing_attribute_predicate_is_undetermined() {
        let attrs = AttributeSet::new();
        let cond = eq("subject.id", "w1");
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::Undetermined);
    }

    #[test]
    fn empty_resolved_bag_is_false_not_undetermined() {
        let attrs = AttributeSet::from_iter([Attribute::new("subject.id", vec![])]);
        let cond = eq("subject.id", "w1");
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::False);
    }

    #[test]
    fn undetermined_attribute_propagates() {
        let attrs = AttributeSet::from_iter([Attribute::undetermined("subject.id")]);
        let cond = eq("subject.id", "w1");
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::Undetermined);
    }

    #[test]
    fn or_short_circuits_true_before_an_undetermined_sibling() {
        let attrs = attrs_with("resource.id", "camera");
        let cond = Condition::Or(vec![
            eq("resource.id", "camera"),
            eq("unresolved.attr", "whatever"),
        ]);
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::True);
    }

    #[test]
    fn and_of_true_and_undetermined_is_undetermined() {
        let attrs = AttributeSet::from_iter([
            Attribute::new(
                "resource.id",
                vec![AttributeValue::String("camera".into())],
            ),
            Attribute::undetermined("subject.id"),
        ]);
        let cond = Condition::And(vec![eq("resource.id", "camera"), eq("subject.id", "w1")]);
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::Undetermined);
    }

    #[test]
    fn not_of_undetermined_is_undetermined() {
        let attrs = AttributeSet::from_iter([Attribute::undetermined("subject.id")]);
        let cond = Condition::Not(Box::new(eq("subject.id", "w1")));
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::Undetermined);
    }

    #[test]
    fn uri_accessor_matches_against_the_extracted_host() {
        let attrs = AttributeSet::from_iter([Attribute::new(
            "resource.uri",
            vec![AttributeValue::String("device-cap://camera.local/capture".into())],
        )]);
        let cond = Condition::Predicate(Predicate {
            attribute_id: "resource.uri".to_string(),
            operator: MatchOperator::Equal,
            literals: vec!["camera.local".to_string()],
            uri_accessor: Some(crate::attribute::UriAccessor::Host),
        });
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::True);
    }

    #[test]
    fn uri_accessor_skips_a_non_uri_value_rather_than_matching_false() {
        let attrs = AttributeSet::from_iter([Attribute::new(
            "resource.uri",
            vec![AttributeValue::String("not-a-uri".into())],
        )]);
        let cond = Condition::Predicate(Predicate {
            attribute_id: "resource.uri".to_string(),
            operator: MatchOperator::Equal,
            literals: vec!["anything".to_string()],
            uri_accessor: Some(crate::attribute::UriAccessor::Host),
        });
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::False);
    }

    #[test]
    fn policy_side_bag_matches_existentially_against_request_bag() {
        let attrs = AttributeSet::from_iter([Attribute::new(
            "resource.id",
            vec![
                AttributeValue::String("microphone".into()),
                AttributeValue::String("camera".into()),
            ],
        )]);
        let cond = Condition::Predicate(Predicate {
            attribute_id: "resource.id".to_string(),
            operator: MatchOperator::Equal,
            literals: vec!["speaker".to_string(), "camera".to_string()],
            uri_accessor: None,
        });
        assert_eq!(cond.evaluate(&attrs).unwrap(), TriState::True);
    }

    #[test]
    fn empty_target_always_applies() {
        let attrs = AttributeSet::new();
        let target = Target::default();
        assert_eq!(target.evaluate(&attrs).unwrap(), TriState::True);
    }
}
