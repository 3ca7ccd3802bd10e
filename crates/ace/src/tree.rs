//! The immutable, arena-backed policy tree.
//!
//! Nodes are stored in a flat `Vec` and referenced by index rather than
//! through a polymorphic class hierarchy with virtual dispatch, so the whole
//! tree is trivially `Send + Sync` and can be published behind a single
//! `arc_swap::ArcSwap` pointer swap on reload.

use serde::{Deserialize, Serialize};

use crate::attribute_set::AttributeSet;
use crate::combiner::CombiningAlgorithm;
use crate::condition::{Condition, Target};
use crate::effect::{Effect, TriState};
use crate::error::AceError;

pub type NodeId = usize;

/// The tag distinguishing a `Rule` from a `Policy`/`PolicySet` node.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum NodeKind {
    Rule {
        condition: Option<Condition>,
        effect: Effect,
    },
    Policy {
        algorithm: CombiningAlgorithm,
        children: Vec<NodeId>,
    },
    PolicySet {
        algorithm: CombiningAlgorithm,
        children: Vec<NodeId>,
    },
}

/// One node of the policy tree: a target gate plus its kind-specific payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode {
    pub id: NodeId,
    pub name: String,
    pub target: Target,
    pub kind: NodeKind,
}

/// One step of an evaluation trace: which node was visited and what it produced.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeTrace {
    pub node_id: NodeId,
    pub node_name: String,
    pub effect: Effect,
}

/// An immutable, validated policy tree.
///
/// Validation (performed once, at [`PolicyTree::build`]) guarantees every
/// child index is in bounds and every `Policy`'s children are `Rule` nodes
/// while every `PolicySet`'s children are `Policy`/`PolicySet` nodes — so
/// `evaluate` never needs to re-check node-kind nesting at call time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyTree {
    nodes: Vec<TreeNode>,
    root: NodeId,
    /// Every attribute id referenced anywhere in the tree, computed once at
    /// [`PolicyTree::build`] and cached alongside the tree for the life of
    /// the `Arc` a reader holds — the orchestration contract's "extract the
    /// schema lazily, once per loaded tree" step (§4.4).
    schema: Vec<String>,
}

impl PolicyTree {
    /// Builds and validates a tree from a flat node list and a root index.
    ///
    /// # Errors
    ///
    /// Returns `AceError::Input` if the root index is out of bounds, if any
    /// child index is out of bounds, or if a `Policy` references a non-`Rule`
    /// child or a `PolicySet` references a `Rule` child directly.
    pub fn build(nodes: Vec<TreeNode>, root: NodeId) -> Result<Self, AceError> {
        if root >= nodes.len() {
            return Err(AceError::input(format!(
                "root node index {root} out of bounds ({} nodes)",
                nodes.len()
            )));
        }
        for node in &nodes {
            match &node.kind {
                NodeKind::Rule { .. } => {}
                NodeKind::Policy { children, .. } => {
                    for &child in children {
                        let Some(child_node) = nodes.get(child) else {
                            return Err(AceError::input(format!(
                                "policy '{}' references out-of-bounds child {child}",
                                node.name
                            )));
                        };
                        if !matches!(child_node.kind, NodeKind::Rule { .. }) {
                            return Err(AceError::input(format!(
                                "policy '{}' child '{}' must be a rule",
                                node.name, child_node.name
                            )));
                        }
                    }
                }
                NodeKind::PolicySet { children, .. } => {
                    for &child in children {
                        let Some(child_node) = nodes.get(child) else {
                            return Err(AceError::input(format!(
                                "policy set '{}' references out-of-bounds child {child}",
                                node.name
                            )));
                        };
                        if matches!(child_node.kind, NodeKind::Rule { .. }) {
                            return Err(AceError::input(format!(
                                "policy set '{}' child '{}' cannot be a bare rule",
                                node.name, child_node.name
                            )));
                        }
                    }
                }
            }
        }
        let schema = compute_referenced_attribute_ids(&nodes);
        Ok(Self { nodes, root, schema })
    }

    #[must_use]
    pub fn root(&self) -> &TreeNode {
        &self.nodes[self.root]
    }

    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(id)
    }

    /// Every attribute id referenced anywhere in the tree: every node's
    /// target predicates plus every rule's condition predicates.
    ///
    /// Computed once by [`PolicyTree::build`] from a full-tree pass, not just
    /// the applicable subtree for one request, so a `PolicyInformationPoint`
    /// can pre-resolve the whole schema once per reload rather than
    /// attribute-by-attribute per evaluation; this accessor just returns the
    /// cached result.
    #[must_use]
    pub fn referenced_attribute_ids(&self) -> &[String] {
        &self.schema
    }

    /// Evaluates the tree against a resolved attribute set, starting at the root.
    ///
    /// Infallible: a malformed literal or any other invariant violation
    /// encountered mid-walk folds to `Effect::Error` for the node it occurred
    /// in rather than aborting the call, per the "internal error inside the
    /// walk becomes an Error effect" failure rule. A resolution gap folds to
    /// `Effect::Undetermined` instead, since it is expected and recoverable.
    #[must_use]
    pub fn evaluate(&self, attrs: &AttributeSet) -> Effect {
        self.evaluate_node(self.root, attrs, &mut None)
    }

    /// Evaluates the tree, recording a trace of every node visited.
    #[must_use]
    pub fn evaluate_with_trace(&self, attrs: &AttributeSet) -> (Effect, Vec<NodeTrace>) {
        let mut trace = Some(Vec::new());
        let effect = self.evaluate_node(self.root, attrs, &mut trace);
        (effect, trace.unwrap_or_default())
    }

    fn evaluate_node(
        &self,
        id: NodeId,
        attrs: &AttributeSet,
        trace: &mut Option<Vec<NodeTrace>>,
    ) -> Effect {
        let node = &self.nodes[id];
        let target_result = fold_tristate(node.target.evaluate(attrs));

        let effect = match target_result {
            Folded::Tri(TriState::False) => Effect::NotApplicable,
            Folded::Tri(TriState::Undetermined) => Effect::Undetermined,
            Folded::Error => Effect::Error,
            Folded::Tri(TriState::True) => match &node.kind {
                NodeKind::Rule { condition, effect } => {
                    self.evaluate_rule(condition.as_ref(), *effect, attrs)
                }
                NodeKind::Policy { algorithm, children }
                | NodeKind::PolicySet { algorithm, children } => {
                    self.evaluate_children(*algorithm, children, attrs, trace)
                }
            },
        };

        if let Some(entries) = trace {
            entries.push(NodeTrace {
                node_id: node.id,
                node_name: node.name.clone(),
                effect,
            });
        }
        effect
    }

    fn evaluate_rule(&self, condition: Option<&Condition>, effect: Effect, attrs: &AttributeSet) -> Effect {
        let Some(condition) = condition else {
            return effect;
        };
        match fold_tristate(condition.evaluate(attrs)) {
            Folded::Tri(TriState::True) => effect,
            Folded::Tri(TriState::False) => Effect::NotApplicable,
            Folded::Tri(TriState::Undetermined) => Effect::Undetermined,
            Folded::Error => Effect::Error,
        }
    }

    fn evaluate_children(
        &self,
        algorithm: CombiningAlgorithm,
        children: &[NodeId],
        attrs: &AttributeSet,
        trace: &mut Option<Vec<NodeTrace>>,
    ) -> Effect {
        if algorithm == CombiningAlgorithm::FirstMatchingTarget {
            for &child in children {
                let node = &self.nodes[child];
                match fold_tristate(node.target.evaluate(attrs)) {
                    Folded::Tri(TriState::False) => continue,
                    Folded::Tri(TriState::Undetermined) => return Effect::Undetermined,
                    Folded::Error => return Effect::Error,
                    Folded::Tri(TriState::True) => return self.evaluate_node(child, attrs, trace),
                }
            }
            return Effect::NotApplicable;
        }

        let mut effects = Vec::with_capacity(children.len());
        for &child in children {
            effects.push(self.evaluate_node(child, attrs, trace));
        }
        algorithm.combine(&effects)
    }
}

/// How a target/condition's `Result<TriState, AceError>` folds into the walk:
/// a resolution gap is an expected `Undetermined`, anything else is an
/// unrecoverable `Error` for that node.
enum Folded {
    Tri(TriState),
    Error,
}

fn fold_tristate(result: Result<TriState, AceError>) -> Folded {
    match result {
        Ok(t) => Folded::Tri(t),
        Err(e) if e.is_resolution_failure() => Folded::Tri(TriState::Undetermined),
        Err(_) => Folded::Error,
    }
}

fn compute_referenced_attribute_ids(nodes: &[TreeNode]) -> Vec<String> {
    let mut ids = std::collections::BTreeSet::new();
    for node in nodes {
        for predicate in &node.target.predicates {
            ids.insert(predicate.attribute_id.clone());
        }
        if let NodeKind::Rule {
            condition: Some(condition),
            ..
        } = &node.kind
        {
            collect_condition_attrs(condition, &mut ids);
        }
    }
    ids.into_iter().collect()
}

fn collect_condition_attrs(condition: &Condition, ids: &mut std::collections::BTreeSet<String>) {
    match condition {
        Condition::Predicate(p) => {
            ids.insert(p.attribute_id.clone());
        }
        Condition::And(children) | Condition::Or(children) => {
            for child in children {
                collect_condition_attrs(child, ids);
            }
        }
        Condition::Not(inner) => collect_condition_attrs(inner, ids),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::{Attribute, AttributeValue, MatchOperator};
    use crate::condition::Predicate;

    fn rule(id: NodeId, name: &str, target_attr: &str, literal: &str, effect: Effect) -> TreeNode {
        TreeNode {
            id,
            name: name.to_string(),
            target: Target {
                predicates: vec![Predicate {
                    attribute_id: target_attr.to_string(),
                    operator: MatchOperator::Equal,
                    literals: vec![literal.to_string()],
                    uri_accessor: None,
                }],
            },
            kind: NodeKind::Rule {
                condition: None,
                effect,
            },
        }
    }

    #[test]
    fn deny_overrides_policy_with_one_deny_rule_denies() {
        let nodes = vec![
            rule(0, "allow-camera", "resource.id", "camera", Effect::Permit),
            rule(1, "deny-untrusted", "subject.trusted", "false", Effect::Deny),
            TreeNode {
                id: 2,
                name: "root-policy".into(),
                target: Target::default(),
                kind: NodeKind::Policy {
                    algorithm: CombiningAlgorithm::DenyOverrides,
                    children: vec![0, 1],
                },
            },
        ];
        let tree = PolicyTree::build(nodes, 2).unwrap();
        let attrs = AttributeSet::from_iter([
            Attribute::new(
                "resource.id",
                vec![AttributeValue::String("camera".into())],
            ),
            Attribute::new(
                "subject.trusted",
                vec![AttributeValue::String("false".into())],
            ),
        ]);
        assert_eq!(tree.evaluate(&attrs), Effect::Deny);
    }

    #[test]
    fn not_applicable_target_skips_the_node() {
        let nodes = vec![
            rule(0, "allow-camera", "resource.id", "camera", Effect::Permit),
            TreeNode {
                id: 1,
                name: "root-policy".into(),
                target: Target::default(),
                kind: NodeKind::Policy {
                    algorithm: CombiningAlgorithm::FirstApplicable,
                    children: vec![0],
                },
            },
        ];
        let tree = PolicyTree::build(nodes, 1).unwrap();
        let attrs = AttributeSet::from_iter([Attribute::new(
            "resource.id",
            vec![AttributeValue::String("microphone".into())],
        )]);
        assert_eq!(tree.evaluate(&attrs), Effect::NotApplicable);
    }

    #[test]
    fn build_rejects_policy_set_with_bare_rule_child() {
        let nodes = vec![
            rule(0, "r", "a", "b", Effect::Permit),
            TreeNode {
                id: 1,
                name: "set".into(),
                target: Target::default(),
                kind: NodeKind::PolicySet {
                    algorithm: CombiningAlgorithm::DenyOverrides,
                    children: vec![0],
                },
            },
        ];
        assert!(PolicyTree::build(nodes, 1).is_err());
    }

    #[test]
    fn referenced_attribute_ids_is_a_full_tree_pass() {
        let nodes = vec![
            rule(0, "r1", "resource.id", "camera", Effect::Permit),
            rule(1, "r2", "subject.trusted", "true", Effect::Deny),
            TreeNode {
                id: 2,
                name: "root".into(),
                target: Target {
                    predicates: vec![Predicate {
                        attribute_id: "environment.mode".into(),
                        operator: MatchOperator::Equal,
                        literals: vec!["normal".into()],
                        uri_accessor: None,
                    }],
                },
                kind: NodeKind::Policy {
                    algorithm: CombiningAlgorithm::DenyOverrides,
                    children: vec![0, 1],
                },
            },
        ];
        let tree = PolicyTree::build(nodes, 2).unwrap();
        let ids = tree.referenced_attribute_ids();
        assert_eq!(
            ids,
            vec!["environment.mode", "resource.id", "subject.trusted"]
        );
    }

    #[test]
    fn first_matching_target_stops_at_first_match() {
        let nodes = vec![
            TreeNode {
                id: 0,
                name: "policy-a".into(),
                target: Target {
                    predicates: vec![Predicate {
                        attribute_id: "resource.id".into(),
                        operator: MatchOperator::Equal,
                        literals: vec!["camera".into()],
                        uri_accessor: None,
                    }],
                },
                kind: NodeKind::Policy {
                    algorithm: CombiningAlgorithm::FirstApplicable,
                    children: vec![2],
                },
            },
            TreeNode {
                id: 1,
                name: "policy-b".into(),
                target: Target::default(),
                kind: NodeKind::Policy {
                    algorithm: CombiningAlgorithm::FirstApplicable,
                    children: vec![3],
                },
            },
            rule(2, "allow", "resource.id", "camera", Effect::Permit),
            rule(3, "deny-fallback", "resource.id", "camera", Effect::Deny),
            TreeNode {
                id: 4,
                name: "root".into(),
                target: Target::default(),
                kind: NodeKind::PolicySet {
                    algorithm: CombiningAlgorithm::FirstMatchingTarget,
                    children: vec![0, 1],
                },
            },
        ];
        let tree = PolicyTree::build(nodes, 4).unwrap();
        let attrs = AttributeSet::from_iter([Attribute::new(
            "resource.id",
            vec![AttributeValue::String("camera".into())],
        )]);
        assert_eq!(tree.evaluate(&attrs), Effect::Permit);
    }
}
