//! Parses a policy document into a validated [`PolicyTree`] and owns the
//! atomic-swap-with-rollback reload contract.
//!
//! ```xml
//! <PolicySet name="root" algorithm="deny-overrides">
//!   <Target/>
//!   <Policy name="device-capabilities" algorithm="first-applicable">
//!     <Target>
//!       <Match attribute="resource.id" operator="glob" value="device-cap://camera.*"/>
//!     </Target>
//!     <Rule name="allow-trusted" effect="Permit">
//!       <Condition>
//!         <Match attribute="subject.trusted" operator="equal" value="true"/>
//!       </Condition>
//!     </Rule>
//!     <Rule name="deny-default" effect="Deny"/>
//!   </Policy>
//! </PolicySet>
//! ```
//!
//! A `<Match>` may carry several literals — either multiple `<Value
//! value="..."/>` children, or the `value` shorthand attribute, or both —
//! matched existentially against the resolved attribute's own bag (§4.1 rule
//! 4 is bag-vs-bag, not just literal-vs-bag). `operator` defaults to
//! `equal` when omitted. A `<Match>` against a URI-valued attribute may add
//! `uriAccessor` (one of `scheme`, `authority`, `host`, `path`,
//! `scheme+authority`) to compare the extracted component instead of the raw
//! value.
//!
//! Unknown elements, attributes, or `algorithm`/`effect`/`operator`/
//! `uriAccessor` names are a [`LoadError::Parsing`] failure, never silently
//! ignored.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, RwLock};

use arc_swap::ArcSwap;
use quick_xml::Reader;
use quick_xml::events::Event;

use crate::attribute::{MatchOperator, UriAccessor};
use crate::combiner::CombiningAlgorithm;
use crate::condition::{Condition, Predicate, Target};
use crate::effect::Effect;
use crate::error::LoadError;
use crate::tree::{NodeKind, NodeId, PolicyTree, TreeNode};

/// A generic XML element, parsed once before lowering to the typed policy AST.
#[derive(Debug, Clone, Default)]
struct XmlElement {
    name: String,
    attrs: HashMap<String, String>,
    children: Vec<XmlElement>,
}

fn parse_xml(document: &str) -> Result<XmlElement, LoadError> {
    let mut reader = Reader::from_str(document);
    reader.config_mut().trim_text(true);

    let mut stack: Vec<XmlElement> = Vec::new();
    let mut root: Option<XmlElement> = None;
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Err(e) => return Err(LoadError::parsing(format!("xml error: {e}"))),
            Ok(Event::Eof) => break,
            Ok(Event::Start(tag)) => {
                let name = decode(tag.name().as_ref());
                let mut attrs = HashMap::new();
                for attr in tag.attributes() {
                    let attr = attr.map_err(|e| LoadError::parsing(format!("bad attribute: {e}")))?;
                    let key = decode(attr.key.as_ref());
                    let value = attr
                        .unescape_value()
                        .map_err(|e| LoadError::parsing(format!("bad attribute value: {e}")))?
                        .to_string();
                    attrs.insert(key, value);
                }
                stack.push(XmlElement {
                    name,
                    attrs,
                    children: Vec::new(),
                });
            }
            Ok(Event::Empty(tag)) => {
                let name = decode(tag.name().as_ref());
                let mut attrs = HashMap::new();
                for attr in tag.attributes() {
                    let attr = attr.map_err(|e| LoadError::parsing(format!("bad attribute: {e}")))?;
                    let key = decode(attr.key.as_ref());
                    let value = attr
                        .unescape_value()
                        .map_err(|e| LoadError::parsing(format!("bad attribute value: {e}")))?
                        .to_string();
                    attrs.insert(key, value);
                }
                let element = XmlElement {
                    name,
                    attrs,
                    children: Vec::new(),
                };
                push_child(&mut stack, &mut root, element)?;
            }
            Ok(Event::End(_)) => {
                let finished = stack
                    .pop()
                    .ok_or_else(|| LoadError::parsing("unbalanced closing tag"))?;
                push_child(&mut stack, &mut root, finished)?;
            }
            _ => {}
        }
        buf.clear();
    }

    root.ok_or_else(|| LoadError::parsing("document has no root element"))
}

fn push_child(
    stack: &mut [XmlElement],
    root: &mut Option<XmlElement>,
    element: XmlElement,
) -> Result<(), LoadError> {
    if let Some(parent) = stack.last_mut() {
        parent.children.push(element);
    } else if root.is_none() {
        *root = Some(element);
    } else {
        return Err(LoadError::parsing("document has more than one root element"));
    }
    Ok(())
}

fn decode(bytes: &[u8]) -> String {
    String::from_utf8_lossy(bytes).into_owned()
}

fn parse_operator(raw: &str) -> Result<MatchOperator, LoadError> {
    match raw {
        "equal" => Ok(MatchOperator::Equal),
        "glob" => Ok(MatchOperator::Glob),
        "regex" => Ok(MatchOperator::Regex),
        other => Err(LoadError::parsing(format!("unknown match operator '{other}'"))),
    }
}

fn parse_algorithm(raw: &str) -> Result<CombiningAlgorithm, LoadError> {
    match raw {
        "deny-overrides" => Ok(CombiningAlgorithm::DenyOverrides),
        "permit-overrides" => Ok(CombiningAlgorithm::PermitOverrides),
        "first-applicable" => Ok(CombiningAlgorithm::FirstApplicable),
        "first-matching-target" => Ok(CombiningAlgorithm::FirstMatchingTarget),
        other => Err(LoadError::parsing(format!(
            "unknown combining algorithm '{other}'"
        ))),
    }
}

fn parse_effect(raw: &str) -> Result<Effect, LoadError> {
    match raw {
        "Permit" => Ok(Effect::Permit),
        "Deny" => Ok(Effect::Deny),
        "PromptOneShot" => Ok(Effect::PromptOneShot),
        "PromptSession" => Ok(Effect::PromptSession),
        "PromptBlanket" => Ok(Effect::PromptBlanket),
        other => Err(LoadError::parsing(format!("unknown rule effect '{other}'"))),
    }
}

fn parse_uri_accessor(raw: &str) -> Result<UriAccessor, LoadError> {
    match raw {
        "scheme" => Ok(UriAccessor::Scheme),
        "authority" => Ok(UriAccessor::Authority),
        "host" => Ok(UriAccessor::Host),
        "path" => Ok(UriAccessor::Path),
        "scheme+authority" => Ok(UriAccessor::SchemeAuthority),
        other => Err(LoadError::parsing(format!("unknown uriAccessor '{other}'"))),
    }
}

fn parse_match(element: &XmlElement) -> Result<Predicate, LoadError> {
    let attribute_id = element
        .attrs
        .get("attribute")
        .ok_or_else(|| LoadError::parsing("<Match> missing 'attribute'"))?
        .clone();
    let operator = match element.attrs.get("operator") {
        Some(raw) => parse_operator(raw)?,
        None => MatchOperator::Equal,
    };

    let mut literals: Vec<String> = Vec::new();
    if let Some(value) = element.attrs.get("value") {
        literals.push(value.clone());
    }
    for child in &element.children {
        match child.name.as_str() {
            "Value" => literals.push(child.attrs.get("value").cloned().unwrap_or_default()),
            other => {
                return Err(LoadError::parsing(format!(
                    "unexpected element <{other}> in <Match>"
                )));
            }
        }
    }
    if literals.is_empty() {
        return Err(LoadError::parsing(
            "<Match> requires a 'value' attribute or at least one <Value> child",
        ));
    }

    let uri_accessor = element
        .attrs
        .get("uriAccessor")
        .map(|raw| parse_uri_accessor(raw))
        .transpose()?;
    Ok(Predicate {
        attribute_id,
        operator,
        literals,
        uri_accessor,
    })
}

fn parse_target(element: Option<&XmlElement>) -> Result<Target, LoadError> {
    let Some(element) = element else {
        return Ok(Target::default());
    };
    let mut predicates = Vec::new();
    for child in &element.children {
        match child.name.as_str() {
            "Match" => predicates.push(parse_match(child)?),
            other => return Err(LoadError::parsing(format!("unexpected element <{other}> in <Target>"))),
        }
    }
    Ok(Target { predicates })
}

fn parse_condition(element: &XmlElement) -> Result<Condition, LoadError> {
    match element.name.as_str() {
        "Match" => Ok(Condition::Predicate(parse_match(element)?)),
        "And" => Ok(Condition::And(
            element
                .children
                .iter()
                .map(parse_condition)
                .collect::<Result<_, _>>()?,
        )),
        "Or" => Ok(Condition::Or(
            element
                .children
                .iter()
                .map(parse_condition)
                .collect::<Result<_, _>>()?,
        )),
        "Not" => {
            let inner = element
                .children
                .first()
                .ok_or_else(|| LoadError::parsing("<Not> requires exactly one child"))?;
            Ok(Condition::Not(Box::new(parse_condition(inner)?)))
        }
        other => Err(LoadError::parsing(format!("unexpected condition element <{other}>"))),
    }
}

struct Lowering {
    nodes: Vec<TreeNode>,
}

impl Lowering {
    fn lower_rule(&mut self, element: &XmlElement) -> Result<NodeId, LoadError> {
        let name = element
            .attrs
            .get("name")
            .cloned()
            .unwrap_or_else(|| "unnamed-rule".to_string());
        let effect = parse_effect(
            element
                .attrs
                .get("effect")
                .ok_or_else(|| LoadError::parsing(format!("<Rule> '{name}' missing 'effect'")))?,
        )?;

        let mut target = None;
        let mut condition = None;
        for child in &element.children {
            match child.name.as_str() {
                "Target" => target = Some(parse_target(Some(child))?),
                "Condition" => {
                    let inner = child
                        .children
                        .first()
                        .ok_or_else(|| LoadError::parsing("<Condition> requires exactly one child"))?;
                    condition = Some(parse_condition(inner)?);
                }
                other => {
                    return Err(LoadError::parsing(format!(
                        "unexpected element <{other}> in <Rule> '{name}'"
                    )));
                }
            }
        }

        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            name,
            target: target.unwrap_or_default(),
            kind: NodeKind::Rule { condition, effect },
        });
        Ok(id)
    }

    fn lower_policy(&mut self, element: &XmlElement) -> Result<NodeId, LoadError> {
        let name = element
            .attrs
            .get("name")
            .cloned()
            .unwrap_or_else(|| "unnamed-policy".to_string());
        let algorithm = parse_algorithm(
            element
                .attrs
                .get("algorithm")
                .ok_or_else(|| LoadError::parsing(format!("<Policy> '{name}' missing 'algorithm'")))?,
        )?;

        let mut target = None;
        let mut children = Vec::new();
        for child in &element.children {
            match child.name.as_str() {
                "Target" => target = Some(parse_target(Some(child))?),
                "Rule" => children.push(self.lower_rule(child)?),
                other => {
                    return Err(LoadError::parsing(format!(
                        "unexpected element <{other}> in <Policy> '{name}'"
                    )));
                }
            }
        }

        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            name,
            target: target.unwrap_or_default(),
            kind: NodeKind::Policy { algorithm, children },
        });
        Ok(id)
    }

    fn lower_policy_set(&mut self, element: &XmlElement) -> Result<NodeId, LoadError> {
        let name = element
            .attrs
            .get("name")
            .cloned()
            .unwrap_or_else(|| "unnamed-policy-set".to_string());
        let algorithm = parse_algorithm(
            element.attrs.get("algorithm").ok_or_else(|| {
                LoadError::parsing(format!("<PolicySet> '{name}' missing 'algorithm'"))
            })?,
        )?;

        let mut target = None;
        let mut children = Vec::new();
        for child in &element.children {
            match child.name.as_str() {
                "Target" => target = Some(parse_target(Some(child))?),
                "Policy" => children.push(self.lower_policy(child)?),
                "PolicySet" => children.push(self.lower_policy_set(child)?),
                other => {
                    return Err(LoadError::parsing(format!(
                        "unexpected element <{other}> in <PolicySet> '{name}'"
                    )));
                }
            }
        }

        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            name,
            target: target.unwrap_or_default(),
            kind: NodeKind::PolicySet { algorithm, children },
        });
        Ok(id)
    }
}

/// Parses a policy document's text into a validated [`PolicyTree`].
///
/// # Errors
///
/// Returns `LoadError::Parsing` for malformed XML, an unrecognized element,
/// a missing required attribute, or an unknown algorithm/effect/operator name.
pub fn parse_policy_document(document: &str) -> Result<PolicyTree, LoadError> {
    let root_element = parse_xml(document)?;
    let mut lowering = Lowering { nodes: Vec::new() };
    let root_id = match root_element.name.as_str() {
        "PolicySet" => lowering.lower_policy_set(&root_element)?,
        "Policy" => lowering.lower_policy(&root_element)?,
        other => {
            return Err(LoadError::parsing(format!(
                "document root must be <PolicySet> or <Policy>, found <{other}>"
            )));
        }
    };
    PolicyTree::build(lowering.nodes, root_id)
        .map_err(|e| LoadError::parsing(format!("invalid tree structure: {e}")))
}

/// Owns the currently-published [`PolicyTree`] and performs atomic,
/// rollback-on-failure reloads from a file path.
///
/// Readers obtain the current tree through [`PolicyLoader::current`] without
/// ever locking — `ArcSwap::load` is a wait-free pointer read. A failed parse
/// leaves the previously-published tree untouched.
pub struct PolicyLoader {
    current: ArcSwap<PolicyTree>,
    path: RwLock<Option<PathBuf>>,
}

impl PolicyLoader {
    /// Loads the initial tree from `path`. There is no "empty" tree state:
    /// an evaluator always has a tree to evaluate against once constructed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, LoadError> {
        let document = std::fs::read_to_string(path)
            .map_err(|e| LoadError::file(format!("{}: {e}", path.display())))?;
        let tree = parse_policy_document(&document)?;
        Ok(Self {
            current: ArcSwap::new(Arc::new(tree)),
            path: RwLock::new(Some(path.to_path_buf())),
        })
    }

    /// Builds a loader from an already-parsed tree with no backing file, for
    /// tests and callers that construct policy trees in-process.
    #[must_use]
    pub fn from_tree(tree: PolicyTree) -> Self {
        Self {
            current: ArcSwap::new(Arc::new(tree)),
            path: RwLock::new(None),
        }
    }

    #[must_use]
    pub fn current(&self) -> Arc<PolicyTree> {
        self.current.load_full()
    }

    /// The path the currently-published tree was last loaded from, or an
    /// empty string if it was constructed in-process (no backing file).
    #[must_use]
    pub fn current_policy_path(&self) -> String {
        self.path
            .read()
            .expect("policy path lock poisoned")
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default()
    }

    /// Parses `path` and atomically publishes the result.
    ///
    /// On success the old tree's `Arc` is simply dropped once the last
    /// reader releases it (no explicit cleanup needed). On failure the
    /// previously-published tree is left exactly as it was — the parse and
    /// validation both happen before any swap is attempted.
    pub fn update_policy(&self, path: &std::path::Path) -> Result<(), LoadError> {
        let document = std::fs::read_to_string(path)
            .map_err(|e| LoadError::file(format!("{}: {e}", path.display())))?;
        let tree = parse_policy_document(&document)?;
        self.current.store(Arc::new(tree));
        *self.path.write().expect("policy path lock poisoned") = Some(path.to_path_buf());
        Ok(())
    }
}
