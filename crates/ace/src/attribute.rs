//! Attributes and the three-valued match algebra.

use std::collections::HashMap;
use std::sync::RwLock;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::AceError;

/// A single named value carried by a request, a PIP resolution, or a target/condition literal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttributeValue {
    String(String),
    Bool(bool),
    Int(i64),
}

impl AttributeValue {
    fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }
}

impl std::fmt::Display for AttributeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::String(s) => write!(f, "{s}"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
        }
    }
}

/// An attribute identity: namespace-qualified name plus its resolved value bag.
///
/// An unresolved attribute (PIP could not produce a value) is represented by
/// an empty `values` bag with `undetermined = true`, per the bag/undetermined
/// distinction `AttributeSet` relies on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attribute {
    pub id: String,
    pub values: Vec<AttributeValue>,
    pub undetermined: bool,
}

impl Attribute {
    #[must_use]
    pub fn new(id: impl Into<String>, values: Vec<AttributeValue>) -> Self {
        Self {
            id: id.into(),
            values,
            undetermined: false,
        }
    }

    #[must_use]
    pub fn undetermined(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            values: Vec::new(),
            undetermined: true,
        }
    }

    #[must_use]
    pub fn is_empty_bag(&self) -> bool {
        !self.undetermined && self.values.is_empty()
    }
}

/// How a literal is compared against a resolved attribute's value bag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MatchOperator {
    Equal,
    Glob,
    Regex,
}

/// A helper accessor pulling one RFC 3986 component out of a URI-valued
/// attribute before the match operator runs against it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UriAccessor {
    Scheme,
    Authority,
    Host,
    Path,
    SchemeAuthority,
}

/// Extracts a URI component from `uri`, or `None` if `uri` has no `scheme://`
/// separator.
///
/// Normalises per RFC 3986: the scheme is lowercased, percent-encoding is
/// preserved byte-for-byte, and hostnames are not IDN/punycode-normalised.
#[must_use]
pub fn uri_component(uri: &str, accessor: UriAccessor) -> Option<String> {
    let (scheme, rest) = uri.split_once("://")?;
    let scheme = scheme.to_ascii_lowercase();
    let (authority, path) = match rest.find('/') {
        Some(idx) => (&rest[..idx], &rest[idx..]),
        None => (rest, ""),
    };
    Some(match accessor {
        UriAccessor::Scheme => scheme,
        UriAccessor::Authority => authority.to_string(),
        UriAccessor::Host => {
            let host_port = authority.rsplit_once('@').map_or(authority, |(_, hp)| hp);
            if let Some(stripped) = host_port.strip_prefix('[') {
                stripped.split(']').next().unwrap_or(host_port).to_string()
            } else {
                host_port.split(':').next().unwrap_or(host_port).to_string()
            }
        }
        UriAccessor::Path => path.to_string(),
        UriAccessor::SchemeAuthority => format!("{scheme}://{authority}"),
    })
}

static GLOB_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));
static REGEX_CACHE: Lazy<RwLock<HashMap<String, Regex>>> =
    Lazy::new(|| RwLock::new(HashMap::new()));

fn glob_to_regex(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len() + 2);
    out.push('^');
    let mut literal = String::new();
    for c in pattern.chars() {
        match c {
            '*' | '?' => {
                if !literal.is_empty() {
                    out.push_str(&regex::escape(&literal));
                    literal.clear();
                }
                out.push_str(if c == '*' { ".*" } else { "." });
            }
            _ => literal.push(c),
        }
    }
    if !literal.is_empty() {
        out.push_str(&regex::escape(&literal));
    }
    out.push('$');
    out
}

fn cached_compile(cache: &Lazy<RwLock<HashMap<String, Regex>>>, pattern: &str) -> Option<Regex> {
    if let Some(re) = cache.read().ok()?.get(pattern) {
        return Some(re.clone());
    }
    let compiled = Regex::new(pattern).ok()?;
    cache
        .write()
        .ok()?
        .insert(pattern.to_string(), compiled.clone());
    Some(compiled)
}

/// Matches a literal against a single value using the given operator.
///
/// Returns `Ok(bool)` for a well-formed comparison. A malformed `Regex`
/// pattern is a hard error (surfaced by the caller as `UNDETERMINED`, not
/// silently treated as `false`), matching the condition algebra's "malformed
/// literal is an evaluation error" rule.
pub fn match_value(
    operator: &MatchOperator,
    literal: &str,
    value: &AttributeValue,
) -> Result<bool, AceError> {
    match operator {
        MatchOperator::Equal => Ok(value.as_str().map(|v| v == literal).unwrap_or_else(|| {
            value.to_string() == literal
        })),
        MatchOperator::Glob => {
            let pattern = glob_to_regex(literal);
            let re = cached_compile(&GLOB_CACHE, &pattern)
                .ok_or_else(|| AceError::input(format!("malformed glob pattern: {literal}")))?;
            Ok(re.is_match(&value.to_string()))
        }
        MatchOperator::Regex => {
            let anchored = if literal.starts_with('^') && literal.ends_with('$') {
                literal.to_string()
            } else {
                format!("^(?:{literal})$")
            };
            let re = cached_compile(&REGEX_CACHE, &anchored)
                .ok_or_else(|| AceError::input(format!("malformed regex pattern: {literal}")))?;
            Ok(re.is_match(&value.to_string()))
        }
    }
}
