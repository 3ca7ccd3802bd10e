//! Resolved attribute bags and the canonical fingerprint used to key the verdict cache.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::attribute::Attribute;

/// The full set of attributes a [`crate::pip::PolicyInformationPoint`] resolved for one request.
///
/// Stored as a sorted map keyed by attribute id so that [`AttributeSet::fingerprint`]
/// is deterministic regardless of resolution order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AttributeSet {
    attributes: BTreeMap<String, Attribute>,
}

impl AttributeSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.id.clone(), attribute);
    }

    #[must_use]
    pub fn get(&self, id: &str) -> Option<&Attribute> {
        self.attributes.get(id)
    }

    #[must_use]
    pub fn contains(&self, id: &str) -> bool {
        self.attributes.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Attribute> {
        self.attributes.values()
    }

    /// A canonical string key identifying this exact attribute set.
    ///
    /// Built from the sorted `(id, undetermined, sorted-values)` tuples so
    /// that two `AttributeSet`s with the same content always produce the same
    /// fingerprint, and two sets differing in even one resolved value never
    /// collide. The full canonical string is stored as the cache key rather
    /// than a digest, ruling out hash collisions entirely.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut parts = Vec::with_capacity(self.attributes.len());
        for attr in self.attributes.values() {
            if attr.undetermined {
                parts.push(format!("{}=?", attr.id));
                continue;
            }
            let mut values: Vec<String> = attr.values.iter().map(|v| v.to_string()).collect();
            values.sort_unstable();
            parts.push(format!("{}=[{}]", attr.id, values.join(",")));
        }
        parts.join("|")
    }
}

impl FromIterator<Attribute> for AttributeSet {
    fn from_iter<T: IntoIterator<Item = Attribute>>(iter: T) -> Self {
        let mut set = Self::new();
        for attr in iter {
            set.insert(attr);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeValue;

    #[test]
    fn fingerprint_is_order_independent() {
        let a = AttributeSet::from_iter([
            Attribute::new("subject.id", vec![AttributeValue::String("w1".into())]),
            Attribute::new("resource.id", vec![AttributeValue::String("camera".into())]),
        ]);
        let b = AttributeSet::from_iter([
            Attribute::new("resource.id", vec![AttributeValue::String("camera".into())]),
            Attribute::new("subject.id", vec![AttributeValue::String("w1".into())]),
        ]);
        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_distinguishes_undetermined_from_empty_bag() {
        let a = AttributeSet::from_iter([Attribute::undetermined("subject.id")]);
        let b = AttributeSet::from_iter([Attribute::new("subject.id", vec![])]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn fingerprint_changes_with_content() {
        let a = AttributeSet::from_iter([Attribute::new(
            "subject.id",
            vec![AttributeValue::String("w1".into())],
        )]);
        let b = AttributeSet::from_iter([Attribute::new(
            "subject.id",
            vec![AttributeValue::String("w2".into())],
        )]);
        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
