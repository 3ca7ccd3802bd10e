//! The Policy Information Point contract: resolving a request and a set of
//! attribute ids into concrete attribute values.

use async_trait::async_trait;

use crate::attribute::Attribute;
use crate::attribute_set::AttributeSet;
use crate::error::AceError;
use crate::request::Request;

/// Resolves attribute values for a request.
///
/// Implementations look up subject/resource/environment facts from whatever
/// backs them (a session store, a device registry, the clock) and return one
/// [`Attribute`] per requested id. A PIP that cannot resolve an id returns
/// `Attribute::undetermined(id)` for it rather than omitting it or erroring —
/// resolution failures are data (`UNDETERMINED` downstream), not exceptions,
/// except when the lookup itself is broken (see `resolve`'s error contract).
#[async_trait]
pub trait PolicyInformationPoint: Send + Sync {
    /// Resolves every id in `attribute_ids` against `request`.
    ///
    /// # Errors
    ///
    /// Returns `AceError::Resolution` only when the attribute *source itself*
    /// is unavailable (e.g. a backing store is down) — this is what the
    /// evaluator folds to `Effect::Undetermined` for the affected node,
    /// whereas a merely-unknown attribute id should resolve to
    /// `Attribute::undetermined` rather than err.
    async fn resolve(
        &self,
        request: &Request,
        attribute_ids: &[String],
    ) -> Result<AttributeSet, AceError>;
}

/// A `PolicyInformationPoint` backed by a fixed table of attribute values,
/// useful for tests and for the `ace-cli evaluate` fixture format.
#[derive(Debug, Clone, Default)]
pub struct StaticPip {
    attributes: std::collections::BTreeMap<String, Attribute>,
}

impl StaticPip {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, attribute: Attribute) {
        self.attributes.insert(attribute.id.clone(), attribute);
    }
}

#[async_trait]
impl PolicyInformationPoint for StaticPip {
    async fn resolve(
        &self,
        _request: &Request,
        attribute_ids: &[String],
    ) -> Result<AttributeSet, AceError> {
        let mut set = AttributeSet::new();
        for id in attribute_ids {
            let attr = self
                .attributes
                .get(id)
                .cloned()
                .unwrap_or_else(|| Attribute::undetermined(id.clone()));
            set.insert(attr);
        }
        Ok(set)
    }
}
