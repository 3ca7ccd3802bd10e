//! The external request shape callers submit to the evaluator.

use serde::{Deserialize, Serialize};

/// A request asking whether `subject` may invoke `function` on `resource`.
///
/// `parameters` carries call-site arguments a condition may need to match
/// against (e.g. a requested camera resolution) without promoting them to
/// first-class attribute ids resolvable by a [`crate::pip::PolicyInformationPoint`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Request {
    pub subject: String,
    pub resource: String,
    pub function: String,
    #[serde(default)]
    pub parameters: std::collections::BTreeMap<String, String>,
}

impl Request {
    #[must_use]
    pub fn new(
        subject: impl Into<String>,
        resource: impl Into<String>,
        function: impl Into<String>,
    ) -> Self {
        Self {
            subject: subject.into(),
            resource: resource.into(),
            function: function.into(),
            parameters: std::collections::BTreeMap::new(),
        }
    }

    #[must_use]
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builder_sets_fields() {
        let req = Request::new("widget://w1", "device-cap://camera", "capture")
            .with_parameter("resolution", "1080p");
        assert_eq!(req.subject, "widget://w1");
        assert_eq!(req.parameters.get("resolution").map(String::as_str), Some("1080p"));
    }
}
