//! Error types for policy evaluation, attribute resolution, and storage.

/// Errors that can occur while evaluating a request or administering the engine.
///
/// `Resolution`/`Storage` failures during evaluation are folded into
/// `Effect::Undetermined`/`Effect::Error` by the evaluator rather than
/// aborting the call — `AceError` is what those internal failures look like
/// before that folding happens, and what `PolicyEvaluator::update_policy`
/// and storage backends return directly.
#[derive(Debug, thiserror::Error)]
pub enum AceError {
    /// The request or a policy literal was malformed.
    #[error("invalid input: {message}")]
    Input { message: String },

    /// The policy information point failed to resolve an attribute.
    #[error("attribute resolution failed for '{attribute}': {message}")]
    Resolution { attribute: String, message: String },

    /// The verdict cache or settings store failed.
    #[error("storage error: {message}")]
    Storage { message: String },

    /// An invariant the engine depends on was violated.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl AceError {
    #[must_use]
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn resolution(attribute: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Resolution {
            attribute: attribute.into(),
            message: message.into(),
        }
    }

    #[must_use]
    pub fn storage(message: impl Into<String>) -> Self {
        Self::Storage {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns the error category for logging and metrics.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::Input { .. } => ErrorCategory::Input,
            Self::Resolution { .. } => ErrorCategory::Resolution,
            Self::Storage { .. } => ErrorCategory::Storage,
            Self::Internal { .. } => ErrorCategory::Internal,
        }
    }

    /// `true` for failures the condition algebra should fold to `UNDETERMINED`
    /// rather than a hard `Error` effect (resolution gaps are expected and
    /// recoverable; storage/internal failures are not).
    #[must_use]
    pub fn is_resolution_failure(&self) -> bool {
        matches!(self, Self::Resolution { .. })
    }
}

/// Errors specific to loading and validating a policy document.
///
/// Kept separate from [`AceError`] because `update_policy` is the one entry
/// point the engine's failure semantics single out as allowed to surface a
/// typed parse/IO error instead of folding into `UNDETERMINED`/`DENY`.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("failed to read policy file: {message}")]
    File { message: String },

    #[error("failed to parse policy document: {message}")]
    Parsing { message: String },
}

impl LoadError {
    #[must_use]
    pub fn file(message: impl Into<String>) -> Self {
        Self::File {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn parsing(message: impl Into<String>) -> Self {
        Self::Parsing {
            message: message.into(),
        }
    }
}

/// Categories of engine errors, used for logging and monitoring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    Input,
    Resolution,
    Storage,
    Internal,
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Input => "input",
            Self::Resolution => "resolution",
            Self::Storage => "storage",
            Self::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display() {
        let err = AceError::input("malformed request");
        assert_eq!(err.to_string(), "invalid input: malformed request");

        let err = AceError::resolution("subject.id", "pip timeout");
        assert_eq!(
            err.to_string(),
            "attribute resolution failed for 'subject.id': pip timeout"
        );
    }

    #[test]
    fn category_mapping() {
        assert_eq!(AceError::input("x").category(), ErrorCategory::Input);
        assert_eq!(
            AceError::resolution("a", "x").category(),
            ErrorCategory::Resolution
        );
        assert_eq!(AceError::storage("x").category(), ErrorCategory::Storage);
        assert_eq!(AceError::internal("x").category(), ErrorCategory::Internal);
    }

    #[test]
    fn only_resolution_errors_are_resolution_failures() {
        assert!(AceError::resolution("a", "x").is_resolution_failure());
        assert!(!AceError::storage("x").is_resolution_failure());
    }

    #[test]
    fn load_error_display() {
        let err = LoadError::parsing("unexpected element <Foo>");
        assert_eq!(
            err.to_string(),
            "failed to parse policy document: unexpected element <Foo>"
        );
    }
}
