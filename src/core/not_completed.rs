//! The failure marker threaded through every app.
//!
//! An app that cannot produce output returns a [`NotCompleted`] instead of
//! raising. Downstream apps pass it through untouched and writers persist it
//! to the store's not-completed log, so a batch never loses track of an input.

use crate::core::error::BioappError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Value of the `"type"` key in a marker's rich dict.
pub const RICH_DICT_TYPE: &str = "NotCompleted";

/// Result type returned by every app.
pub type AppResult<T> = Result<T, NotCompleted>;

/// Failure category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FailureCode {
    /// The step hit an error condition (bad input, I/O failure, parse error).
    Error,
    /// The input was valid but did not satisfy the step's criteria.
    Fail,
    /// The step detected an internal inconsistency.
    Bug,
}

impl fmt::Display for FailureCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FailureCode::Error => "ERROR",
            FailureCode::Fail => "FAIL",
            FailureCode::Bug => "BUG",
        };
        f.write_str(s)
    }
}

/// A recoverable failure, optionally caused by an upstream failure.
///
/// Equality ignores `caused_by`: two markers are equal when code, origin,
/// message and source agree.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename = "NotCompleted")]
pub struct NotCompleted {
    pub code: FailureCode,
    pub origin: String,
    pub message: String,
    pub source: Option<String>,
    pub caused_by: Option<Box<NotCompleted>>,
}

impl NotCompleted {
    pub fn new(code: FailureCode, origin: &str, message: impl fmt::Display) -> Self {
        Self {
            code,
            origin: origin.to_string(),
            message: message.to_string(),
            source: None,
            caused_by: None,
        }
    }

    pub fn error(origin: &str, message: impl fmt::Display) -> Self {
        Self::new(FailureCode::Error, origin, message)
    }

    pub fn fail(origin: &str, message: impl fmt::Display) -> Self {
        Self::new(FailureCode::Fail, origin, message)
    }

    pub fn with_source(mut self, source: Option<String>) -> Self {
        self.source = source;
        self
    }

    pub fn with_cause(mut self, cause: NotCompleted) -> Self {
        self.caused_by = Some(Box::new(cause));
        self
    }

    /// Depth of the causal chain, counting this marker.
    pub fn chain_len(&self) -> usize {
        let mut n = 1;
        let mut current = self.caused_by.as_deref();
        while let Some(cause) = current {
            n += 1;
            current = cause.caused_by.as_deref();
        }
        n
    }

    /// The innermost marker of the causal chain.
    pub fn root_cause(&self) -> &NotCompleted {
        let mut current = self;
        while let Some(cause) = current.caused_by.as_deref() {
            current = cause;
        }
        current
    }

    pub fn to_rich_dict(&self) -> Result<serde_json::Value, BioappError> {
        Ok(serde_json::to_value(self)?)
    }

    pub fn from_rich_dict(value: serde_json::Value) -> Result<Self, BioappError> {
        match value.get("type").and_then(|t| t.as_str()) {
            Some(RICH_DICT_TYPE) => Ok(serde_json::from_value(value)?),
            other => Err(BioappError::Validation(format!(
                "expected a {RICH_DICT_TYPE} record, got type {other:?}"
            ))),
        }
    }

    pub fn to_json(&self) -> Result<String, BioappError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(raw: &str) -> Result<Self, BioappError> {
        Self::from_rich_dict(serde_json::from_str(raw)?)
    }
}

impl PartialEq for NotCompleted {
    fn eq(&self, other: &Self) -> bool {
        self.code == other.code
            && self.origin == other.origin
            && self.message == other.message
            && self.source == other.source
    }
}

impl Eq for NotCompleted {}

impl fmt::Display for NotCompleted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "NotCompleted(type={}, origin={}, source={}, message={})",
            self.code,
            self.origin,
            self.source.as_deref().unwrap_or("None"),
            self.message
        )
    }
}

impl std::error::Error for NotCompleted {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rich_dict_shape() {
        let nc = NotCompleted::error("load_aligned", "bad input").with_source(Some("x.fa".into()));
        let dict = nc.to_rich_dict().unwrap();
        assert_eq!(dict["type"], "NotCompleted");
        assert_eq!(dict["code"], "ERROR");
        assert_eq!(dict["origin"], "load_aligned");
        assert_eq!(dict["source"], "x.fa");
        assert!(dict["caused_by"].is_null());
    }

    #[test]
    fn test_equality_ignores_cause() {
        let a = NotCompleted::fail("app", "msg");
        let b = NotCompleted::fail("app", "msg").with_cause(NotCompleted::error("up", "x"));
        assert_eq!(a, b);
        assert_ne!(a, NotCompleted::error("app", "msg"));
    }

    #[test]
    fn test_chain_helpers() {
        let root = NotCompleted::error("reader", "missing");
        let nc = NotCompleted::error("writer", "upstream failed")
            .with_cause(NotCompleted::fail("aligner", "too short").with_cause(root.clone()));
        assert_eq!(nc.chain_len(), 3);
        assert_eq!(nc.root_cause(), &root);
    }

    #[test]
    fn test_wrong_type_tag_is_rejected() {
        let value = serde_json::json!({
            "type": "Table", "code": "ERROR", "origin": "o", "message": "m",
            "source": null, "caused_by": null
        });
        assert!(NotCompleted::from_rich_dict(value).is_err());
    }

    #[test]
    fn test_display() {
        let nc = NotCompleted::error("app", "boom");
        assert_eq!(
            nc.to_string(),
            "NotCompleted(type=ERROR, origin=app, source=None, message=boom)"
        );
    }
}
