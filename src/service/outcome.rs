use crate::entity::{join_violations, Violation};
use serde_json::Value;

/// Result of one engine call. Store failures are reported separately as `Err`.
#[derive(Clone, Debug, PartialEq)]
pub enum Outcome {
    /// `None` for calls with no body (delete).
    Success(Option<Value>),
    NotFound(String),
    /// Never empty.
    ValidationFailed(Vec<Violation>),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn payload(&self) -> Option<&Value> {
        match self {
            Outcome::Success(v) => v.as_ref(),
            _ => None,
        }
    }

    /// Human-readable failure message; violations are joined.
    pub fn message(&self) -> Option<String> {
        match self {
            Outcome::Success(_) => None,
            Outcome::NotFound(m) => Some(m.clone()),
            Outcome::ValidationFailed(v) => Some(join_violations(v)),
        }
    }
}
