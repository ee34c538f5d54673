//! Nesting policy: the external rule table that decides which component
//! types may be placed inside which.

use blocks_model::ComponentRecord;
use serde::{Deserialize, Serialize};

/// Answer from a [`NestingPolicy`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NestingDecision {
    pub allowed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl NestingDecision {
    pub fn allow() -> Self {
        Self {
            allowed: true,
            reason: None,
            code: None,
        }
    }

    pub fn deny(reason: impl Into<String>) -> Self {
        Self {
            allowed: false,
            reason: Some(reason.into()),
            code: None,
        }
    }

    #[must_use]
    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }
}

/// Decides whether a child may be placed under a parent.
///
/// The store consults the policy during validation whenever a candidate
/// record has a parent, and for depth when the policy tracks it itself.
pub trait NestingPolicy: Send + Sync {
    fn can_nest(
        &self,
        parent: &ComponentRecord,
        child_type: &str,
        child_component: &str,
    ) -> NestingDecision;

    /// Authoritative depth for `id`, if the policy knows it.
    fn component_depth(&self, _id: &str) -> Option<usize> {
        None
    }
}

impl<F> NestingPolicy for F
where
    F: Fn(&ComponentRecord, &str, &str) -> NestingDecision + Send + Sync,
{
    fn can_nest(
        &self,
        parent: &ComponentRecord,
        child_type: &str,
        child_component: &str,
    ) -> NestingDecision {
        self(parent, child_type, child_component)
    }
}
