use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IssueSeverity {
    Error,
    Warning,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ValidationCode {
    /// `id`, `type` or `component` is empty.
    MissingField,
    /// A `children` entry does not resolve to a record.
    InvalidChild,
    /// `parent` does not resolve to a record.
    InvalidParent,
    DuplicateChild,
    /// The parent chain would loop back onto the component.
    CycleDetected,
    /// The nesting policy refused the placement.
    NestingViolation,
    DuplicateId,
    /// Child count above the performance threshold.
    LargeChildCount,
    /// Parent and child disagree about their relationship.
    ParentMismatch,
}

impl ValidationCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingField => "missing-field",
            Self::InvalidChild => "invalid-child",
            Self::InvalidParent => "invalid-parent",
            Self::DuplicateChild => "duplicate-child",
            Self::CycleDetected => "cycle-detected",
            Self::NestingViolation => "nesting-violation",
            Self::DuplicateId => "duplicate-id",
            Self::LargeChildCount => "large-child-count",
            Self::ParentMismatch => "parent-mismatch",
        }
    }
}

/// An issue found while validating a state change or the whole forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationIssue {
    pub code: ValidationCode,
    pub severity: IssueSeverity,
    /// Human-readable message describing the issue.
    pub message: String,
    /// Record field the issue refers to (if applicable).
    pub field: Option<String>,
    pub component_id: Option<String>,
    /// Code reported by the nesting policy for `NestingViolation`.
    pub policy_code: Option<String>,
}

impl ValidationIssue {
    pub fn error(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            severity: IssueSeverity::Error,
            message: message.into(),
            field: None,
            component_id: None,
            policy_code: None,
        }
    }

    pub fn warning(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            severity: IssueSeverity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn with_field(mut self, field: impl Into<String>) -> Self {
        self.field = Some(field.into());
        self
    }

    pub fn with_component(mut self, id: impl Into<String>) -> Self {
        self.component_id = Some(id.into());
        self
    }

    pub fn with_policy_code(mut self, code: Option<String>) -> Self {
        self.policy_code = code;
        self
    }

    pub fn is_error(&self) -> bool {
        self.severity == IssueSeverity::Error
    }
}

/// Validation outcome for a single component (or the whole forest when
/// `component_id` is `None`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidationReport {
    pub component_id: Option<String>,
    pub issues: Vec<ValidationIssue>,
}

impl ValidationReport {
    pub fn for_component(id: impl Into<String>) -> Self {
        Self {
            component_id: Some(id.into()),
            issues: Vec::new(),
        }
    }

    pub fn push(&mut self, issue: ValidationIssue) {
        self.issues.push(issue);
    }

    pub fn extend(&mut self, other: ValidationReport) {
        self.issues.extend(other.issues);
    }

    pub fn error_count(&self) -> usize {
        self.issues.iter().filter(|issue| issue.is_error()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.issues
            .iter()
            .filter(|issue| issue.severity == IssueSeverity::Warning)
            .count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() > 0
    }

    pub fn errors(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| issue.is_error())
    }

    pub fn warnings(&self) -> impl Iterator<Item = &ValidationIssue> {
        self.issues.iter().filter(|issue| !issue.is_error())
    }

    pub fn has_code(&self, code: ValidationCode) -> bool {
        self.issues.iter().any(|issue| issue.code == code)
    }
}

impl std::fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let messages: Vec<&str> = self.errors().map(|issue| issue.message.as_str()).collect();
        if messages.is_empty() {
            write!(f, "no errors")
        } else {
            write!(f, "{}", messages.join("; "))
        }
    }
}
