//! Candidate validation and whole-forest integrity checks.

use std::collections::HashSet;

use blocks_model::{ComponentRecord, ValidationCode, ValidationIssue, ValidationReport};

use crate::store::StateStore;

/// Blank `id`, `type` or `component` is an error.
pub(crate) fn check_required(record: &ComponentRecord, report: &mut ValidationReport) {
    let fields = [
        ("id", record.id.as_str()),
        ("type", record.component_type.as_str()),
        ("component", record.component.as_str()),
    ];
    for (field, value) in fields {
        if value.trim().is_empty() {
            report.push(
                ValidationIssue::error(
                    ValidationCode::MissingField,
                    format!("required field `{field}` is empty"),
                )
                .with_field(field)
                .with_component(&record.id),
            );
        }
    }
}

impl StateStore {
    /// Check `candidate` as the next version of `id` against the current
    /// forest. Nothing is modified.
    pub fn validate_state_change(&self, id: &str, candidate: &ComponentRecord) -> ValidationReport {
        let mut report = ValidationReport::for_component(id);
        check_required(candidate, &mut report);

        let mut seen: HashSet<&str> = HashSet::new();
        for child in &candidate.children {
            if !seen.insert(child) {
                report.push(
                    ValidationIssue::error(
                        ValidationCode::DuplicateChild,
                        format!("child `{child}` is listed more than once"),
                    )
                    .with_field("children")
                    .with_component(id),
                );
            } else if child == id {
                report.push(
                    ValidationIssue::error(
                        ValidationCode::CycleDetected,
                        format!("`{id}` lists itself as a child"),
                    )
                    .with_field("children")
                    .with_component(id),
                );
            } else if !self.records.contains_key(child) {
                report.push(
                    ValidationIssue::error(
                        ValidationCode::InvalidChild,
                        format!("child `{child}` does not exist"),
                    )
                    .with_field("children")
                    .with_component(id),
                );
            }
        }

        let threshold = self.options.child_warning_threshold;
        if candidate.children.len() > threshold {
            report.push(
                ValidationIssue::warning(
                    ValidationCode::LargeChildCount,
                    format!(
                        "{} children exceeds the recommended maximum of {threshold}",
                        candidate.children.len()
                    ),
                )
                .with_field("children")
                .with_component(id),
            );
        }

        if let Some(parent_id) = &candidate.parent {
            self.check_parent(id, parent_id, candidate, &mut report);
        }
        report
    }

    fn check_parent(
        &self,
        id: &str,
        parent_id: &str,
        candidate: &ComponentRecord,
        report: &mut ValidationReport,
    ) {
        if parent_id == id {
            report.push(
                ValidationIssue::error(
                    ValidationCode::CycleDetected,
                    format!("`{id}` cannot be its own parent"),
                )
                .with_field("parent")
                .with_component(id),
            );
            return;
        }
        let Some(parent) = self.records.get(parent_id) else {
            report.push(
                ValidationIssue::error(
                    ValidationCode::InvalidParent,
                    format!("parent `{parent_id}` does not exist"),
                )
                .with_field("parent")
                .with_component(id),
            );
            return;
        };
        if self.chain_reaches(parent_id, id) {
            report.push(
                ValidationIssue::error(
                    ValidationCode::CycleDetected,
                    format!("`{parent_id}` is nested inside `{id}`"),
                )
                .with_field("parent")
                .with_component(id),
            );
            return;
        }
        if let Some(policy) = &self.policy {
            let decision =
                policy.can_nest(parent, &candidate.component_type, &candidate.component);
            if !decision.allowed {
                let message = decision.reason.unwrap_or_else(|| {
                    format!(
                        "`{}` cannot be placed inside `{}`",
                        candidate.component, parent.component
                    )
                });
                report.push(
                    ValidationIssue::error(ValidationCode::NestingViolation, message)
                        .with_field("parent")
                        .with_component(id)
                        .with_policy_code(decision.code),
                );
            }
        }
    }

    /// Whether walking up from `start` (inclusive) reaches `target`.
    pub(crate) fn chain_reaches(&self, start: &str, target: &str) -> bool {
        let mut visited: HashSet<&str> = HashSet::new();
        let mut current = Some(start);
        while let Some(id) = current {
            if id == target {
                return true;
            }
            if !visited.insert(id) {
                return false;
            }
            current = self
                .records
                .get(id)
                .and_then(|record| record.parent.as_deref());
        }
        false
    }

    /// Scan the whole forest for broken links, cycles and missing fields.
    pub fn check_integrity(&self) -> ValidationReport {
        let mut report = ValidationReport::default();
        for record in self.records() {
            let id = record.id.as_str();
            check_required(record, &mut report);

            let mut seen: HashSet<&str> = HashSet::new();
            for child_id in &record.children {
                if !seen.insert(child_id) {
                    report.push(
                        ValidationIssue::error(
                            ValidationCode::DuplicateChild,
                            format!("`{id}` lists child `{child_id}` more than once"),
                        )
                        .with_component(id),
                    );
                    continue;
                }
                match self.records.get(child_id) {
                    None => report.push(
                        ValidationIssue::error(
                            ValidationCode::InvalidChild,
                            format!("`{id}` lists missing child `{child_id}`"),
                        )
                        .with_component(id),
                    ),
                    Some(child) if child.parent.as_deref() != Some(id) => {
                        let actual = match child.parent.as_deref() {
                            Some(parent) => format!("`{parent}`"),
                            None => "unset".to_string(),
                        };
                        report.push(
                            ValidationIssue::error(
                                ValidationCode::ParentMismatch,
                                format!("`{id}` lists `{child_id}` but its parent is {actual}"),
                            )
                            .with_component(id),
                        );
                    }
                    Some(_) => {}
                }
            }

            if let Some(parent_id) = record.parent.as_deref() {
                match self.records.get(parent_id) {
                    None => report.push(
                        ValidationIssue::error(
                            ValidationCode::InvalidParent,
                            format!("`{id}` points at missing parent `{parent_id}`"),
                        )
                        .with_component(id),
                    ),
                    Some(parent) if !parent.has_child(id) => report.push(
                        ValidationIssue::error(
                            ValidationCode::ParentMismatch,
                            format!("`{id}` points at `{parent_id}` which does not list it"),
                        )
                        .with_component(id),
                    ),
                    Some(_) => {}
                }
                if self.chain_reaches(parent_id, id) {
                    report.push(
                        ValidationIssue::error(
                            ValidationCode::CycleDetected,
                            format!("`{id}` is its own ancestor"),
                        )
                        .with_component(id),
                    );
                }
            }

            if record.children.len() > self.options.child_warning_threshold {
                report.push(
                    ValidationIssue::warning(
                        ValidationCode::LargeChildCount,
                        format!("`{id}` has {} children", record.children.len()),
                    )
                    .with_component(id),
                );
            }
        }
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::NestingDecision;
    use crate::{StateError, StoreOptions};
    use blocks_model::{ComponentInit, StatePatch};
    use std::sync::Arc;

    fn store_with(ids: &[&str]) -> StateStore {
        let mut store = StateStore::default();
        for id in ids {
            store
                .initialize_state(ComponentInit::new("layout", "Section").with_id(*id))
                .expect("init");
        }
        store
    }

    #[test]
    fn flags_duplicate_and_self_children() {
        let store = store_with(&["a", "b"]);
        let mut candidate = store.get_state("a").cloned().expect("a");
        candidate.children = vec!["b".into(), "b".into(), "a".into()];
        let report = store.validate_state_change("a", &candidate);
        assert!(report.has_code(ValidationCode::DuplicateChild));
        assert!(report.has_code(ValidationCode::CycleDetected));
    }

    #[test]
    fn flags_missing_parent_and_cycle() {
        let mut store = store_with(&["a", "b"]);
        store.add_child("a", "b").expect("add");

        let mut candidate = store.get_state("a").cloned().expect("a");
        candidate.parent = Some("b".into());
        let report = store.validate_state_change("a", &candidate);
        assert!(report.has_code(ValidationCode::CycleDetected));

        candidate.parent = Some("ghost".into());
        let report = store.validate_state_change("a", &candidate);
        assert!(report.has_code(ValidationCode::InvalidParent));
    }

    #[test]
    fn large_child_count_is_only_a_warning() {
        let mut store = StateStore::default()
            .with_options(StoreOptions::default().with_child_warning_threshold(1));
        for id in ["p", "a", "b"] {
            store
                .initialize_state(ComponentInit::new("layout", "Section").with_id(id))
                .expect("init");
        }
        store.add_child("p", "a").expect("add a");
        store.add_child("p", "b").expect("add b");
        let report = store.check_integrity();
        assert!(!report.has_errors());
        assert_eq!(report.warning_count(), 1);
    }

    #[test]
    fn policy_refusal_becomes_nesting_violation() {
        let policy = |parent: &ComponentRecord, _: &str, component: &str| {
            if parent.component == "Text" {
                NestingDecision::deny(format!("{component} cannot go inside Text"))
                    .with_code("LEAF")
            } else {
                NestingDecision::allow()
            }
        };
        let mut store = StateStore::default().with_policy(Arc::new(policy));
        store
            .initialize_state(ComponentInit::new("basic", "Text").with_id("t"))
            .expect("init");
        store
            .initialize_state(ComponentInit::new("layout", "Section").with_id("s"))
            .expect("init");

        let err = store.add_child("t", "s").unwrap_err();
        let StateError::ValidationFailed(report) = err else {
            panic!("expected validation failure");
        };
        let issue = report.errors().next().expect("issue");
        assert_eq!(issue.code, ValidationCode::NestingViolation);
        assert_eq!(issue.policy_code.as_deref(), Some("LEAF"));
        assert_eq!(store.get_state("s").and_then(|s| s.parent.clone()), None);
        assert!(store.get_state("t").expect("t").children.is_empty());
    }

    #[test]
    fn integrity_reports_broken_links() {
        let mut store = store_with(&["a", "b"]);
        store
            .set_state("b", StatePatch::new().parent(Some("a".into())), false)
            .expect("set");
        let report = store.check_integrity();
        assert!(report.has_code(ValidationCode::ParentMismatch));
    }
}
