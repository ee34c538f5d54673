//! Component records and the inputs that create or change them.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::ids::new_component_id;

/// Derived positional data, recomputed on every structural change.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComponentMetadata {
    /// Distance from the nearest ancestor that has no parent.
    pub depth: usize,
    /// Position within the parent's `children` (0 for roots).
    pub index: usize,
}

/// The state of a single component instance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentRecord {
    pub id: String,
    #[serde(rename = "type")]
    pub component_type: String,
    pub component: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default)]
    pub children: Vec<String>,
    #[serde(default)]
    pub parent: Option<String>,
    pub is_visible: bool,
    #[serde(default)]
    pub is_selected: bool,
    #[serde(default)]
    pub is_dragging: bool,
    #[serde(default)]
    pub has_error: bool,
    #[serde(default)]
    pub error_message: Option<String>,
    #[serde(default)]
    pub metadata: ComponentMetadata,
    pub created: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
}

impl ComponentRecord {
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    pub fn has_child(&self, id: &str) -> bool {
        self.children.iter().any(|child| child == id)
    }

    /// Stamp `last_modified`, never moving it backwards.
    pub fn touch(&mut self) {
        self.last_modified = self.last_modified.max(Utc::now());
    }

    /// Field-level differences between two versions of a record.
    ///
    /// Keys are the serialized (camelCase) field names. `lastModified` is
    /// excluded because every commit changes it.
    pub fn diff(previous: &ComponentRecord, next: &ComponentRecord) -> BTreeMap<String, FieldChange> {
        let before = to_object(previous);
        let after = to_object(next);
        let keys: BTreeSet<&String> = before.keys().chain(after.keys()).collect();

        let mut changes = BTreeMap::new();
        for key in keys {
            if key == "lastModified" {
                continue;
            }
            let from = before.get(key).cloned().unwrap_or(Value::Null);
            let to = after.get(key).cloned().unwrap_or(Value::Null);
            if from != to {
                changes.insert(key.clone(), FieldChange { from, to });
            }
        }
        changes
    }
}

fn to_object(record: &ComponentRecord) -> Map<String, Value> {
    match serde_json::to_value(record) {
        Ok(Value::Object(map)) => map,
        _ => Map::new(),
    }
}

/// One entry of a record diff.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldChange {
    pub from: Value,
    pub to: Value,
}

/// Input for creating a new record.
///
/// Parent and children are deliberately absent: attaching a record to the
/// forest is a separate operation.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComponentInit {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(rename = "type")]
    pub component_type: String,
    pub component: String,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(default)]
    pub subcategory: Option<String>,
    #[serde(default)]
    pub props: Map<String, Value>,
    #[serde(default)]
    pub hidden: bool,
}

impl ComponentInit {
    pub fn new(component_type: impl Into<String>, component: impl Into<String>) -> Self {
        Self {
            component_type: component_type.into(),
            component: component.into(),
            ..Self::default()
        }
    }

    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }

    pub fn with_subcategory(mut self, subcategory: impl Into<String>) -> Self {
        self.subcategory = Some(subcategory.into());
        self
    }

    pub fn with_prop(mut self, key: impl Into<String>, value: Value) -> Self {
        self.props.insert(key.into(), value);
        self
    }

    pub fn with_props(mut self, props: Map<String, Value>) -> Self {
        self.props = props;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    /// Build the record, assigning an id when none was supplied.
    pub fn into_record(self, now: DateTime<Utc>) -> ComponentRecord {
        ComponentRecord {
            id: self.id.unwrap_or_else(new_component_id),
            component_type: self.component_type,
            component: self.component,
            category: self.category,
            subcategory: self.subcategory,
            props: self.props,
            children: Vec::new(),
            parent: None,
            is_visible: !self.hidden,
            is_selected: false,
            is_dragging: false,
            has_error: false,
            error_message: None,
            metadata: ComponentMetadata::default(),
            created: now,
            last_modified: now,
        }
    }
}

/// A partial update. `None` leaves the field untouched.
///
/// `parent` and `error_message` are doubly optional so that a patch can
/// clear them: `Some(None)` sets the field to `None`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StatePatch {
    pub component_type: Option<String>,
    pub component: Option<String>,
    pub category: Option<String>,
    pub subcategory: Option<String>,
    pub props: Option<Map<String, Value>>,
    pub children: Option<Vec<String>>,
    pub parent: Option<Option<String>>,
    pub is_visible: Option<bool>,
    pub is_selected: Option<bool>,
    pub is_dragging: Option<bool>,
    pub has_error: Option<bool>,
    pub error_message: Option<Option<String>>,
}

impl StatePatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn props(mut self, props: Map<String, Value>) -> Self {
        self.props = Some(props);
        self
    }

    pub fn children(mut self, children: Vec<String>) -> Self {
        self.children = Some(children);
        self
    }

    pub fn parent(mut self, parent: Option<String>) -> Self {
        self.parent = Some(parent);
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.is_visible = Some(visible);
        self
    }

    pub fn selected(mut self, selected: bool) -> Self {
        self.is_selected = Some(selected);
        self
    }

    pub fn dragging(mut self, dragging: bool) -> Self {
        self.is_dragging = Some(dragging);
        self
    }

    /// Set or clear the error flag together with its message.
    pub fn error(mut self, message: Option<String>) -> Self {
        self.has_error = Some(message.is_some());
        self.error_message = Some(message);
        self
    }

    pub fn classification(
        mut self,
        component_type: impl Into<String>,
        component: impl Into<String>,
    ) -> Self {
        self.component_type = Some(component_type.into());
        self.component = Some(component.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    /// Merge this patch over `record`, returning the candidate record.
    ///
    /// Timestamps and metadata are left alone; the store stamps them on
    /// commit.
    pub fn apply_to(self, record: &ComponentRecord) -> ComponentRecord {
        let mut next = record.clone();
        if let Some(value) = self.component_type {
            next.component_type = value;
        }
        if let Some(value) = self.component {
            next.component = value;
        }
        if let Some(value) = self.category {
            next.category = Some(value);
        }
        if let Some(value) = self.subcategory {
            next.subcategory = Some(value);
        }
        if let Some(value) = self.props {
            next.props = value;
        }
        if let Some(value) = self.children {
            next.children = value;
        }
        if let Some(value) = self.parent {
            next.parent = value;
        }
        if let Some(value) = self.is_visible {
            next.is_visible = value;
        }
        if let Some(value) = self.is_selected {
            next.is_selected = value;
        }
        if let Some(value) = self.is_dragging {
            next.is_dragging = value;
        }
        if let Some(value) = self.has_error {
            next.has_error = value;
        }
        if let Some(value) = self.error_message {
            next.error_message = value;
        }
        next
    }
}
