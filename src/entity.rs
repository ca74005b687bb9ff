//! Entities - experiments (identified by name) and runs (identified by id)

use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of tracked entity a query targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
    /// Experiment, labelled by `sys/name`
    Experiment,
    /// Run, labelled by `sys/custom_run_id`
    Run,
}

impl EntityKind {
    /// Attribute holding the entity's user-facing label.
    #[must_use]
    pub const fn label_attribute(self) -> &'static str {
        match self {
            Self::Experiment => "sys/name",
            Self::Run => "sys/custom_run_id",
        }
    }

    /// Name of the index column in output tables.
    #[must_use]
    pub const fn index_name(self) -> &'static str {
        match self {
            Self::Experiment => "experiment",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.index_name())
    }
}

/// Service-assigned entity identifier (`sys/id`).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityId(String);

impl EntityId {
    /// Wrap a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Raw identifier.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for EntityId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// An entity matched by a search: its id plus its label.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EntityEntry {
    /// Service identifier
    pub id: EntityId,
    /// User-facing label (experiment name or custom run id)
    pub label: String,
}

/// Sorted labels returned by `list_entities`, tagged with their kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityList {
    kind: EntityKind,
    labels: Vec<String>,
}

impl EntityList {
    /// Create a list; labels are sorted and de-duplicated.
    #[must_use]
    pub fn new(kind: EntityKind, mut labels: Vec<String>) -> Self {
        labels.sort();
        labels.dedup();
        Self { kind, labels }
    }

    /// Kind of the listed entities.
    #[must_use]
    pub const fn kind(&self) -> EntityKind {
        self.kind
    }

    /// Labels in ascending order.
    #[must_use]
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// Number of entities.
    #[must_use]
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entity_list_sorted_and_unique() {
        let list = EntityList::new(
            EntityKind::Run,
            vec!["b".to_string(), "a".to_string(), "b".to_string()],
        );
        assert_eq!(list.labels(), ["a", "b"]);
        assert_eq!(list.kind(), EntityKind::Run);
    }

    #[test]
    fn test_label_attribute_per_kind() {
        assert_eq!(EntityKind::Experiment.label_attribute(), "sys/name");
        assert_eq!(EntityKind::Run.label_attribute(), "sys/custom_run_id");
    }
}
