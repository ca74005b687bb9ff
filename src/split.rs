//! Request splitting
//!
//! Large queries are cut into fetch tasks so that no single request exceeds
//! the configured request size or value count. Entity ids are costed at a
//! fixed [`ENTITY_ID_SIZE`]; attributes at the length of their path.
//!
//! - Entity batches are balanced: the batch count is the minimum needed and
//!   ids are spread evenly across batches.
//! - Attribute batches are greedy by accumulated path length.
//! - Every batch holds at least one item, even when a single item is larger
//!   than the limit.

use crate::attribute::AttributeDefinition;

/// Cost of one entity id in a request.
pub const ENTITY_ID_SIZE: usize = 50;

/// One fetch task: an entity batch paired with an attribute batch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSplit<T> {
    /// Entities of the task
    pub entities: Vec<T>,
    /// Attributes of the task
    pub attributes: Vec<AttributeDefinition>,
}

fn balanced<T: Clone>(items: &[T], max_per_batch: usize) -> Vec<Vec<T>> {
    if items.is_empty() {
        return Vec::new();
    }
    let max_per_batch = max_per_batch.max(1);
    let batches = items.len().div_ceil(max_per_batch);
    let chunk = items.len().div_ceil(batches);
    items.chunks(chunk).map(<[T]>::to_vec).collect()
}

/// Split entity ids into balanced batches fitting `max_request_size`.
///
/// ```rust
/// use trueno_fetch::split::split_entities;
///
/// let ids: Vec<u32> = (0..7).collect();
/// let sizes: Vec<usize> = split_entities(&ids, 150).iter().map(Vec::len).collect();
/// assert_eq!(sizes, vec![3, 3, 1]);
/// ```
#[must_use]
pub fn split_entities<T: Clone>(ids: &[T], max_request_size: usize) -> Vec<Vec<T>> {
    balanced(ids, max_request_size / ENTITY_ID_SIZE)
}

fn greedy(
    attributes: &[AttributeDefinition],
    max_size: usize,
    max_count: usize,
) -> Vec<Vec<AttributeDefinition>> {
    let mut batches = Vec::new();
    let mut current: Vec<AttributeDefinition> = Vec::new();
    let mut size = 0usize;

    for attribute in attributes {
        let len = attribute.path().len();
        if !current.is_empty() && (size + len > max_size || current.len() >= max_count) {
            batches.push(std::mem::take(&mut current));
            size = 0;
        }
        size += len;
        current.push(attribute.clone());
    }
    if !current.is_empty() {
        batches.push(current);
    }
    batches
}

/// Split attributes greedily by accumulated path length.
#[must_use]
pub fn split_attributes(
    attributes: &[AttributeDefinition],
    max_request_size: usize,
) -> Vec<Vec<AttributeDefinition>> {
    greedy(attributes, max_request_size, usize::MAX)
}

/// Split an entities × attributes query into fetch tasks.
///
/// Attribute batches leave room for one entity id and hold at most
/// `values_batch_size` attributes. Entities are then batched so that the
/// largest attribute batch still fits both limits. Tasks are ordered
/// entity batch first.
#[must_use]
pub fn split_tasks<T: Clone>(
    entities: &[T],
    attributes: &[AttributeDefinition],
    max_request_size: usize,
    values_batch_size: usize,
) -> Vec<TaskSplit<T>> {
    if entities.is_empty() || attributes.is_empty() {
        return Vec::new();
    }
    let values_batch_size = values_batch_size.max(1);
    let attribute_batches = greedy(
        attributes,
        max_request_size.saturating_sub(ENTITY_ID_SIZE),
        values_batch_size,
    );

    let largest_size = attribute_batches
        .iter()
        .map(|b| b.iter().map(|a| a.path().len()).sum::<usize>())
        .max()
        .unwrap_or(0);
    let largest_count = attribute_batches.iter().map(Vec::len).max().unwrap_or(1);

    let by_size = max_request_size.saturating_sub(largest_size) / ENTITY_ID_SIZE;
    let by_count = values_batch_size / largest_count;
    let entity_batches = balanced(entities, by_size.min(by_count));

    entity_batches
        .iter()
        .flat_map(|batch| {
            attribute_batches.iter().map(move |attrs| TaskSplit {
                entities: batch.clone(),
                attributes: attrs.clone(),
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attribute::AttributeType;

    const NAME_LEN: usize = 17;

    fn attrs(n: usize) -> Vec<AttributeDefinition> {
        (0..n)
            .map(|i| AttributeDefinition::new(format!("config/param_{i:04}"), AttributeType::Float))
            .collect()
    }

    fn ids(n: usize) -> Vec<usize> {
        (0..n).collect()
    }

    fn sizes<T>(batches: &[Vec<T>]) -> Vec<usize> {
        batches.iter().map(Vec::len).collect()
    }

    fn shape(tasks: &[TaskSplit<usize>]) -> Vec<(usize, usize)> {
        tasks
            .iter()
            .map(|t| (t.entities.len(), t.attributes.len()))
            .collect()
    }

    #[test]
    fn test_fixture_name_length() {
        assert!(attrs(3).iter().all(|a| a.path().len() == NAME_LEN));
    }

    #[test]
    fn test_split_entities_balanced() {
        assert_eq!(sizes(&split_entities(&ids(9), 149)), vec![2, 2, 2, 2, 1]);
        assert_eq!(sizes(&split_entities(&ids(9), 200)), vec![3, 3, 3]);
        assert_eq!(sizes(&split_entities(&ids(7), 150)), vec![3, 3, 1]);
        assert_eq!(sizes(&split_entities(&ids(10), 10_000)), vec![10]);
    }

    #[test]
    fn test_split_entities_at_least_one_per_batch() {
        assert_eq!(sizes(&split_entities(&ids(2), 0)), vec![1, 1]);
        assert!(split_entities::<usize>(&[], 100).is_empty());
    }

    #[test]
    fn test_split_attributes_greedy() {
        assert_eq!(sizes(&split_attributes(&attrs(9), NAME_LEN * 4)), vec![4, 4, 1]);
        assert_eq!(
            sizes(&split_attributes(&attrs(9), NAME_LEN * 3 - 1)),
            vec![2, 2, 2, 2, 1]
        );
        assert_eq!(sizes(&split_attributes(&attrs(2), 0)), vec![1, 1]);
        assert!(split_attributes(&[], 100).is_empty());
    }

    #[test]
    fn test_split_tasks_by_value_count() {
        assert_eq!(shape(&split_tasks(&ids(1), &attrs(1), 500, 1)), vec![(1, 1)]);
        assert_eq!(
            shape(&split_tasks(&ids(2), &attrs(3), 500, 2)),
            vec![(1, 2), (1, 1), (1, 2), (1, 1)]
        );
        assert_eq!(
            shape(&split_tasks(&ids(2), &attrs(3), 500, 3)),
            vec![(1, 3), (1, 3)]
        );
        assert_eq!(shape(&split_tasks(&ids(2), &attrs(3), 500, 6)), vec![(2, 3)]);
        assert_eq!(
            shape(&split_tasks(&ids(3), &attrs(3), 500, 6)),
            vec![(2, 3), (1, 3)]
        );
    }

    #[test]
    fn test_split_tasks_by_request_size() {
        let size = ENTITY_ID_SIZE + 2 * NAME_LEN;
        assert_eq!(
            shape(&split_tasks(&ids(2), &attrs(3), size, 500)),
            vec![(1, 2), (1, 1), (1, 2), (1, 1)]
        );
        let size = ENTITY_ID_SIZE + 3 * NAME_LEN;
        assert_eq!(
            shape(&split_tasks(&ids(2), &attrs(3), size, 500)),
            vec![(1, 3), (1, 3)]
        );
        let size = 2 * ENTITY_ID_SIZE + 3 * NAME_LEN;
        assert_eq!(shape(&split_tasks(&ids(2), &attrs(3), size, 500)), vec![(2, 3)]);
    }

    #[test]
    fn test_split_tasks_tiny_limit() {
        assert_eq!(shape(&split_tasks(&ids(2), &attrs(3), 1, 500)), vec![(1, 1); 6]);
    }

    #[test]
    fn test_split_tasks_empty() {
        assert!(split_tasks::<usize>(&[], &attrs(3), 500, 10).is_empty());
        assert!(split_tasks(&ids(3), &[], 500, 10).is_empty());
    }
}
