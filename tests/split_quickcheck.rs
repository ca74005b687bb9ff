//! Request splitting properties (quickcheck)
//!
//! Batches must partition their input in order, never be empty, and stay
//! within the configured limits unless a single item alone exceeds them.

use quickcheck::{quickcheck, TestResult};

use trueno_fetch::attribute::{AttributeDefinition, AttributeType};
use trueno_fetch::split::{split_attributes, split_entities, split_tasks, ENTITY_ID_SIZE};

fn definitions(lengths: &[u8]) -> Vec<AttributeDefinition> {
    lengths
        .iter()
        .enumerate()
        .map(|(i, len)| {
            let path = format!("a{i}/{}", "x".repeat(usize::from(*len % 40)));
            AttributeDefinition::new(path, AttributeType::Float)
        })
        .collect()
}

fn batch_size(batch: &[AttributeDefinition]) -> usize {
    batch.iter().map(|a| a.path().len()).sum()
}

quickcheck! {
    fn entity_batches_partition_input(count: u8, limit: u16) -> bool {
        let ids: Vec<u32> = (0..u32::from(count)).collect();
        let batches = split_entities(&ids, usize::from(limit));
        batches.concat() == ids && batches.iter().all(|b| !b.is_empty())
    }

    fn entity_batches_are_balanced(count: u8, limit: u16) -> TestResult {
        if count == 0 {
            return TestResult::discard();
        }
        let ids: Vec<u32> = (0..u32::from(count)).collect();
        let per_batch = (usize::from(limit) / ENTITY_ID_SIZE).max(1);
        let batches = split_entities(&ids, usize::from(limit));

        let chunk = batches[0].len();
        let (last, rest) = batches.split_last().unwrap();
        TestResult::from_bool(
            chunk <= per_batch
                && rest.iter().all(|b| b.len() == chunk)
                && last.len() <= chunk
                && batches.len() <= ids.len().div_ceil(per_batch),
        )
    }

    fn attribute_batches_respect_size(lengths: Vec<u8>, limit: u16) -> bool {
        let attrs = definitions(&lengths);
        let batches = split_attributes(&attrs, usize::from(limit));
        batches.concat() == attrs
            && batches
                .iter()
                .all(|b| !b.is_empty() && (b.len() == 1 || batch_size(b) <= usize::from(limit)))
    }

    fn tasks_cover_every_pair_once(count: u8, lengths: Vec<u8>, limit: u16, values: u16) -> TestResult {
        if count > 40 || lengths.len() > 40 {
            return TestResult::discard();
        }
        let ids: Vec<u32> = (0..u32::from(count)).collect();
        let attrs = definitions(&lengths);
        let tasks = split_tasks(&ids, &attrs, usize::from(limit), usize::from(values));

        let mut covered: Vec<(u32, String)> = tasks
            .iter()
            .flat_map(|t| {
                t.entities
                    .iter()
                    .flat_map(move |e| t.attributes.iter().map(move |a| (*e, a.path().to_string())))
            })
            .collect();
        covered.sort();

        let mut expected: Vec<(u32, String)> = ids
            .iter()
            .flat_map(|e| attrs.iter().map(move |a| (*e, a.path().to_string())))
            .collect();
        expected.sort();

        TestResult::from_bool(covered == expected)
    }

    fn tasks_respect_value_count(count: u8, lengths: Vec<u8>, limit: u16, values: u16) -> TestResult {
        if count > 40 || lengths.len() > 40 {
            return TestResult::discard();
        }
        let ids: Vec<u32> = (0..u32::from(count)).collect();
        let attrs = definitions(&lengths);
        let max_values = usize::from(values).max(1);
        let max_size = usize::from(limit);
        let tasks = split_tasks(&ids, &attrs, max_size, usize::from(values));

        TestResult::from_bool(tasks.iter().all(|t| {
            let within_count = t.entities.len() * t.attributes.len() <= max_values;
            let request = t.entities.len() * ENTITY_ID_SIZE + batch_size(&t.attributes);
            let within_size = t.entities.len() == 1 || request <= max_size;
            within_count && within_size
        }))
    }
}
