//! Property-based tests for trueno-fetch
//!
//! - Filter algebra (De Morgan, double negation) under local evaluation
//! - Type inference: one observed type always resolves, several always fail
//! - Lineage merging: strictly increasing steps, ancestor precedence
//! - Bucketing: bounded output, first and last point kept
//!
//! Run with `ProptestConfig::with_cases(100)`.

use proptest::prelude::*;
use rustc_hash::FxHashMap;

use trueno_fetch::attribute::{
    resolve_reference, AttributeDefinition, AttributeRef, AttributeType, AttributeValue,
};
use trueno_fetch::buckets::BucketAggregator;
use trueno_fetch::entity::EntityId;
use trueno_fetch::filter::eval::{evaluate, Record};
use trueno_fetch::filter::Filter;
use trueno_fetch::lineage::{self, Lineage, LineageLink};
use trueno_fetch::series::SeriesPoint;
use trueno_fetch::Error;

// ============================================================================
// Property Test Generators (Strategies)
// ============================================================================

#[derive(Debug, Clone)]
struct SyntheticRecord {
    label: String,
    values: FxHashMap<String, AttributeValue>,
}

impl Record for SyntheticRecord {
    fn label(&self) -> &str {
        &self.label
    }

    fn attribute(&self, attribute: &AttributeRef) -> Option<&AttributeValue> {
        let value = self.values.get(attribute.path())?;
        match attribute.declared_type() {
            Some(t) if t != value.attribute_type() => None,
            _ => Some(value),
        }
    }
}

fn metric() -> AttributeRef {
    AttributeRef::typed("metrics/score", AttributeType::Float)
}

fn tag() -> AttributeRef {
    AttributeRef::typed("config/tag", AttributeType::String)
}

fn arb_record() -> impl Strategy<Value = SyntheticRecord> {
    (
        "[a-c]{1,3}",
        proptest::option::of(0.0f64..10.0),
        proptest::option::of("[a-d]{0,3}"),
    )
        .prop_map(|(label, score, tag)| {
            let mut values = FxHashMap::default();
            if let Some(score) = score {
                values.insert("metrics/score".to_string(), AttributeValue::Float(score));
            }
            if let Some(tag) = tag {
                values.insert("config/tag".to_string(), AttributeValue::String(tag));
            }
            SyntheticRecord { label, values }
        })
}

fn arb_leaf() -> impl Strategy<Value = Filter> {
    prop_oneof![
        (0.0f64..10.0).prop_map(|x| Filter::gt(metric(), x).unwrap()),
        (0.0f64..10.0).prop_map(|x| Filter::le(metric(), x).unwrap()),
        "[a-d]".prop_map(|s| Filter::matches(tag(), &s).unwrap()),
        "[a-c]".prop_map(|s| Filter::name_matches(&s).unwrap()),
        Just(Filter::exists(metric())),
        Just(Filter::exists(tag())),
    ]
}

fn arb_filter() -> impl Strategy<Value = Filter> {
    arb_leaf().prop_recursive(3, 16, 2, |inner| {
        prop_oneof![
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.and(&b)),
            (inner.clone(), inner.clone()).prop_map(|(a, b)| a.or(&b)),
            inner.prop_map(|a| a.not()),
        ]
    })
}

const TYPES: [AttributeType; 6] = [
    AttributeType::Bool,
    AttributeType::Int,
    AttributeType::Float,
    AttributeType::String,
    AttributeType::Datetime,
    AttributeType::FloatSeries,
];

fn arb_types() -> impl Strategy<Value = Vec<AttributeType>> {
    proptest::sample::subsequence(TYPES.to_vec(), 1..=TYPES.len())
}

/// Sorted, unique integer steps as floats.
fn arb_steps(max_len: usize) -> impl Strategy<Value = Vec<f64>> {
    proptest::collection::btree_set(0u32..10_000, 1..max_len)
        .prop_map(|set| set.into_iter().map(f64::from).collect())
}

fn points(steps: &[f64], tag: f64) -> Vec<SeriesPoint<f64>> {
    steps.iter().map(|&s| SeriesPoint::new(s, tag)).collect()
}

/// Chain of 1..=4 entities with increasing fork steps, plus each entity's points.
fn arb_chain() -> impl Strategy<Value = (Lineage, FxHashMap<EntityId, Vec<SeriesPoint<f64>>>)> {
    (
        proptest::collection::btree_set(1u32..100, 0..4),
        proptest::collection::vec(proptest::collection::vec(0u32..120, 0..30), 4),
    )
        .prop_map(|(forks, logged)| {
            let mut links = vec![LineageLink::root("E-0")];
            for (i, fork) in forks.iter().enumerate() {
                links.push(LineageLink::forked(format!("E-{}", i + 1).as_str(), f64::from(*fork)));
            }
            let leaf = links.last().map(|l| l.entity.clone()).unwrap();

            let mut by_entity = FxHashMap::default();
            for (i, link) in links.iter().enumerate() {
                let steps: Vec<f64> = logged[i].iter().copied().map(f64::from).collect();
                #[allow(clippy::cast_precision_loss)]
                by_entity.insert(link.entity.clone(), points(&steps, i as f64));
            }
            (Lineage { entity: leaf, links }, by_entity)
        })
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    // ========================================================================
    // Filter algebra
    // ========================================================================

    /// Property: not(a and b) == not(a) or not(b)
    #[test]
    fn prop_de_morgan_and(a in arb_filter(), b in arb_filter(), record in arb_record()) {
        let lhs = a.and(&b).not();
        let rhs = a.not().or(&b.not());
        prop_assert_eq!(evaluate(&lhs, &record), evaluate(&rhs, &record));
    }

    /// Property: not(a or b) == not(a) and not(b)
    #[test]
    fn prop_de_morgan_or(a in arb_filter(), b in arb_filter(), record in arb_record()) {
        let lhs = a.or(&b).not();
        let rhs = a.not().and(&b.not());
        prop_assert_eq!(evaluate(&lhs, &record), evaluate(&rhs, &record));
    }

    /// Property: combinators never mutate their operands
    #[test]
    fn prop_combinators_do_not_mutate(a in arb_filter(), b in arb_filter()) {
        let (a0, b0) = (a.clone(), b.clone());
        let _ = a.and(&b).or(&a.not());
        prop_assert_eq!(a, a0);
        prop_assert_eq!(b, b0);
    }

    /// Property: a typed filter always compiles
    #[test]
    fn prop_typed_filters_compile(a in arb_filter()) {
        prop_assert!(a.compile(trueno_fetch::entity::EntityKind::Run).is_ok());
    }

    // ========================================================================
    // Type inference
    // ========================================================================

    /// Property: inference succeeds iff exactly one type is observed
    #[test]
    fn prop_inference_single_type_only(types in arb_types()) {
        let observed: Vec<AttributeDefinition> = types
            .iter()
            .map(|t| AttributeDefinition::new("config/x", *t))
            .collect();
        let result = resolve_reference(&AttributeRef::new("config/x"), &observed);

        if types.len() == 1 {
            prop_assert_eq!(result.unwrap(), Some(observed[0].clone()));
        } else {
            let is_inference_error = matches!(
                result,
                Err(Error::AttributeTypeInference { ref types, .. }) if types.len() == observed.len()
            );
            prop_assert!(is_inference_error);
        }
    }

    /// Property: a declared type is used whatever the population holds
    #[test]
    fn prop_declared_type_never_fails(types in arb_types(), declared in 0..TYPES.len()) {
        let observed: Vec<AttributeDefinition> = types
            .iter()
            .map(|t| AttributeDefinition::new("config/x", *t))
            .collect();
        let reference = AttributeRef::typed("config/x", TYPES[declared]);
        let resolved = resolve_reference(&reference, &observed).unwrap();
        prop_assert_eq!(resolved, Some(AttributeDefinition::new("config/x", TYPES[declared])));
    }

    // ========================================================================
    // Lineage merging
    // ========================================================================

    /// Property: merged steps are strictly increasing
    #[test]
    fn prop_lineage_strictly_increasing((chain, logged) in arb_chain()) {
        let merged = lineage::merge(&chain, &logged).unwrap();
        for pair in merged.windows(2) {
            prop_assert!(pair[0].step < pair[1].step);
        }
    }

    /// Property: each point comes from the deepest link whose segment covers its step
    #[test]
    fn prop_lineage_segments((chain, logged) in arb_chain()) {
        let merged = lineage::merge(&chain, &logged).unwrap();
        let forks: Vec<f64> = chain.links.iter().skip(1).filter_map(|l| l.forked_at).collect();

        for point in &merged {
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let owner = point.value as usize;
            let lower = if owner == 0 { f64::NEG_INFINITY } else { forks[owner - 1] };
            let upper = forks.get(owner).copied().unwrap_or(f64::INFINITY);
            prop_assert!(point.step > lower && point.step <= upper);
        }
    }

    /// Property: an unforked chain returns the entity's own normalized points, idempotently
    #[test]
    fn prop_lineage_unforked_identity(steps in proptest::collection::vec(0u32..50, 0..40)) {
        let id = EntityId::new("E-0");
        let raw: Vec<SeriesPoint<f64>> = steps.iter().map(|&s| SeriesPoint::new(f64::from(s), 1.0)).collect();
        let chain = Lineage::unforked(id.clone());

        let mut logged = FxHashMap::default();
        logged.insert(id.clone(), raw.clone());
        let once = lineage::merge(&chain, &logged).unwrap();
        prop_assert_eq!(&once, &lineage::normalize(raw));

        logged.insert(id, once.clone());
        let twice = lineage::merge(&chain, &logged).unwrap();
        prop_assert_eq!(twice, once);
    }

    // ========================================================================
    // Bucketing
    // ========================================================================

    /// Property: at most `limit` buckets, strictly increasing indices
    #[test]
    fn prop_buckets_bounded(steps in arb_steps(300), limit in 1usize..=50) {
        let series = points(&steps, 0.0);
        let buckets = BucketAggregator::new(limit).unwrap().aggregate(&series);
        prop_assert!(buckets.len() <= limit);
        prop_assert!(!buckets.is_empty());
        for pair in buckets.windows(2) {
            prop_assert!(pair[0].index < pair[1].index);
        }
    }

    /// Property: the first point always represents the first bucket
    #[test]
    fn prop_buckets_keep_first_point(steps in arb_steps(300), limit in 1usize..=50) {
        let series = points(&steps, 0.0);
        let buckets = BucketAggregator::new(limit).unwrap().aggregate(&series);
        prop_assert_eq!(buckets[0].index, 0);
        prop_assert_eq!(buckets[0].point.step, steps[0]);
    }

    /// Property: with more than one bucket the last point is always kept
    #[test]
    fn prop_buckets_keep_last_point(steps in arb_steps(300), limit in 2usize..=50) {
        let series = points(&steps, 0.0);
        let buckets = BucketAggregator::new(limit).unwrap().aggregate(&series);
        let last = buckets.last().unwrap();
        prop_assert_eq!(last.point.step, *steps.last().unwrap());
    }

    /// Property: every non-first representative lies inside its bucket
    #[test]
    fn prop_bucket_membership(steps in arb_steps(300), limit in 1usize..=50) {
        let series = points(&steps, 0.0);
        let buckets = BucketAggregator::new(limit).unwrap().aggregate(&series);
        let tolerance = 1e-6;
        for bucket in buckets.iter().skip(1) {
            prop_assert!(bucket.point.step > bucket.from_step - tolerance);
            prop_assert!(bucket.point.step <= bucket.to_step + tolerance);
        }
    }
}
