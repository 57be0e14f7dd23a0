use std::collections::BTreeSet;

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rowforge_core::{
    AggregateResults, Aggregator, AggregatorBox, DistributionHolder, GeneratedRow,
    GeneratedValue, Result,
};

/// Sums a field and remembers how many rows this copy mapped.
#[derive(Clone, Default)]
struct Total {
    mapped: usize,
}

impl Aggregator for Total {
    type Output = i64;

    fn name(&self) -> &str {
        "total"
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        BTreeSet::from(["points".to_string()])
    }

    fn map(&mut self, row: &GeneratedRow) -> Result<i64> {
        self.mapped += 1;
        Ok(row.get("points").and_then(GeneratedValue::as_i64).unwrap_or(0))
    }

    fn reduce(&mut self, larger: i64, smaller: i64) -> Result<i64> {
        Ok(larger + smaller)
    }
}

fn rows(holder: &DistributionHolder, ids: std::ops::Range<u64>) -> Vec<GeneratedRow> {
    ids.map(|id| {
        let mut rng = ChaCha8Rng::seed_from_u64(id);
        let mut row = GeneratedRow::new(id);
        for field in holder.var_order() {
            let dist = holder.get(field).expect("distribution");
            let value = dist.generate(&row, &mut rng).expect("draw");
            row.insert(field.clone(), value);
        }
        row
    })
    .collect()
}

#[test]
fn copies_split_work_and_original_reduces() {
    let holder = DistributionHolder::new()
        .with(
            "points",
            |_: &GeneratedRow, rng: &mut dyn RngCore| -> Result<GeneratedValue> {
                Ok(GeneratedValue::Int(rng.random_range(1..=10)))
            },
        )
        .expect("holder");
    let all = rows(&holder, 0..40);
    let expected: i64 = all
        .iter()
        .filter_map(|row| row.get("points").and_then(GeneratedValue::as_i64))
        .sum();

    let mut original: AggregatorBox = Box::new(Total::default());
    let mut left = original.clone();
    let mut right = original.clone();
    left.start().expect("start");
    right.start().expect("start");
    let partials = vec![
        left.map_reduce_batch(&all[..25]).expect("left batch"),
        right.map_reduce_batch(&all[25..]).expect("right batch"),
    ];
    left.done().expect("done");
    right.done().expect("done");

    let total = original.reduce_list(partials).expect("reduce");
    let results = AggregateResults::new(vec![original.name().to_string()], vec![total]);
    assert_eq!(results.get::<i64>(0), Some(&expected));

    let mapped = |agg: &AggregatorBox| {
        agg.as_any()
            .downcast_ref::<Total>()
            .map(|total| total.mapped)
            .expect("total aggregator")
    };
    assert_eq!(mapped(&left), 25);
    assert_eq!(mapped(&right), 15);
    assert_eq!(mapped(&original), 0);
}
