//! Map-reduce contract for consumers of generated rows.
//!
//! Lifecycle of an aggregator during one run:
//!
//! 1. It is constructed once by the caller and placed in the run options.
//! 2. Every worker receives its own copy through [`Clone`]. No copy is ever
//!    shared between workers, and the caller's original never sees `map`.
//! 3. Each worker calls `start` once before generating anything. Resources
//!    that must not be shared (open files, connections) are acquired here and
//!    never in the constructor, since the constructor runs only once.
//! 4. Batches of rows go through `map_reduce_batch`; batch results travel back
//!    to the coordinator.
//! 5. Each worker calls `done` when it shuts down. Its return value is only
//!    inspected for failure.
//! 6. The coordinator folds all batch results with `reduce_list` on its own
//!    copy.
//!
//! A copy that writes rows somewhere only ever sees a partition of the run
//! when more than one worker is used.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;

use crate::error::{Error, Result};
use crate::row::GeneratedRow;

/// Type-erased accumulator crossing the worker/coordinator boundary.
pub type AggregateValue = Box<dyn Any + Send>;

/// A map-reduce style consumer of generated rows.
pub trait Aggregator: Clone + Send + 'static {
    /// Accumulator produced by `map` and combined by `reduce`.
    type Output: Send + 'static;

    /// Name used in logs and error messages.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }

    /// Fields of the row this aggregator reads. The engine generates the
    /// fewest fields that cover every aggregator.
    fn fields_needed(&self) -> BTreeSet<String>;

    /// Per-worker setup, called exactly once before the first `map`.
    fn start(&mut self) -> Result<()> {
        Ok(())
    }

    fn map(&mut self, row: &GeneratedRow) -> Result<Self::Output>;

    /// Combine two accumulators. Must satisfy `reduce(a, b) == reduce(b, a)`.
    /// Callers try to pass the operand built from more rows first, but that
    /// ordering is only a hint.
    fn reduce(&mut self, larger: Self::Output, smaller: Self::Output) -> Result<Self::Output>;

    /// Per-worker teardown.
    fn done(&mut self) -> Result<()> {
        Ok(())
    }

    /// Fold `reduce` left to right over a non-empty list.
    fn reduce_list(&mut self, values: Vec<Self::Output>) -> Result<Self::Output> {
        let mut values = values.into_iter();
        let first = values.next().ok_or_else(|| {
            Error::EmptyInput(format!(
                "{}: reduce_list over no values",
                Aggregator::name(self)
            ))
        })?;
        values.try_fold(first, |acc, value| self.reduce(acc, value))
    }

    /// Map every row, then fold the results.
    fn map_reduce_batch(&mut self, rows: &[GeneratedRow]) -> Result<Self::Output> {
        if rows.is_empty() {
            return Err(Error::EmptyInput(format!(
                "{}: map_reduce_batch over no rows",
                Aggregator::name(self)
            )));
        }
        let mut mapped = Vec::with_capacity(rows.len());
        for row in rows {
            mapped.push(self.map(row)?);
        }
        Aggregator::reduce_list(self, mapped)
    }
}

/// Object-safe view of an [`Aggregator`], used to hold heterogeneous
/// aggregators in one ordered list.
pub trait DynAggregator: Send {
    fn name(&self) -> &str;
    fn fields_needed(&self) -> BTreeSet<String>;
    fn start(&mut self) -> Result<()>;
    fn map_reduce_batch(&mut self, rows: &[GeneratedRow]) -> Result<AggregateValue>;
    fn reduce_list(&mut self, values: Vec<AggregateValue>) -> Result<AggregateValue>;
    fn done(&mut self) -> Result<()>;
    /// Independent copy for another worker.
    fn clone_box(&self) -> AggregatorBox;
    fn as_any(&self) -> &dyn Any;
}

pub type AggregatorBox = Box<dyn DynAggregator>;

impl<A: Aggregator> DynAggregator for A {
    fn name(&self) -> &str {
        Aggregator::name(self)
    }

    fn fields_needed(&self) -> BTreeSet<String> {
        Aggregator::fields_needed(self)
    }

    fn start(&mut self) -> Result<()> {
        Aggregator::start(self)
    }

    fn map_reduce_batch(&mut self, rows: &[GeneratedRow]) -> Result<AggregateValue> {
        let value = Aggregator::map_reduce_batch(self, rows)?;
        Ok(Box::new(value))
    }

    fn reduce_list(&mut self, values: Vec<AggregateValue>) -> Result<AggregateValue> {
        let mut typed = Vec::with_capacity(values.len());
        for value in values {
            let value = value.downcast::<A::Output>().map_err(|_| {
                Error::aggregator(
                    Aggregator::name(self),
                    "accumulator has an unexpected type",
                )
            })?;
            typed.push(*value);
        }
        let reduced = Aggregator::reduce_list(self, typed)?;
        Ok(Box::new(reduced))
    }

    fn done(&mut self) -> Result<()> {
        Aggregator::done(self)
    }

    fn clone_box(&self) -> AggregatorBox {
        Box::new(self.clone())
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl Clone for AggregatorBox {
    fn clone(&self) -> Self {
        self.clone_box()
    }
}

impl fmt::Debug for dyn DynAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Aggregator").field(&self.name()).finish()
    }
}

/// Final reduced accumulators, one per configured aggregator, in
/// configuration order.
pub struct AggregateResults {
    names: Vec<String>,
    values: Vec<AggregateValue>,
}

impl AggregateResults {
    pub fn new(names: Vec<String>, values: Vec<AggregateValue>) -> Self {
        debug_assert_eq!(names.len(), values.len());
        Self { names, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Borrow the accumulator at `index` as `T`.
    pub fn get<T: 'static>(&self, index: usize) -> Option<&T> {
        self.values.get(index).and_then(|value| value.downcast_ref::<T>())
    }

    /// Like [`AggregateResults::get`], but reports why the lookup failed.
    pub fn expect_typed<T: 'static>(&self, index: usize) -> Result<&T> {
        let value = self.values.get(index).ok_or_else(|| {
            Error::InvalidArgument(format!(
                "no aggregate result at index {index} (have {})",
                self.values.len()
            ))
        })?;
        value.downcast_ref::<T>().ok_or_else(|| {
            Error::InvalidArgument(format!(
                "aggregate result '{}' is not a {}",
                self.names[index],
                std::any::type_name::<T>()
            ))
        })
    }

    /// Convert every accumulator to `T`; `None` if any has another type.
    pub fn into_typed<T: 'static>(self) -> Option<Vec<T>> {
        self.values
            .into_iter()
            .map(|value| value.downcast::<T>().ok().map(|value| *value))
            .collect()
    }

    pub fn into_values(self) -> Vec<AggregateValue> {
        self.values
    }
}

impl fmt::Debug for AggregateResults {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AggregateResults")
            .field("names", &self.names)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::GeneratedValue;

    #[derive(Clone)]
    struct SumAges;

    impl Aggregator for SumAges {
        type Output = i64;

        fn name(&self) -> &str {
            "sum_ages"
        }

        fn fields_needed(&self) -> BTreeSet<String> {
            BTreeSet::from(["age".to_string()])
        }

        fn map(&mut self, row: &GeneratedRow) -> Result<i64> {
            row.get("age")
                .and_then(GeneratedValue::as_i64)
                .ok_or_else(|| Error::aggregator("sum_ages", "row has no age"))
        }

        fn reduce(&mut self, larger: i64, smaller: i64) -> Result<i64> {
            Ok(larger + smaller)
        }
    }

    fn rows(ages: &[i64]) -> Vec<GeneratedRow> {
        ages.iter()
            .enumerate()
            .map(|(index, age)| {
                let mut row = GeneratedRow::new(index as u64);
                row.insert("age", GeneratedValue::Int(*age));
                row
            })
            .collect()
    }

    #[test]
    fn reduce_list_folds_left_to_right() {
        let mut agg = SumAges;
        assert_eq!(Aggregator::reduce_list(&mut agg, vec![1, 2, 3]).expect("reduce"), 6);
        assert_eq!(Aggregator::reduce_list(&mut agg, vec![5]).expect("reduce"), 5);
    }

    #[test]
    fn empty_inputs_are_rejected() {
        let mut agg = SumAges;
        let err = Aggregator::reduce_list(&mut agg, Vec::new()).unwrap_err();
        assert_eq!(err.kind(), "empty_input");
        let err = Aggregator::map_reduce_batch(&mut agg, &[]).unwrap_err();
        assert_eq!(err.kind(), "empty_input");
    }

    #[test]
    fn map_errors_propagate_out_of_batch() {
        let mut agg = SumAges;
        let mut batch = rows(&[1, 2]);
        batch.push(GeneratedRow::new(99));
        let err = Aggregator::map_reduce_batch(&mut agg, &batch).unwrap_err();
        assert_eq!(err.kind(), "aggregator");
    }

    #[test]
    fn erased_aggregator_round_trips_accumulators() {
        let mut boxed: AggregatorBox = Box::new(SumAges);
        let first = boxed.map_reduce_batch(&rows(&[10, 20])).expect("batch one");
        let second = boxed.map_reduce_batch(&rows(&[5])).expect("batch two");
        let total = boxed.reduce_list(vec![first, second]).expect("reduce");
        assert_eq!(total.downcast_ref::<i64>(), Some(&35));
        assert_eq!(boxed.clone().name(), "sum_ages");
    }

    #[test]
    fn erased_reduce_rejects_foreign_accumulators() {
        let mut boxed: AggregatorBox = Box::new(SumAges);
        let err = boxed
            .reduce_list(vec![Box::new("not an i64".to_string()) as AggregateValue])
            .unwrap_err();
        assert_eq!(err.kind(), "aggregator");
    }

    #[test]
    fn results_downcast_by_position() {
        let results = AggregateResults::new(
            vec!["count".to_string(), "label".to_string()],
            vec![Box::new(100_u64) as AggregateValue, Box::new("x".to_string())],
        );
        assert_eq!(results.get::<u64>(0), Some(&100));
        assert_eq!(results.get::<u64>(1), None);
        assert!(results.expect_typed::<u64>(1).is_err());
        assert!(results.expect_typed::<u64>(5).is_err());
        assert!(results.into_typed::<u64>().is_none());
    }
}
