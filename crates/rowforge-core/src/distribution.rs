use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use rand::RngCore;

use crate::error::{Error, Result};
use crate::row::{GeneratedRow, ROW_ID_FIELD};
use crate::value::GeneratedValue;

/// Draws the value of one field.
///
/// `row` holds every field generated earlier in the canonical order, so a
/// distribution may condition on them. All randomness must come from `rng`;
/// the engine reseeds it per row, which is what makes generation replayable.
pub trait Distribution: Send + Sync {
    fn generate(&self, row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue>;
}

impl<F> Distribution for F
where
    F: Fn(&GeneratedRow, &mut dyn RngCore) -> Result<GeneratedValue> + Send + Sync,
{
    fn generate(&self, row: &GeneratedRow, rng: &mut dyn RngCore) -> Result<GeneratedValue> {
        self(row, rng)
    }
}

/// Ordered set of named field distributions.
///
/// Insertion order is the canonical generation order. Distributions are
/// immutable and shared between workers behind `Arc`.
#[derive(Clone, Default)]
pub struct DistributionHolder {
    order: Vec<String>,
    dists: HashMap<String, Arc<dyn Distribution>>,
}

impl DistributionHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a field to the end of the generation order.
    pub fn push(
        &mut self,
        field: impl Into<String>,
        dist: impl Distribution + 'static,
    ) -> Result<()> {
        self.push_shared(field, Arc::new(dist))
    }

    pub fn push_shared(
        &mut self,
        field: impl Into<String>,
        dist: Arc<dyn Distribution>,
    ) -> Result<()> {
        let field = field.into();
        if field == ROW_ID_FIELD {
            return Err(Error::InvalidArgument(format!(
                "field '{ROW_ID_FIELD}' is reserved for row identifiers"
            )));
        }
        if self.dists.contains_key(&field) {
            return Err(Error::InvalidArgument(format!(
                "duplicate distribution for field '{field}'"
            )));
        }
        self.order.push(field.clone());
        self.dists.insert(field, dist);
        Ok(())
    }

    /// Builder form of [`DistributionHolder::push`].
    pub fn with(mut self, field: impl Into<String>, dist: impl Distribution + 'static) -> Result<Self> {
        self.push(field, dist)?;
        Ok(self)
    }

    /// Canonical generation order.
    pub fn var_order(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, field: &str) -> Option<&Arc<dyn Distribution>> {
        self.dists.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.dists.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl fmt::Debug for DistributionHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DistributionHolder")
            .field("order", &self.order)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use rand::Rng;

    use super::*;

    fn constant(value: i64) -> impl Distribution {
        move |_: &GeneratedRow, _: &mut dyn RngCore| -> Result<GeneratedValue> {
            Ok(GeneratedValue::Int(value))
        }
    }

    #[test]
    fn keeps_insertion_order() {
        let holder = DistributionHolder::new()
            .with("b", constant(1))
            .and_then(|h| h.with("a", constant(2)))
            .and_then(|h| h.with("c", constant(3)))
            .expect("build holder");
        assert_eq!(holder.var_order(), ["b", "a", "c"]);
        assert!(holder.contains("a"));
        assert_eq!(holder.len(), 3);
    }

    #[test]
    fn rejects_duplicates_and_reserved_id() {
        let mut holder = DistributionHolder::new();
        holder.push("age", constant(1)).expect("first push");
        let err = holder.push("age", constant(2)).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
        let err = holder.push(ROW_ID_FIELD, constant(3)).unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }

    #[test]
    fn closures_draw_from_supplied_rng() {
        use rand::SeedableRng;
        use rand_chacha::ChaCha8Rng;

        let dist = |_: &GeneratedRow, rng: &mut dyn RngCore| -> Result<GeneratedValue> {
            Ok(GeneratedValue::Int(rng.random_range(0..1000)))
        };
        let row = GeneratedRow::new(0);
        let mut first = ChaCha8Rng::seed_from_u64(9);
        let mut second = ChaCha8Rng::seed_from_u64(9);
        assert_eq!(
            dist.generate(&row, &mut first).expect("draw"),
            dist.generate(&row, &mut second).expect("draw")
        );
    }
}
