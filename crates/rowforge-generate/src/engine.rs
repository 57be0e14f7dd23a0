use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::{debug, warn};

use rowforge_core::{
    AggregateValue, AggregatorBox, DistributionHolder, Error, GeneratedRow, ROW_ID_FIELD,
};

use crate::errors::GenerationError;
use crate::ids::RowSpec;
use crate::options::GenerationOptions;

/// Generates rows for a list of row specs and feeds them to its own copies
/// of the configured aggregators.
///
/// One engine lives on each worker (or on the calling thread in
/// single-worker mode). It owns its RNG and reseeds it once per row.
pub struct GenerationEngine {
    distributions: DistributionHolder,
    fields: Vec<String>,
    aggregators: Vec<AggregatorBox>,
    rng: ChaCha8Rng,
    cancel: Arc<AtomicBool>,
}

impl GenerationEngine {
    /// Clone the configured aggregators, select the fields to draw and start
    /// every aggregator copy. If one fails to start, the copies started before
    /// it get their `done` before the error is returned.
    pub fn new(
        options: &GenerationOptions,
        distributions: &DistributionHolder,
    ) -> Result<Self, GenerationError> {
        let mut aggregators: Vec<AggregatorBox> = options.aggregators.to_vec();
        let fields = select_fields_to_generate(distributions, &aggregators)?;
        for index in 0..aggregators.len() {
            if let Err(err) = aggregators[index].start() {
                // The engine is never built, so nothing else will call `done`.
                for started in &mut aggregators[..index] {
                    if let Err(done_err) = started.done() {
                        debug!(
                            aggregator = started.name(),
                            error = %done_err,
                            "done after failed start also failed"
                        );
                    }
                }
                return Err(err.into());
            }
        }
        debug!(
            fields = fields.len(),
            aggregators = aggregators.len(),
            "generation engine started"
        );
        Ok(Self {
            distributions: distributions.clone(),
            fields,
            aggregators,
            rng: ChaCha8Rng::seed_from_u64(0),
            cancel: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Share a cancellation flag; generation stops between rows once it is
    /// set.
    pub fn with_cancellation(mut self, cancel: Arc<AtomicBool>) -> Self {
        self.cancel = cancel;
        self
    }

    /// Fields drawn for every row, in generation order.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn aggregators(&self) -> &[AggregatorBox] {
        &self.aggregators
    }

    pub fn generate_row(&mut self, spec: RowSpec) -> Result<GeneratedRow, GenerationError> {
        self.rng = match spec.seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed as u64),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let mut row = GeneratedRow::new(spec.row_id);
        for field in &self.fields {
            let dist = self
                .distributions
                .get(field)
                .ok_or_else(|| Error::MissingFields(BTreeSet::from([field.clone()])))?;
            let value = dist.generate(&row, &mut self.rng)?;
            row.insert(field.clone(), value);
        }
        Ok(row)
    }

    /// Generate every row of the batch in order, then run each aggregator's
    /// `map_reduce_batch` over the whole batch. Results follow aggregator
    /// order.
    pub fn generate_and_aggregate(
        &mut self,
        specs: &[RowSpec],
    ) -> Result<Vec<AggregateValue>, GenerationError> {
        let mut rows = Vec::with_capacity(specs.len());
        for spec in specs {
            if self.cancel.load(Ordering::Relaxed) {
                return Err(GenerationError::Cancelled);
            }
            rows.push(self.generate_row(*spec)?);
        }

        let mut results = Vec::with_capacity(self.aggregators.len());
        for aggregator in &mut self.aggregators {
            results.push(aggregator.map_reduce_batch(&rows)?);
        }
        Ok(results)
    }

    /// Call `done` on every aggregator, even after a failure, and report the
    /// first failure.
    pub fn done(&mut self) -> Result<(), GenerationError> {
        let mut first_error = None;
        for aggregator in &mut self.aggregators {
            if let Err(err) = aggregator.done() {
                warn!(aggregator = aggregator.name(), error = %err, "aggregator done failed");
                first_error.get_or_insert(err);
            }
        }
        match first_error {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }
}

/// Smallest prefix of the canonical field order that holds every field the
/// aggregators read.
///
/// Every field before the last needed one is drawn as well: each draw
/// advances the row RNG, so skipping one would change every later value.
pub fn select_fields_to_generate(
    distributions: &DistributionHolder,
    aggregators: &[AggregatorBox],
) -> Result<Vec<String>, GenerationError> {
    let mut needed: BTreeSet<String> = aggregators
        .iter()
        .flat_map(|aggregator| aggregator.fields_needed())
        .collect();
    needed.remove(ROW_ID_FIELD);

    let missing: BTreeSet<String> = needed
        .iter()
        .filter(|field| !distributions.contains(field))
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(Error::MissingFields(missing).into());
    }

    let order = distributions.var_order();
    let end = order
        .iter()
        .rposition(|field| needed.contains(field))
        .map_or(0, |last| last + 1);
    Ok(order[..end].to_vec())
}
