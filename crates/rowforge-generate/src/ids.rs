//! Deterministic `(row id, seed)` stream.
//!
//! Row ids are 64-bit: the high 32 bits name a stripe, the low 32 bits an
//! offset inside the stripe. Both the stripe order and the offset order are
//! shuffled once per run from the run seed, so ids look random but can never
//! collide.

use std::fmt;

use rand::SeedableRng;
use rand::seq::SliceRandom;
use rand_chacha::ChaCha8Rng;
use rowforge_core::{Error, Result};

/// Default number of row ids per stripe.
pub const STRIPE_WIDTH: u64 = 1000;

const MAX_STRIPES: u64 = 1 << 32;

/// Identifier and RNG seed of a single row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowSpec {
    pub row_id: u64,
    /// `None` means the row is drawn from an entropy-seeded RNG and is not
    /// reproducible.
    pub seed: Option<i64>,
}

impl RowSpec {
    pub fn new(row_id: u64, seed: Option<i64>) -> Self {
        Self { row_id, seed }
    }

    pub fn stripe(&self) -> u64 {
        self.row_id >> 32
    }

    pub fn offset(&self) -> u64 {
        self.row_id & 0xffff_ffff
    }
}

impl fmt::Display for RowSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.seed {
            Some(seed) => write!(f, "{:#x}/{}", self.row_id, seed),
            None => write!(f, "{:#x}/-", self.row_id),
        }
    }
}

/// Builds the row id/seed stream for a run.
#[derive(Debug, Clone)]
pub struct RowIdSeedGenerator {
    random_seed: Option<i64>,
    stripe_width: u64,
}

impl RowIdSeedGenerator {
    pub fn new(random_seed: Option<i64>) -> Self {
        Self {
            random_seed,
            stripe_width: STRIPE_WIDTH,
        }
    }

    pub fn with_stripe_width(mut self, stripe_width: u64) -> Self {
        self.stripe_width = stripe_width;
        self
    }

    pub fn stripe_width(&self) -> u64 {
        self.stripe_width
    }

    /// Produce the stream for `num_rows` rows.
    ///
    /// The stripe list is shuffled before the offset list, both from the same
    /// RNG; changing that order changes every id of every run.
    ///
    /// Only `ceil(num_rows / stripe_width)` stripes are shuffled, never a
    /// spare one, so a run whose row count is an exact multiple of the width
    /// uses every stripe completely. The stripe count feeds the shuffle, so
    /// ids for a given seed depend on this choice.
    pub fn generate(&self, num_rows: u64) -> Result<RowSpecs> {
        if self.stripe_width == 0 || self.stripe_width > MAX_STRIPES {
            return Err(Error::InvalidArgument(format!(
                "stripe width must be in 1..={MAX_STRIPES}, got {}",
                self.stripe_width
            )));
        }
        let num_stripes = num_rows.div_ceil(self.stripe_width);
        if num_stripes > MAX_STRIPES {
            return Err(Error::InvalidArgument(format!(
                "{num_rows} rows need {num_stripes} stripes, more than {MAX_STRIPES}"
            )));
        }

        let mut rng = match self.random_seed {
            Some(seed) => ChaCha8Rng::seed_from_u64(seed as u64),
            None => ChaCha8Rng::from_rng(&mut rand::rng()),
        };
        let mut stripes: Vec<u64> = (0..num_stripes).collect();
        let mut offsets: Vec<u64> = (0..self.stripe_width).collect();
        stripes.shuffle(&mut rng);
        offsets.shuffle(&mut rng);

        Ok(RowSpecs {
            stripes,
            offsets,
            stripe_pos: 0,
            offset_pos: 0,
            next_seed: self.random_seed.map(|seed| seed.wrapping_add(1)),
            remaining: num_rows,
        })
    }
}

/// Lazy, finite stream of [`RowSpec`]s. Not restartable; build a new one
/// from the generator to iterate again.
#[derive(Debug, Clone)]
pub struct RowSpecs {
    stripes: Vec<u64>,
    offsets: Vec<u64>,
    stripe_pos: usize,
    offset_pos: usize,
    next_seed: Option<i64>,
    remaining: u64,
}

impl Iterator for RowSpecs {
    type Item = RowSpec;

    fn next(&mut self) -> Option<RowSpec> {
        if self.remaining == 0 {
            return None;
        }
        let stripe = *self.stripes.get(self.stripe_pos)?;
        let offset = self.offsets[self.offset_pos];
        self.offset_pos += 1;
        if self.offset_pos == self.offsets.len() {
            self.offset_pos = 0;
            self.stripe_pos += 1;
        }
        self.remaining -= 1;

        let seed = self.next_seed;
        self.next_seed = seed.map(|seed| seed.wrapping_add(1));
        Some(RowSpec::new((stripe << 32) | offset, seed))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = usize::try_from(self.remaining).unwrap_or(usize::MAX);
        (remaining, Some(remaining))
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{BTreeMap, BTreeSet, HashSet};

    use super::*;

    fn collect(seed: Option<i64>, width: u64, rows: u64) -> Vec<RowSpec> {
        RowIdSeedGenerator::new(seed)
            .with_stripe_width(width)
            .generate(rows)
            .expect("generate ids")
            .collect()
    }

    #[test]
    fn seeds_count_up_from_start_seed() {
        let specs = collect(Some(120), 1000, 10);
        let seeds: Vec<_> = specs.iter().map(|spec| spec.seed).collect();
        let expected: Vec<_> = (121..131).map(Some).collect();
        assert_eq!(seeds, expected);
    }

    #[test]
    fn missing_seed_yields_unseeded_rows() {
        let specs = collect(None, 1000, 25);
        assert_eq!(specs.len(), 25);
        assert!(specs.iter().all(|spec| spec.seed.is_none()));
        let ids: HashSet<_> = specs.iter().map(|spec| spec.row_id).collect();
        assert_eq!(ids.len(), 25);
    }

    #[test]
    fn same_seed_same_stream() {
        assert_eq!(collect(Some(7), 1000, 2500), collect(Some(7), 1000, 2500));
        assert_ne!(collect(Some(7), 1000, 2500), collect(Some(8), 1000, 2500));
    }

    #[test]
    fn ids_are_unique() {
        for rows in [0, 1, 999, 1000, 1001, 3777] {
            let specs = collect(Some(3), 1000, rows);
            assert_eq!(specs.len() as u64, rows);
            let ids: HashSet<_> = specs.iter().map(|spec| spec.row_id).collect();
            assert_eq!(ids.len() as u64, rows, "duplicate ids for {rows} rows");
        }
    }

    #[test]
    fn full_stripes_hold_every_offset_once() {
        let width = 1000;
        let specs = collect(Some(11), width, width * 3);
        let mut by_stripe: BTreeMap<u64, Vec<u64>> = BTreeMap::new();
        for spec in &specs {
            by_stripe.entry(spec.stripe()).or_default().push(spec.offset());
        }
        assert_eq!(by_stripe.len(), 3);
        let all_offsets: BTreeSet<u64> = (0..width).collect();
        for offsets in by_stripe.values() {
            assert_eq!(offsets.len() as u64, width);
            let unique: BTreeSet<u64> = offsets.iter().copied().collect();
            assert_eq!(unique, all_offsets);
        }
    }

    #[test]
    fn partial_stripe_is_a_prefix_of_the_shared_offset_order() {
        let specs = collect(Some(5), 10, 25);
        let first_stripe: Vec<u64> = specs[..10].iter().map(RowSpec::offset).collect();
        let last_stripe: Vec<u64> = specs[20..].iter().map(RowSpec::offset).collect();
        assert_eq!(last_stripe.as_slice(), &first_stripe[..5]);
    }

    #[test]
    fn rejects_bad_stripe_width() {
        let err = RowIdSeedGenerator::new(Some(1))
            .with_stripe_width(0)
            .generate(10)
            .unwrap_err();
        assert_eq!(err.kind(), "invalid_argument");
    }
}
