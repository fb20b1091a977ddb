//! Sampler
//!
//! Reproducible resampling: whole-season bags for the ensemble, and row
//! subsampling for the booster. All randomness in a run flows from a single
//! seed derived from the forecast reference date.
use chrono::NaiveDate;
use log::debug;
use rand::rngs::StdRng;
use rand::seq::index;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use crate::constants::MODEL_SEED_UPPER;
use crate::errors::FlucastError;
use crate::utils::{validate_fraction, validate_positive_count};

/// Seed for a run: seconds since the epoch at midnight UTC of the reference date.
pub fn seed_from_date(date: NaiveDate) -> u64 {
    date.and_hms_opt(0, 0, 0)
        .map(|dt| dt.and_utc().timestamp() as u64)
        .unwrap_or(0)
}

// A sampler can be used to subset the data prior to fitting a new tree.
pub trait Sampler {
    /// Sample the data, returning a tuple, where the first item is the samples
    /// chosen for training, and the second are the samples excluded.
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>);
}

pub struct RandomSampler {
    subsample: f64,
}

impl RandomSampler {
    pub fn new(subsample: f64) -> Self {
        RandomSampler { subsample }
    }
}

impl Sampler for RandomSampler {
    fn sample(&mut self, rng: &mut StdRng, index: &[usize]) -> (Vec<usize>, Vec<usize>) {
        let mut chosen = Vec::new();
        let mut excluded = Vec::new();
        for i in index {
            if rng.gen::<f64>() < self.subsample {
                chosen.push(*i);
            } else {
                excluded.push(*i)
            }
        }
        (chosen, excluded)
    }
}

/// One ensemble member's share of the training seasons.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bag {
    pub seasons: Vec<String>,
}

impl Bag {
    pub fn contains(&self, season: &str) -> bool {
        self.seasons.iter().any(|s| s == season)
    }
}

/// Draws subsets of whole seasons without replacement.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeasonalBaggingSampler {
    num_bags: usize,
    bag_frac_samples: f64,
}

impl SeasonalBaggingSampler {
    pub fn new(num_bags: usize, bag_frac_samples: f64) -> Result<Self, FlucastError> {
        validate_positive_count(num_bags, "num_bags")?;
        validate_fraction(bag_frac_samples, "bag_frac_samples")?;
        Ok(SeasonalBaggingSampler {
            num_bags,
            bag_frac_samples,
        })
    }

    pub fn num_bags(&self) -> usize {
        self.num_bags
    }

    pub fn bag_frac_samples(&self) -> f64 {
        self.bag_frac_samples
    }

    /// Number of seasons in each bag.
    pub fn bag_size(&self, num_seasons: usize) -> usize {
        // Truncation, not rounding.
        (num_seasons as f64 * self.bag_frac_samples) as usize
    }

    /// Draw one bag from `seasons`.
    pub fn draw_bag(&self, rng: &mut StdRng, seasons: &[String]) -> Bag {
        let size = self.bag_size(seasons.len());
        let picked = index::sample(rng, seasons.len(), size);
        Bag {
            seasons: picked.into_iter().map(|i| seasons[i].clone()).collect(),
        }
    }
}

/// Every random choice of an ensemble run, drawn up front so fitting order
/// does not matter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeedPlan {
    pub rng_seed: u64,
    /// Model seeds indexed `[bag][quantile]`.
    pub model_seeds: Vec<Vec<u64>>,
    pub bags: Vec<Bag>,
}

impl SeedPlan {
    /// The seed matrix is drawn first, then the bags, from one stream.
    pub fn draw(
        rng_seed: u64,
        sampler: &SeasonalBaggingSampler,
        num_quantiles: usize,
        seasons: &[String],
    ) -> Result<Self, FlucastError> {
        // A deserialized sampler has not been through `new`.
        validate_positive_count(sampler.num_bags, "num_bags")?;
        validate_fraction(sampler.bag_frac_samples, "bag_frac_samples")?;
        let mut rng = StdRng::seed_from_u64(rng_seed);
        let model_seeds: Vec<Vec<u64>> = (0..sampler.num_bags)
            .map(|_| {
                (0..num_quantiles)
                    .map(|_| rng.gen_range(0..MODEL_SEED_UPPER))
                    .collect()
            })
            .collect();
        let mut bags = Vec::with_capacity(sampler.num_bags);
        for b in 0..sampler.num_bags {
            let bag = sampler.draw_bag(&mut rng, seasons);
            if bag.seasons.is_empty() {
                return Err(FlucastError::EmptyBag(b, seasons.len(), sampler.bag_frac_samples));
            }
            debug!("bag {} seasons: {:?}", b + 1, bag.seasons);
            bags.push(bag);
        }
        Ok(SeedPlan {
            rng_seed,
            model_seeds,
            bags,
        })
    }

    pub fn for_reference_date(
        ref_date: NaiveDate,
        sampler: &SeasonalBaggingSampler,
        num_quantiles: usize,
        seasons: &[String],
    ) -> Result<Self, FlucastError> {
        Self::draw(seed_from_date(ref_date), sampler, num_quantiles, seasons)
    }
}
