use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;

use crate::error::DatasetError;
use crate::types::Partitions;

const RATIO_TOLERANCE: f64 = 1e-6;

/// Target proportions of the train, val and test subsets
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SplitRatios {
    pub train: f64,
    pub val: f64,
    pub test: f64,
}

impl Default for SplitRatios {
    fn default() -> Self {
        Self {
            train: 0.8,
            val: 0.1,
            test: 0.1,
        }
    }
}

impl SplitRatios {
    /// Build ratios from the held-out sizes; train gets the remainder
    pub fn from_holdout(val: f64, test: f64) -> Result<Self, DatasetError> {
        let ratios = Self {
            train: 1.0 - val - test,
            val,
            test,
        };
        ratios.validate()?;
        Ok(ratios)
    }

    pub fn validate(&self) -> Result<(), DatasetError> {
        for (name, value) in [("train", self.train), ("val", self.val), ("test", self.test)] {
            if !(-RATIO_TOLERANCE..=1.0 + RATIO_TOLERANCE).contains(&value) {
                return Err(DatasetError::InvalidRatios(format!(
                    "{} ratio {} is outside 0.0..=1.0",
                    name, value
                )));
            }
        }
        let sum = self.train + self.val + self.test;
        if (sum - 1.0).abs() > RATIO_TOLERANCE {
            return Err(DatasetError::InvalidRatios(format!(
                "ratios sum to {}, expected 1.0",
                sum
            )));
        }
        Ok(())
    }

    /// Combined share of val and test
    pub fn holdout(&self) -> f64 {
        self.val + self.test
    }
}

// Shuffle with a fresh seeded rng and move the first ceil(len * fraction)
// items out. Returns (kept, held_out).
fn shuffle_split<T>(mut items: Vec<T>, fraction: f64, seed: u64) -> (Vec<T>, Vec<T>) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);

    let held_out_len = ((items.len() as f64 * fraction).ceil() as usize).min(items.len());
    let held_out = items.drain(0..held_out_len).collect();
    (items, held_out)
}

/// Split `items` into train, val and test subsets.
///
/// A single binary split cannot express three ways, so this runs two: train
/// against a val+test pool sized `ceil(n * (val + test))`, then the pool into
/// test (`ceil(pool * test / (val + test))`) and val. Both stages shuffle with
/// an rng seeded from `seed`, so the result depends only on `seed` and the
/// input order.
pub fn partition<T>(
    items: Vec<T>,
    ratios: &SplitRatios,
    seed: u64,
) -> Result<Partitions<T>, DatasetError> {
    ratios.validate()?;

    let holdout = ratios.holdout();
    let (train, pool) = shuffle_split(items, holdout, seed);

    let test_fraction = if holdout > 0.0 {
        ratios.test / holdout
    } else {
        0.0
    };
    let (val, test) = shuffle_split(pool, test_fraction, seed);

    Ok(Partitions { train, val, test })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_partition_sizes_ten_items() {
        let items: Vec<u32> = (0..10).collect();
        let parts = partition(items, &SplitRatios::default(), 42).unwrap();

        assert_eq!(parts.train.len(), 8);
        assert_eq!(parts.val.len(), 1);
        assert_eq!(parts.test.len(), 1);
    }

    #[test]
    fn test_partition_is_disjoint_and_exhaustive() {
        let items: Vec<u32> = (0..137).collect();
        let parts = partition(items.clone(), &SplitRatios::default(), 7).unwrap();

        let mut seen = HashSet::new();
        for (_, subset) in parts.iter() {
            for item in subset {
                assert!(seen.insert(*item), "item {} assigned twice", item);
            }
        }
        assert_eq!(seen, items.into_iter().collect::<HashSet<_>>());

        // ceil(137 * 0.2) = 28 held out, split 14 / 14
        assert_eq!(parts.train.len(), 109);
        assert_eq!(parts.val.len(), 14);
        assert_eq!(parts.test.len(), 14);
    }

    #[test]
    fn test_partition_is_reproducible() {
        let items: Vec<String> = (0..50).map(|i| format!("sample_{:03}", i)).collect();
        let first = partition(items.clone(), &SplitRatios::default(), 42).unwrap();
        let second = partition(items.clone(), &SplitRatios::default(), 42).unwrap();
        assert_eq!(first, second);

        let other_seed = partition(items, &SplitRatios::default(), 43).unwrap();
        assert_ne!(first, other_seed);
    }

    #[test]
    fn test_partition_without_holdout() {
        let ratios = SplitRatios::from_holdout(0.0, 0.0).unwrap();
        let parts = partition(vec![1, 2, 3], &ratios, 42).unwrap();
        assert_eq!(parts.train.len(), 3);
        assert!(parts.val.is_empty());
        assert!(parts.test.is_empty());
    }

    #[test]
    fn test_partition_empty_input() {
        let parts = partition(Vec::<u8>::new(), &SplitRatios::default(), 42).unwrap();
        assert!(parts.is_empty());
    }

    #[test]
    fn test_invalid_ratios() {
        assert!(SplitRatios::from_holdout(0.7, 0.5).is_err());
        assert!(SplitRatios::from_holdout(-0.1, 0.1).is_err());
        let lopsided = SplitRatios {
            train: 0.5,
            val: 0.1,
            test: 0.1,
        };
        assert!(matches!(
            partition(vec![1], &lopsided, 42),
            Err(DatasetError::InvalidRatios(_))
        ));
    }
}
