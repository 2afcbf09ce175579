//! Piecewise-constant, height-indexed configuration (spec §9 "Global
//! configuration by height").
//!
//! `ExecutorConfig.getConfigByHeight(h)` is modeled as an ordered list of
//! `{ activationHeight, params }` entries, looked up by descending lower
//! bound: the entry with the greatest `activation_height <= h` applies.

use serde::{Deserialize, Serialize};

/// One piece of a piecewise-constant configuration timeline.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightActivation<T> {
    pub activation_height: u64,
    pub params: T,
}

/// An ordered, non-empty set of [`HeightActivation`] entries, queried by
/// descending-lower-bound lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeightIndexedConfig<T> {
    /// Invariant: sorted ascending by `activation_height`, first entry's
    /// `activation_height == 0`.
    entries: Vec<HeightActivation<T>>,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HeightIndexedConfigError {
    #[error("height-indexed configuration must have at least one entry")]
    Empty,
    #[error("the first activation height must be 0, got {0}")]
    FirstActivationNotZero(u64),
    #[error("activation heights must be strictly increasing; {prev} is not < {next}")]
    NotStrictlyIncreasing { prev: u64, next: u64 },
}

impl<T> HeightIndexedConfig<T> {
    pub fn new(mut entries: Vec<HeightActivation<T>>) -> Result<Self, HeightIndexedConfigError> {
        entries.sort_by_key(|e| e.activation_height);
        if entries.is_empty() {
            return Err(HeightIndexedConfigError::Empty);
        }
        if entries[0].activation_height != 0 {
            return Err(HeightIndexedConfigError::FirstActivationNotZero(
                entries[0].activation_height,
            ));
        }
        for pair in entries.windows(2) {
            let (prev, next) = (pair[0].activation_height, pair[1].activation_height);
            if prev >= next {
                return Err(HeightIndexedConfigError::NotStrictlyIncreasing { prev, next });
            }
        }
        Ok(Self { entries })
    }

    pub fn constant(params: T) -> Self {
        Self { entries: vec![HeightActivation { activation_height: 0, params }] }
    }

    /// Descending-lower-bound lookup (spec §9).
    pub fn get_config_by_height(&self, height: u64) -> &T {
        // `entries` is sorted ascending and always has an entry at height 0,
        // so `partition_point` never returns 0.
        let idx = self.entries.partition_point(|e| e.activation_height <= height);
        &self.entries[idx - 1].params
    }
}

#[cfg(test)]
mod height_indexed_test {
    use rstest::rstest;

    use super::*;

    fn config(heights: &[u64]) -> HeightIndexedConfig<u64> {
        let entries = heights
            .iter()
            .map(|&h| HeightActivation { activation_height: h, params: h })
            .collect();
        HeightIndexedConfig::new(entries).expect("valid config")
    }

    #[test]
    fn rejects_missing_zero_activation() {
        let entries = vec![HeightActivation { activation_height: 5, params: 1u64 }];
        assert_eq!(
            HeightIndexedConfig::new(entries).unwrap_err(),
            HeightIndexedConfigError::FirstActivationNotZero(5)
        );
    }

    #[test]
    fn rejects_duplicate_activation_heights() {
        let entries = vec![
            HeightActivation { activation_height: 0, params: 1u64 },
            HeightActivation { activation_height: 0, params: 2u64 },
        ];
        assert!(matches!(
            HeightIndexedConfig::new(entries).unwrap_err(),
            HeightIndexedConfigError::NotStrictlyIncreasing { .. }
        ));
    }

    #[rstest]
    #[case(0, 0)]
    #[case(4, 0)]
    #[case(5, 5)]
    #[case(100, 20)]
    fn looks_up_the_greatest_activation_leq_height(#[case] height: u64, #[case] expected: u64) {
        let cfg = config(&[0, 5, 20]);
        assert_eq!(*cfg.get_config_by_height(height), expected);
    }
}
