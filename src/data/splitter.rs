// ============================================================
// Layer 4 — Train / Validation / Test Splitter
// ============================================================
// The corpus ships a train split and a test split. Validation
// examples are carved out of the test split:
//
//   train       = the train split, untouched
//   test split  → shuffled with a fixed seed (42)
//   validation  = the first `valid_size` shuffled test examples
//   test        = the remaining shuffled test examples
//
// The shuffle is seeded, so every run (training, retraining,
// attack) sees the same validation set.
//
// Uses Fisher-Yates shuffle via rand::seq::SliceRandom over a
// seeded StdRng.

use rand::{rngs::StdRng, seq::SliceRandom, SeedableRng};

/// Seed of the fixed validation cut.
pub const SPLIT_SEED: u64 = 42;

/// Number of shuffled test examples used for validation.
pub const DEFAULT_VALID_SIZE: usize = 10_000;

/// The three splits a training session works with.
#[derive(Debug, Clone)]
pub struct DatasetSplits<T> {
    pub train: Vec<T>,
    pub valid: Vec<T>,
    pub test: Vec<T>,
}

/// Shuffle `items` in place with a deterministic seed.
pub fn shuffle_with_seed<T>(items: &mut [T], seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    items.shuffle(&mut rng);
}

/// Build train / validation / test splits.
///
/// `valid_size` is capped by the size of the test split, so a small
/// test split becomes validation in full and leaves `test` empty.
pub fn split_dataset<T>(train: Vec<T>, mut test: Vec<T>, valid_size: usize, seed: u64) -> DatasetSplits<T> {
    shuffle_with_seed(&mut test, seed);

    let split_at = valid_size.min(test.len());
    let rest = test.split_off(split_at);

    tracing::debug!(
        "Dataset split: {} train, {} validation, {} test",
        train.len(),
        test.len(),
        rest.len(),
    );

    DatasetSplits {
        train,
        valid: test,
        test: rest,
    }
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correct_split_sizes() {
        let train: Vec<usize> = (0..30).collect();
        let test: Vec<usize> = (0..100).collect();
        let splits = split_dataset(train, test, 80, SPLIT_SEED);
        assert_eq!(splits.train.len(), 30);
        assert_eq!(splits.valid.len(), 80);
        assert_eq!(splits.test.len(), 20);
    }

    #[test]
    fn test_train_split_is_untouched() {
        let train: Vec<usize> = (0..10).collect();
        let splits = split_dataset(train.clone(), vec![1, 2, 3], 2, SPLIT_SEED);
        assert_eq!(splits.train, train);
    }

    #[test]
    fn test_same_seed_gives_same_validation_set() {
        let test: Vec<usize> = (0..50).collect();
        let a = split_dataset(Vec::<usize>::new(), test.clone(), 10, SPLIT_SEED);
        let b = split_dataset(Vec::<usize>::new(), test, 10, SPLIT_SEED);
        assert_eq!(a.valid, b.valid);
        assert_eq!(a.test, b.test);
    }

    #[test]
    fn test_all_test_items_preserved() {
        let test: Vec<usize> = (0..50).collect();
        let splits = split_dataset(Vec::<usize>::new(), test, 20, SPLIT_SEED);
        let mut all: Vec<usize> = splits.valid.into_iter().chain(splits.test).collect();
        all.sort();
        assert_eq!(all, (0..50).collect::<Vec<_>>());
    }

    #[test]
    fn test_valid_size_capped_by_test_split() {
        let splits = split_dataset(vec![0usize], vec![1, 2, 3], DEFAULT_VALID_SIZE, SPLIT_SEED);
        assert_eq!(splits.valid.len(), 3);
        assert!(splits.test.is_empty());
    }
}
