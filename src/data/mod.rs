// ============================================================
// Layer 4 — Data Pipeline
// ============================================================
// Everything from corpus files to device-ready tensor batches,
// plus the adversarial-results table.
//
//   train.csv / aclImdb tree
//       │
//       ▼
//   CorpusLoader          → reads files, cleans text (Preprocessor)
//       │
//       ▼
//   split_dataset         → train / validation / test (seed 42)
//       │
//       ▼
//   adversarial_table     → (retraining only) appends successful attacks
//       │
//       ▼
//   ExampleEncoder        → token ids, padding, attention mask
//       │
//       ▼
//   ClassificationDataset → implements Burn's Dataset trait
//       │
//       ▼
//   ClassificationBatcher → stacks samples into tensor batches

/// Loads labelled corpora from CSV files or review directories
pub mod loader;

/// Cleans raw review text
pub mod preprocessor;

/// Deterministic train / validation / test split
pub mod splitter;

/// Tokenises, truncates and pads examples
pub mod encoder;

/// Implements Burn's Dataset trait for classification samples
pub mod dataset;

/// Implements Burn's Batcher trait to create tensor batches
pub mod batcher;

/// Reads / writes the adversarial-results CSV
pub mod adversarial_table;
