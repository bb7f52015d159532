// ============================================================
// Layer 4 — Adversarial Results Table
// ============================================================
// Reads and writes the CSV attack log.
//
// Reading (adversarial retraining):
//   every row → AttackRecord
//   keep result_type == Successful
//   append {text: perturbed_text, label: ground_truth_output}
//   to the training set, in table order, cleaned like every
//   corpus example
//
// No deduplication is done against the original training set:
// an adversarial text may repeat an existing example. An empty
// table, or one without successful rows, adds nothing.
//
// Writing (attack driver):
//   one row per attacked example, flushed immediately so a long
//   attack run leaves a usable partial table behind.

use anyhow::{Context, Result};
use std::{fs::File, path::Path};

use crate::data::preprocessor::Preprocessor;
use crate::domain::adversarial::AttackRecord;
use crate::domain::example::Example;

/// Read every row of an attack log.
pub fn read_records(path: impl AsRef<Path>) -> Result<Vec<AttackRecord>> {
    let path = path.as_ref();
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Cannot open adversarial results table '{}'", path.display()))?;

    let mut records = Vec::new();
    for (row, record) in rdr.deserialize::<AttackRecord>().enumerate() {
        records.push(
            record.with_context(|| format!("Bad row {} in '{}'", row + 1, path.display()))?,
        );
    }
    Ok(records)
}

/// Training examples contributed by the successful rows, in table order.
pub fn successful_examples(records: &[AttackRecord]) -> Vec<Example> {
    let preprocessor = Preprocessor::new();
    records
        .iter()
        .filter(|r| r.is_successful())
        .map(|r| {
            let Example { text, label } = r.to_example();
            Example::new(preprocessor.clean(&text), label)
        })
        .collect()
}

/// Append the successful adversarial examples to `train`.
/// Returns how many examples were appended.
pub fn augment(train: &mut Vec<Example>, records: &[AttackRecord]) -> usize {
    let extra = successful_examples(records);
    let added = extra.len();
    train.extend(extra);
    added
}

/// Read an attack log and append its successful rows to `train`.
pub fn augment_from_file(train: &mut Vec<Example>, path: impl AsRef<Path>) -> Result<usize> {
    let path = path.as_ref();
    let records = read_records(path)?;
    let added = augment(train, &records);
    tracing::info!(
        "Added {} successful adversarial examples out of {} rows from '{}'",
        added,
        records.len(),
        path.display()
    );
    Ok(added)
}

/// Row-at-a-time writer for attack logs.
pub struct ResultsWriter {
    writer: csv::Writer<File>,
}

impl ResultsWriter {
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).ok();
        }
        let writer = csv::Writer::from_path(path)
            .with_context(|| format!("Cannot create results table '{}'", path.display()))?;
        Ok(Self { writer })
    }

    pub fn write(&mut self, record: &AttackRecord) -> Result<()> {
        self.writer.serialize(record)?;
        self.writer.flush()?;
        Ok(())
    }
}
