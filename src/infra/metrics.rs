// ============================================================
// Layer 6 — Metrics Logger
// ============================================================
// Records training metrics to a CSV file after each epoch.
//
// Output file: <output dir>/metrics.csv
//
//   epoch,step,train_loss,eval_loss,eval_accuracy
//   1,1563,0.712300,0.698100,0.541000
//   2,3126,0.601200,0.655400,0.612000
//
// Rows are appended, so a resumed run extends the same log.

use anyhow::{Context, Result};
use std::{
    fs::{self, OpenOptions},
    path::{Path, PathBuf},
};

use crate::domain::{epoch::EpochSummary, traits::EpochSubscriber};

/// Logs epoch summaries to a CSV file for later analysis.
pub struct MetricsLogger {
    csv_path: PathBuf,
}

impl MetricsLogger {
    pub fn new(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        fs::create_dir_all(dir)?;
        let csv_path = dir.join("metrics.csv");
        tracing::debug!("Metrics will be appended to '{}'", csv_path.display());
        Ok(Self { csv_path })
    }

    /// Append one epoch as a new row, writing the header first
    /// when the file is new.
    pub fn log(&self, summary: &EpochSummary) -> Result<()> {
        let is_new = !self.csv_path.exists();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.csv_path)
            .with_context(|| format!("Cannot open '{}'", self.csv_path.display()))?;

        let mut writer = csv::WriterBuilder::new().has_headers(false).from_writer(file);
        if is_new {
            writer.write_record(["epoch", "step", "train_loss", "eval_loss", "eval_accuracy"])?;
        }
        writer.write_record(&[
            summary.epoch.to_string(),
            summary.step.to_string(),
            format!("{:.6}", summary.train_loss),
            format!("{:.6}", summary.eval_loss),
            format!("{:.6}", summary.eval_accuracy),
        ])?;
        writer.flush()?;

        tracing::debug!(
            "Logged epoch {} metrics: train_loss={:.4}, eval_loss={:.4}",
            summary.epoch, summary.train_loss, summary.eval_loss,
        );
        Ok(())
    }
}

impl EpochSubscriber for MetricsLogger {
    fn on_epoch_end(&mut self, summary: &EpochSummary, _history: &[EpochSummary]) -> Result<()> {
        self.log(summary)
    }
}
