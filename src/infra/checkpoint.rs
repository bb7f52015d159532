// ============================================================
// Layer 6 — Checkpoint Manager
// ============================================================
// Saves and restores classifier weights using Burn's
// CompactRecorder.
//
// Layout of a checkpoint directory:
//   model_step_2000.mpk      ← weights every `save_steps` optimizer steps
//   model_epoch_1.mpk        ← weights at the end of each epoch
//   latest_checkpoint.json   ← name of the most recent weights file
//   model_config.json        ← ClassifierConfig, to rebuild the model
//   run_config.json          ← the full run configuration
//   tokenizer.json           ← written by the tokenizer store
//
// The model config is saved separately because loading needs
// the exact architecture before the weights can be restored.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};
use burn::{
    prelude::*,
    record::{CompactRecorder, Recorder},
};
use serde::Serialize;

use crate::ml::model::{ClassifierConfig, TransformerClassifier};

const LATEST_FILE: &str = "latest_checkpoint.json";
const MODEL_CONFIG_FILE: &str = "model_config.json";
const RUN_CONFIG_FILE: &str = "run_config.json";

/// Manages saving and loading of model checkpoints.
/// All files are stored in the configured directory.
#[derive(Debug, Clone)]
pub struct CheckpointManager {
    dir: PathBuf,
}

impl CheckpointManager {
    /// Creates the directory if it doesn't already exist.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)
            .with_context(|| format!("Cannot create checkpoint directory '{}'", dir.display()))?;
        Ok(Self { dir })
    }

    /// Open an existing checkpoint directory without creating it.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self> {
        let dir = dir.into();
        if !dir.join(MODEL_CONFIG_FILE).exists() {
            anyhow::bail!(
                "'{}' is not a checkpoint directory (no {})",
                dir.display(), MODEL_CONFIG_FILE
            );
        }
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// End-of-epoch weights.
    pub fn save_epoch<B: Backend>(&self, model: &TransformerClassifier<B>, epoch: usize) -> Result<()> {
        self.save_record(model, &format!("model_epoch_{epoch}"))
    }

    /// Intermediate weights every `save_steps` optimizer steps.
    pub fn save_step<B: Backend>(&self, model: &TransformerClassifier<B>, step: usize) -> Result<()> {
        self.save_record(model, &format!("model_step_{step}"))
    }

    fn save_record<B: Backend>(&self, model: &TransformerClassifier<B>, name: &str) -> Result<()> {
        // Recorder adds the extension
        let path = self.dir.join(name);

        CompactRecorder::new()
            .record(model.clone().into_record(), path.clone())
            .with_context(|| format!("Failed to save checkpoint to '{}'", path.display()))?;

        let latest_path = self.dir.join(LATEST_FILE);
        fs::write(&latest_path, serde_json::to_string(name)?)
            .with_context(|| format!("Failed to write {LATEST_FILE}"))?;

        tracing::debug!("Saved checkpoint '{}'", name);
        Ok(())
    }

    /// Load the most recently saved weights into `model`.
    /// The architecture must match the saved checkpoint.
    pub fn load_model<B: Backend>(
        &self,
        model:  TransformerClassifier<B>,
        device: &B::Device,
    ) -> Result<TransformerClassifier<B>> {
        let name = self.latest()?;
        let path = self.dir.join(&name);

        tracing::info!("Loading checkpoint '{}' from '{}'", name, self.dir.display());

        let record = CompactRecorder::new()
            .load(path.clone(), device)
            .with_context(|| format!("Cannot load checkpoint '{}'", path.display()))?;

        Ok(model.load_record(record))
    }

    /// Rebuild the architecture from model_config.json and load the latest weights.
    pub fn restore<B: Backend>(&self, device: &B::Device) -> Result<(ClassifierConfig, TransformerClassifier<B>)> {
        let config = self.load_config()?;
        let model = self.load_model(config.init(device), device)?;
        Ok((config, model))
    }

    pub fn save_config(&self, cfg: &ClassifierConfig) -> Result<()> {
        self.write_json(MODEL_CONFIG_FILE, cfg)
    }

    pub fn load_config(&self) -> Result<ClassifierConfig> {
        let path = self.dir.join(MODEL_CONFIG_FILE);
        let json = fs::read_to_string(&path)
            .with_context(|| format!("Cannot read model config from '{}'", path.display()))?;
        serde_json::from_str(&json)
            .with_context(|| format!("Malformed model config '{}'", path.display()))
    }

    /// Persist the full run configuration next to the weights.
    pub fn save_run_config<T: Serialize>(&self, cfg: &T) -> Result<()> {
        self.write_json(RUN_CONFIG_FILE, cfg)
    }

    pub fn has_weights(&self) -> bool {
        self.dir.join(LATEST_FILE).exists()
    }

    fn write_json<T: Serialize + ?Sized>(&self, file_name: &str, value: &T) -> Result<()> {
        let path = self.dir.join(file_name);
        let json = serde_json::to_string_pretty(value)?;
        fs::write(&path, json)
            .with_context(|| format!("Cannot write '{}'", path.display()))?;
        tracing::debug!("Saved '{}'", path.display());
        Ok(())
    }

    fn latest(&self) -> Result<String> {
        let path = self.dir.join(LATEST_FILE);
        let s = fs::read_to_string(&path)
            .with_context(|| format!("No checkpoint found in '{}'", self.dir.display()))?;
        Ok(serde_json::from_str::<String>(&s)?)
    }
}
