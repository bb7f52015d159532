// ============================================================
// Layer 6 — Model Card
// ============================================================
// Markdown summary of a run, rewritten after every epoch:
//
//   ---
//   language: en
//   license: mit
//   library_name: burn
//   ---
//   # <title>
//   Trainer Hyperparameters:
//   - `lr` = ...
//   ...
//   Regularization Hyperparameters   (knowledge-continuity runs)
//   ...
//   Extended Logs:
//
//   |eval_loss|eval_accuracy|epoch|
//   |--|--|--|
//   |0.693|0.512|1|
//
// The writer saves README.md into the output directory and, when
// a hub target is configured, pushes it (plus the latest weights
// at the end of training).

use anyhow::{Context, Result};
use std::{
    fmt::Write as _,
    fs,
    path::{Path, PathBuf},
};

use crate::domain::{epoch::EpochSummary, traits::EpochSubscriber};
use crate::infra::hub::{HubPublisher, HubTarget};

pub const MODEL_CARD_FILE: &str = "README.md";

/// Checkpoint files pushed next to the card when training ends.
const PUBLISHED_FILES: [&str; 3] = ["model_config.json", "tokenizer.json", "run_config.json"];

#[derive(Debug, Clone)]
pub struct ModelCard {
    pub title:          String,
    pub trainer:        Vec<(String, String)>,
    pub regularization: Option<Vec<(String, String)>>,
}

impl ModelCard {
    pub fn new(title: impl Into<String>) -> Self {
        Self { title: title.into(), trainer: Vec::new(), regularization: None }
    }

    pub fn with_trainer_param(mut self, key: &str, value: impl ToString) -> Self {
        self.trainer.push((key.to_string(), value.to_string()));
        self
    }

    pub fn with_regularization_param(mut self, key: &str, value: impl ToString) -> Self {
        self.regularization
            .get_or_insert_with(Vec::new)
            .push((key.to_string(), value.to_string()));
        self
    }

    pub fn render(&self, history: &[EpochSummary]) -> String {
        let mut out = String::new();
        out.push_str("---\nlanguage: en\nlicense: mit\nlibrary_name: burn\n---\n");
        let _ = writeln!(out, "# {}", self.title);

        out.push_str("Trainer Hyperparameters:\n");
        for (key, value) in &self.trainer {
            let _ = writeln!(out, "- `{key}` = {value}");
        }

        if let Some(params) = &self.regularization {
            out.push_str("\nRegularization Hyperparameters\n");
            for (key, value) in params {
                let _ = writeln!(out, "- `{key}` = {value}");
            }
        }

        out.push_str("\nExtended Logs:\n\n|eval_loss|eval_accuracy|epoch|\n|--|--|--|\n");
        for summary in history {
            let _ = writeln!(
                out,
                "|{:.3}|{:.3}|{}|",
                summary.eval_loss, summary.eval_accuracy, summary.epoch
            );
        }
        out
    }
}

/// Writes (and optionally publishes) the model card every epoch.
pub struct ModelCardWriter {
    card:      ModelCard,
    dir:       PathBuf,
    target:    Option<HubTarget>,
    publisher: Option<HubPublisher>,
}

impl ModelCardWriter {
    pub fn new(card: ModelCard, dir: impl Into<PathBuf>, target: Option<HubTarget>) -> Self {
        Self { card, dir: dir.into(), target, publisher: None }
    }

    pub fn card_path(&self) -> PathBuf {
        self.dir.join(MODEL_CARD_FILE)
    }

    // The publisher is only built when something is pushed, so a
    // missing token fails at that point.
    fn publisher(&mut self) -> Result<Option<&mut HubPublisher>> {
        let Some(target) = &self.target else {
            return Ok(None);
        };
        if self.publisher.is_none() {
            let publisher = HubPublisher::new(target)
                .with_context(|| format!("Cannot publish to '{}'", target.repo_id))?;
            self.publisher = Some(publisher);
        }
        Ok(self.publisher.as_mut())
    }
}

impl EpochSubscriber for ModelCardWriter {
    fn on_epoch_end(&mut self, _summary: &EpochSummary, history: &[EpochSummary]) -> Result<()> {
        let content = self.card.render(history);
        let path = self.card_path();
        fs::write(&path, &content)
            .with_context(|| format!("Cannot write model card '{}'", path.display()))?;

        if let Some(publisher) = self.publisher()? {
            publisher.upload_bytes(content.as_bytes(), MODEL_CARD_FILE)?;
            tracing::info!("Model card pushed to '{}'", publisher.repo_id());
        }
        Ok(())
    }

    fn on_train_end(&mut self, _history: &[EpochSummary], checkpoint_dir: &Path) -> Result<()> {
        let Some(publisher) = self.publisher()? else {
            return Ok(());
        };

        let weights = latest_weights_file(checkpoint_dir)?;
        let mut files: Vec<PathBuf> = PUBLISHED_FILES
            .iter()
            .map(|name| checkpoint_dir.join(name))
            .filter(|p| p.exists())
            .collect();
        files.push(weights);

        for path in &files {
            let Some(name) = path.file_name().and_then(|n| n.to_str()) else { continue };
            publisher.upload_file(path, name)?;
        }
        tracing::info!("Pushed {} checkpoint files to '{}'", files.len(), publisher.repo_id());
        Ok(())
    }
}

/// The weights file named by latest_checkpoint.json (the recorder
/// picks the extension).
fn latest_weights_file(checkpoint_dir: &Path) -> Result<PathBuf> {
    let pointer = checkpoint_dir.join("latest_checkpoint.json");
    let name: String = serde_json::from_str(
        &fs::read_to_string(&pointer)
            .with_context(|| format!("Cannot read '{}'", pointer.display()))?,
    )?;
    let prefix = format!("{name}.");

    fs::read_dir(checkpoint_dir)?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .find(|p| {
            p.file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with(&prefix))
        })
        .with_context(|| format!("Weights '{name}' missing from '{}'", checkpoint_dir.display()))
}

// ─── Unit Tests ───────────────────────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;

    fn history() -> Vec<EpochSummary> {
        vec![
            EpochSummary { epoch: 1, step: 5, train_loss: 0.9, eval_loss: 0.6931, eval_accuracy: 0.5124 },
            EpochSummary { epoch: 2, step: 10, train_loss: 0.7, eval_loss: 0.4, eval_accuracy: 0.8 },
        ]
    }

    #[test]
    fn test_render_table_rows() {
        let card = ModelCard::new("Knowledge Continuity Regularized Network")
            .with_trainer_param("lr", 2e-5)
            .with_regularization_param("lambda", 0.1);
        let text = card.render(&history());

        assert!(text.starts_with("---\nlanguage: en\n"));
        assert!(text.contains("# Knowledge Continuity Regularized Network\n"));
        assert!(text.contains("- `lr` = 0.00002\n"));
        assert!(text.contains("Regularization Hyperparameters\n- `lambda` = 0.1\n"));
        assert!(text.contains("|eval_loss|eval_accuracy|epoch|\n|--|--|--|\n|0.693|0.512|1|\n|0.400|0.800|2|\n"));
    }

    #[test]
    fn test_render_without_regularization_section() {
        let text = ModelCard::new("Adversarial Training Through Iterations").render(&[]);
        assert!(!text.contains("Regularization"));
        assert!(text.ends_with("|--|--|--|\n"));
    }

    #[test]
    fn test_writer_saves_card_each_epoch() {
        let tmp = tempfile::tempdir().unwrap();
        let mut writer = ModelCardWriter::new(ModelCard::new("Run"), tmp.path(), None);
        let history = history();

        writer.on_epoch_end(&history[0], &history[..1]).unwrap();
        writer.on_epoch_end(&history[1], &history).unwrap();
        writer.on_train_end(&history, tmp.path()).unwrap();

        let saved = fs::read_to_string(writer.card_path()).unwrap();
        assert!(saved.contains("|0.400|0.800|2|"));
    }

    #[test]
    fn test_missing_token_fails_when_publishing() {
        let tmp = tempfile::tempdir().unwrap();
        let target = HubTarget::new("owner", "imdb-model", None);
        let mut writer = ModelCardWriter::new(ModelCard::new("Run"), tmp.path(), Some(target));
        let history = history();

        let err = writer.on_epoch_end(&history[0], &history[..1]).unwrap_err();
        assert!(format!("{err:#}").contains("HUB_TOKEN"));
    }

    #[test]
    fn test_latest_weights_file_uses_pointer() {
        let tmp = tempfile::tempdir().unwrap();
        fs::write(tmp.path().join("latest_checkpoint.json"), "\"model_epoch_2\"").unwrap();
        fs::write(tmp.path().join("model_epoch_1.mpk"), b"x").unwrap();
        fs::write(tmp.path().join("model_epoch_2.mpk"), b"y").unwrap();

        let found = latest_weights_file(tmp.path()).unwrap();
        assert_eq!(found.file_name().unwrap(), "model_epoch_2.mpk");
    }
}
