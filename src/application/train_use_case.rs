// ============================================================
// Layer 2 — TrainUseCase
// ============================================================
// Knowledge-continuity regularized training:
//
//   Step 1: Load and split the corpus        (Layer 4 - data)
//   Step 2: Resolve the tokenizer            (Layer 6 - infra)
//   Step 3: Restore or initialise the model  (Layer 5 / 6)
//   Step 4: Encode train / validation sets   (Layer 4 - data)
//   Step 5: Save model and run config        (Layer 6 - infra)
//   Step 6: Build wrapper, objective, card   (Layer 5 / 6)
//   Step 7: Run the training loop            (Layer 5 - ml)
//
// The objective is Σ CE + λ · discontinuity over a hidden layer
// drawn from Beta(α, β) on every forward pass.

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::application::session::{self, ModelDims};
use crate::data::splitter::DEFAULT_VALID_SIZE;
use crate::domain::epoch::EpochSummary;
use crate::infra::{
    checkpoint::CheckpointManager,
    hub::{regularized_model_id, HubTarget},
    model_card::ModelCard,
};
use crate::ml::{
    objective::Objective,
    trainer::{TrainBackend, Trainer, TrainerSettings},
    wrapper::{KnowledgeContinuousWrapper, LayerSampler},
};

pub const DEFAULT_OUTPUT_DIR: &str = "imdb-kd-regularized";
pub const DEFAULT_HUB_NAMESPACE: &str = "kc-regularizer";

// ─── Training Configuration ──────────────────────────────────────────────────
// Saved as run_config.json next to the checkpoints. The hub token
// is never written to disk.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainConfig {
    /// Checkpoint directory to continue from, or a model name for
    /// a fresh classifier (also used to look up its tokenizer)
    pub model:         String,
    pub alpha:         f64,
    pub beta:          f64,
    pub lambda:        f64,
    pub stabilizer:    f64,
    pub trainer:       TrainerSettings,
    pub is_ed:         bool,
    pub data_dir:      String,
    pub output_dir:    String,
    pub valid_size:    usize,
    pub dims:          ModelDims,
    /// Cross-entropy on raw logits instead of softmax outputs
    pub raw_logits_ce: bool,
    pub offline:       bool,
    pub push_to_hub:   bool,
    pub hub_namespace: String,
    #[serde(skip)]
    pub hub_token:     Option<String>,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            model:         "bert-base-uncased".to_string(),
            alpha:         1.0,
            beta:          1.0,
            lambda:        1.0,
            stabilizer:    1e-2,
            trainer:       TrainerSettings::default(),
            is_ed:         false,
            data_dir:      "data/imdb".to_string(),
            output_dir:    DEFAULT_OUTPUT_DIR.to_string(),
            valid_size:    DEFAULT_VALID_SIZE,
            dims:          ModelDims::default(),
            raw_logits_ce: false,
            offline:       false,
            push_to_hub:   false,
            hub_namespace: DEFAULT_HUB_NAMESPACE.to_string(),
            hub_token:     None,
        }
    }
}

impl TrainConfig {
    pub fn hub_model_id(&self) -> String {
        regularized_model_id(&self.model, self.alpha, self.beta, self.lambda)
    }

    fn hub_target(&self) -> Option<HubTarget> {
        self.push_to_hub
            .then(|| HubTarget::new(&self.hub_namespace, &self.hub_model_id(), self.hub_token.clone()))
    }

    fn model_card(&self) -> ModelCard {
        let t = &self.trainer;
        ModelCard::new("Knowledge Continuity Regularized Network")
            .with_trainer_param("lr", t.learning_rate)
            .with_trainer_param("per_device_batch_size", t.batch_size)
            .with_trainer_param("gradient_accumulation_steps", t.grad_accumulation_steps)
            .with_trainer_param("weight_decay", t.weight_decay)
            .with_trainer_param("seed", t.seed)
            .with_regularization_param("numerical stability denominator constant", self.stabilizer)
            .with_regularization_param("lambda", self.lambda)
            .with_regularization_param("alpha", self.alpha)
            .with_regularization_param("beta", self.beta)
    }
}

// ─── TrainUseCase ─────────────────────────────────────────────────────────────
pub struct TrainUseCase {
    config: TrainConfig,
}

impl TrainUseCase {
    pub fn new(config: TrainConfig) -> Self {
        Self { config }
    }

    /// Train on the GPU backend.
    pub fn execute(&self) -> Result<Vec<EpochSummary>> {
        let device = Default::default();
        self.run::<TrainBackend>(&device)
    }

    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Vec<EpochSummary>> {
        let cfg = &self.config;
        session::check_regularization(cfg.lambda, cfg.stabilizer)?;

        // ── Step 1: Corpus ────────────────────────────────────────────────────
        let splits = session::load_splits(&cfg.data_dir, cfg.valid_size)?;

        // ── Step 2: Tokenizer ─────────────────────────────────────────────────
        let (tokenizer, special) = session::resolve_tokenizer(
            &cfg.model, &cfg.output_dir, &splits.train, cfg.dims.vocab_size, cfg.offline,
        )?;

        // ── Step 3: Model ─────────────────────────────────────────────────────
        let (model_cfg, model) = session::load_or_init_model::<B>(
            &cfg.model, &cfg.dims, tokenizer.get_vocab_size(true), cfg.is_ed, device,
        )?;

        // ── Step 4: Datasets ──────────────────────────────────────────────────
        let encoded = session::encode_corpus(
            &tokenizer, special, model_cfg.max_seq_len, &splits.train, &splits.valid,
        )?;

        // ── Step 5: Configs ───────────────────────────────────────────────────
        let checkpoints = CheckpointManager::new(&cfg.output_dir)?;
        checkpoints.save_config(&model_cfg)?;
        checkpoints.save_run_config(cfg)?;

        // ── Step 6: Wrapper, objective, subscribers ───────────────────────────
        let wrapper = KnowledgeContinuousWrapper::new(
            LayerSampler::new(cfg.alpha, cfg.beta, cfg.trainer.seed)?,
        );
        let objective = Objective::knowledge_continuity(cfg.lambda, cfg.stabilizer)
            .with_softmax_before_ce(!cfg.raw_logits_ce);
        let mut subscribers = session::subscribers(&cfg.output_dir, cfg.model_card(), cfg.hub_target())?;

        // ── Step 7: Train ─────────────────────────────────────────────────────
        tracing::info!(
            "Regularizing with alpha={} beta={} lambda={} stabilizer={}",
            cfg.alpha, cfg.beta, cfg.lambda, cfg.stabilizer
        );
        let trainer = Trainer::new(&cfg.trainer, &objective, &checkpoints);
        let (_, history) = trainer.fit(
            model, wrapper, encoded.train, encoded.valid, &mut subscribers, device,
        )?;
        Ok(history)
    }
}

// ─── Unit Tests ───────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::TestAutodiffBackend;

    #[test]
    fn test_hub_id_and_card() {
        let cfg = TrainConfig {
            model: "org/bert-small".into(),
            alpha: 2.7,
            beta: 1.0,
            lambda: 0.5,
            ..Default::default()
        };
        assert_eq!(cfg.hub_model_id(), "imdb-bert-small-a2b1l0.5");
        assert!(cfg.hub_target().is_none());

        let card = cfg.model_card().render(&[]);
        assert!(card.contains("# Knowledge Continuity Regularized Network"));
        assert!(card.contains("- `lambda` = 0.5"));
    }

    #[test]
    fn test_token_is_not_serialized() {
        let cfg = TrainConfig { hub_token: Some("secret".into()), ..Default::default() };
        let json = serde_json::to_string(&cfg).unwrap();
        assert!(!json.contains("secret"));
    }

    #[test]
    fn test_rejects_non_positive_stabilizer_and_negative_lambda() {
        let data = tempfile::tempdir().unwrap();
        std::fs::write(data.path().join("train.csv"), "text,label\ngreat movie,1\nawful plot,0\n").unwrap();
        std::fs::write(data.path().join("test.csv"), "text,label\nfine acting,1\n").unwrap();
        let out = tempfile::tempdir().unwrap();

        let base = TrainConfig {
            model: "fresh-model".into(),
            data_dir: data.path().to_str().unwrap().into(),
            output_dir: out.path().to_str().unwrap().into(),
            valid_size: 1,
            offline: true,
            ..Default::default()
        };

        let bad_stabilizer = TrainConfig { stabilizer: -1e-6, ..base.clone() };
        let err = TrainUseCase::new(bad_stabilizer).run::<TestAutodiffBackend>(&Default::default()).unwrap_err();
        assert!(err.to_string().contains("Stabilizer"));

        let bad_lambda = TrainConfig { lambda: -10.0, ..base };
        let err = TrainUseCase::new(bad_lambda).run::<TestAutodiffBackend>(&Default::default()).unwrap_err();
        assert!(err.to_string().contains("Lambda"));

        assert!(!out.path().join("model_config.json").exists());
    }

    #[test]
    fn test_end_to_end_on_tiny_corpus() {
        let data = tempfile::tempdir().unwrap();
        std::fs::write(
            data.path().join("train.csv"),
            "text,label\ngreat movie,1\nawful plot,0\nloved it,1\nboring film,0\n",
        ).unwrap();
        std::fs::write(data.path().join("test.csv"), "text,label\nfine acting,1\nweak ending,0\n").unwrap();
        let out = tempfile::tempdir().unwrap();

        let cfg = TrainConfig {
            model: "fresh-model".into(),
            alpha: 2.0,
            beta: 2.0,
            trainer: TrainerSettings { epochs: 1, batch_size: 2, learning_rate: 1e-3, ..Default::default() },
            data_dir: data.path().to_str().unwrap().into(),
            output_dir: out.path().to_str().unwrap().into(),
            valid_size: 2,
            dims: ModelDims { vocab_size: 32, max_seq_len: 8, d_model: 8, num_heads: 2, num_layers: 2, d_ff: 16, dropout: 0.0 },
            offline: true,
            ..Default::default()
        };

        let history = TrainUseCase::new(cfg).run::<TestAutodiffBackend>(&Default::default()).unwrap();
        assert_eq!(history.len(), 1);
        assert!(history[0].train_loss.is_finite());
        for file in ["model_config.json", "run_config.json", "tokenizer.json", "metrics.csv", "README.md"] {
            assert!(out.path().join(file).exists(), "missing {file}");
        }
    }
}
