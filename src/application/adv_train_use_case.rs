// ============================================================
// Layer 2 — AdvTrainUseCase
// ============================================================
// Adversarial retraining:
//
//   Step 1: Load and split the corpus            (Layer 4 - data)
//   Step 2: Append the successful attacks of the
//           results table to the training set    (Layer 4 - data)
//   Step 3: Resolve the tokenizer                (Layer 6 - infra)
//   Step 4: Restore the attacked model           (Layer 5 / 6)
//   Step 5: Encode, save configs, train          (Layer 4 / 5 / 6)
//
// The hidden layer is fixed (α = β = 1). The objective is
// selectable: knowledge continuity, adversarial smoothing or
// plain cross-entropy.

use anyhow::Result;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};
use std::{fmt, path::Path, str::FromStr};

use crate::application::{
    session::{self, ModelDims},
    train_use_case::{DEFAULT_HUB_NAMESPACE, DEFAULT_OUTPUT_DIR},
};
use crate::data::{adversarial_table::augment_from_file, splitter::DEFAULT_VALID_SIZE};
use crate::domain::epoch::EpochSummary;
use crate::infra::{
    checkpoint::CheckpointManager,
    hub::{adviter_model_id, HubTarget},
    model_card::ModelCard,
    tokenizer_store::TOKENIZER_FILE,
};
use crate::ml::{
    objective::Objective,
    smoothing::{NormType, SmoothingSettings},
    trainer::{TrainBackend, Trainer, TrainerSettings},
    wrapper::{KnowledgeContinuousWrapper, LayerSampler},
};

/// Loss used while retraining.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdvObjective {
    /// Σ CE + λ · discontinuity
    #[default]
    Kd,
    /// CE + adversarial smoothing of the embedding output
    Alum,
    /// CE only
    Plain,
}

impl FromStr for AdvObjective {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "kd" => Ok(AdvObjective::Kd),
            "alum" => Ok(AdvObjective::Alum),
            "plain" => Ok(AdvObjective::Plain),
            other => anyhow::bail!("Unknown objective '{other}' (expected kd, alum or plain)"),
        }
    }
}

impl fmt::Display for AdvObjective {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            AdvObjective::Kd => "kd",
            AdvObjective::Alum => "alum",
            AdvObjective::Plain => "plain",
        };
        write!(f, "{name}")
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdvTrainConfig {
    /// Checkpoint directory of the model that was attacked
    pub model:         String,
    /// Base model name; names the hub repo and supplies the
    /// tokenizer when the checkpoint has none
    pub base_model:    String,
    pub advtrain_file: String,
    pub objective:     AdvObjective,
    pub lambda:        f64,
    pub stabilizer:    f64,
    pub norm:          NormType,
    pub trainer:       TrainerSettings,
    pub is_ed:         bool,
    pub data_dir:      String,
    pub output_dir:    String,
    pub valid_size:    usize,
    pub dims:          ModelDims,
    pub raw_logits_ce: bool,
    pub offline:       bool,
    pub push_to_hub:   bool,
    pub hub_namespace: String,
    #[serde(skip)]
    pub hub_token:     Option<String>,
}

impl Default for AdvTrainConfig {
    fn default() -> Self {
        Self {
            model:         DEFAULT_OUTPUT_DIR.to_string(),
            base_model:    "bert-base-uncased".to_string(),
            advtrain_file: "attack.csv".to_string(),
            objective:     AdvObjective::default(),
            lambda:        1.0,
            stabilizer:    1e-2,
            norm:          NormType::default(),
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

impl AdvTrainConfig {
    pub fn hub_model_id(&self) -> String {
        adviter_model_id(&self.base_model)
    }

    fn hub_target(&self) -> Option<HubTarget> {
        self.push_to_hub
            .then(|| HubTarget::new(&self.hub_namespace, &self.hub_model_id(), self.hub_token.clone()))
    }

    fn build_objective(&self) -> Objective {
        let objective = match self.objective {
            AdvObjective::Kd => Objective::knowledge_continuity(self.lambda, self.stabilizer),
            AdvObjective::Alum => Objective::smoothing(SmoothingSettings { norm: self.norm, ..Default::default() }),
            AdvObjective::Plain => Objective::cross_entropy(),
        };
        objective.with_softmax_before_ce(!self.raw_logits_ce)
    }

    fn model_card(&self) -> ModelCard {
        let t = &self.trainer;
        ModelCard::new("Adversarial Training Through Iterations")
            .with_trainer_param("lr", t.learning_rate)
            .with_trainer_param("per_device_batch_size", t.batch_size)
            .with_trainer_param("gradient_accumulation_steps", t.grad_accumulation_steps)
            .with_trainer_param("weight_decay", t.weight_decay)
            .with_trainer_param("seed", t.seed)
            .with_trainer_param("objective", self.objective)
    }

    /// The checkpoint's own tokenizer wins over the base model's.
    fn tokenizer_source(&self) -> &str {
        if Path::new(&self.model).join(TOKENIZER_FILE).exists() {
            &self.model
        } else {
            &self.base_model
        }
    }
}

pub struct AdvTrainUseCase {
    config: AdvTrainConfig,
}

impl AdvTrainUseCase {
    pub fn new(config: AdvTrainConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<Vec<EpochSummary>> {
        let device = Default::default();
        self.run::<TrainBackend>(&device)
    }

    pub fn run<B: AutodiffBackend>(&self, device: &B::Device) -> Result<Vec<EpochSummary>> {
        let cfg = &self.config;
        if cfg.objective == AdvObjective::Kd {
            session::check_regularization(cfg.lambda, cfg.stabilizer)?;
        }

        // ── Step 1: Corpus ────────────────────────────────────────────────────
        let mut splits = session::load_splits(&cfg.data_dir, cfg.valid_size)?;

        // ── Step 2: Adversarial examples ──────────────────────────────────────
        let before = splits.train.len();
        augment_from_file(&mut splits.train, &cfg.advtrain_file)?;
        tracing::info!("Training set grew from {} to {} examples", before, splits.train.len());

        // ── Step 3: Tokenizer ─────────────────────────────────────────────────
        let (tokenizer, special) = session::resolve_tokenizer(
            cfg.tokenizer_source(), &cfg.output_dir, &splits.train, cfg.dims.vocab_size, cfg.offline,
        )?;

        // ── Step 4: Model ─────────────────────────────────────────────────────
        if !session::is_checkpoint_dir(&cfg.model) {
            tracing::warn!("'{}' is not a checkpoint directory, retraining a fresh model", cfg.model);
        }
        let (model_cfg, model) = session::load_or_init_model::<B>(
            &cfg.model, &cfg.dims, tokenizer.get_vocab_size(true), cfg.is_ed, device,
        )?;

        // ── Step 5: Encode, save, train ───────────────────────────────────────
        let encoded = session::encode_corpus(
            &tokenizer, special, model_cfg.max_seq_len, &splits.train, &splits.valid,
        )?;

        let checkpoints = CheckpointManager::new(&cfg.output_dir)?;
        checkpoints.save_config(&model_cfg)?;
        checkpoints.save_run_config(cfg)?;

        let wrapper   = KnowledgeContinuousWrapper::new(LayerSampler::new(1.0, 1.0, cfg.trainer.seed)?);
        let objective = cfg.build_objective();
        let mut subscribers = session::subscribers(&cfg.output_dir, cfg.model_card(), cfg.hub_target())?;

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
    use crate::ml::objective::ObjectiveKind;
    use crate::ml::test_support::TestAutodiffBackend;

    #[test]
    fn test_objective_selection() {
        let mut cfg = AdvTrainConfig { lambda: 0.3, ..Default::default() };
        assert!(matches!(cfg.build_objective().kind, ObjectiveKind::KnowledgeContinuity { lambda, .. } if lambda == 0.3));

        cfg.objective = "alum".parse().unwrap();
        cfg.norm = NormType::L2;
        match cfg.build_objective().kind {
            ObjectiveKind::Smoothing(settings) => assert_eq!(settings.norm, NormType::L2),
            other => panic!("unexpected objective {other:?}"),
        }

        cfg.objective = AdvObjective::Plain;
        cfg.raw_logits_ce = true;
        let objective = cfg.build_objective();
        assert_eq!(objective.kind, ObjectiveKind::CrossEntropy);
        assert!(!objective.softmax_before_ce);

        assert!("fgsm".parse::<AdvObjective>().is_err());
    }

    #[test]
    fn test_hub_id_uses_base_model() {
        let cfg = AdvTrainConfig { base_model: "gpt2".into(), ..Default::default() };
        assert_eq!(cfg.hub_model_id(), "gpt2-adviter");
    }

    #[test]
    fn test_kd_objective_rejects_negative_lambda() {
        let cfg = AdvTrainConfig { lambda: -1.0, ..Default::default() };
        let err = AdvTrainUseCase::new(cfg).run::<TestAutodiffBackend>(&Default::default()).unwrap_err();
        assert!(err.to_string().contains("Lambda"));

        let cfg = AdvTrainConfig { stabilizer: 0.0, ..Default::default() };
        let err = AdvTrainUseCase::new(cfg).run::<TestAutodiffBackend>(&Default::default()).unwrap_err();
        assert!(err.to_string().contains("Stabilizer"));
    }

    #[test]
    fn test_retraining_appends_successful_attacks() {
        let data = tempfile::tempdir().unwrap();
        std::fs::write(
            data.path().join("train.csv"),
            "text,label\ngreat movie,1\nawful plot,0\n",
        ).unwrap();
        std::fs::write(data.path().join("test.csv"), "text,label\nfine acting,1\nweak ending,0\n").unwrap();
        let table = data.path().join("attack.csv");
        std::fs::write(
            &table,
            "perturbed_text,ground_truth_output,result_type\n\
             [[decent]] movie,1,Successful\n\
             dull plot,0,Failed\n",
        ).unwrap();
        let out = tempfile::tempdir().unwrap();

        let cfg = AdvTrainConfig {
            model: data.path().join("missing-checkpoint").to_str().unwrap().into(),
            advtrain_file: table.to_str().unwrap().into(),
            objective: AdvObjective::Alum,
            trainer: TrainerSettings { epochs: 1, batch_size: 4, learning_rate: 1e-3, ..Default::default() },
            data_dir: data.path().to_str().unwrap().into(),
            output_dir: out.path().to_str().unwrap().into(),
            valid_size: 2,
            dims: ModelDims { vocab_size: 32, max_seq_len: 8, d_model: 8, num_heads: 2, num_layers: 1, d_ff: 16, dropout: 0.0 },
            offline: true,
            ..Default::default()
        };

        let history = AdvTrainUseCase::new(cfg).run::<TestAutodiffBackend>(&Default::default()).unwrap();
        assert_eq!(history.len(), 1);

        // 2 original + 1 successful attack: one optimizer step with batch 4.
        assert_eq!(history[0].step, 1);
        let tokenizer = crate::infra::tokenizer_store::TokenizerStore::new(out.path()).load().unwrap();
        assert!(tokenizer.token_to_id("decent").is_some());
    }
}
