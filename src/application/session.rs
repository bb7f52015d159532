// ============================================================
// Layer 2 — Training Session
// ============================================================
// Steps shared by the training workflows:
//
//   Step 1: Load the corpus and split it    (Layer 4 - data)
//   Step 2: Resolve the tokenizer           (Layer 6 - infra)
//   Step 3: Encode examples into datasets   (Layer 4 - data)
//   Step 4: Restore or initialise the model (Layer 5 / 6)
//   Step 5: Build the epoch subscribers     (Layer 6 - infra)
//
// A `model` argument that names a checkpoint directory (one
// holding model_config.json) is restored from it; any other name
// starts a freshly initialised classifier of `ModelDims`.

use anyhow::Result;
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::Path;
use tokenizers::Tokenizer;

use crate::data::{
    dataset::ClassificationDataset,
    encoder::{ExampleEncoder, SpecialTokens},
    loader::CorpusLoader,
    splitter::{split_dataset, DatasetSplits, SPLIT_SEED},
};
use crate::domain::{
    example::{Example, Split},
    traits::{EpochSubscriber, ExampleSource},
};
use crate::infra::{
    checkpoint::CheckpointManager,
    hub::HubTarget,
    metrics::MetricsLogger,
    model_card::{ModelCard, ModelCardWriter},
    tokenizer_store::{resolve_special_tokens, TokenizerStore},
};
use crate::ml::model::{ClassifierConfig, TransformerClassifier};

/// Architecture of a freshly initialised classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelDims {
    pub vocab_size:  usize,
    pub max_seq_len: usize,
    pub d_model:     usize,
    pub num_heads:   usize,
    pub num_layers:  usize,
    pub d_ff:        usize,
    pub dropout:     f64,
}

impl Default for ModelDims {
    fn default() -> Self {
        Self {
            vocab_size:  30_000,
            max_seq_len: 256,
            d_model:     256,
            num_heads:   8,
            num_layers:  6,
            d_ff:        1024,
            dropout:     0.1,
        }
    }
}

impl ModelDims {
    /// Encoder-decoder models get one decoder block per encoder block.
    pub fn classifier_config(&self, vocab_size: usize, is_ed: bool) -> ClassifierConfig {
        ClassifierConfig::new(
            vocab_size,
            self.max_seq_len,
            self.d_model,
            self.num_heads,
            self.num_layers,
            self.d_ff,
            self.dropout,
        )
        .with_num_decoder_layers(if is_ed { self.num_layers } else { 0 })
    }
}

/// Tokenised train / validation sets ready for the trainer.
pub struct EncodedCorpus {
    pub train: ClassificationDataset,
    pub valid: ClassificationDataset,
}

/// The discontinuity score needs ε > 0 to stay finite; λ < 0 would
/// reward discontinuity.
pub fn check_regularization(lambda: f64, stabilizer: f64) -> Result<()> {
    anyhow::ensure!(
        stabilizer.is_finite() && stabilizer > 0.0,
        "Stabilizer must be a positive number, got {stabilizer}"
    );
    anyhow::ensure!(
        lambda.is_finite() && lambda >= 0.0,
        "Lambda must be a non-negative number, got {lambda}"
    );
    Ok(())
}

/// Step 1: train split plus the seeded validation cut of the test split.
pub fn load_splits(data_dir: &str, valid_size: usize) -> Result<DatasetSplits<Example>> {
    tracing::info!("Loading corpus from '{}'", data_dir);
    let loader = CorpusLoader::new(data_dir);
    let train  = loader.load_split(Split::Train)?;
    let test   = loader.load_split(Split::Test)?;

    let splits = split_dataset(train, test, valid_size, SPLIT_SEED);
    tracing::info!(
        "Split: {} train, {} validation, {} test",
        splits.train.len(), splits.valid.len(), splits.test.len()
    );
    Ok(splits)
}

/// Step 2. The tokenizer is saved into `output_dir`.
pub fn resolve_tokenizer(
    model:      &str,
    output_dir: &str,
    train:      &[Example],
    vocab_size: usize,
    offline:    bool,
) -> Result<(Tokenizer, SpecialTokens)> {
    let corpus: Vec<String> = train.iter().map(|e| e.text.clone()).collect();
    let mut store = TokenizerStore::new(output_dir);
    if offline {
        store = store.offline();
    }
    let tokenizer = store.resolve(model, &corpus, vocab_size)?;
    let special   = resolve_special_tokens(&tokenizer)?;
    Ok((tokenizer, special))
}

/// Step 3. `max_seq_len` must not exceed the model's position table.
pub fn encode_corpus(
    tokenizer:   &Tokenizer,
    special:     SpecialTokens,
    max_seq_len: usize,
    train:       &[Example],
    valid:       &[Example],
) -> Result<EncodedCorpus> {
    let encoder = ExampleEncoder::new(tokenizer, special, max_seq_len);
    let train   = ClassificationDataset::new(encoder.encode_all(train)?);
    let valid   = ClassificationDataset::new(encoder.encode_all(valid)?);
    tracing::info!("Encoded {} train / {} validation samples", train.sample_count(), valid.sample_count());
    Ok(EncodedCorpus { train, valid })
}

pub fn is_checkpoint_dir(model: &str) -> bool {
    Path::new(model).join("model_config.json").exists()
}

/// Step 4.
pub fn load_or_init_model<B: Backend>(
    model:      &str,
    dims:       &ModelDims,
    vocab_size: usize,
    is_ed:      bool,
    device:     &B::Device,
) -> Result<(ClassifierConfig, TransformerClassifier<B>)> {
    if is_checkpoint_dir(model) {
        let checkpoints = CheckpointManager::open(model)?;
        if !checkpoints.has_weights() {
            anyhow::bail!("Checkpoint '{}' has a model config but no saved weights", model);
        }
        let (config, classifier) = checkpoints.restore::<B>(device)?;
        if config.vocab_size < vocab_size {
            anyhow::bail!(
                "Checkpoint '{}' has {} embeddings but the tokenizer has {} tokens",
                model, config.vocab_size, vocab_size
            );
        }
        tracing::info!("Continuing from checkpoint '{}'", model);
        return Ok((config, classifier));
    }

    let config = dims.classifier_config(vocab_size, is_ed);
    tracing::info!(
        "Initialising '{}': {} encoder / {} decoder blocks, d_model={}",
        model, config.num_layers, config.num_decoder_layers, config.d_model
    );
    let classifier = config.init::<B>(device);
    Ok((config, classifier))
}

/// Step 5: metrics CSV and model card (pushed when `target` is set).
pub fn subscribers(
    output_dir: &str,
    card:       ModelCard,
    target:     Option<HubTarget>,
) -> Result<Vec<Box<dyn EpochSubscriber>>> {
    if let Some(target) = &target {
        tracing::info!("Publishing to '{}'", target.repo_id);
    }
    Ok(vec![
        Box::new(MetricsLogger::new(output_dir)?),
        Box::new(ModelCardWriter::new(card, output_dir, target)),
    ])
}

// ─── Unit Tests ───────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::TestBackend;

    fn write_corpus(dir: &Path) {
        std::fs::write(
            dir.join("train.csv"),
            "text,label\ngreat movie,1\nawful plot,0\nloved it,1\nboring film,0\n",
        ).unwrap();
        std::fs::write(
            dir.join("test.csv"),
            "text,label\nfine acting,1\nweak ending,0\nsolid cast,1\n",
        ).unwrap();
    }

    fn tiny_dims() -> ModelDims {
        ModelDims { vocab_size: 64, max_seq_len: 8, d_model: 8, num_heads: 2, num_layers: 2, d_ff: 16, dropout: 0.0 }
    }

    #[test]
    fn test_regularization_bounds() {
        assert!(check_regularization(0.0, 1e-2).is_ok());
        assert!(check_regularization(0.5, 1e-6).is_ok());
        assert!(check_regularization(0.5, 0.0).is_err());
        assert!(check_regularization(0.5, -1e-6).is_err());
        assert!(check_regularization(-10.0, 1e-2).is_err());
        assert!(check_regularization(f64::NAN, 1e-2).is_err());
    }

    #[test]
    fn test_load_splits_cuts_validation_from_test() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());

        let splits = load_splits(dir.path().to_str().unwrap(), 2).unwrap();
        assert_eq!(splits.train.len(), 4);
        assert_eq!(splits.valid.len(), 2);
        assert_eq!(splits.test.len(), 1);
    }

    #[test]
    fn test_tokenizer_is_saved_and_corpus_encoded() {
        let dir = tempfile::tempdir().unwrap();
        write_corpus(dir.path());
        let out = dir.path().join("out");
        let splits = load_splits(dir.path().to_str().unwrap(), 2).unwrap();

        let (tokenizer, special) = resolve_tokenizer(
            dir.path().join("no-model").to_str().unwrap(),
            out.to_str().unwrap(),
            &splits.train,
            64,
            true,
        ).unwrap();
        assert!(out.join("tokenizer.json").exists());

        let encoded = encode_corpus(&tokenizer, special, 8, &splits.train, &splits.valid).unwrap();
        assert_eq!(encoded.train.sample_count(), 4);
        assert_eq!(encoded.valid.sample_count(), 2);
    }

    #[test]
    fn test_fresh_model_uses_dims_and_encoder_decoder_flag() {
        let device = Default::default();
        let (config, model) = load_or_init_model::<TestBackend>("fresh", &tiny_dims(), 20, true, &device).unwrap();
        assert_eq!(config.vocab_size, 20);
        assert_eq!(config.num_decoder_layers, 2);
        assert_eq!(model.num_hidden_layers(), 5);
    }

    #[test]
    fn test_checkpoint_directory_is_restored() {
        let dir = tempfile::tempdir().unwrap();
        let device = Default::default();
        let config = tiny_dims().classifier_config(20, false);
        let ckpt = CheckpointManager::new(dir.path()).unwrap();
        ckpt.save_config(&config).unwrap();
        ckpt.save_epoch(&config.init::<TestBackend>(&device), 1).unwrap();

        let model_arg = dir.path().to_str().unwrap();
        assert!(is_checkpoint_dir(model_arg));
        let (restored, _) = load_or_init_model::<TestBackend>(model_arg, &tiny_dims(), 20, false, &device).unwrap();
        assert_eq!(restored.d_model, 8);

        // A larger tokenizer than the checkpoint's embedding table is rejected.
        assert!(load_or_init_model::<TestBackend>(model_arg, &tiny_dims(), 50, false, &device).is_err());
    }
}
