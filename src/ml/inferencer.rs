// ============================================================
// Layer 5 — Inferencer
// ============================================================
// Scores raw texts with a trained classifier:
//
//   texts → ExampleEncoder → ClassificationBatcher → forward
//         → softmax → one probability row per text
//
// Used by the attack driver through the TextClassifier trait.

use anyhow::Result;
use burn::{data::dataloader::batcher::Batcher, prelude::*};
use tokenizers::Tokenizer;

use crate::data::{
    batcher::ClassificationBatcher,
    dataset::ClassificationSample,
    encoder::{ExampleEncoder, SpecialTokens},
};
use crate::domain::traits::TextClassifier;
use crate::infra::checkpoint::CheckpointManager;
use crate::infra::tokenizer_store::resolve_special_tokens;
use crate::ml::model::TransformerClassifier;

pub type InferBackend = burn::backend::Wgpu;

const INFER_BATCH_SIZE: usize = 32;

pub struct Inferencer<B: Backend> {
    model:       TransformerClassifier<B>,
    tokenizer:   Tokenizer,
    special:     SpecialTokens,
    max_seq_len: usize,
    device:      B::Device,
}

impl<B: Backend> Inferencer<B> {
    pub fn new(
        model:       TransformerClassifier<B>,
        tokenizer:   Tokenizer,
        special:     SpecialTokens,
        max_seq_len: usize,
        device:      B::Device,
    ) -> Self {
        Self { model, tokenizer, special, max_seq_len, device }
    }

    /// Rebuild the classifier saved in `ckpt_manager` and pair it with `tokenizer`.
    pub fn from_checkpoint(
        ckpt_manager: &CheckpointManager,
        tokenizer:    Tokenizer,
        device:       B::Device,
    ) -> Result<Self> {
        let (cfg, model) = ckpt_manager.restore::<B>(&device)?;
        let special = resolve_special_tokens(&tokenizer)?;
        tracing::info!("Model loaded from '{}'", ckpt_manager.dir().display());
        Ok(Self::new(model, tokenizer, special, cfg.max_seq_len, device))
    }

    pub fn predict_proba(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let encoder = ExampleEncoder::new(&self.tokenizer, self.special, self.max_seq_len);
        let batcher = ClassificationBatcher::<B>::new(self.device.clone());

        let mut rows = Vec::with_capacity(texts.len());
        for chunk in texts.chunks(INFER_BATCH_SIZE) {
            let samples = chunk
                .iter()
                .map(|text| {
                    let (input_ids, attention_mask) = encoder.encode_text(text)?;
                    Ok(ClassificationSample { input_ids, attention_mask, label: 0 })
                })
                .collect::<Result<Vec<_>>>()?;

            let batch  = batcher.batch(samples);
            let logits = self.model.forward(batch.input_ids, batch.attention_mask);
            let [_, num_classes] = logits.dims();

            let probs: Vec<f32> = burn::tensor::activation::softmax(logits, 1)
                .into_data()
                .to_vec::<f32>()
                .map_err(|e| anyhow::anyhow!("Cannot read probabilities: {e:?}"))?;
            rows.extend(probs.chunks(num_classes).map(<[f32]>::to_vec));
        }

        tracing::trace!("Scored {} texts", texts.len());
        Ok(rows)
    }
}

impl<B: Backend> TextClassifier for Inferencer<B> {
    fn predict_proba(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Inferencer::predict_proba(self, texts)
    }
}
