// ============================================================
// Layer 5 — Knowledge-Continuity Wrapper
// ============================================================
// Wraps the classifier so a forward pass returns the hidden
// state of one intermediate layer alongside the logits.
//
// Candidate layers (L of them, see num_hidden_layers):
//   0            embedding output
//   1..=E        encoder block outputs
//   E+1..        decoder block outputs (encoder-decoder mode)
//
// Layer selection per forward pass:
//   u   ~ Beta(alpha, beta)
//   idx = min(floor(u * L), L - 1)
//
// alpha = beta = 1 fixes the layer to the last candidate.
// A deterministic index overrides the draw (index 0 gives the
// embedding output, which the smoothing loss perturbs).

use anyhow::Result;
use burn::prelude::*;
use rand::{rngs::StdRng, SeedableRng};
use rand_distr::{Beta, Distribution};

use crate::data::batcher::ClassificationBatch;
use crate::ml::model::{HiddenOutput, TransformerClassifier};

/// Draws the layer index used for the hidden state.
#[derive(Debug, Clone)]
pub struct LayerSampler {
    /// None when alpha = beta = 1 (fixed last layer)
    dist: Option<Beta<f64>>,
    rng:  StdRng,
}

impl LayerSampler {
    pub fn new(alpha: f64, beta: f64, seed: u64) -> Result<Self> {
        let dist = if alpha == 1.0 && beta == 1.0 {
            None
        } else {
            Some(Beta::new(alpha, beta).map_err(|e| {
                anyhow::anyhow!("Invalid Beta({alpha}, {beta}) for layer sampling: {e}")
            })?)
        };
        Ok(Self { dist, rng: StdRng::seed_from_u64(seed) })
    }

    /// Pick a layer index in 0..num_layers.
    pub fn sample(&mut self, num_layers: usize) -> usize {
        let last = num_layers.saturating_sub(1);
        match &self.dist {
            None => last,
            Some(dist) => {
                let u = dist.sample(&mut self.rng);
                ((u * num_layers as f64).floor() as usize).min(last)
            }
        }
    }
}

pub struct KnowledgeContinuousWrapper {
    sampler: LayerSampler,
}

impl KnowledgeContinuousWrapper {
    pub fn new(sampler: LayerSampler) -> Self {
        Self { sampler }
    }

    /// Forward pass returning (hidden state, logits).
    /// `deterministic_idx` bypasses the Beta draw.
    pub fn forward<B: Backend>(
        &mut self,
        model:             &TransformerClassifier<B>,
        batch:             &ClassificationBatch<B>,
        deterministic_idx: Option<usize>,
    ) -> HiddenOutput<B> {
        let num_layers = model.num_hidden_layers();
        let layer = match deterministic_idx {
            Some(idx) => idx.min(num_layers - 1),
            None => self.sampler.sample(num_layers),
        };
        tracing::trace!("Hidden state taken from layer {}/{}", layer, num_layers);

        model.forward_with_layer(batch.input_ids.clone(), batch.attention_mask.clone(), layer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{tiny_config, TestBackend};

    #[test]
    fn test_uniform_parameters_fix_last_layer() {
        let mut sampler = LayerSampler::new(1.0, 1.0, 42).unwrap();
        for _ in 0..20 {
            assert_eq!(sampler.sample(5), 4);
        }
    }

    #[test]
    fn test_samples_stay_in_range() {
        let mut sampler = LayerSampler::new(0.5, 2.0, 7).unwrap();
        for _ in 0..500 {
            assert!(sampler.sample(4) < 4);
        }
    }

    #[test]
    fn test_skewed_beta_prefers_late_layers() {
        let mut sampler = LayerSampler::new(20.0, 1.0, 3).unwrap();
        let late = (0..200).filter(|_| sampler.sample(10) >= 7).count();
        assert!(late > 180);
    }

    #[test]
    fn test_same_seed_same_layers() {
        let mut a = LayerSampler::new(2.0, 5.0, 11).unwrap();
        let mut b = LayerSampler::new(2.0, 5.0, 11).unwrap();
        let xs: Vec<usize> = (0..50).map(|_| a.sample(7)).collect();
        let ys: Vec<usize> = (0..50).map(|_| b.sample(7)).collect();
        assert_eq!(xs, ys);
    }

    #[test]
    fn test_invalid_parameters_rejected() {
        assert!(LayerSampler::new(0.0, 1.0, 0).is_err());
        assert!(LayerSampler::new(1.0, -2.0, 0).is_err());
    }

    #[test]
    fn test_deterministic_index_overrides_sampling() {
        let device = Default::default();
        let model: TransformerClassifier<TestBackend> = tiny_config().init(&device);
        let batch = ClassificationBatch {
            input_ids: Tensor::<TestBackend, 2, Int>::from_ints([[3, 4, 0]], &device),
            attention_mask: Tensor::<TestBackend, 2, Int>::from_ints([[1, 1, 0]], &device),
            labels: Tensor::<TestBackend, 1, Int>::from_ints([1], &device),
        };

        let mut wrapper = KnowledgeContinuousWrapper::new(LayerSampler::new(1.0, 1.0, 0).unwrap());
        let out = wrapper.forward(&model, &batch, Some(0));

        // Layer 0 is the pooled embedding output.
        let expected = crate::ml::model::masked_mean(out.embeddings.clone(), batch.attention_mask.clone());
        let diff: f32 = (out.hidden - expected).abs().sum().into_scalar().elem::<f32>();
        assert!(diff < 1e-6);
    }
}
