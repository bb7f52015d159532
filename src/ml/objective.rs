// ============================================================
// Layer 5 — Training Objectives
// ============================================================
//   KnowledgeContinuity  Σ CE + λ · discontinuity (sampled layer)
//   Smoothing            mean CE + adversarial smoothing
//                        (perturbs the embedding output, layer 0)
//   CrossEntropy         mean CE
//
// Evaluation uses the same objective, except Smoothing which
// reports the class loss alone.

use burn::prelude::*;
use burn::tensor::backend::AutodiffBackend;
use serde::{Deserialize, Serialize};

use crate::data::batcher::ClassificationBatch;
use crate::ml::loss::{per_example_cross_entropy, regularized_loss};
use crate::ml::model::TransformerClassifier;
use crate::ml::smoothing::{smoothing_loss, SmoothingSettings};
use crate::ml::wrapper::KnowledgeContinuousWrapper;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ObjectiveKind {
    KnowledgeContinuity { lambda: f64, stabilizer: f64 },
    Smoothing(SmoothingSettings),
    CrossEntropy,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Objective {
    pub kind: ObjectiveKind,
    /// Apply softmax to the logits before the cross-entropy
    pub softmax_before_ce: bool,
}

pub struct LossOutput<B: Backend> {
    /// Scalar objective, shape [1]
    pub loss:   Tensor<B, 1>,
    /// Clean logits, shape [batch, num_classes]
    pub logits: Tensor<B, 2>,
}

impl Objective {
    pub fn knowledge_continuity(lambda: f64, stabilizer: f64) -> Self {
        Self::from_kind(ObjectiveKind::KnowledgeContinuity { lambda, stabilizer })
    }

    pub fn smoothing(settings: SmoothingSettings) -> Self {
        Self::from_kind(ObjectiveKind::Smoothing(settings))
    }

    pub fn cross_entropy() -> Self {
        Self::from_kind(ObjectiveKind::CrossEntropy)
    }

    fn from_kind(kind: ObjectiveKind) -> Self {
        Self { kind, softmax_before_ce: true }
    }

    pub fn with_softmax_before_ce(mut self, enabled: bool) -> Self {
        self.softmax_before_ce = enabled;
        self
    }

    pub fn name(&self) -> &'static str {
        match self.kind {
            ObjectiveKind::KnowledgeContinuity { .. } => "knowledge-continuity",
            ObjectiveKind::Smoothing(_) => "adversarial-smoothing",
            ObjectiveKind::CrossEntropy => "cross-entropy",
        }
    }

    /// Loss used for the optimizer step.
    pub fn train_loss<B: AutodiffBackend>(
        &self,
        model:   &TransformerClassifier<B>,
        wrapper: &mut KnowledgeContinuousWrapper,
        batch:   &ClassificationBatch<B>,
    ) -> LossOutput<B> {
        match self.kind {
            ObjectiveKind::Smoothing(settings) => {
                let out = wrapper.forward(model, batch, Some(0));
                let class_loss = per_example_cross_entropy(
                    out.logits.clone(), batch.labels.clone(), self.softmax_before_ce,
                ).mean();

                let last = model.num_hidden_layers() - 1;
                let mask = batch.attention_mask.clone();
                let forward = |embeddings: Tensor<B, 3>| {
                    model.forward_embeddings(embeddings, mask.clone(), last).1
                };

                let loss = smoothing_loss(
                    class_loss, out.embeddings, out.logits.clone(), forward, &settings,
                );
                LossOutput { loss, logits: out.logits }
            }
            _ => self.eval_loss(model, wrapper, batch),
        }
    }

    /// Loss reported on the validation split.
    pub fn eval_loss<B: Backend>(
        &self,
        model:   &TransformerClassifier<B>,
        wrapper: &mut KnowledgeContinuousWrapper,
        batch:   &ClassificationBatch<B>,
    ) -> LossOutput<B> {
        match self.kind {
            ObjectiveKind::KnowledgeContinuity { lambda, stabilizer } => {
                let out = wrapper.forward(model, batch, None);
                let losses = per_example_cross_entropy(
                    out.logits.clone(), batch.labels.clone(), self.softmax_before_ce,
                );
                let loss = regularized_loss(losses, out.hidden, lambda, stabilizer);
                LossOutput { loss, logits: out.logits }
            }
            ObjectiveKind::Smoothing(_) | ObjectiveKind::CrossEntropy => {
                let logits = model.forward(batch.input_ids.clone(), batch.attention_mask.clone());
                let loss = per_example_cross_entropy(
                    logits.clone(), batch.labels.clone(), self.softmax_before_ce,
                ).mean();
                LossOutput { loss, logits }
            }
        }
    }
}

/// Number of rows whose argmax matches the label.
pub fn correct_predictions<B: Backend>(logits: Tensor<B, 2>, labels: Tensor<B, 1, Int>) -> usize {
    // argmax(1) returns [batch, 1] — flatten before comparing with labels [batch]
    let predicted = logits.argmax(1).flatten::<1>(0, 1);
    predicted.equal(labels).int().sum().into_scalar().elem::<i64>() as usize
}

// ─── Unit Tests ───────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::smoothing::NormType;
    use crate::ml::test_support::{tiny_config, TestAutodiffBackend, TestBackend};
    use crate::ml::wrapper::LayerSampler;

    fn batch<B: Backend>(device: &B::Device) -> ClassificationBatch<B> {
        ClassificationBatch {
            input_ids:      Tensor::from_ints([[3, 4, 5, 0], [6, 7, 0, 0], [8, 9, 10, 11]], device),
            attention_mask: Tensor::from_ints([[1, 1, 1, 0], [1, 1, 0, 0], [1, 1, 1, 1]], device),
            labels:         Tensor::from_ints([1, 0, 1], device),
        }
    }

    fn wrapper() -> KnowledgeContinuousWrapper {
        KnowledgeContinuousWrapper::new(LayerSampler::new(2.0, 2.0, 42).unwrap())
    }

    #[test]
    fn test_zero_lambda_equals_summed_cross_entropy() {
        let device = Default::default();
        let model: TransformerClassifier<TestBackend> = tiny_config().init(&device);
        let batch = batch::<TestBackend>(&device);

        let kd = Objective::knowledge_continuity(0.0, 1e-3).eval_loss(&model, &mut wrapper(), &batch);
        let ce = Objective::cross_entropy().eval_loss(&model, &mut wrapper(), &batch);

        let kd: f32 = kd.loss.into_scalar().elem();
        let ce: f32 = ce.loss.into_scalar().elem();
        assert!((kd - 3.0 * ce).abs() < 1e-4);
    }

    #[test]
    fn test_regularizer_never_lowers_the_loss() {
        let device = Default::default();
        let model: TransformerClassifier<TestBackend> = tiny_config().init(&device);
        let batch = batch::<TestBackend>(&device);

        let plain = Objective::knowledge_continuity(0.0, 1e-3).eval_loss(&model, &mut wrapper(), &batch);
        let heavy = Objective::knowledge_continuity(5.0, 1e-3).eval_loss(&model, &mut wrapper(), &batch);
        let plain: f32 = plain.loss.into_scalar().elem();
        let heavy: f32 = heavy.loss.into_scalar().elem();
        assert!(heavy >= plain);
    }

    #[test]
    fn test_smoothing_train_loss_is_finite() {
        let device = Default::default();
        let model: TransformerClassifier<TestAutodiffBackend> = tiny_config().init(&device);
        let batch = batch::<TestAutodiffBackend>(&device);

        let objective = Objective::smoothing(SmoothingSettings { norm: NormType::L2, ..Default::default() });
        let out = objective.train_loss(&model, &mut wrapper(), &batch);
        let value: f32 = out.loss.into_scalar().elem();
        assert!(value.is_finite());
        assert_eq!(out.logits.dims(), [3, 2]);
    }

    #[test]
    fn test_correct_predictions() {
        let device = Default::default();
        let logits = Tensor::<TestBackend, 2>::from_floats([[0.1, 0.9], [0.8, 0.2], [0.3, 0.7]], &device);
        let labels = Tensor::<TestBackend, 1, Int>::from_ints([1, 1, 1], &device);
        assert_eq!(correct_predictions(logits, labels), 2);
    }

    #[test]
    fn test_objective_serializes_with_tag() {
        let json = serde_json::to_string(&Objective::knowledge_continuity(0.5, 0.01)).unwrap();
        assert!(json.contains("\"type\":\"knowledge_continuity\""));
        let back: Objective = serde_json::from_str(&json).unwrap();
        assert_eq!(back.name(), "knowledge-continuity");
        assert!(back.softmax_before_ce);
    }
}
