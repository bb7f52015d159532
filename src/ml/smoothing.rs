// ============================================================
// Layer 5 — Adversarial Smoothing Loss
// ============================================================
// Perturbs the embedding output adversarially and penalizes
// the divergence between clean and perturbed predictions.
//
// Phase 1 — seek a direction
//   δ₀  ~ N(0, 1) · 1e-5            (requires grad)
//   z'  = f(h.detach() + δ₀)
//   g   = ∇δ₀ KL(z' ‖ z.detach())   (batch mean)
//   non-finite ‖g‖ → class loss only
//
// Phase 2 — commit
//   δ   = project(δ₀ + g · 1e-3)    (constant)
//   z'' = f(h.detach() + δ)
//   loss = class + 1e-3 · (KL(z'' ‖ z.detach()) + KL(z ‖ z''.detach()))
//
// Only the second forward pass carries gradient to the model.

use std::fmt;
use std::str::FromStr;

use anyhow::bail;
use burn::prelude::*;
use burn::tensor::{backend::AutodiffBackend, Distribution};
use serde::{Deserialize, Serialize};

use crate::ml::loss::{kl_divergence, KlReduction};

/// Unit ball the committed perturbation is projected onto.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NormType {
    L1,
    L2,
    #[default]
    Inf,
}

impl FromStr for NormType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "l1" => Ok(NormType::L1),
            "l2" => Ok(NormType::L2),
            "inf" | "linf" => Ok(NormType::Inf),
            other => bail!("Unknown norm type '{other}' (expected l1, l2 or inf)"),
        }
    }
}

impl fmt::Display for NormType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            NormType::L1 => "l1",
            NormType::L2 => "l2",
            NormType::Inf => "inf",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SmoothingSettings {
    pub norm:           NormType,
    pub noise_scale:    f64,
    pub step_size:      f64,
    pub projection_eps: f64,
    pub weight:         f64,
}

impl Default for SmoothingSettings {
    fn default() -> Self {
        Self {
            norm:           NormType::Inf,
            noise_scale:    1e-5,
            step_size:      1e-3,
            projection_eps: 1e-5,
            weight:         1e-3,
        }
    }
}

/// Normalize `delta` along the embedding dimension.
pub fn project<B: Backend>(delta: Tensor<B, 3>, norm: NormType, eps: f64) -> Tensor<B, 3> {
    let dims = delta.dims();
    match norm {
        NormType::L1 => delta.sign(),
        NormType::L2 => {
            let length = delta.clone().powf_scalar(2.0).sum_dim(2).sqrt().add_scalar(eps);
            delta / length.expand(dims)
        }
        NormType::Inf => {
            let peak = delta.clone().abs().max_dim(2).add_scalar(eps);
            delta / peak.expand(dims)
        }
    }
}

/// Class loss plus the adversarial smoothing penalty.
///
/// `embeddings` and `logits` come from the clean forward pass;
/// `forward` re-runs the network from a (perturbed) embedding tensor.
pub fn smoothing_loss<B, F>(
    class_loss: Tensor<B, 1>,
    embeddings: Tensor<B, 3>,
    logits:     Tensor<B, 2>,
    forward:    F,
    settings:   &SmoothingSettings,
) -> Tensor<B, 1>
where
    B: AutodiffBackend,
    F: Fn(Tensor<B, 3>) -> Tensor<B, 2>,
{
    let clean = embeddings.detach();
    let device = clean.device();

    // ── Phase 1: gradient direction from a random start ──────────────────────
    let noise = Tensor::<B, 3>::random(clean.dims(), Distribution::Normal(0.0, 1.0), &device)
        .mul_scalar(settings.noise_scale)
        .require_grad();

    let adv_logits = forward(clean.clone() + noise.clone());
    let seek_loss = kl_divergence(adv_logits, logits.clone().detach(), KlReduction::BatchMean);
    let grads = seek_loss.backward();

    let Some(direction) = noise.grad(&grads) else {
        tracing::debug!("No gradient reached the perturbation, skipping smoothing term");
        return class_loss;
    };
    let grad_norm: f64 = direction.clone().powf_scalar(2.0).sum().sqrt().into_scalar().elem::<f64>();
    if !grad_norm.is_finite() {
        tracing::debug!("Perturbation gradient norm is {}, skipping smoothing term", grad_norm);
        return class_loss;
    }

    // ── Phase 2: projected step, symmetric KL ─────────────────────────────────
    let delta = noise.inner() + direction.mul_scalar(settings.step_size);
    let delta = Tensor::<B, 3>::from_inner(project(delta, settings.norm, settings.projection_eps));

    let adv_logits = forward(clean + delta);
    let forward_kl  = kl_divergence(adv_logits.clone(), logits.clone().detach(), KlReduction::Sum);
    let backward_kl = kl_divergence(logits, adv_logits.detach(), KlReduction::Sum);

    class_loss + (forward_kl + backward_kl).mul_scalar(settings.weight)
}

// ─── Unit Tests ───────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::test_support::{TestAutodiffBackend, TestBackend};

    type Ad = TestAutodiffBackend;

    fn to_vec<B: Backend, const D: usize>(t: Tensor<B, D>) -> Vec<f32> {
        t.into_data().to_vec::<f32>().unwrap()
    }

    #[test]
    fn test_parse_norm_type() {
        assert_eq!("l2".parse::<NormType>().unwrap(), NormType::L2);
        assert_eq!("INF".parse::<NormType>().unwrap(), NormType::Inf);
        assert!("l3".parse::<NormType>().is_err());
        assert_eq!(NormType::default(), NormType::Inf);
        assert_eq!(NormType::L1.to_string(), "l1");
    }

    #[test]
    fn test_project_l2_has_unit_length() {
        let device = Default::default();
        let delta = Tensor::<TestBackend, 3>::from_floats([[[3.0, 4.0], [0.0, 0.0]]], &device);
        let projected = to_vec(project(delta, NormType::L2, 1e-5));
        let first = (projected[0].powi(2) + projected[1].powi(2)).sqrt();
        assert!(first <= 1.0 + 1e-5);
        assert!(first > 0.99);
        assert_eq!(&projected[2..], &[0.0, 0.0]);
    }

    #[test]
    fn test_project_inf_bounds_largest_component() {
        let device = Default::default();
        let delta = Tensor::<TestBackend, 3>::from_floats([[[-8.0, 2.0, 4.0]]], &device);
        let projected = to_vec(project(delta, NormType::Inf, 1e-5));
        assert!(projected.iter().all(|v| v.abs() <= 1.0));
        assert!((projected[0] + 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_project_l1_takes_sign() {
        let device = Default::default();
        let delta = Tensor::<TestBackend, 3>::from_floats([[[-0.3, 0.0, 7.0]]], &device);
        assert_eq!(to_vec(project(delta, NormType::L1, 1e-5)), vec![-1.0, 0.0, 1.0]);
    }

    // Mean-pool over the sequence, then a fixed linear map to two classes.
    fn linear_head(device: &<Ad as Backend>::Device) -> impl Fn(Tensor<Ad, 3>) -> Tensor<Ad, 2> {
        let weight = Tensor::<Ad, 2>::from_floats([[2.0, -1.0], [0.5, 3.0], [-1.5, 0.2]], device);
        move |emb: Tensor<Ad, 3>| {
            let [n, _, d] = emb.dims();
            emb.mean_dim(1).reshape([n, d]).matmul(weight.clone())
        }
    }

    #[test]
    fn test_smoothing_loss_not_below_class_loss() {
        let device = Default::default();
        let forward = linear_head(&device);
        let embeddings = Tensor::<Ad, 3>::from_floats(
            [[[0.1, 0.4, -0.2], [0.3, 0.0, 0.9]], [[-0.5, 0.2, 0.1], [0.7, -0.3, 0.0]]],
            &device,
        );
        let logits = forward(embeddings.clone());
        let class_loss = Tensor::<Ad, 1>::from_floats([0.6], &device);

        let settings = SmoothingSettings { norm: NormType::L2, ..Default::default() };
        let total = smoothing_loss(class_loss, embeddings, logits, &forward, &settings);
        let value = total.into_scalar().elem::<f32>();
        assert!(value >= 0.6);
        assert!(value.is_finite());
    }

    #[test]
    fn test_non_finite_direction_falls_back_to_class_loss() {
        let device = Default::default();
        let embeddings = Tensor::<Ad, 3>::from_floats([[[0.1, 0.2], [0.3, 0.4]]], &device);
        let logits = Tensor::<Ad, 2>::from_floats([[0.5, -0.5]], &device);
        let class_loss = Tensor::<Ad, 1>::from_floats([0.42], &device);

        let poisoned = |emb: Tensor<Ad, 3>| {
            let [n, _, d] = emb.dims();
            emb.mean_dim(1).reshape([n, d]).mul_scalar(f32::NAN)
        };

        let total = smoothing_loss(class_loss, embeddings, logits, poisoned, &SmoothingSettings::default());
        assert!((total.into_scalar().elem::<f32>() - 0.42).abs() < 1e-7);
    }
}
