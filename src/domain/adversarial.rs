// ============================================================
// Layer 3 — Adversarial Attack Records
// ============================================================
// One row of the adversarial-results table. The attack driver
// writes these rows; the adversarial retraining workflow reads
// them back and keeps only the Successful ones.
//
// Column names follow the common attack-log layout so tables
// produced by other attack tools can be consumed as well:
//
//   original_text, perturbed_text, ground_truth_output,
//   original_output, perturbed_output, num_queries, result_type

use serde::{Deserialize, Deserializer, Serialize};

use crate::domain::example::Example;

/// Outcome of the adversarial search for one example.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum AttackOutcome {
    /// A perturbation flipped the prediction within the constraints
    Successful,
    /// The query budget or the candidates ran out without a flip
    Failed,
    /// The model already misclassified the clean example
    Skipped,
    /// Any other label another tool may write (never used for training)
    Other,
}

impl From<String> for AttackOutcome {
    fn from(raw: String) -> Self {
        match raw.trim() {
            "Successful" => AttackOutcome::Successful,
            "Failed" => AttackOutcome::Failed,
            "Skipped" => AttackOutcome::Skipped,
            _ => AttackOutcome::Other,
        }
    }
}

/// A full attack-log row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackRecord {
    #[serde(default)]
    pub original_text: String,

    pub perturbed_text: String,

    #[serde(deserialize_with = "deserialize_class_index")]
    pub ground_truth_output: usize,

    #[serde(default, deserialize_with = "deserialize_optional_class_index")]
    pub original_output: Option<usize>,

    #[serde(default, deserialize_with = "deserialize_optional_class_index")]
    pub perturbed_output: Option<usize>,

    #[serde(default)]
    pub num_queries: usize,

    pub result_type: AttackOutcome,
}

impl AttackRecord {
    pub fn is_successful(&self) -> bool {
        self.result_type == AttackOutcome::Successful
    }

    /// The training example this row contributes when it is a
    /// successful attack: the perturbed text with the true label.
    pub fn to_example(&self) -> Example {
        Example::new(strip_markers(&self.perturbed_text), self.ground_truth_output)
    }
}

/// Remove the `[[word]]` highlighting some attack logs put
/// around substituted words.
pub fn strip_markers(text: &str) -> String {
    text.replace("[[", "").replace("]]", "")
}

// Class indices are sometimes logged as floats ("1.0").
fn parse_class_index(raw: &str) -> Result<usize, String> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<usize>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v >= 0.0 && v.fract() == 0.0 => Ok(v as usize),
        _ => Err(format!("invalid class index '{raw}'")),
    }
}

fn deserialize_class_index<'de, D>(deserializer: D) -> Result<usize, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_class_index(&raw).map_err(serde::de::Error::custom)
}

fn deserialize_optional_class_index<'de, D>(deserializer: D) -> Result<Option<usize>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw {
        Some(s) if !s.trim().is_empty() => parse_class_index(&s)
            .map(Some)
            .map_err(serde::de::Error::custom),
        _ => Ok(None),
    }
}
