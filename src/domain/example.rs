// ============================================================
// Layer 3 — Example Domain Type
// ============================================================
// One labelled text example of a classification corpus.
//
// Examples are never edited after they are read. The only
// mutation the system performs on a set of examples is
// appending adversarial examples (see data::adversarial_table).

use serde::{Deserialize, Serialize};

/// A raw text with its class index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Example {
    /// The input text, before any tokenisation
    pub text: String,

    /// Class index, e.g. 0 = negative, 1 = positive
    pub label: usize,
}

impl Example {
    /// Uses impl Into<String> so callers can pass &str or String.
    pub fn new(text: impl Into<String>, label: usize) -> Self {
        Self {
            text: text.into(),
            label,
        }
    }
}

/// Which split of a corpus to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl Split {
    pub fn as_str(&self) -> &'static str {
        match self {
            Split::Train => "train",
            Split::Test => "test",
        }
    }
}

impl std::str::FromStr for Split {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> anyhow::Result<Self> {
        match s {
            "train" => Ok(Split::Train),
            "test" => Ok(Split::Test),
            other => anyhow::bail!("unknown split '{other}', expected 'train' or 'test'"),
        }
    }
}
