// ============================================================
// Attack — Synonym Table
// ============================================================
// Substitution candidates for the word-substitution search.
//
// File format, one entry per line:
//
//   good fine decent nice
//   movie film picture
//   # comments and blank lines are ignored
//
// The first word is the key, the rest are its candidates. Commas
// may be used instead of spaces. Keys are matched lowercase.

use anyhow::{Context, Result};
use std::{collections::HashMap, fs, path::Path};

#[derive(Debug, Clone, Default)]
pub struct SynonymTable {
    entries: HashMap<String, Vec<String>>,
}

impl SynonymTable {
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Cannot read synonym table '{}'", path.display()))?;
        let table = Self::parse(&content);
        tracing::info!("Loaded {} synonym entries from '{}'", table.len(), path.display());
        Ok(table)
    }

    pub fn parse(content: &str) -> Self {
        let mut entries: HashMap<String, Vec<String>> = HashMap::new();
        for line in content.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let mut words = line
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|w| !w.is_empty());
            let Some(key) = words.next() else { continue };
            let key = key.to_lowercase();

            let candidates = entries.entry(key.clone()).or_default();
            for word in words {
                if word.to_lowercase() != key && !candidates.iter().any(|c| c == word) {
                    candidates.push(word.to_string());
                }
            }
        }
        entries.retain(|_, v| !v.is_empty());
        Self { entries }
    }

    /// Candidates for `word`; punctuation around the word is ignored.
    pub fn candidates(&self, word: &str) -> &[String] {
        let key = core_word(word).to_lowercase();
        self.entries.get(&key).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// The word without leading/trailing punctuation.
pub fn core_word(word: &str) -> &str {
    word.trim_matches(|c: char| !c.is_alphanumeric())
}
