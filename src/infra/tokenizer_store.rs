// ============================================================
// Layer 6 — Tokenizer Store
// ============================================================
// Resolves the tokenizer for a model name, in this order:
//
//   1. <model>/tokenizer.json      (model is a local directory)
//   2. <output dir>/tokenizer.json (an earlier run)
//   3. tokenizer.json downloaded from the model hub (hf-hub)
//   4. a word-level vocabulary built from the training texts
//
// Whatever is resolved is saved into the output directory so
// a checkpoint directory is self-contained.
//
// The word-level tokenizer is written as tokenizer JSON and
// loaded back, bypassing the trainer ModelWrapper type mismatch
// of tokenizers 0.15.

use anyhow::{Context, Result};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    str::FromStr,
};
use tokenizers::Tokenizer;

use crate::data::encoder::SpecialTokens;

pub const TOKENIZER_FILE: &str = "tokenizer.json";

const SPECIAL_TOKENS: [&str; 4] = ["[PAD]", "[UNK]", "[CLS]", "[SEP]"];
const PAD_CANDIDATES: [&str; 3] = ["[PAD]", "<pad>", "<|pad|>"];
const EOS_CANDIDATES: [&str; 4] = ["</s>", "<|endoftext|>", "<eos>", "[SEP]"];

pub struct TokenizerStore {
    dir:            PathBuf,
    allow_download: bool,
}

impl TokenizerStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into(), allow_download: true }
    }

    /// Skip the hub lookup (offline runs, tests).
    pub fn offline(mut self) -> Self {
        self.allow_download = false;
        self
    }

    pub fn resolve(&self, model: &str, corpus: &[String], vocab_size: usize) -> Result<Tokenizer> {
        let tokenizer = self.resolve_inner(model, corpus, vocab_size)?;
        self.save(&tokenizer)?;
        Ok(tokenizer)
    }

    fn resolve_inner(&self, model: &str, corpus: &[String], vocab_size: usize) -> Result<Tokenizer> {
        if let Some(tokenizer) = self.find(model)? {
            return Ok(tokenizer);
        }
        tracing::info!("Building word-level tokenizer (vocab_size={})", vocab_size);
        build_word_level(corpus, vocab_size)
    }

    /// Look for an existing tokenizer (steps 1 to 3) without building one.
    pub fn find(&self, model: &str) -> Result<Option<Tokenizer>> {
        let local = Path::new(model).join(TOKENIZER_FILE);
        if local.exists() {
            tracing::info!("Using tokenizer from '{}'", local.display());
            return load(&local).map(Some);
        }

        let saved = self.dir.join(TOKENIZER_FILE);
        if saved.exists() {
            tracing::info!("Loading existing tokenizer from '{}'", saved.display());
            return load(&saved).map(Some);
        }

        if self.allow_download {
            match download(model) {
                Ok(path) => {
                    tracing::info!("Downloaded tokenizer for '{}'", model);
                    return load(&path).map(Some);
                }
                Err(e) => tracing::warn!("No hub tokenizer for '{}': {:#}", model, e),
            }
        }
        Ok(None)
    }

    /// Load the tokenizer saved next to a checkpoint.
    pub fn load(&self) -> Result<Tokenizer> {
        load(&self.dir.join(TOKENIZER_FILE))
    }

    pub fn save(&self, tokenizer: &Tokenizer) -> Result<()> {
        std::fs::create_dir_all(&self.dir)
            .with_context(|| format!("Cannot create '{}'", self.dir.display()))?;
        let path = self.dir.join(TOKENIZER_FILE);
        tokenizer
            .save(&path, true)
            .map_err(|e| anyhow::anyhow!("Cannot write tokenizer to '{}': {}", path.display(), e))
    }
}

fn load(path: &Path) -> Result<Tokenizer> {
    Tokenizer::from_file(path)
        .map_err(|e| anyhow::anyhow!("Cannot load tokenizer from '{}': {}", path.display(), e))
}

fn download(model: &str) -> Result<PathBuf> {
    let api = hf_hub::api::sync::Api::new().context("Failed to initialise hub API")?;
    api.model(model.to_string())
        .get(TOKENIZER_FILE)
        .with_context(|| format!("Download of {TOKENIZER_FILE} for '{model}' failed"))
}

/// Word-level tokenizer over the most frequent corpus words.
///
/// Ids are contiguous: [PAD]=0, [UNK]=1, [CLS]=2, [SEP]=3, then
/// words by descending frequency (ties alphabetical). No special
/// tokens are added when encoding.
pub fn build_word_level(corpus: &[String], vocab_size: usize) -> Result<Tokenizer> {
    // ── Step 1: Word frequencies ──────────────────────────────────────────────
    let mut freq: HashMap<String, usize> = HashMap::new();
    for text in corpus {
        for word in text.split_whitespace() {
            let w = word.to_lowercase();
            let w = w.trim_matches(|c: char| !c.is_alphanumeric());
            if !w.is_empty() {
                *freq.entry(w.to_string()).or_insert(0) += 1;
            }
        }
    }

    let mut words: Vec<(String, usize)> = freq.into_iter().collect();
    words.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    words.truncate(vocab_size.saturating_sub(SPECIAL_TOKENS.len()));

    // ── Step 2: Vocab ─────────────────────────────────────────────────────────
    let mut vocab = serde_json::Map::new();
    let mut added_tokens = Vec::new();
    for (id, token) in SPECIAL_TOKENS.iter().enumerate() {
        vocab.insert(token.to_string(), serde_json::json!(id));
        added_tokens.push(serde_json::json!({
            "id": id, "content": token, "single_word": false, "lstrip": false,
            "rstrip": false, "normalized": false, "special": true
        }));
    }
    for (word, _) in &words {
        if !vocab.contains_key(word) {
            let id = vocab.len();
            vocab.insert(word.clone(), serde_json::json!(id));
        }
    }

    // ── Step 3: Tokenizer JSON ────────────────────────────────────────────────
    let tokenizer_json = serde_json::json!({
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": added_tokens,
        "normalizer": {
            "type": "BertNormalizer",
            "clean_text": true,
            "handle_chinese_chars": true,
            "strip_accents": null,
            "lowercase": true
        },
        "pre_tokenizer": { "type": "Whitespace" },
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": vocab,
            "unk_token": "[UNK]"
        }
    });

    tracing::debug!("Word-level vocabulary holds {} entries", vocab_len(&tokenizer_json));
    Tokenizer::from_str(&tokenizer_json.to_string())
        .map_err(|e| anyhow::anyhow!("Cannot build word-level tokenizer: {e}"))
}

fn vocab_len(tokenizer_json: &serde_json::Value) -> usize {
    tokenizer_json["model"]["vocab"].as_object().map_or(0, |v| v.len())
}

/// Padding id of a tokenizer; tokenizers without a padding
/// token pad with their end-of-sequence token.
pub fn resolve_special_tokens(tokenizer: &Tokenizer) -> Result<SpecialTokens> {
    if let Some(pad_id) = PAD_CANDIDATES.iter().find_map(|t| tokenizer.token_to_id(t)) {
        return Ok(SpecialTokens { pad_id, pad_is_eos: false });
    }
    if let Some(pad_id) = EOS_CANDIDATES.iter().find_map(|t| tokenizer.token_to_id(t)) {
        tracing::info!("Tokenizer has no padding token, padding with end-of-sequence id {}", pad_id);
        return Ok(SpecialTokens { pad_id, pad_is_eos: true });
    }
    anyhow::bail!("Tokenizer has neither a padding nor an end-of-sequence token")
}
