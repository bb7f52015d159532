// ============================================================
// Layer 4 — Example Encoder
// ============================================================
// Turns labelled examples into fixed-length token sequences:
//
//   text → tokenizer ids → truncate to max_seq_len → pad with pad_id
//
// The padding id is resolved once when the tokenizer is loaded
// (see infra::tokenizer_store::resolve_special_tokens): a tokenizer
// with a dedicated padding token uses it, one without falls back to
// its end-of-sequence token.

use anyhow::Result;
use tokenizers::Tokenizer;

use crate::data::dataset::ClassificationSample;
use crate::domain::example::Example;

/// Token ids the encoder needs, resolved once per tokenizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecialTokens {
    pub pad_id: u32,
    /// True when `pad_id` is borrowed from the end-of-sequence token
    pub pad_is_eos: bool,
}

pub struct ExampleEncoder<'a> {
    tokenizer:   &'a Tokenizer,
    special:     SpecialTokens,
    max_seq_len: usize,
}

impl<'a> ExampleEncoder<'a> {
    pub fn new(tokenizer: &'a Tokenizer, special: SpecialTokens, max_seq_len: usize) -> Self {
        Self { tokenizer, special, max_seq_len }
    }

    /// Encode a single text to (input_ids, attention_mask).
    pub fn encode_text(&self, text: &str) -> Result<(Vec<u32>, Vec<u32>)> {
        let enc = self
            .tokenizer
            .encode(text, true)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;
        Ok(self.pad(enc.get_ids()))
    }

    /// Encode a whole set of examples, keeping their order.
    pub fn encode_all(&self, examples: &[Example]) -> Result<Vec<ClassificationSample>> {
        let texts: Vec<&str> = examples.iter().map(|e| e.text.as_str()).collect();
        let encodings = self
            .tokenizer
            .encode_batch(texts, true)
            .map_err(|e| anyhow::anyhow!("Tokenisation error: {e}"))?;

        let samples: Vec<ClassificationSample> = encodings
            .iter()
            .zip(examples)
            .map(|(enc, ex)| {
                let (input_ids, attention_mask) = self.pad(enc.get_ids());
                ClassificationSample { input_ids, attention_mask, label: ex.label }
            })
            .collect();

        let truncated = samples.iter().filter(|s| s.token_count() == self.max_seq_len).count();
        tracing::debug!("{} of {} examples fill all {} positions", truncated, samples.len(), self.max_seq_len);
        Ok(samples)
    }

    fn pad(&self, ids: &[u32]) -> (Vec<u32>, Vec<u32>) {
        let mut input_ids: Vec<u32> = ids.iter().copied().take(self.max_seq_len).collect();

        // An empty text still needs one attended position, otherwise
        // every attention score of the row is masked out.
        if input_ids.is_empty() {
            input_ids.push(self.special.pad_id);
        }

        let mut attention_mask = vec![1u32; input_ids.len()];
        while input_ids.len() < self.max_seq_len {
            input_ids.push(self.special.pad_id);
            attention_mask.push(0);
        }
        (input_ids, attention_mask)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::tokenizer_store::{build_word_level, resolve_special_tokens};

    fn tokenizer() -> Tokenizer {
        let corpus = vec!["great movie".to_string(), "bad movie".to_string()];
        build_word_level(&corpus, 100).unwrap()
    }

    #[test]
    fn test_pads_to_max_len() {
        let tok = tokenizer();
        let special = resolve_special_tokens(&tok).unwrap();
        let enc = ExampleEncoder::new(&tok, special, 6);

        let (ids, mask) = enc.encode_text("great movie").unwrap();
        assert_eq!(ids.len(), 6);
        assert_eq!(mask, vec![1, 1, 0, 0, 0, 0]);
        assert_eq!(ids[2], special.pad_id);
    }

    #[test]
    fn test_truncates_long_text() {
        let tok = tokenizer();
        let special = resolve_special_tokens(&tok).unwrap();
        let enc = ExampleEncoder::new(&tok, special, 2);

        let (ids, mask) = enc.encode_text("great bad great movie").unwrap();
        assert_eq!(ids.len(), 2);
        assert_eq!(mask, vec![1, 1]);
    }

    #[test]
    fn test_empty_text_keeps_one_attended_position() {
        let tok = tokenizer();
        let special = resolve_special_tokens(&tok).unwrap();
        let enc = ExampleEncoder::new(&tok, special, 4);

        let (_, mask) = enc.encode_text("").unwrap();
        assert_eq!(mask, vec![1, 0, 0, 0]);
    }

    #[test]
    fn test_encode_all_keeps_labels_and_order() {
        let tok = tokenizer();
        let special = resolve_special_tokens(&tok).unwrap();
        let enc = ExampleEncoder::new(&tok, special, 4);

        let samples = enc
            .encode_all(&[Example::new("great movie", 1), Example::new("bad", 0)])
            .unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].label, 1);
        assert_eq!(samples[1].label, 0);
        assert_eq!(samples[1].token_count(), 1);
    }
}
