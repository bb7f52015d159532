// ============================================================
// Attack — Greedy Word-Substitution Search
// ============================================================
// Budgeted black-box search against a TextClassifier.
//
//   1. Score the clean text (1 query). Already wrong → Skipped.
//   2. Rank words by deletion importance: the drop in the
//      true-class probability when the word is removed
//      (1 query per word).
//   3. Walk the words in importance order. Try every synonym
//      of the word (1 query each):
//        - a candidate that flips the prediction → Successful
//          (the one with the lowest true-class probability)
//        - otherwise keep the candidate that lowers the true-class
//          probability most, if it lowers it at all
//   4. Stop with Failed when the query budget is spent, the
//      candidates run out, or one more substitution would exceed
//      max_perturb_ratio of the words.

use anyhow::{ensure, Result};

use crate::attack::synonyms::{core_word, SynonymTable};
use crate::domain::adversarial::AttackOutcome;
use crate::domain::traits::TextClassifier;

#[derive(Debug, Clone, Copy)]
pub struct SearchSettings {
    pub query_budget:      usize,
    pub max_perturb_ratio: f64,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self { query_budget: 300, max_perturb_ratio: 0.3 }
    }
}

/// Result of attacking one text.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub outcome:          AttackOutcome,
    /// Words of the original text
    pub original_words:   Vec<String>,
    /// Words after substitution (same length as original_words)
    pub perturbed_words:  Vec<String>,
    /// Indices of substituted words
    pub changed:          Vec<usize>,
    pub original_output:  usize,
    pub perturbed_output: usize,
    pub num_queries:      usize,
}

/// Counts model queries against the budget.
struct QueryCounter<'a, C: TextClassifier + ?Sized> {
    classifier: &'a C,
    used:       usize,
    budget:     usize,
}

impl<'a, C: TextClassifier + ?Sized> QueryCounter<'a, C> {
    fn remaining(&self) -> usize {
        self.budget.saturating_sub(self.used)
    }

    /// Scores at most `remaining()` texts, in order.
    fn query(&mut self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        let take = texts.len().min(self.remaining());
        if take == 0 {
            return Ok(Vec::new());
        }
        let rows = self.classifier.predict_proba(&texts[..take])?;
        ensure!(rows.len() == take, "Classifier returned {} rows for {} texts", rows.len(), take);
        self.used += take;
        Ok(rows)
    }
}

pub fn argmax(row: &[f32]) -> usize {
    row.iter()
        .enumerate()
        .fold((0, f32::NEG_INFINITY), |best, (i, &p)| if p > best.1 { (i, p) } else { best })
        .0
}

fn prob_of(row: &[f32], label: usize) -> f32 {
    row.get(label).copied().unwrap_or(0.0)
}

pub struct GreedySubstitution<'a> {
    synonyms: &'a SynonymTable,
    settings: SearchSettings,
}

impl<'a> GreedySubstitution<'a> {
    pub fn new(synonyms: &'a SynonymTable, settings: SearchSettings) -> Self {
        Self { synonyms, settings }
    }

    pub fn attack<C: TextClassifier + ?Sized>(
        &self,
        classifier: &C,
        text:       &str,
        label:      usize,
    ) -> Result<SearchOutcome> {
        let words: Vec<String> = text.split_whitespace().map(str::to_string).collect();
        let mut counter = QueryCounter { classifier, used: 0, budget: self.settings.query_budget.max(1) };

        // ── Step 1: Clean prediction ──────────────────────────────────────────
        let clean = counter.query(&[words.join(" ")])?;
        let clean = clean.first().cloned().unwrap_or_default();
        let original_output = argmax(&clean);

        let mut result = SearchOutcome {
            outcome:          AttackOutcome::Failed,
            original_words:   words.clone(),
            perturbed_words:  words.clone(),
            changed:          Vec::new(),
            original_output,
            perturbed_output: original_output,
            num_queries:      0,
        };

        if original_output != label {
            result.outcome = AttackOutcome::Skipped;
            result.num_queries = counter.used;
            return Ok(result);
        }

        // ── Step 2: Deletion importance ───────────────────────────────────────
        let order = self.rank_words(&mut counter, &words, label, prob_of(&clean, label))?;

        // ── Step 3: Substitute in importance order ────────────────────────────
        let max_changes = ((words.len() as f64) * self.settings.max_perturb_ratio).floor() as usize;
        let mut current_prob = prob_of(&clean, label);

        for idx in order {
            if result.changed.len() + 1 > max_changes.max(1) || counter.remaining() == 0 {
                break;
            }
            let core = core_word(&words[idx]);
            let candidates = self.synonyms.candidates(&words[idx]);
            if core.is_empty() || candidates.is_empty() {
                continue;
            }

            let variants: Vec<String> = candidates
                .iter()
                .map(|c| words[idx].replacen(core, c, 1))
                .collect();
            let texts: Vec<String> = variants
                .iter()
                .map(|v| {
                    let mut trial = result.perturbed_words.clone();
                    trial[idx] = v.clone();
                    trial.join(" ")
                })
                .collect();
            let rows = counter.query(&texts)?;

            let best_flip = rows
                .iter()
                .enumerate()
                .filter(|(_, row)| argmax(row) != label)
                .min_by(|a, b| prob_of(a.1, label).total_cmp(&prob_of(b.1, label)));

            if let Some((i, row)) = best_flip {
                result.perturbed_words[idx] = variants[i].clone();
                result.changed.push(idx);
                result.perturbed_output = argmax(row);
                result.outcome = AttackOutcome::Successful;
                break;
            }

            let best = rows
                .iter()
                .enumerate()
                .min_by(|a, b| prob_of(a.1, label).total_cmp(&prob_of(b.1, label)));
            if let Some((i, row)) = best {
                if prob_of(row, label) < current_prob {
                    current_prob = prob_of(row, label);
                    result.perturbed_words[idx] = variants[i].clone();
                    result.changed.push(idx);
                }
            }
        }

        result.num_queries = counter.used;
        tracing::trace!(
            "Attack {:?} after {} queries, {} words changed",
            result.outcome, result.num_queries, result.changed.len()
        );
        Ok(result)
    }

    /// Word indices, most important first. Words that could not be
    /// scored within the budget keep their text order at the end.
    fn rank_words<C: TextClassifier + ?Sized>(
        &self,
        counter: &mut QueryCounter<'_, C>,
        words:   &[String],
        label:   usize,
        clean:   f32,
    ) -> Result<Vec<usize>> {
        // Only words with candidates are worth a query.
        let scorable: Vec<usize> = (0..words.len())
            .filter(|&i| !self.synonyms.candidates(&words[i]).is_empty())
            .collect();

        let deleted: Vec<String> = scorable
            .iter()
            .map(|&i| {
                words.iter()
                    .enumerate()
                    .filter(|&(j, _)| j != i)
                    .map(|(_, w)| w.as_str())
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        let rows = counter.query(&deleted)?;

        let mut scored: Vec<(usize, f32)> = scorable
            .iter()
            .zip(&rows)
            .map(|(&i, row)| (i, clean - prob_of(row, label)))
            .collect();
        scored.sort_by(|a, b| b.1.total_cmp(&a.1));

        let mut order: Vec<usize> = scored.iter().map(|&(i, _)| i).collect();
        order.extend(scorable.iter().skip(rows.len()));
        Ok(order)
    }
}
