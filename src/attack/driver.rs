// ============================================================
// Attack — Driver
// ============================================================
// Runs the greedy search over a list of examples and writes
// one results-table row per example:
//
//   examples → GreedySubstitution → AttackRecord → ResultsWriter
//
// Sequential mode scores with one classifier. Parallel mode
// builds one classifier per rayon thread through the factory,
// then fans each chunk of examples out over them; rows are
// written back in input order once the chunk is done.

use anyhow::{anyhow, bail, Result};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};

use crate::attack::search::{GreedySubstitution, SearchOutcome};
use crate::data::adversarial_table::ResultsWriter;
use crate::domain::adversarial::{AttackOutcome, AttackRecord};
use crate::domain::example::Example;
use crate::domain::traits::TextClassifier;

const PARALLEL_CHUNK: usize = 256;

/// How substituted words are highlighted in the results table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MarkingStyle {
    /// `[[word]]` around changed words in both texts
    #[default]
    File,
    Plain,
}

impl FromStr for MarkingStyle {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(MarkingStyle::File),
            "plain" => Ok(MarkingStyle::Plain),
            other => bail!("Unknown marking style '{other}' (expected file or plain)"),
        }
    }
}

impl fmt::Display for MarkingStyle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MarkingStyle::File => write!(f, "file"),
            MarkingStyle::Plain => write!(f, "plain"),
        }
    }
}

fn mark(words: &[String], changed: &[usize], style: MarkingStyle) -> String {
    words
        .iter()
        .enumerate()
        .map(|(i, w)| match style {
            MarkingStyle::File if changed.contains(&i) => format!("[[{w}]]"),
            _ => w.clone(),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Turn a search result into a results-table row.
pub fn to_record(example: &Example, found: &SearchOutcome, style: MarkingStyle) -> AttackRecord {
    AttackRecord {
        original_text:       mark(&found.original_words, &found.changed, style),
        perturbed_text:      mark(&found.perturbed_words, &found.changed, style),
        ground_truth_output: example.label,
        original_output:     Some(found.original_output),
        perturbed_output:    Some(found.perturbed_output),
        num_queries:         found.num_queries,
        result_type:         found.outcome,
    }
}

/// Outcome counts of one attack run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttackSummary {
    pub successful: usize,
    pub failed:     usize,
    pub skipped:    usize,
    pub queries:    usize,
}

impl AttackSummary {
    pub fn record(&mut self, row: &AttackRecord) {
        match row.result_type {
            AttackOutcome::Successful => self.successful += 1,
            AttackOutcome::Failed => self.failed += 1,
            AttackOutcome::Skipped | AttackOutcome::Other => self.skipped += 1,
        }
        self.queries += row.num_queries;
    }

    pub fn total(&self) -> usize {
        self.successful + self.failed + self.skipped
    }

    /// Share of originally correct examples the attack flipped.
    pub fn success_rate(&self) -> f64 {
        let attacked = self.successful + self.failed;
        if attacked == 0 { 0.0 } else { self.successful as f64 / attacked as f64 }
    }
}

impl fmt::Display for AttackSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let total = self.total().max(1) as f64;
        writeln!(f, "Successful attacks : {}", self.successful)?;
        writeln!(f, "Failed attacks     : {}", self.failed)?;
        writeln!(f, "Skipped attacks    : {}", self.skipped)?;
        writeln!(f, "Original accuracy  : {:.2}%", 100.0 * (self.successful + self.failed) as f64 / total)?;
        writeln!(f, "Accuracy under attack : {:.2}%", 100.0 * self.failed as f64 / total)?;
        writeln!(f, "Attack success rate   : {:.2}%", 100.0 * self.success_rate())?;
        write!(f, "Average queries       : {:.1}", self.queries as f64 / total)
    }
}

pub struct AttackDriver<'a> {
    search:  GreedySubstitution<'a>,
    marking: MarkingStyle,
}

impl<'a> AttackDriver<'a> {
    pub fn new(search: GreedySubstitution<'a>, marking: MarkingStyle) -> Self {
        Self { search, marking }
    }

    fn attack_one<C: TextClassifier + ?Sized>(&self, classifier: &C, example: &Example) -> Result<AttackRecord> {
        let found = self.search.attack(classifier, &example.text, example.label)?;
        Ok(to_record(example, &found, self.marking))
    }

    pub fn run<C: TextClassifier + ?Sized>(
        &self,
        classifier: &C,
        examples:   &[Example],
        writer:     &mut ResultsWriter,
    ) -> Result<AttackSummary> {
        let mut summary = AttackSummary::default();
        for (i, example) in examples.iter().enumerate() {
            let row = self.attack_one(classifier, example)?;
            writer.write(&row)?;
            summary.record(&row);
            log_progress(i + 1, examples.len(), &summary);
        }
        Ok(summary)
    }

    /// Same rows as `run`. One classifier is built per rayon
    /// thread up front; every chunk is split into one contiguous
    /// part per classifier.
    pub fn run_parallel<C, F>(
        &self,
        factory:  F,
        examples: &[Example],
        writer:   &mut ResultsWriter,
    ) -> Result<AttackSummary>
    where
        C: TextClassifier + Send,
        F: Fn() -> Result<C> + Sync + Send,
    {
        let workers = rayon::current_num_threads().max(1);
        let mut classifiers = (0..workers)
            .into_par_iter()
            .map(|_| factory())
            .collect::<Result<Vec<C>>>()
            .map_err(|e| anyhow!("Cannot build worker classifier: {e:#}"))?;
        tracing::info!("Attacking on {} worker threads", classifiers.len());

        let mut summary = AttackSummary::default();
        let mut done = 0;

        for chunk in examples.chunks(PARALLEL_CHUNK) {
            let part_len = chunk.len().div_ceil(classifiers.len());
            let parts: Vec<Result<Vec<AttackRecord>>> = classifiers
                .par_iter_mut()
                .zip(chunk.par_chunks(part_len))
                .map(|(classifier, part)| {
                    part.iter().map(|example| self.attack_one(&*classifier, example)).collect()
                })
                .collect();

            for part in parts {
                for row in part? {
                    writer.write(&row)?;
                    summary.record(&row);
                }
            }
            done += chunk.len();
            log_progress(done, examples.len(), &summary);
        }
        Ok(summary)
    }
}

fn log_progress(done: usize, total: usize, summary: &AttackSummary) {
    if done % 100 == 0 || done == total {
        tracing::info!(
            "[{}/{}] succeeded={} failed={} skipped={}",
            done, total, summary.successful, summary.failed, summary.skipped
        );
    }
}

// ─── Unit Tests ───────────────────────────────────────────────
#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::search::SearchSettings;
    use crate::attack::synonyms::SynonymTable;
    use crate::data::adversarial_table::{read_records, successful_examples};

    /// Positive iff the text contains "good".
    struct GoodDetector;

    impl TextClassifier for GoodDetector {
        fn predict_proba(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
            Ok(texts
                .iter()
                .map(|t| if t.split_whitespace().any(|w| w == "good") { vec![0.1, 0.9] } else { vec![0.9, 0.1] })
                .collect())
        }
    }

    fn examples() -> Vec<Example> {
        vec![
            Example::new("a good film", 1),
            Example::new("a dull film", 1),
            Example::new("good good good", 1),
        ]
    }

    #[test]
    fn test_marking_styles() {
        let words: Vec<String> = vec!["a".into(), "bad".into(), "film".into()];
        assert_eq!(mark(&words, &[1], MarkingStyle::File), "a [[bad]] film");
        assert_eq!(mark(&words, &[1], MarkingStyle::Plain), "a bad film");
        assert_eq!("PLAIN".parse::<MarkingStyle>().unwrap(), MarkingStyle::Plain);
        assert!("html".parse::<MarkingStyle>().is_err());
    }

    #[test]
    fn test_run_writes_one_row_per_example() {
        let table = SynonymTable::parse("good awful");
        let search = GreedySubstitution::new(&table, SearchSettings { query_budget: 20, max_perturb_ratio: 0.4 });
        let driver = AttackDriver::new(search, MarkingStyle::File);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("attack.csv");
        let mut writer = ResultsWriter::create(&path).unwrap();
        let summary = driver.run(&GoodDetector, &examples(), &mut writer).unwrap();
        drop(writer);

        // "good good good": one change of three still leaves "good" in the text.
        assert_eq!((summary.successful, summary.failed, summary.skipped), (1, 1, 1));

        let rows = read_records(&path).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].perturbed_text, "a [[awful]] film");
        assert_eq!(rows[1].result_type, AttackOutcome::Skipped);

        // Markers are stripped when the rows feed retraining.
        assert_eq!(successful_examples(&rows), vec![Example::new("a awful film", 1)]);
    }

    #[test]
    fn test_parallel_rows_match_sequential() {
        let table = SynonymTable::parse("good awful");
        let settings = SearchSettings { query_budget: 20, max_perturb_ratio: 0.4 };
        let driver = AttackDriver::new(GreedySubstitution::new(&table, settings), MarkingStyle::Plain);
        let dir = tempfile::tempdir().unwrap();

        let seq_path = dir.path().join("seq.csv");
        let mut writer = ResultsWriter::create(&seq_path).unwrap();
        driver.run(&GoodDetector, &examples(), &mut writer).unwrap();
        drop(writer);

        let par_path = dir.path().join("par.csv");
        let mut writer = ResultsWriter::create(&par_path).unwrap();
        let summary = driver.run_parallel(|| Ok(GoodDetector), &examples(), &mut writer).unwrap();
        drop(writer);

        assert_eq!(summary.total(), 3);
        assert_eq!(read_records(&seq_path).unwrap(), read_records(&par_path).unwrap());
    }

    #[test]
    fn test_parallel_builds_one_classifier_per_thread() {
        use std::sync::atomic::{AtomicUsize, Ordering};

        let table = SynonymTable::parse("good awful");
        let driver = AttackDriver::new(GreedySubstitution::new(&table, SearchSettings::default()), MarkingStyle::Plain);
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path().join("many.csv")).unwrap();

        let many: Vec<Example> = (0..3 * PARALLEL_CHUNK).map(|i| Example::new(format!("good film {i}"), 1)).collect();
        let built = AtomicUsize::new(0);
        let summary = driver
            .run_parallel(
                || {
                    built.fetch_add(1, Ordering::SeqCst);
                    Ok(GoodDetector)
                },
                &many,
                &mut writer,
            )
            .unwrap();

        assert_eq!(summary.total(), many.len());
        assert_eq!(built.load(Ordering::SeqCst), rayon::current_num_threads().max(1));
    }

    #[test]
    fn test_factory_error_propagates() {
        let table = SynonymTable::parse("good awful");
        let driver = AttackDriver::new(GreedySubstitution::new(&table, SearchSettings::default()), MarkingStyle::File);
        let dir = tempfile::tempdir().unwrap();
        let mut writer = ResultsWriter::create(dir.path().join("x.csv")).unwrap();

        let result = driver.run_parallel(|| -> Result<GoodDetector> { bail!("no model") }, &examples(), &mut writer);
        assert!(result.is_err());
    }

    #[test]
    fn test_summary_rates() {
        let summary = AttackSummary { successful: 3, failed: 1, skipped: 1, queries: 50 };
        assert_eq!(summary.total(), 5);
        assert!((summary.success_rate() - 0.75).abs() < 1e-12);
        assert!(summary.to_string().contains("Successful attacks : 3"));
    }
}
