// ============================================================
// Layer 4 — Corpus Loader
// ============================================================
// Loads a labelled classification corpus from a local directory.
//
// Two layouts are supported:
//
//   1. CSV files with a header row `text,label`
//        {dir}/train.csv
//        {dir}/test.csv
//
//   2. The aclImdb directory tree (one review per file)
//        {dir}/train/pos/*.txt   → label 1
//        {dir}/train/neg/*.txt   → label 0
//        {dir}/test/pos/*.txt
//        {dir}/test/neg/*.txt
//
// CSV takes precedence when both exist. Files are visited in
// sorted order so a split always loads in the same order.

use anyhow::{Context, Result};
use std::{
    fs,
    path::{Path, PathBuf},
};

use crate::data::preprocessor::Preprocessor;
use crate::domain::example::{Example, Split};
use crate::domain::traits::ExampleSource;

/// Sub-directory name → class index for the aclImdb layout.
const CLASS_DIRS: [(&str, usize); 2] = [("neg", 0), ("pos", 1)];

/// Loads corpus splits from disk and cleans every text.
pub struct CorpusLoader {
    dir: PathBuf,
    preprocessor: Preprocessor,
}

impl CorpusLoader {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            preprocessor: Preprocessor::new(),
        }
    }

    fn load_csv(&self, path: &Path) -> Result<Vec<Example>> {
        let mut rdr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("Cannot open corpus file '{}'", path.display()))?;

        let mut examples = Vec::new();
        for (row, record) in rdr.deserialize::<Example>().enumerate() {
            let example = record
                .with_context(|| format!("Bad row {} in '{}'", row + 1, path.display()))?;
            examples.push(Example::new(self.preprocessor.clean(&example.text), example.label));
        }
        Ok(examples)
    }

    fn load_review_tree(&self, split_dir: &Path) -> Result<Vec<Example>> {
        let mut examples = Vec::new();

        for (class_dir, label) in CLASS_DIRS {
            let dir = split_dir.join(class_dir);
            if !dir.exists() {
                tracing::warn!("Class directory '{}' does not exist — skipping", dir.display());
                continue;
            }

            let mut files: Vec<PathBuf> = fs::read_dir(&dir)
                .with_context(|| format!("Cannot read directory '{}'", dir.display()))?
                .filter_map(|entry| entry.ok().map(|e| e.path()))
                .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("txt"))
                .collect();
            files.sort();

            for path in files {
                let text = fs::read_to_string(&path)
                    .with_context(|| format!("Cannot read '{}'", path.display()))?;
                examples.push(Example::new(self.preprocessor.clean(&text), label));
            }
        }

        Ok(examples)
    }
}

impl ExampleSource for CorpusLoader {
    fn load_split(&self, split: Split) -> Result<Vec<Example>> {
        let csv_path = self.dir.join(format!("{}.csv", split.as_str()));
        let examples = if csv_path.exists() {
            self.load_csv(&csv_path)?
        } else {
            let split_dir = self.dir.join(split.as_str());
            if !split_dir.exists() {
                anyhow::bail!(
                    "No '{}' split under '{}': expected {}.csv or a {}/{{pos,neg}} tree",
                    split.as_str(),
                    self.dir.display(),
                    split.as_str(),
                    split.as_str(),
                );
            }
            self.load_review_tree(&split_dir)?
        };

        tracing::info!(
            "Loaded {} {} examples from '{}'",
            examples.len(),
            split.as_str(),
            self.dir.display()
        );
        Ok(examples)
    }
}
