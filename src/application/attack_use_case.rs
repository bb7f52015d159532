// ============================================================
// Layer 2 — AttackUseCase
// ============================================================
// Attacks a trained checkpoint and writes the results table:
//
//   Step 1: Load the split, shuffle (seeded), keep num_examples
//   Step 2: Find the tokenizer (checkpoint dir, base model, hub)
//   Step 3: Load the synonym table
//   Step 4: Run the attack driver, rows flushed into
//           <checkpoint_dir>/<output_filename>.csv
//   Step 5: Copy the finished table to <output_filename>.csv

use anyhow::{Context, Result};
use burn::prelude::*;
use serde::{Deserialize, Serialize};
use std::{fs, path::{Path, PathBuf}};
use tokenizers::Tokenizer;

use crate::attack::{
    driver::{AttackDriver, AttackSummary, MarkingStyle},
    search::{GreedySubstitution, SearchSettings},
    synonyms::SynonymTable,
};
use crate::data::{
    adversarial_table::ResultsWriter,
    loader::CorpusLoader,
    splitter::{shuffle_with_seed, SPLIT_SEED},
};
use crate::domain::{example::Split, traits::ExampleSource};
use crate::infra::{
    checkpoint::CheckpointManager,
    tokenizer_store::{TokenizerStore, TOKENIZER_FILE},
};
use crate::ml::inferencer::{InferBackend, Inferencer};

const ATTACK_CONFIG_FILE: &str = "attack_config.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttackConfig {
    pub split:             Split,
    /// Checkpoint directory of the model under attack
    pub model:             String,
    pub base_model:        String,
    /// Where the results table is written while the attack runs
    pub checkpoint_dir:    String,
    /// Final table is `<output_filename>.csv`
    pub output_filename:   String,
    pub marking_style:     MarkingStyle,
    pub query_budget:      usize,
    pub num_examples:      usize,
    pub max_perturb_ratio: f64,
    pub parallel:          bool,
    pub synonyms:          String,
    pub data_dir:          String,
    pub seed:              u64,
    pub offline:           bool,
}

impl Default for AttackConfig {
    fn default() -> Self {
        let search = SearchSettings::default();
        Self {
            split:             Split::Test,
            model:             "imdb-kd-regularized".to_string(),
            base_model:        "bert-base-uncased".to_string(),
            checkpoint_dir:    "attack-checkpoints".to_string(),
            output_filename:   "attack".to_string(),
            marking_style:     MarkingStyle::File,
            query_budget:      search.query_budget,
            num_examples:      5000,
            max_perturb_ratio: search.max_perturb_ratio,
            parallel:          false,
            synonyms:          "synonyms.txt".to_string(),
            data_dir:          "data/imdb".to_string(),
            seed:              SPLIT_SEED,
            offline:           false,
        }
    }
}

impl AttackConfig {
    pub fn results_path(&self) -> PathBuf {
        Path::new(&self.checkpoint_dir).join(format!("{}.csv", table_stem(&self.output_filename)))
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(format!("{}.csv", self.output_filename))
    }
}

fn table_stem(output_filename: &str) -> &str {
    Path::new(output_filename)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(output_filename)
}

pub struct AttackUseCase {
    config: AttackConfig,
}

impl AttackUseCase {
    pub fn new(config: AttackConfig) -> Self {
        Self { config }
    }

    pub fn execute(&self) -> Result<AttackSummary> {
        let device = Default::default();
        self.run::<InferBackend>(&device)
    }

    pub fn run<B: Backend>(&self, device: &B::Device) -> Result<AttackSummary> {
        let cfg = &self.config;

        // ── Step 1: Examples ──────────────────────────────────────────────────
        let mut examples = CorpusLoader::new(&cfg.data_dir).load_split(cfg.split)?;
        shuffle_with_seed(&mut examples, cfg.seed);
        examples.truncate(cfg.num_examples);
        tracing::info!("Attacking {} {} examples", examples.len(), cfg.split.as_str());

        // ── Step 2: Tokenizer and checkpoint ──────────────────────────────────
        let tokenizer   = self.find_tokenizer()?;
        let checkpoints = CheckpointManager::open(&cfg.model)?;

        // ── Step 3: Synonyms ──────────────────────────────────────────────────
        let synonyms = SynonymTable::from_path(&cfg.synonyms)?;
        if synonyms.is_empty() {
            tracing::warn!("Synonym table '{}' is empty, every attack will fail", cfg.synonyms);
        }

        // ── Step 4: Attack ────────────────────────────────────────────────────
        fs::create_dir_all(&cfg.checkpoint_dir)
            .with_context(|| format!("Cannot create '{}'", cfg.checkpoint_dir))?;
        fs::write(
            Path::new(&cfg.checkpoint_dir).join(ATTACK_CONFIG_FILE),
            serde_json::to_string_pretty(cfg)?,
        )?;

        let results_path = cfg.results_path();
        let mut writer = ResultsWriter::create(&results_path)?;
        let search = GreedySubstitution::new(
            &synonyms,
            SearchSettings { query_budget: cfg.query_budget, max_perturb_ratio: cfg.max_perturb_ratio },
        );
        let driver = AttackDriver::new(search, cfg.marking_style);

        let summary = if cfg.parallel {
            let factory = || Inferencer::<B>::from_checkpoint(&checkpoints, tokenizer.clone(), device.clone());
            driver.run_parallel(factory, &examples, &mut writer)?
        } else {
            let classifier = Inferencer::<B>::from_checkpoint(&checkpoints, tokenizer, device.clone())?;
            driver.run(&classifier, &examples, &mut writer)?
        };
        drop(writer);

        // ── Step 5: Final table ───────────────────────────────────────────────
        let output_path = cfg.output_path();
        if output_path != results_path {
            fs::copy(&results_path, &output_path).with_context(|| {
                format!("Cannot copy '{}' to '{}'", results_path.display(), output_path.display())
            })?;
        }
        tracing::info!("Attack results written to '{}'", output_path.display());
        Ok(summary)
    }

    fn find_tokenizer(&self) -> Result<Tokenizer> {
        let cfg = &self.config;
        let mut store = TokenizerStore::new(&cfg.model);
        if store_has_tokenizer(&cfg.model) {
            return store.load();
        }
        if cfg.offline {
            store = store.offline();
        }
        store
            .find(&cfg.base_model)?
            .with_context(|| format!("No tokenizer found for '{}' or '{}'", cfg.model, cfg.base_model))
    }
}

fn store_has_tokenizer(dir: &str) -> bool {
    Path::new(dir).join(TOKENIZER_FILE).exists()
}
