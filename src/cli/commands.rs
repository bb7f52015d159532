// ============================================================
// Layer 1 — CLI Commands and Arguments
// ============================================================
// Defines the three subcommands and all their flags:
//
//   train      <model> <alpha> <beta> <lambda> <stabilizer>
//              <learning_rate> <weight_decay>
//   adv-train  <model> <base_model> <learning_rate>
//              <weight_decay> <advtrain_file>
//   attack     <split> <model> <base_model> <checkpoint_dir>
//              <output_filename>
//
// clap's derive macros generate help text, missing-argument
// errors and string → number conversion. Every Args struct
// converts into its application-layer config with `From`.

use clap::{Args, Subcommand};

use crate::application::{
    adv_train_use_case::{AdvObjective, AdvTrainConfig},
    attack_use_case::AttackConfig,
    session::ModelDims,
    train_use_case::{TrainConfig, DEFAULT_HUB_NAMESPACE, DEFAULT_OUTPUT_DIR},
};
use crate::attack::driver::MarkingStyle;
use crate::data::splitter::{DEFAULT_VALID_SIZE, SPLIT_SEED};
use crate::domain::example::Split;
use crate::ml::{smoothing::NormType, trainer::TrainerSettings};

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train with the knowledge-continuity regularizer
    Train(TrainArgs),

    /// Retrain a checkpoint on successful adversarial examples
    AdvTrain(AdvTrainArgs),

    /// Run a word-substitution attack against a checkpoint
    Attack(AttackArgs),
}

// ─── Shared flags ─────────────────────────────────────────────────────────────

/// Schedule, corpus, architecture and publishing flags shared by
/// both training commands.
#[derive(Args, Debug)]
pub struct CommonTrainArgs {
    /// Number of full passes through the training data
    #[arg(long, default_value_t = 20)]
    pub epochs: usize,

    /// The model is an encoder-decoder
    #[arg(long)]
    pub is_ed: bool,

    /// Per-device batch size
    #[arg(long, default_value_t = 8)]
    pub batch_size: usize,

    #[arg(long, default_value_t = 2)]
    pub grad_accumulation_steps: usize,

    /// Save weights every N optimizer steps
    #[arg(long, default_value_t = 2000)]
    pub save_steps: usize,

    #[arg(long, default_value_t = 42)]
    pub seed: u64,

    /// Corpus directory (train.csv / test.csv or an aclImdb tree)
    #[arg(long, default_value = "data/imdb")]
    pub data_dir: String,

    #[arg(long, default_value = DEFAULT_OUTPUT_DIR)]
    pub output_dir: String,

    /// Shuffled test examples used for validation
    #[arg(long, default_value_t = DEFAULT_VALID_SIZE)]
    pub valid_size: usize,

    /// Vocabulary size of a newly built tokenizer
    #[arg(long, default_value_t = 30_000)]
    pub vocab_size: usize,

    #[arg(long, default_value_t = 256)]
    pub max_seq_len: usize,

    /// Hidden dimension of a freshly initialised model
    #[arg(long, default_value_t = 256)]
    pub d_model: usize,

    /// d_model must be divisible by num_heads
    #[arg(long, default_value_t = 8)]
    pub num_heads: usize,

    #[arg(long, default_value_t = 6)]
    pub num_layers: usize,

    #[arg(long, default_value_t = 1024)]
    pub d_ff: usize,

    #[arg(long, default_value_t = 0.1)]
    pub dropout: f64,

    /// Cross-entropy on raw logits instead of softmax outputs
    #[arg(long)]
    pub raw_logits_ce: bool,

    /// Never download tokenizers from the hub
    #[arg(long)]
    pub offline: bool,

    /// Push the model card and weights to the hub
    #[arg(long)]
    pub push_to_hub: bool,

    #[arg(long, default_value = DEFAULT_HUB_NAMESPACE)]
    pub hub_namespace: String,

    /// Hub access token
    #[arg(long, env = "HUB_TOKEN", hide_env_values = true)]
    pub hub_token: Option<String>,
}

impl CommonTrainArgs {
    fn trainer(&self, learning_rate: f64, weight_decay: f64) -> TrainerSettings {
        TrainerSettings {
            learning_rate,
            weight_decay,
            epochs:                  self.epochs,
            batch_size:              self.batch_size,
            grad_accumulation_steps: self.grad_accumulation_steps,
            save_steps:              self.save_steps,
            seed:                    self.seed,
            ..Default::default()
        }
    }

    fn dims(&self) -> ModelDims {
        ModelDims {
            vocab_size:  self.vocab_size,
            max_seq_len: self.max_seq_len,
            d_model:     self.d_model,
            num_heads:   self.num_heads,
            num_layers:  self.num_layers,
            d_ff:        self.d_ff,
            dropout:     self.dropout,
        }
    }
}

// ─── train ────────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct TrainArgs {
    /// Checkpoint directory or model name
    pub model: String,

    /// Beta distribution α for choosing the hidden layer
    pub alpha: f64,

    /// Beta distribution β for choosing the hidden layer
    pub beta: f64,

    /// Weight of the regularization term
    pub lambda: f64,

    /// Added to every pairwise distance
    pub stabilizer: f64,

    pub learning_rate: f64,

    pub weight_decay: f64,

    #[command(flatten)]
    pub common: CommonTrainArgs,
}

impl From<TrainArgs> for TrainConfig {
    fn from(a: TrainArgs) -> Self {
        let trainer = a.common.trainer(a.learning_rate, a.weight_decay);
        let dims    = a.common.dims();
        let c       = a.common;
        TrainConfig {
            model:         a.model,
            alpha:         a.alpha,
            beta:          a.beta,
            lambda:        a.lambda,
            stabilizer:    a.stabilizer,
            trainer,
            is_ed:         c.is_ed,
            data_dir:      c.data_dir,
            output_dir:    c.output_dir,
            valid_size:    c.valid_size,
            dims,
            raw_logits_ce: c.raw_logits_ce,
            offline:       c.offline,
            push_to_hub:   c.push_to_hub,
            hub_namespace: c.hub_namespace,
            hub_token:     c.hub_token,
        }
    }
}

// ─── adv-train ────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AdvTrainArgs {
    /// Checkpoint directory of the attacked model
    pub model: String,

    /// Name of the base model
    pub base_model: String,

    pub learning_rate: f64,

    pub weight_decay: f64,

    /// CSV table of adversarial examples
    pub advtrain_file: String,

    /// kd, alum or plain
    #[arg(long, default_value = "kd")]
    pub objective: AdvObjective,

    /// Regularization weight (kd)
    #[arg(long, default_value_t = 1.0)]
    pub lambda: f64,

    /// Distance stabilizer (kd)
    #[arg(long, default_value_t = 1e-2)]
    pub stabilizer: f64,

    /// Perturbation projection: l1, l2 or inf (alum)
    #[arg(long, default_value = "inf")]
    pub norm: NormType,

    #[command(flatten)]
    pub common: CommonTrainArgs,
}

impl From<AdvTrainArgs> for AdvTrainConfig {
    fn from(a: AdvTrainArgs) -> Self {
        let trainer = a.common.trainer(a.learning_rate, a.weight_decay);
        let dims    = a.common.dims();
        let c       = a.common;
        AdvTrainConfig {
            model:         a.model,
            base_model:    a.base_model,
            advtrain_file: a.advtrain_file,
            objective:     a.objective,
            lambda:        a.lambda,
            stabilizer:    a.stabilizer,
            norm:          a.norm,
            trainer,
            is_ed:         c.is_ed,
            data_dir:      c.data_dir,
            output_dir:    c.output_dir,
            valid_size:    c.valid_size,
            dims,
            raw_logits_ce: c.raw_logits_ce,
            offline:       c.offline,
            push_to_hub:   c.push_to_hub,
            hub_namespace: c.hub_namespace,
            hub_token:     c.hub_token,
        }
    }
}

// ─── attack ───────────────────────────────────────────────────────────────────

#[derive(Args, Debug)]
pub struct AttackArgs {
    /// train or test
    pub split: Split,

    /// Checkpoint directory of the model under attack
    pub model: String,

    /// Name of the base model (tokenizer fallback)
    pub base_model: String,

    /// Directory for attack progress
    pub checkpoint_dir: String,

    /// Name of the output file (without .csv)
    pub output_filename: String,

    /// file ([[word]] around substitutions) or plain
    #[arg(long, default_value = "file")]
    pub marking_style: MarkingStyle,

    #[arg(long, default_value_t = 300)]
    pub query_budget: usize,

    #[arg(long, default_value_t = 5000)]
    pub num_examples: usize,

    /// Largest share of words that may be substituted
    #[arg(long, default_value_t = 0.3)]
    pub max_perturb_ratio: f64,

    /// One classifier per worker thread
    #[arg(long)]
    pub parallel: bool,

    /// Synonym table: one `word candidate...` entry per line
    #[arg(long, default_value = "synonyms.txt")]
    pub synonyms: String,

    #[arg(long, default_value = "data/imdb")]
    pub data_dir: String,

    #[arg(long, default_value_t = SPLIT_SEED)]
    pub seed: u64,

    #[arg(long)]
    pub offline: bool,
}

impl From<AttackArgs> for AttackConfig {
    fn from(a: AttackArgs) -> Self {
        AttackConfig {
            split:             a.split,
            model:             a.model,
            base_model:        a.base_model,
            checkpoint_dir:    a.checkpoint_dir,
            output_filename:   a.output_filename,
            marking_style:     a.marking_style,
            query_budget:      a.query_budget,
            num_examples:      a.num_examples,
            max_perturb_ratio: a.max_perturb_ratio,
            parallel:          a.parallel,
            synonyms:          a.synonyms,
            data_dir:          a.data_dir,
            seed:              a.seed,
            offline:           a.offline,
        }
    }
}
