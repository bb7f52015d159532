// ============================================================
// Layer 1 — CLI / Presentation Layer
// ============================================================
// This is the entry point for all user interaction.
// It uses the `clap` crate to parse command line arguments.
// All business logic is delegated to Layer 2 (application).
//
// Three commands are supported:
//   1. `train`     — knowledge-continuity regularized training
//   2. `adv-train` — retraining on successful adversarial examples
//   3. `attack`    — word-substitution attack, writes the results table

pub mod commands;

use anyhow::Result;
use clap::Parser;
use commands::{AdvTrainArgs, AttackArgs, Commands, TrainArgs};

#[derive(Parser, Debug)]
#[command(
    name = "kc-regularizer",
    version,
    about = "Knowledge-continuity regularized text classifiers, adversarial attacks and retraining."
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

impl Cli {
    /// Dispatch to the matching use case. The CLI layer only
    /// routes and prints.
    pub fn run(self) -> Result<()> {
        match self.command {
            Commands::Train(args)    => run_train(args),
            Commands::AdvTrain(args) => run_adv_train(args),
            Commands::Attack(args)   => run_attack(args),
        }
    }
}

fn run_train(args: TrainArgs) -> Result<()> {
    use crate::application::train_use_case::TrainUseCase;

    tracing::info!("Starting regularized training of '{}'", args.model);
    let history = TrainUseCase::new(args.into()).execute()?;

    if let Some(last) = history.last() {
        println!(
            "Training complete. Final eval_loss={:.4} eval_accuracy={:.1}%",
            last.eval_loss, last.eval_accuracy * 100.0
        );
    }
    Ok(())
}

fn run_adv_train(args: AdvTrainArgs) -> Result<()> {
    use crate::application::adv_train_use_case::AdvTrainUseCase;

    tracing::info!("Starting adversarial retraining of '{}' with '{}'", args.model, args.advtrain_file);
    let history = AdvTrainUseCase::new(args.into()).execute()?;

    if let Some(last) = history.last() {
        println!(
            "Retraining complete. Final eval_loss={:.4} eval_accuracy={:.1}%",
            last.eval_loss, last.eval_accuracy * 100.0
        );
    }
    Ok(())
}

fn run_attack(args: AttackArgs) -> Result<()> {
    use crate::application::attack_use_case::AttackUseCase;

    tracing::info!("Attacking '{}' on the {} split", args.model, args.split.as_str());
    let summary = AttackUseCase::new(args.into()).execute()?;
    println!("\n{summary}");
    Ok(())
}
