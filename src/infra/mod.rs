// ============================================================
// Layer 6 — Infrastructure Layer
// ============================================================
// Cross-cutting concerns used by several workflows:
//
//   checkpoint.rs      — model weights (CompactRecorder), model
//                        config and run config as JSON
//   tokenizer_store.rs — resolves the tokenizer (model dir, hub
//                        download, or a word-level vocabulary)
//                        and the padding token
//   metrics.rs         — per-epoch metrics CSV
//   model_card.rs      — README.md model card, rewritten every epoch
//   hub.rs             — model-hub REST publisher

/// Model checkpoint saving and loading
pub mod checkpoint;

/// Tokenizer resolution, saving, and loading
pub mod tokenizer_store;

/// Training metrics CSV logger
pub mod metrics;

/// Model card rendering and publishing
pub mod model_card;

/// Model-hub publisher
pub mod hub;
