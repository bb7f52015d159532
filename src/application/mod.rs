// ============================================================
// Layer 2 — Application / Use Cases
// ============================================================
// This layer orchestrates all the other layers to accomplish
// one workflow (training, retraining or attacking).
//
// Rules for this layer:
//   - No ML math or model code here
//   - No printing here (that's Layer 1)
//   - No direct file parsing (that's Layer 4 and 6)
//   - Only workflow coordination
//
// Think of this layer as the "director": it tells the other
// layers what to do but doesn't do the work itself.

// Steps shared by the training workflows
pub mod session;

// Knowledge-continuity regularized training
pub mod train_use_case;

// Retraining on successful adversarial examples
pub mod adv_train_use_case;

// Word-substitution attack against a checkpoint
pub mod attack_use_case;
