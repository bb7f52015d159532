// ============================================================
// Layer 3 — Domain Layer
// ============================================================
// Plain Rust structs and traits describing what the system
// works with: labelled examples, attack outcomes and the
// per-epoch records the trainer emits.
//
// Rules for this layer:
//   - NO Burn framework types allowed here
//   - NO file I/O or network calls
//   - Only plain Rust structs, enums, and traits

// A labelled text example
pub mod example;

// Attack outcomes read from / written to the results table
pub mod adversarial;

// Per-epoch training summaries
pub mod epoch;

// Core abstractions (traits) that other layers implement
pub mod traits;
