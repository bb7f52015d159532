// ============================================================
// Attack Driver
// ============================================================
// Black-box word-substitution attacks against a TextClassifier.
//
//   synonyms.rs — substitution candidates per word
//   search.rs   — budgeted greedy search for one example
//   driver.rs   — runs the search over a split, writes the
//                 results table (sequential or rayon)

pub mod synonyms;

pub mod search;

pub mod driver;
