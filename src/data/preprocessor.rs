// ============================================================
// Layer 4 — Text Preprocessor
// ============================================================
// Cleans raw review text before tokenisation.
//
// Movie-review corpora scraped from the web often contain:
//   - HTML line breaks ("<br />", "<br/>", "<br>")
//   - Non-breaking and zero-width spaces
//   - Tabs, carriage returns and stray control characters
//   - Runs of spaces
//
// Cleaning steps (applied in order):
//   1. Replace HTML line breaks with a space
//   2. Map Unicode whitespace variants and control characters to a space
//   3. Collapse every whitespace run into one space and trim
//
// Classification inputs are single sequences, so line structure
// is not preserved.

const LINE_BREAK_TAGS: [&str; 4] = ["<br />", "<br/>", "<br>", "<BR>"];

pub struct Preprocessor;

impl Preprocessor {
    pub fn new() -> Self {
        Self
    }

    /// Clean a raw text string for downstream tokenisation.
    pub fn clean(&self, text: &str) -> String {
        // ── Step 1: HTML line breaks ──────────────────────────────────────────
        let mut step1 = text.to_string();
        for tag in LINE_BREAK_TAGS {
            if step1.contains(tag) {
                step1 = step1.replace(tag, " ");
            }
        }

        // ── Step 2: Normalise individual characters ───────────────────────────
        let step2: String = step1
            .chars()
            .map(|c| match c {
                '\u{00A0}' | '\u{200B}' | '\u{FEFF}' => ' ',
                c if c.is_control() => ' ',
                c => c,
            })
            .collect();

        // ── Step 3: Collapse whitespace runs ──────────────────────────────────
        step2.split_whitespace().collect::<Vec<_>>().join(" ")
    }
}

impl Default for Preprocessor {
    fn default() -> Self {
        Self::new()
    }
}
