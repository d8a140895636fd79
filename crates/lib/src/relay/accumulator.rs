//! Append-only reply text.

/// Cumulative text of a reply, built from fragments in arrival order.
#[derive(Debug, Default, Clone)]
pub struct Accumulator {
    text: String,
    fragments: usize,
}

impl Accumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment and return the full text so far.
    pub fn append(&mut self, fragment: &str) -> &str {
        self.text.push_str(fragment);
        self.fragments += 1;
        &self.text
    }

    pub fn current_text(&self) -> &str {
        &self.text
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    /// Number of fragments appended.
    pub fn fragment_count(&self) -> usize {
        self.fragments
    }
}
