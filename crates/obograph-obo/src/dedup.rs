use std::collections::HashSet;

/// Subjects already committed to output in the current run.
///
/// First occurrence wins: a repeated block for the same subject is dropped
/// whole, never merged into the first.
#[derive(Debug, Default)]
pub struct DedupLedger {
    seen: HashSet<String>,
}

impl DedupLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `true` (and records the subject) on first sight only.
    pub fn admit(&mut self, subject: &str) -> bool {
        if self.seen.contains(subject) {
            return false;
        }
        self.seen.insert(subject.to_string())
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}
