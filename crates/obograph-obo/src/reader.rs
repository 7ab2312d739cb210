//! Streaming reader: tokenizer → block machine → records.

use std::io::BufRead;

use crate::block::{BlockMachine, Finalized};
use crate::dedup::DedupLedger;
use crate::emit::Emit;
use crate::identifier::IdentifierNormalizer;
use crate::record::{BlockKind, Discarded, FieldGrammar};
use crate::tokenizer::LogicalLines;
use crate::OboError;

/// Which blocks become records and which fields name parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub accepted: Vec<BlockKind>,
    pub parent_fields: Vec<String>,
}

impl ParseOptions {
    /// Graph loading: terms and relation typedefs.
    pub fn triples() -> Self {
        Self {
            accepted: vec![BlockKind::Term, BlockKind::Typedef],
            parent_fields: vec!["is_a:".to_string()],
        }
    }

    /// Search indexing: terms only.
    pub fn documents() -> Self {
        Self {
            accepted: vec![BlockKind::Term],
            parent_fields: vec!["is_a:".to_string()],
        }
    }
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::triples()
    }
}

/// Per-run counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ParseStats {
    /// Blocks of an accepted kind that were closed.
    pub records: usize,
    /// Records whose subject was seen for the first time.
    pub admitted: usize,
    /// Records dropped because their subject was already emitted.
    pub duplicates: usize,
    /// Blocks without a usable id.
    pub inert: usize,
    /// Items handed downstream.
    pub items: usize,
}

impl ParseStats {
    /// Account for one closed block and return its items if it is admitted.
    pub fn admit<T: Emit>(&mut self, finalized: Finalized, ledger: &mut DedupLedger) -> Vec<T> {
        self.records += 1;
        let record = match finalized {
            Ok(record) => record,
            Err(Discarded::MissingId { kind, line_no }) => {
                tracing::debug!(kind = kind.as_str(), line = line_no, "block without id");
                self.inert += 1;
                return Vec::new();
            }
            Err(Discarded::InvalidId { kind, line_no, error }) => {
                tracing::debug!(kind = kind.as_str(), line = line_no, %error, "block with invalid id");
                self.inert += 1;
                return Vec::new();
            }
        };

        if !ledger.admit(record.id.uri()) {
            tracing::debug!(subject = record.id.uri(), line = record.line_no, "duplicate subject dropped");
            self.duplicates += 1;
            return Vec::new();
        }

        self.admitted += 1;
        let items = T::emit(&record);
        self.items += items.len();
        items
    }
}

/// Immutable per-run parser configuration.
#[derive(Debug, Clone)]
pub struct OboParser {
    normalizer: IdentifierNormalizer,
    grammar: FieldGrammar,
    accepted: Vec<BlockKind>,
}

impl OboParser {
    pub fn new(normalizer: IdentifierNormalizer, options: ParseOptions) -> Self {
        let parent_fields: Vec<&str> = options.parent_fields.iter().map(String::as_str).collect();
        Self {
            normalizer,
            grammar: FieldGrammar::new(&parent_fields),
            accepted: options.accepted,
        }
    }

    pub fn normalizer(&self) -> &IdentifierNormalizer {
        &self.normalizer
    }

    /// Stream closed blocks from `reader`.
    pub fn records<R: BufRead>(&self, reader: R) -> Records<'_, R> {
        Records {
            lines: LogicalLines::new(reader),
            machine: BlockMachine::new(&self.accepted, &self.normalizer, &self.grammar),
            done: false,
        }
    }

    /// Parse the whole input in memory, deduplicated, without a sink.
    pub fn collect<T: Emit, R: BufRead>(&self, reader: R) -> Result<(Vec<T>, ParseStats), OboError> {
        let mut ledger = DedupLedger::new();
        let mut stats = ParseStats::default();
        let mut items = Vec::new();
        for finalized in self.records(reader) {
            items.extend(stats.admit::<T>(finalized?, &mut ledger));
        }
        Ok((items, stats))
    }

    pub fn collect_str<T: Emit>(&self, text: &str) -> Result<(Vec<T>, ParseStats), OboError> {
        self.collect(text.as_bytes())
    }
}

impl Default for OboParser {
    fn default() -> Self {
        Self::new(IdentifierNormalizer::default(), ParseOptions::default())
    }
}

pub struct Records<'p, R> {
    lines: LogicalLines<R>,
    machine: BlockMachine<'p>,
    done: bool,
}

impl<R: BufRead> Records<'_, R> {
    /// Physical lines consumed so far.
    pub fn lines_read(&self) -> usize {
        self.lines.lines_read()
    }
}

impl<R: BufRead> Iterator for Records<'_, R> {
    type Item = Result<Finalized, OboError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            match self.lines.next() {
                Some(Ok(line)) => {
                    if let Some(finalized) = self.machine.feed(&line) {
                        return Some(Ok(finalized));
                    }
                }
                Some(Err(err)) => {
                    self.done = true;
                    return Some(Err(err));
                }
                None => {
                    self.done = true;
                    return self.machine.finish().map(Ok);
                }
            }
        }
    }
}
