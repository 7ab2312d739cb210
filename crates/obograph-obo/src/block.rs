//! Block state machine.
//!
//! ```text
//!                 [accepted]                 field line
//!   OutsideBlock ───────────► InAcceptedBlock ──────────► RecordBuilder
//!        │                      ▲      │
//!        │ [other]    [accepted]│      │[other]
//!        ▼                      │      ▼
//!   InIgnoredBlock ◄────────────┴── (flush open record)
//! ```
//!
//! Every header line closes the open record (if any) before switching state.

use crate::identifier::IdentifierNormalizer;
use crate::record::{BlockKind, Discarded, FieldGrammar, Record, RecordBuilder};
use crate::tokenizer::RawLine;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockState {
    OutsideBlock,
    InAcceptedBlock,
    InIgnoredBlock,
}

/// Outcome of closing a block.
pub type Finalized = Result<Record, Discarded>;

pub struct BlockMachine<'a> {
    state: BlockState,
    open: Option<RecordBuilder>,
    accepted: &'a [BlockKind],
    normalizer: &'a IdentifierNormalizer,
    grammar: &'a FieldGrammar,
}

impl<'a> BlockMachine<'a> {
    pub fn new(
        accepted: &'a [BlockKind],
        normalizer: &'a IdentifierNormalizer,
        grammar: &'a FieldGrammar,
    ) -> Self {
        Self {
            state: BlockState::OutsideBlock,
            open: None,
            accepted,
            normalizer,
            grammar,
        }
    }

    pub fn state(&self) -> BlockState {
        self.state
    }

    /// Consume one logical line. Returns the record closed by a header line.
    pub fn feed(&mut self, line: &RawLine) -> Option<Finalized> {
        if let Some(kind) = BlockKind::from_header(&line.text) {
            let closed = self.close();
            if self.accepted.contains(&kind) {
                self.open = Some(RecordBuilder::new(kind, line.line_no));
                self.state = BlockState::InAcceptedBlock;
            } else {
                self.state = BlockState::InIgnoredBlock;
            }
            return closed;
        }

        if let (BlockState::InAcceptedBlock, Some(builder)) = (self.state, self.open.as_mut()) {
            builder.apply(&line.text, self.normalizer, self.grammar);
        }
        None
    }

    /// End of input: close whatever is still open.
    pub fn finish(&mut self) -> Option<Finalized> {
        let closed = self.close();
        self.state = BlockState::OutsideBlock;
        closed
    }

    fn close(&mut self) -> Option<Finalized> {
        self.open.take().map(RecordBuilder::finish)
    }
}
