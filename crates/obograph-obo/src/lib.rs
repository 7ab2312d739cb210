//! Streaming OBO ingestion core.
//!
//! Turns the line-oriented OBO flat-file format into two kinds of downstream
//! items:
//!
//! - [`Triple`]s for a graph store (`rdf:type`, `rdfs:label`,
//!   `rdfs:subClassOf`, `skos:altLabel`), and
//! - flat [`Document`]s for a full-text search index.
//!
//! The pipeline is `bytes → tokenizer → block machine → record builder →
//! dedup ledger → items`. Nothing here performs network IO; delivery lives in
//! `obograph-load`.
//!
//! Only the subset of OBO that is consumed downstream is understood (`id`,
//! `name`, `is_a`, `synonym`); no ontological validation is attempted.

pub mod block;
pub mod dedup;
pub mod emit;
pub mod identifier;
pub mod reader;
pub mod record;
pub mod tokenizer;

pub use block::{BlockMachine, BlockState, Finalized};
pub use dedup::DedupLedger;
pub use emit::{escape_literal, Document, Emit, Object, Triple};
pub use identifier::{
    Identifier, IdentifierError, IdentifierNormalizer, NormalizedId, PrefixMap, OBO_PURL_BASE,
};
pub use reader::{OboParser, ParseOptions, ParseStats, Records};
pub use record::{BlockKind, Discarded, FieldGrammar, Record, RecordBuilder};
pub use tokenizer::{strip_comment, LogicalLines, RawLine};

#[derive(Debug, thiserror::Error)]
pub enum OboError {
    #[error("failed to read input at line {line}: {source}")]
    Io {
        line: usize,
        #[source]
        source: std::io::Error,
    },
}
