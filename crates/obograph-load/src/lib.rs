//! Delivery of parsed OBO ontologies to external stores.
//!
//! A load run reads one ontology file, streams it through the
//! `obograph-obo` parser and writes the emitted items in fixed-size batches to
//! a [`BulkSink`]:
//!
//! ```text
//! file ─▶ OboParser ─▶ DedupLedger ─▶ BatchAccumulator ─▶ BulkSink
//!                                                        ├─ SparqlUpdateSink (named graph)
//!                                                        └─ SearchIndexSink  (document index)
//! ```
//!
//! Before loading, the destination is cleared under a bounded retry policy; a
//! clear that keeps failing is logged and the load proceeds anyway. A sink
//! failure during loading aborts the file; [`IngestPipeline::load_file_with_reload`]
//! re-runs clear-and-load from the start a bounded number of times.
//!
//! The Darwin Core schema ([`dwc`]) is a second document source for the
//! search index and shares the same batching and sink.

pub mod batch;
pub mod config;
pub mod dwc;
pub mod pipeline;
pub mod retry;
pub mod sink;

pub use batch::{BatchAccumulator, BatchProgress, FlushError};
pub use config::{
    ConfigError, LoadTarget, LoaderConfig, ManifestEntry, OntologyManifest, SearchConfig,
    SparqlConfig, DEFAULT_INDEX,
};
pub use dwc::{JapaneseLabels, SchemaError, SchemaTerm, DWC_INDEX};
pub use pipeline::{IngestPipeline, LoadError, LoadReport};
pub use retry::RetryPolicy;
pub use sink::{
    payload_preview, BulkSink, EnqueuedTask, SearchIndexSink, SinkError, SparqlUpdateSink,
};
