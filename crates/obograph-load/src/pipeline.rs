//! Per-file ingestion run.
//!
//! One run owns its dedup ledger, open record and pending buffer; nothing is
//! shared between runs except the (read-only) parser and sink handles, so
//! several files can be loaded concurrently into distinct destinations.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use obograph_obo::{DedupLedger, Document, Emit, OboError, OboParser, ParseStats};

use crate::batch::{BatchAccumulator, FlushError};
use crate::dwc::{self, JapaneseLabels, SchemaError};
use crate::retry::RetryPolicy;
use crate::sink::BulkSink;

#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("cannot open {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Read(#[from] OboError),
    #[error(transparent)]
    Schema(#[from] SchemaError),
    #[error(transparent)]
    Sink(#[from] FlushError),
}

/// Outcome of one successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub destination: String,
    pub records: usize,
    pub admitted: usize,
    pub duplicates: usize,
    pub inert: usize,
    pub items: usize,
    pub batches: usize,
    /// `false` when the destination could not be cleared before loading.
    pub clear_ok: bool,
    /// Reload attempt that produced this report (1-based).
    pub attempt: u32,
}

impl LoadReport {
    fn new(destination: &str, stats: ParseStats, batches: usize) -> Self {
        Self {
            destination: destination.to_string(),
            records: stats.records,
            admitted: stats.admitted,
            duplicates: stats.duplicates,
            inert: stats.inert,
            items: stats.items,
            batches,
            clear_ok: true,
            attempt: 1,
        }
    }
}

pub struct IngestPipeline<S: BulkSink> {
    sink: S,
    parser: OboParser,
    batch_size: usize,
    clear_retry: RetryPolicy,
    reload_retry: RetryPolicy,
    clear_before_load: bool,
}

impl<S> IngestPipeline<S>
where
    S: BulkSink,
    S::Item: Emit,
{
    pub fn new(sink: S, parser: OboParser, batch_size: usize) -> Self {
        Self {
            sink,
            parser,
            batch_size,
            clear_retry: RetryPolicy::default(),
            reload_retry: RetryPolicy::once(),
            clear_before_load: true,
        }
    }

    pub fn with_clear_retry(mut self, policy: RetryPolicy) -> Self {
        self.clear_retry = policy;
        self
    }

    pub fn with_reload_retry(mut self, policy: RetryPolicy) -> Self {
        self.reload_retry = policy;
        self
    }

    /// Skip the per-run clear, for destinations shared by several runs that
    /// the caller clears once up front.
    pub fn without_clear(mut self) -> Self {
        self.clear_before_load = false;
        self
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn parser(&self) -> &OboParser {
        &self.parser
    }

    /// Stream `reader` into `destination` without clearing it first.
    pub fn run_reader<R: BufRead>(&self, reader: R, destination: &str) -> Result<LoadReport, LoadError> {
        let mut ledger = DedupLedger::new();
        let mut stats = ParseStats::default();
        let mut batches = BatchAccumulator::new(&self.sink, destination, self.batch_size);

        for finalized in self.parser.records(reader) {
            let items = stats.admit::<S::Item>(finalized?, &mut ledger);
            batches.submit(items)?;
        }
        let progress = batches.finish()?;
        debug_assert_eq!(progress.items, stats.items);

        Ok(LoadReport::new(destination, stats, progress.batches))
    }

    pub fn run_file(&self, path: &Path, destination: &str) -> Result<LoadReport, LoadError> {
        let file = File::open(path).map_err(|source| LoadError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        self.run_reader(BufReader::new(file), destination)
    }

    /// Clear `destination` with the clear policy. A clear that never
    /// succeeds is logged and reported as `false`; loading still proceeds.
    pub fn clear_destination(&self, destination: &str) -> bool {
        let outcome = self
            .clear_retry
            .run("clear destination", |_| self.sink.clear(destination));
        match outcome {
            Ok(()) => true,
            Err(err) => {
                tracing::error!(
                    sink = self.sink.name(),
                    destination,
                    attempts = self.clear_retry.attempts,
                    error = %err,
                    "could not clear destination, loading on top of existing data"
                );
                false
            }
        }
    }

    /// Clear (unless disabled), then load the whole file.
    pub fn load_file(&self, path: &Path, destination: &str) -> Result<LoadReport, LoadError> {
        let clear_ok = !self.clear_before_load || self.clear_destination(destination);
        let mut report = self.run_file(path, destination)?;
        report.clear_ok = clear_ok;
        tracing::info!(
            sink = self.sink.name(),
            destination,
            records = report.records,
            items = report.items,
            batches = report.batches,
            duplicates = report.duplicates,
            inert = report.inert,
            "ontology loaded"
        );
        Ok(report)
    }

    /// [`load_file`](Self::load_file) repeated under the reload policy: every
    /// attempt clears the destination (unless disabled) and reprocesses the
    /// file from the start.
    pub fn load_file_with_reload(&self, path: &Path, destination: &str) -> Result<LoadReport, LoadError> {
        self.reload_retry.run("reload ontology", |attempt| {
            let mut report = self.load_file(path, destination)?;
            report.attempt = attempt;
            Ok(report)
        })
    }
}

impl<S> IngestPipeline<S>
where
    S: BulkSink<Item = Document>,
{
    /// Load the Darwin Core terms referenced by the schema at `path` as
    /// documents, clearing `destination` first unless disabled. Repeated
    /// references are counted as duplicates and sent once.
    pub fn load_schema(
        &self,
        path: &Path,
        destination: &str,
        labels: &JapaneseLabels,
    ) -> Result<LoadReport, LoadError> {
        let terms = dwc::read_schema_file(path)?;
        let clear_ok = !self.clear_before_load || self.clear_destination(destination);

        let mut ledger = DedupLedger::new();
        let mut stats = ParseStats::default();
        let mut batches = BatchAccumulator::new(&self.sink, destination, self.batch_size);
        for term in &terms {
            stats.records += 1;
            if !ledger.admit(&term.id()) {
                stats.duplicates += 1;
                continue;
            }
            stats.admitted += 1;
            stats.items += 1;
            batches.submit([term.to_document(labels)])?;
        }
        let progress = batches.finish()?;

        let mut report = LoadReport::new(destination, stats, progress.batches);
        report.clear_ok = clear_ok;
        tracing::info!(
            sink = self.sink.name(),
            destination,
            terms = report.records,
            items = report.items,
            labelled = labels.len(),
            "schema terms loaded"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sink::SinkError;
    use obograph_obo::{IdentifierNormalizer, ParseOptions, Triple};
    use std::cell::{Cell, RefCell};
    use std::io::Write;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;
    use tracing_subscriber::layer::{Context, SubscriberExt};

    #[derive(Default)]
    struct MemorySink {
        clear_failures: Cell<u32>,
        clears: Cell<u32>,
        batch_failures: Cell<u32>,
        batches: RefCell<Vec<(String, Vec<Triple>)>>,
    }

    fn unavailable() -> SinkError {
        SinkError::Status {
            url: "mem://".to_string(),
            status: 503,
            body: "unavailable".to_string(),
            payload_preview: String::new(),
        }
    }

    impl BulkSink for MemorySink {
        type Item = Triple;

        fn name(&self) -> &str {
            "memory"
        }

        fn clear(&self, destination: &str) -> Result<(), SinkError> {
            self.clears.set(self.clears.get() + 1);
            if self.clear_failures.get() > 0 {
                self.clear_failures.set(self.clear_failures.get() - 1);
                return Err(unavailable());
            }
            self.batches.borrow_mut().retain(|(d, _)| d != destination);
            Ok(())
        }

        fn write_batch(&self, destination: &str, items: &[Triple]) -> Result<(), SinkError> {
            if self.batch_failures.get() > 0 {
                self.batch_failures.set(self.batch_failures.get() - 1);
                return Err(unavailable());
            }
            self.batches
                .borrow_mut()
                .push((destination.to_string(), items.to_vec()));
            Ok(())
        }
    }

    struct WarnCounter(Arc<AtomicUsize>);

    impl<S: tracing::Subscriber> tracing_subscriber::Layer<S> for WarnCounter {
        fn on_event(&self, event: &tracing::Event<'_>, _ctx: Context<'_, S>) {
            if *event.metadata().level() == tracing::Level::WARN {
                self.0.fetch_add(1, Ordering::SeqCst);
            }
        }
    }

    const ONTOLOGY: &str = "format-version: 1.2\n\n\
[Term]\nid: GO:0000001\nname: mitochondrion inheritance\nis_a: GO:0048308 ! organelle inheritance\n\n\
[Term]\nid: GO:0000002\nname: mitochondrial genome maintenance\nsynonym: \"mtDNA maintenance\" EXACT []\n\n\
[Term]\nid: GO:0000001\nname: duplicate\n\n\
[Typedef]\nid: BFO:0000050\nname: part of\n";

    fn pipeline(sink: &MemorySink, batch_size: usize) -> IngestPipeline<&MemorySink> {
        IngestPipeline::new(sink, OboParser::default(), batch_size)
            .with_clear_retry(RetryPolicy::new(3, Duration::ZERO))
    }

    #[test]
    fn streamed_count_matches_reference_parser() {
        let sink = MemorySink::default();
        let report = pipeline(&sink, 2).run_reader(ONTOLOGY.as_bytes(), "g").unwrap();

        let (reference, stats) = OboParser::default().collect_str::<Triple>(ONTOLOGY).unwrap();
        let delivered: Vec<Triple> = sink
            .batches
            .borrow()
            .iter()
            .flat_map(|(_, items)| items.clone())
            .collect();

        assert_eq!(delivered, reference);
        assert_eq!(report.items, stats.items);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.batches, (reference.len() + 1) / 2);
        assert!(sink.batches.borrow().iter().rev().skip(1).all(|(_, b)| b.len() == 2));
    }

    #[test]
    fn failing_clear_warns_each_attempt_and_still_loads() {
        let sink = MemorySink::default();
        sink.clear_failures.set(3);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ONTOLOGY.as_bytes()).unwrap();

        let warnings = Arc::new(AtomicUsize::new(0));
        let subscriber = tracing_subscriber::registry().with(WarnCounter(warnings.clone()));
        let report = tracing::subscriber::with_default(subscriber, || {
            pipeline(&sink, 500).load_file(file.path(), "http://g/go")
        })
        .unwrap();

        assert_eq!(sink.clears.get(), 3);
        assert_eq!(warnings.load(Ordering::SeqCst), 3);
        assert!(!report.clear_ok);
        assert_eq!(report.batches, 1);
        assert!(report.items > 0);
    }

    #[test]
    fn flush_failure_aborts_the_file() {
        let sink = MemorySink::default();
        sink.batch_failures.set(1);
        let err = pipeline(&sink, 1).run_reader(ONTOLOGY.as_bytes(), "g").unwrap_err();
        match err {
            LoadError::Sink(flush) => {
                assert_eq!(flush.batch, 1);
                assert_eq!(flush.committed, 0);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(sink.batches.borrow().is_empty());
    }

    #[test]
    fn reload_clears_and_reprocesses_whole_file() {
        let sink = MemorySink::default();
        sink.batch_failures.set(1);
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ONTOLOGY.as_bytes()).unwrap();

        let report = pipeline(&sink, 2)
            .with_reload_retry(RetryPolicy::new(2, Duration::ZERO))
            .load_file_with_reload(file.path(), "g")
            .unwrap();

        assert_eq!(report.attempt, 2);
        assert_eq!(sink.clears.get(), 2);
        let delivered: usize = sink.batches.borrow().iter().map(|(_, b)| b.len()).sum();
        assert_eq!(delivered, report.items);
    }

    #[test]
    fn shared_destination_is_not_cleared_per_run() {
        let sink = MemorySink::default();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(ONTOLOGY.as_bytes()).unwrap();

        let report = pipeline(&sink, 500)
            .without_clear()
            .load_file(file.path(), "ontology")
            .unwrap();

        assert_eq!(sink.clears.get(), 0);
        assert!(report.clear_ok);
    }

    #[test]
    fn missing_file_is_an_open_error() {
        let sink = MemorySink::default();
        let err = pipeline(&sink, 10)
            .run_file(Path::new("/nonexistent/none.obo"), "g")
            .unwrap_err();
        assert!(matches!(err, LoadError::Open { .. }));
    }

    #[test]
    fn document_pipeline_skips_typedefs() {
        use obograph_obo::Document;

        #[derive(Default)]
        struct Docs(RefCell<Vec<Document>>);

        impl BulkSink for Docs {
            type Item = Document;
            fn name(&self) -> &str {
                "docs"
            }
            fn clear(&self, _: &str) -> Result<(), SinkError> {
                Ok(())
            }
            fn write_batch(&self, _: &str, items: &[Document]) -> Result<(), SinkError> {
                self.0.borrow_mut().extend_from_slice(items);
                Ok(())
            }
        }

        let sink = Docs::default();
        let parser = OboParser::new(IdentifierNormalizer::default(), ParseOptions::documents());
        let report = IngestPipeline::new(&sink, parser, 2000)
            .run_reader(ONTOLOGY.as_bytes(), "ontology")
            .unwrap();

        assert_eq!(report.items, 2);
        let ids: Vec<String> = sink.0.borrow().iter().map(|d| d.id.clone()).collect();
        assert_eq!(ids, vec!["GO_0000001", "GO_0000002"]);
    }

    #[derive(Default)]
    struct DocumentSink {
        batches: RefCell<Vec<Vec<Document>>>,
    }

    impl BulkSink for DocumentSink {
        type Item = Document;

        fn name(&self) -> &str {
            "documents"
        }

        fn clear(&self, _destination: &str) -> Result<(), SinkError> {
            self.batches.borrow_mut().clear();
            Ok(())
        }

        fn write_batch(&self, _destination: &str, items: &[Document]) -> Result<(), SinkError> {
            self.batches.borrow_mut().push(items.to_vec());
            Ok(())
        }
    }

    #[test]
    fn schema_terms_load_in_batches_with_japanese_labels() {
        let mut schema = tempfile::NamedTempFile::new().unwrap();
        schema
            .write_all(
                br#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema">
  <xs:element name="SimpleDarwinRecord"><xs:complexType><xs:all>
    <xs:element ref="dwc:occurrenceID"/>
    <xs:element ref="dwc:scientificName"/>
    <xs:element ref="dwc:occurrenceID"/>
    <xs:element ref="dcterms:modified"/>
  </xs:all></xs:complexType></xs:element>
</xs:schema>"#,
            )
            .unwrap();
        let labels: JapaneseLabels = [(
            "http://rs.tdwg.org/dwc/terms/scientificName".to_string(),
            "学名".to_string(),
        )]
        .into_iter()
        .collect();

        let sink = DocumentSink::default();
        let report = IngestPipeline::new(&sink, OboParser::default(), 2)
            .load_schema(schema.path(), "dwc", &labels)
            .unwrap();

        assert_eq!(report.records, 4);
        assert_eq!(report.duplicates, 1);
        assert_eq!(report.items, 3);
        assert_eq!(report.batches, 2);

        let docs: Vec<Document> = sink.batches.borrow().iter().flatten().cloned().collect();
        let ids: Vec<&str> = docs.iter().map(|d| d.id.as_str()).collect();
        assert_eq!(ids, vec!["dwc_occurrenceID", "dwc_scientificName", "dcterms_modified"]);
        assert_eq!(docs[1].label, "学名");
        assert_eq!(docs[1].en, "scientificName");
        assert_eq!(docs[0].label, "occurrenceID");
    }

    #[test]
    fn missing_schema_file_is_reported() {
        let sink = DocumentSink::default();
        let err = IngestPipeline::new(&sink, OboParser::default(), 2)
            .load_schema(Path::new("/nonexistent/dwc.xsd"), "dwc", &JapaneseLabels::default())
            .unwrap_err();
        assert!(matches!(err, LoadError::Schema(SchemaError::Open { .. })));
    }
}
