//! Fixed-size batching in front of a [`BulkSink`].

use crate::sink::{BulkSink, SinkError};

/// A flush that the sink rejected, with the progress made before it.
#[derive(Debug, thiserror::Error)]
#[error("batch {batch} ({items} items) to {destination} failed after {committed} items were written: {source}")]
pub struct FlushError {
    pub destination: String,
    /// 1-based number of the failing batch.
    pub batch: usize,
    pub items: usize,
    /// Items acknowledged by earlier batches of this run.
    pub committed: usize,
    #[source]
    pub source: SinkError,
}

/// Running totals of what the sink has acknowledged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchProgress {
    pub batches: usize,
    pub items: usize,
}

/// Buffers items for one destination and writes them in batches of exactly
/// `batch_size`, except for the final remainder.
pub struct BatchAccumulator<'s, S: BulkSink> {
    sink: &'s S,
    destination: String,
    batch_size: usize,
    pending: Vec<S::Item>,
    progress: BatchProgress,
}

impl<'s, S: BulkSink> BatchAccumulator<'s, S> {
    pub fn new(sink: &'s S, destination: impl Into<String>, batch_size: usize) -> Self {
        let batch_size = batch_size.max(1);
        Self {
            sink,
            destination: destination.into(),
            batch_size,
            pending: Vec::with_capacity(batch_size),
            progress: BatchProgress::default(),
        }
    }

    /// Buffer `items`, flushing each time the buffer reaches the threshold.
    pub fn submit(&mut self, items: impl IntoIterator<Item = S::Item>) -> Result<(), FlushError> {
        for item in items {
            self.pending.push(item);
            if self.pending.len() >= self.batch_size {
                self.flush()?;
            }
        }
        Ok(())
    }

    /// Write whatever is buffered. A no-op on an empty buffer.
    pub fn flush(&mut self) -> Result<(), FlushError> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let batch = self.progress.batches + 1;
        let items = self.pending.len();
        tracing::debug!(
            sink = self.sink.name(),
            destination = %self.destination,
            batch,
            items,
            "flushing batch"
        );

        self.sink
            .write_batch(&self.destination, &self.pending)
            .map_err(|source| FlushError {
                destination: self.destination.clone(),
                batch,
                items,
                committed: self.progress.items,
                source,
            })?;

        self.pending.clear();
        self.progress.batches = batch;
        self.progress.items += items;
        Ok(())
    }

    /// Final flush; consumes the accumulator.
    pub fn finish(mut self) -> Result<BatchProgress, FlushError> {
        self.flush()?;
        Ok(self.progress)
    }

    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    pub fn progress(&self) -> BatchProgress {
        self.progress
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        batches: RefCell<Vec<Vec<u32>>>,
        fail_on: Option<usize>,
    }

    impl BulkSink for Recorder {
        type Item = u32;

        fn name(&self) -> &str {
            "recorder"
        }

        fn clear(&self, _destination: &str) -> Result<(), SinkError> {
            Ok(())
        }

        fn write_batch(&self, _destination: &str, items: &[u32]) -> Result<(), SinkError> {
            let mut batches = self.batches.borrow_mut();
            if self.fail_on == Some(batches.len() + 1) {
                return Err(SinkError::Status {
                    url: "mem://".to_string(),
                    status: 503,
                    body: "busy".to_string(),
                    payload_preview: String::new(),
                });
            }
            batches.push(items.to_vec());
            Ok(())
        }
    }

    #[test]
    fn flushes_exactly_at_threshold_and_remainder_at_end() {
        let sink = Recorder::default();
        let mut acc = BatchAccumulator::new(&sink, "g", 3);

        acc.submit([1, 2]).unwrap();
        assert!(sink.batches.borrow().is_empty());
        acc.submit([3]).unwrap();
        assert_eq!(sink.batches.borrow().len(), 1);
        assert_eq!(acc.pending(), 0);

        acc.submit([4, 5, 6, 7]).unwrap();
        let progress = acc.finish().unwrap();

        let batches = sink.batches.borrow();
        let sizes: Vec<usize> = batches.iter().map(Vec::len).collect();
        assert_eq!(sizes, vec![3, 3, 1]);
        assert_eq!(progress, BatchProgress { batches: 3, items: 7 });
    }

    #[test]
    fn empty_input_sends_nothing() {
        let sink = Recorder::default();
        let acc = BatchAccumulator::new(&sink, "g", 10);
        assert_eq!(acc.finish().unwrap(), BatchProgress::default());
        assert!(sink.batches.borrow().is_empty());
    }

    #[test]
    fn failure_reports_partial_progress() {
        let sink = Recorder {
            fail_on: Some(2),
            ..Recorder::default()
        };
        let mut acc = BatchAccumulator::new(&sink, "http://g/pato", 2);
        let err = acc.submit(0..5).unwrap_err();

        assert_eq!(err.batch, 2);
        assert_eq!(err.items, 2);
        assert_eq!(err.committed, 2);
        assert_eq!(err.destination, "http://g/pato");
    }
}
