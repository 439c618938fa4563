//! Bounded, chunked streaming of records out of one sheet.
//!
//! [`stream_records`] starts a background producer that parses the sheet and pushes records
//! into a bounded queue. The returned [`ChunkedIterator`] drains that queue in batches of at most
//! `chunk_size` records. When the queue is full the producer blocks, so at most
//! `queue_capacity` records are buffered at any time.
//!
//! A producer failure does not discard records that were already queued: the consumer receives
//! them first, then the failure exactly once.
//!
//! ```no_run
//! use sheet_records::binding::{Record, RecordDescriptor};
//! use sheet_records::streaming::stream_records;
//!
//! #[derive(Default)]
//! struct Reading {
//!     sensor: String,
//!     value: f64,
//! }
//!
//! impl Record for Reading {
//!     fn describe(d: &mut RecordDescriptor<Self>) {
//!         d.field("sensor", |r: &Self| r.sensor.clone(), |r: &mut Self, v| r.sensor = v);
//!         d.field("value", |r: &Self| r.value, |r: &mut Self, v| r.value = v);
//!         d.read_column("sensor", "Sensor");
//!         d.read_column("value", "Value");
//!     }
//! }
//!
//! # fn main() -> Result<(), sheet_records::IngestionError> {
//! let mut total = 0;
//! for batch in stream_records::<Reading>("readings.xlsx", 500)? {
//!     total += batch?.len();
//! }
//! println!("rows={total}");
//! # Ok(())
//! # }
//! ```

pub mod metrics;
mod producer;

use std::fmt;
use std::mem;
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Instant;

use crossbeam_channel::{Receiver, TryRecvError, bounded};

use crate::binding::Record;
use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::observability::{
    IngestionContext, IngestionObserver, IngestionSeverity, IngestionStats, ReadMode, report,
};
use crate::ingestion::package::{SheetSelection, SheetSource};
use crate::ingestion::workbook::read_bindings;

pub use metrics::{StreamMetrics, StreamMetricsSnapshot};
pub use producer::QueueItem;

use producer::{ProducerJob, StreamState};

pub const DEFAULT_CHUNK_SIZE: usize = 1000;
pub const DEFAULT_QUEUE_CAPACITY: usize = 20_000;

/// Options for [`stream_records_with`].
///
/// Use [`Default`] for common cases.
#[derive(Clone)]
pub struct StreamOptions {
    /// Maximum number of records per batch. Must be positive.
    pub chunk_size: usize,
    /// Maximum number of records buffered between producer and consumer. Must be positive.
    pub queue_capacity: usize,
    pub sheet: SheetSelection,
    /// Optional observer for logging/alerts.
    pub observer: Option<Arc<dyn IngestionObserver>>,
    /// Severity threshold at which `on_alert` is invoked.
    pub alert_at_or_above: IngestionSeverity,
}

impl fmt::Debug for StreamOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamOptions")
            .field("chunk_size", &self.chunk_size)
            .field("queue_capacity", &self.queue_capacity)
            .field("sheet", &self.sheet)
            .field("observer_set", &self.observer.is_some())
            .field("alert_at_or_above", &self.alert_at_or_above)
            .finish()
    }
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            sheet: SheetSelection::First,
            observer: None,
            alert_at_or_above: IngestionSeverity::Critical,
        }
    }
}

/// Lifecycle of a [`ChunkedIterator`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamPhase {
    /// The producer is still parsing.
    Running,
    /// The producer is done; buffered records remain.
    Draining,
    /// Every record was delivered (or the stream was closed).
    Exhausted,
    /// The producer failed. Buffered records may still be delivered before the failure.
    Failed,
}

/// Stream the first sheet of `source` in batches of at most `chunk_size` records.
pub fn stream_records<T: Record>(
    source: impl Into<SheetSource>,
    chunk_size: usize,
) -> IngestionResult<ChunkedIterator<T>> {
    stream_records_with(
        source,
        &StreamOptions {
            chunk_size,
            ..Default::default()
        },
    )
}

/// Stream a sheet of `source` with explicit options.
///
/// Arguments, bindings and the source are checked before the producer starts, so every error
/// returned here is synchronous. Errors found while parsing are delivered through the iterator.
pub fn stream_records_with<T: Record>(
    source: impl Into<SheetSource>,
    options: &StreamOptions,
) -> IngestionResult<ChunkedIterator<T>> {
    let source = source.into();
    let ctx = IngestionContext {
        source: source.to_string(),
        sheet: options.sheet.to_string(),
        record_type: std::any::type_name::<T>(),
        mode: ReadMode::Streaming,
    };

    let result = start(source, options, ctx.clone());
    if let Err(e) = &result {
        report(options.observer.as_ref(), options.alert_at_or_above, &ctx, Err(e));
    }
    result
}

fn start<T: Record>(
    source: SheetSource,
    options: &StreamOptions,
    ctx: IngestionContext,
) -> IngestionResult<ChunkedIterator<T>> {
    if options.chunk_size == 0 {
        return Err(IngestionError::configuration("chunk size must be positive, got 0"));
    }
    if options.queue_capacity == 0 {
        return Err(IngestionError::configuration("queue capacity must be positive, got 0"));
    }
    let bindings = read_bindings::<T>()?;
    source.validate()?;

    let type_name = bindings.type_name();
    let (sender, receiver) = bounded(options.queue_capacity);
    let state = Arc::new(StreamState::default());
    let metrics = Arc::new(StreamMetrics::new());
    let producer = producer::spawn(ProducerJob {
        source,
        sheet: options.sheet.clone(),
        bindings,
        sender,
        state: Arc::clone(&state),
        metrics: Arc::clone(&metrics),
    })?;

    Ok(ChunkedIterator {
        receiver: Some(receiver),
        producer: Some(producer),
        state,
        metrics,
        chunk_size: options.chunk_size,
        type_name,
        pending: Vec::new(),
        end_seen: false,
        done: false,
        failed: false,
        ctx,
        observer: options.observer.clone(),
        alert_at_or_above: options.alert_at_or_above,
        started: Instant::now(),
    })
}

/// Consumer side of a record stream.
///
/// Batches are pulled with [`has_next`](Self::has_next) / [`next_batch`](Self::next_batch) or
/// through [`Iterator`]. Dropping the iterator closes the stream.
pub struct ChunkedIterator<T> {
    receiver: Option<Receiver<QueueItem<T>>>,
    producer: Option<JoinHandle<()>>,
    state: Arc<StreamState>,
    metrics: Arc<StreamMetrics>,
    chunk_size: usize,
    type_name: &'static str,
    /// The next batch, filled by `has_next`.
    pending: Vec<T>,
    end_seen: bool,
    done: bool,
    failed: bool,
    ctx: IngestionContext,
    observer: Option<Arc<dyn IngestionObserver>>,
    alert_at_or_above: IngestionSeverity,
    started: Instant,
}

impl<T> ChunkedIterator<T> {
    /// Whether another batch is available, blocking until the producer supplies one or ends.
    ///
    /// Returns the producer's failure once, after every record queued before it has been
    /// delivered.
    pub fn has_next(&mut self) -> IngestionResult<bool> {
        if !self.pending.is_empty() {
            return Ok(true);
        }
        if self.done {
            return Ok(false);
        }

        self.fill();
        if !self.pending.is_empty() {
            return Ok(true);
        }

        // Nothing left in the queue; the sentinel has been seen.
        self.done = true;
        match self.take_failure() {
            Some(e) => {
                self.failed = true;
                let e = match e {
                    conversion @ IngestionError::Conversion { .. } => conversion,
                    other => IngestionError::Conversion {
                        row: None,
                        type_name: self.type_name,
                        source: Box::new(other),
                    },
                };
                report(self.observer.as_ref(), self.alert_at_or_above, &self.ctx, Err(&e));
                Err(e)
            }
            None => {
                let snapshot = self.metrics.snapshot();
                let stats = IngestionStats {
                    rows: snapshot.rows_delivered as usize,
                    batches: snapshot.batches_delivered as usize,
                    elapsed: self.started.elapsed(),
                };
                report(self.observer.as_ref(), self.alert_at_or_above, &self.ctx, Ok(stats));
                Ok(false)
            }
        }
    }

    /// Next batch of at most `chunk_size` records.
    ///
    /// Fails with [`IngestionError::NoMoreElements`] once the stream is exhausted.
    pub fn next_batch(&mut self) -> IngestionResult<Vec<T>> {
        if !self.has_next()? {
            return Err(IngestionError::NoMoreElements);
        }
        let batch = mem::take(&mut self.pending);
        self.metrics.on_batch(batch.len());
        Ok(batch)
    }

    /// Stop the producer and release the source. Safe to call more than once.
    ///
    /// Records still queued are discarded. Blocks until the producer thread exits: it checks for
    /// cancellation before and after opening the workbook and before each record, so a close
    /// issued while the shared string table is loading waits for that load to finish.
    pub fn close(&mut self) {
        self.state.cancel();
        self.receiver = None;
        self.join_producer();
        self.pending.clear();
        self.done = true;
    }

    pub fn phase(&self) -> StreamPhase {
        if self.failed || self.state.has_failed() {
            StreamPhase::Failed
        } else if self.done && self.pending.is_empty() {
            StreamPhase::Exhausted
        } else if self.end_seen || self.state.is_finished() {
            StreamPhase::Draining
        } else {
            StreamPhase::Running
        }
    }

    pub fn metrics(&self) -> Arc<StreamMetrics> {
        Arc::clone(&self.metrics)
    }

    /// Pull records into `pending` until it holds `chunk_size` of them or the sentinel arrives.
    fn fill(&mut self) {
        let Some(receiver) = self.receiver.as_ref() else {
            self.end_seen = true;
            return;
        };
        if self.pending.capacity() == 0 {
            self.pending.reserve(self.chunk_size.min(DEFAULT_CHUNK_SIZE));
        }
        while self.pending.len() < self.chunk_size && !self.end_seen {
            let item = match receiver.try_recv() {
                Ok(item) => item,
                Err(TryRecvError::Empty) => receiver.recv().unwrap_or(QueueItem::End),
                Err(TryRecvError::Disconnected) => QueueItem::End,
            };
            match item {
                QueueItem::Record(record) => self.pending.push(record),
                QueueItem::End => self.end_seen = true,
            }
        }
    }

    fn take_failure(&mut self) -> Option<IngestionError> {
        // The producer has sent the sentinel; joining makes this iterator the only owner of
        // the shared state.
        self.join_producer();
        Arc::get_mut(&mut self.state).and_then(StreamState::take_failure)
    }

    fn join_producer(&mut self) {
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
    }
}

impl<T> Iterator for ChunkedIterator<T> {
    type Item = IngestionResult<Vec<T>>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.has_next() {
            Ok(true) => Some(self.next_batch()),
            Ok(false) => None,
            Err(e) => Some(Err(e)),
        }
    }
}

impl<T> Drop for ChunkedIterator<T> {
    fn drop(&mut self) {
        self.close();
    }
}

impl<T> fmt::Debug for ChunkedIterator<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChunkedIterator")
            .field("type_name", &self.type_name)
            .field("chunk_size", &self.chunk_size)
            .field("phase", &self.phase())
            .field("pending", &self.pending.len())
            .field("metrics", &self.metrics.snapshot())
            .finish()
    }
}
