//! Background side of a record stream.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread::{self, JoinHandle};
use std::time::Instant;

use crossbeam_channel::{Sender, TrySendError};
use once_cell::sync::OnceCell;

use crate::binding::{Record, TypeBindingSet};
use crate::error::{IngestionError, IngestionResult};
use crate::ingestion::assembler::RowFlow;
use crate::ingestion::package::{SheetSelection, SheetSource};
use crate::ingestion::workbook::{RecordSink, WorkbookReader};

use super::metrics::StreamMetrics;

/// Element of the producer/consumer queue.
#[derive(Debug)]
pub enum QueueItem<T> {
    Record(T),
    /// Sent exactly once, after the last record (also after a failure).
    End,
}

/// State shared by one stream's producer and consumer.
#[derive(Debug, Default)]
pub(crate) struct StreamState {
    failure: OnceCell<IngestionError>,
    finished: AtomicBool,
    cancelled: AtomicBool,
}

impl StreamState {
    pub(crate) fn has_failed(&self) -> bool {
        self.failure.get().is_some()
    }

    pub(crate) fn take_failure(&mut self) -> Option<IngestionError> {
        self.failure.take()
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }

    pub(crate) fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

pub(crate) struct ProducerJob<T> {
    pub(crate) source: SheetSource,
    pub(crate) sheet: SheetSelection,
    pub(crate) bindings: Arc<TypeBindingSet<T>>,
    pub(crate) sender: Sender<QueueItem<T>>,
    pub(crate) state: Arc<StreamState>,
    pub(crate) metrics: Arc<StreamMetrics>,
}

pub(crate) fn spawn<T: Record>(job: ProducerJob<T>) -> IngestionResult<JoinHandle<()>> {
    Ok(thread::Builder::new()
        .name("sheet-records-producer".to_string())
        .spawn(move || job.run())?)
}

/// Sends the end marker and raises the finished flag when dropped, whatever happened before.
struct EndGuard<'a, T> {
    sender: &'a Sender<QueueItem<T>>,
    state: &'a StreamState,
    metrics: &'a StreamMetrics,
}

impl<T> Drop for EndGuard<'_, T> {
    fn drop(&mut self) {
        // Fails only when the consumer is gone.
        let _ = self.sender.send(QueueItem::End);
        self.metrics.end_producer();
        self.state.finished.store(true, Ordering::SeqCst);
    }
}

impl<T: Record> ProducerJob<T> {
    fn run(self) {
        let ProducerJob {
            source,
            sheet,
            bindings,
            sender,
            state,
            metrics,
        } = self;
        metrics.begin_producer();
        let _guard = EndGuard {
            sender: &sender,
            state: &state,
            metrics: &metrics,
        };

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            produce(&source, &sheet, bindings, &sender, &state, &metrics)
        }));
        let failure = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(e),
            Err(payload) => Some(IngestionError::ProducerPanicked {
                message: panic_message(payload.as_ref()),
            }),
        };
        if let Some(e) = failure {
            if !state.is_cancelled() {
                let _ = state.failure.set(e);
            }
        }
    }
}

fn produce<T: Record>(
    source: &SheetSource,
    sheet: &SheetSelection,
    bindings: Arc<TypeBindingSet<T>>,
    sender: &Sender<QueueItem<T>>,
    state: &StreamState,
    metrics: &StreamMetrics,
) -> IngestionResult<()> {
    if state.is_cancelled() {
        return Ok(());
    }
    let mut reader = WorkbookReader::open(source)?;
    // Closed while the shared tables were loading.
    if state.is_cancelled() {
        return Ok(());
    }
    let mut sink = RecordSink::new(bindings, |record: T| {
        if state.is_cancelled() {
            return Ok(RowFlow::Stop);
        }
        match sender.try_send(QueueItem::Record(record)) {
            Ok(()) => {}
            Err(TrySendError::Full(item)) => {
                let started = Instant::now();
                if sender.send(item).is_err() {
                    return Ok(RowFlow::Stop);
                }
                metrics.on_backpressure(started.elapsed());
            }
            Err(TrySendError::Disconnected(_)) => return Ok(RowFlow::Stop),
        }
        metrics.on_enqueued();
        Ok(RowFlow::Continue)
    });
    reader.read_into(sheet, &mut sink)?;
    Ok(())
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use crossbeam_channel::{TryRecvError, bounded};

    use super::*;
    use crate::binding::{RecordDescriptor, resolve};

    #[derive(Default)]
    struct Line {
        id: i64,
    }

    impl Record for Line {
        fn describe(d: &mut RecordDescriptor<Self>) {
            d.field("id", |l: &Self| l.id, |l: &mut Self, v| l.id = v);
            d.read_column("id", "ID");
        }
    }

    #[test]
    fn cancelled_producer_does_not_open_the_workbook() {
        let (sender, receiver) = bounded::<QueueItem<Line>>(4);
        let state = StreamState::default();
        state.cancel();
        let metrics = StreamMetrics::new();

        // A missing file would fail with an I/O error if it were opened.
        let source = SheetSource::Path("no/such/workbook.xlsx".into());
        let bindings = resolve::<Line>().unwrap();
        produce(&source, &SheetSelection::First, bindings, &sender, &state, &metrics).unwrap();

        assert!(matches!(receiver.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(metrics.snapshot().rows_enqueued, 0);
    }

    #[test]
    fn end_marker_follows_a_cancelled_run() {
        let (sender, receiver) = bounded::<QueueItem<Line>>(4);
        let state = Arc::new(StreamState::default());
        state.cancel();
        let job = ProducerJob {
            source: SheetSource::Path("no/such/workbook.xlsx".into()),
            sheet: SheetSelection::First,
            bindings: resolve::<Line>().unwrap(),
            sender,
            state: Arc::clone(&state),
            metrics: Arc::new(StreamMetrics::new()),
        };
        spawn(job).unwrap().join().unwrap();

        assert!(matches!(receiver.recv(), Ok(QueueItem::End)));
        assert!(state.is_finished());
        assert!(!state.has_failed());
    }
}
