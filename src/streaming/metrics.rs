use std::fmt;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Real-time metrics for one record stream.
///
/// The producer and the consumer update these counters while the stream runs; callers can
/// snapshot them at any time.
pub struct StreamMetrics {
    started_at: Mutex<Option<Instant>>,
    elapsed_ns: AtomicU64,

    rows_enqueued: AtomicU64,
    rows_delivered: AtomicU64,
    batches_delivered: AtomicU64,
    backpressure_waits: AtomicU64,
    backpressure_wait_ns: AtomicU64,
    peak_buffered: AtomicU64,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            started_at: Mutex::new(None),
            elapsed_ns: AtomicU64::new(0),
            rows_enqueued: AtomicU64::new(0),
            rows_delivered: AtomicU64::new(0),
            batches_delivered: AtomicU64::new(0),
            backpressure_waits: AtomicU64::new(0),
            backpressure_wait_ns: AtomicU64::new(0),
            peak_buffered: AtomicU64::new(0),
        }
    }

    pub(crate) fn begin_producer(&self) {
        *self.started_at.lock().expect("metrics mutex poisoned") = Some(Instant::now());
    }

    pub(crate) fn end_producer(&self) {
        let started = *self.started_at.lock().expect("metrics mutex poisoned");
        if let Some(started) = started {
            self.elapsed_ns.store(as_nanos(started.elapsed()), Ordering::SeqCst);
        }
    }

    pub(crate) fn on_enqueued(&self) {
        let enqueued = self.rows_enqueued.fetch_add(1, Ordering::SeqCst) + 1;
        let delivered = self.rows_delivered.load(Ordering::SeqCst);
        update_max(&self.peak_buffered, enqueued.saturating_sub(delivered));
    }

    pub(crate) fn on_backpressure(&self, waited: Duration) {
        let _ = self.backpressure_waits.fetch_add(1, Ordering::SeqCst);
        let _ = self.backpressure_wait_ns.fetch_add(as_nanos(waited), Ordering::SeqCst);
    }

    pub(crate) fn on_batch(&self, rows: usize) {
        let _ = self.rows_delivered.fetch_add(rows as u64, Ordering::SeqCst);
        let _ = self.batches_delivered.fetch_add(1, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> StreamMetricsSnapshot {
        let elapsed_ns = self.elapsed_ns.load(Ordering::SeqCst);
        let elapsed = if elapsed_ns > 0 {
            Some(Duration::from_nanos(elapsed_ns))
        } else {
            None
        };

        StreamMetricsSnapshot {
            rows_enqueued: self.rows_enqueued.load(Ordering::SeqCst),
            rows_delivered: self.rows_delivered.load(Ordering::SeqCst),
            batches_delivered: self.batches_delivered.load(Ordering::SeqCst),
            backpressure_waits: self.backpressure_waits.load(Ordering::SeqCst),
            backpressure_wait: Duration::from_nanos(
                self.backpressure_wait_ns.load(Ordering::SeqCst),
            ),
            peak_buffered: self.peak_buffered.load(Ordering::SeqCst),
            producer_elapsed: elapsed,
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StreamMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("StreamMetrics").field(&self.snapshot()).finish()
    }
}

fn as_nanos(d: Duration) -> u64 {
    d.as_nanos().min(u64::MAX as u128) as u64
}

fn update_max(dst: &AtomicU64, now: u64) {
    loop {
        let cur = dst.load(Ordering::SeqCst);
        if now <= cur {
            break;
        }
        if dst
            .compare_exchange(cur, now, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            break;
        }
    }
}

/// Immutable snapshot of [`StreamMetrics`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamMetricsSnapshot {
    pub rows_enqueued: u64,
    pub rows_delivered: u64,
    pub batches_delivered: u64,
    /// Number of times the producer found the queue full.
    pub backpressure_waits: u64,
    /// Total time the producer spent blocked on a full queue.
    pub backpressure_wait: Duration,
    /// Highest observed number of records enqueued but not yet delivered.
    pub peak_buffered: u64,
    /// Producer run time; `None` while it is still running.
    pub producer_elapsed: Option<Duration>,
}

impl fmt::Display for StreamMetricsSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "rows={}/{} (delivered/enqueued), batches={}, peak_buffered={}, \
             backpressure_waits={}, backpressure_wait={:?}, producer_elapsed={:?}",
            self.rows_delivered,
            self.rows_enqueued,
            self.batches_delivered,
            self.peak_buffered,
            self.backpressure_waits,
            self.backpressure_wait,
            self.producer_elapsed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_buffered_tracks_the_gap_between_producer_and_consumer() {
        let m = StreamMetrics::new();
        m.on_enqueued();
        m.on_enqueued();
        m.on_enqueued();
        m.on_batch(2);
        m.on_enqueued();
        let s = m.snapshot();
        assert_eq!(s.rows_enqueued, 4);
        assert_eq!(s.rows_delivered, 2);
        assert_eq!(s.batches_delivered, 1);
        assert_eq!(s.peak_buffered, 3);
        assert_eq!(s.producer_elapsed, None);
    }

    #[test]
    fn snapshot_display_mentions_counts() {
        let m = StreamMetrics::new();
        m.on_backpressure(Duration::from_millis(3));
        m.begin_producer();
        m.end_producer();
        let text = m.snapshot().to_string();
        assert!(text.contains("backpressure_waits=1"), "{text}");
        assert!(text.contains("batches=0"), "{text}");
    }
}
