use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use telemetry_core::MetricEntry;
use telemetry_db::Db;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::bus::{BusEvent, EventBus, ListenerHandle, METRIC_COLLECTED};
use crate::config::CollectorConfig;
use crate::error::{AppError, Result};

/// A failed flush keeps at most this many full batches buffered.
const RETAINED_BATCHES: usize = 10;

#[derive(Clone)]
pub struct Collector {
    inner: Arc<CollectorInner>,
}

struct CollectorInner {
    db_path: PathBuf,
    bus: EventBus,
    flush_interval: Duration,
    max_buffer_size: usize,
    buffer: Mutex<VecDeque<MetricEntry>>,
    wake: Notify,
    flushing: tokio::sync::Mutex<()>,
}

impl Collector {
    pub fn new(db_path: PathBuf, bus: EventBus, config: &CollectorConfig) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                db_path,
                bus,
                flush_interval: config.flush_interval,
                max_buffer_size: config.max_buffer_size.max(1),
                buffer: Mutex::new(VecDeque::new()),
                wake: Notify::new(),
                flushing: tokio::sync::Mutex::new(()),
            }),
        }
    }

    /// Appends to the buffer without touching storage. A full buffer wakes
    /// the flush loop.
    pub fn collect(&self, entry: MetricEntry) {
        let len = {
            let mut buffer = self.inner.buffer.lock();
            buffer.push_back(entry);
            buffer.len()
        };
        if len >= self.inner.max_buffer_size {
            self.inner.wake.notify_one();
        }
    }

    pub fn buffered(&self) -> usize {
        self.inner.buffer.lock().len()
    }

    /// Writes everything buffered in one transaction, then republishes each
    /// entry on `metric:collected`. On failure the batch goes back to the
    /// front of the buffer for the next attempt.
    pub async fn flush(&self) -> Result<usize> {
        let _guard = self.inner.flushing.lock().await;
        let batch: Vec<MetricEntry> = self.inner.buffer.lock().drain(..).collect();
        if batch.is_empty() {
            return Ok(0);
        }

        let db_path = self.inner.db_path.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let inserted = Db::open(&db_path).and_then(|mut db| db.insert_metrics(&batch));
            (batch, inserted)
        })
        .await;

        let (batch, inserted) = match outcome {
            Ok((batch, Ok(inserted))) => (batch, inserted),
            Ok((batch, Err(err))) => {
                self.restore(batch);
                return Err(err.into());
            }
            Err(err) => return Err(AppError::Message(format!("flush task failed: {err}"))),
        };
        debug!(entries = batch.len(), inserted, "collector flushed batch");
        let count = batch.len();
        for entry in batch {
            self.inner
                .bus
                .emit(METRIC_COLLECTED, BusEvent::Metric(Arc::new(entry)))
                .await;
        }
        Ok(count)
    }

    fn restore(&self, batch: Vec<MetricEntry>) {
        let cap = self.inner.max_buffer_size * RETAINED_BATCHES;
        let mut buffer = self.inner.buffer.lock();
        for entry in batch.into_iter().rev() {
            buffer.push_front(entry);
        }
        let overflow = buffer.len().saturating_sub(cap);
        if overflow > 0 {
            buffer.drain(..overflow);
            warn!(dropped = overflow, cap, "collector buffer full, dropped oldest entries");
        }
    }

    pub async fn run(self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.inner.flush_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
                _ = self.inner.wake.notified() => {}
            }
            if let Err(err) = self.flush().await {
                error!(error = %err, buffered = self.buffered(), "collector flush failed");
            }
        }
        match self.flush().await {
            Ok(count) => debug!(entries = count, "collector final flush"),
            Err(err) => error!(error = %err, "collector final flush failed"),
        }
    }

    pub fn listener(&self) -> ListenerHandle {
        let collector = self.clone();
        Arc::new(move |event: BusEvent| {
            if let BusEvent::Metric(entry) = event {
                collector.collect(Arc::unwrap_or_clone(entry));
            }
            async { Ok::<(), anyhow::Error>(()) }
        })
    }
}
