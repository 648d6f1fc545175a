use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, join_all};
use parking_lot::RwLock;
use telemetry_core::{MetricEntry, PlanEvent};
use tracing::{error, warn};

/// Producers (hooks, transcript capture) to the collector.
pub const METRIC_INGESTED: &str = "metric:ingested";
/// Collector to live metric streams, once a batch is stored.
pub const METRIC_COLLECTED: &str = "metric:collected";
/// Plan capture to plan storage and live plan streams.
pub const PLAN_EVENT: &str = "plan:event";

#[derive(Debug, Clone)]
pub enum BusEvent {
    Metric(Arc<MetricEntry>),
    Plan(Arc<PlanEvent>),
}

/// Something that reacts to events on a channel. Failures are reported back
/// to the bus, which logs them; they never reach the emitter.
pub trait Listener: Send + Sync + 'static {
    fn handle(&self, event: BusEvent) -> BoxFuture<'static, anyhow::Result<()>>;
}

impl<F, Fut> Listener for F
where
    F: Fn(BusEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    fn handle(&self, event: BusEvent) -> BoxFuture<'static, anyhow::Result<()>> {
        Box::pin(self(event))
    }
}

pub type ListenerHandle = Arc<dyn Listener>;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmitReport {
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Clone, Default)]
pub struct EventBus {
    channels: Arc<RwLock<HashMap<String, Vec<ListenerHandle>>>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, channel: &str, listener: ListenerHandle) -> bool {
        let mut channels = self.channels.write();
        let listeners = channels.entry(channel.to_string()).or_default();
        if listeners.iter().any(|existing| same_listener(existing, &listener)) {
            return false;
        }
        listeners.push(listener);
        true
    }

    pub fn unsubscribe(&self, channel: &str, listener: &ListenerHandle) -> bool {
        let mut channels = self.channels.write();
        let Some(listeners) = channels.get_mut(channel) else {
            return false;
        };
        let before = listeners.len();
        listeners.retain(|existing| !same_listener(existing, listener));
        let removed = listeners.len() != before;
        if listeners.is_empty() {
            channels.remove(channel);
        }
        removed
    }

    pub fn listener_count(&self, channel: &str) -> usize {
        self.channels
            .read()
            .get(channel)
            .map(Vec::len)
            .unwrap_or(0)
    }

    /// Runs every current listener of `channel` concurrently and waits for
    /// all of them to settle. A listener that errors or panics is logged and
    /// counted as failed; its siblings still run.
    pub async fn emit(&self, channel: &str, event: BusEvent) -> EmitReport {
        let listeners = self
            .channels
            .read()
            .get(channel)
            .cloned()
            .unwrap_or_default();
        if listeners.is_empty() {
            return EmitReport::default();
        }
        let tasks = listeners.into_iter().map(|listener| {
            let event = event.clone();
            tokio::spawn(async move { listener.handle(event).await })
        });
        let mut report = EmitReport::default();
        for outcome in join_all(tasks).await {
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    report.failed += 1;
                    warn!(channel, error = %err, "bus listener failed");
                }
                Err(err) => {
                    report.failed += 1;
                    error!(channel, error = %err, "bus listener panicked");
                }
            }
        }
        report
    }
}

fn same_listener(a: &ListenerHandle, b: &ListenerHandle) -> bool {
    std::ptr::addr_eq(Arc::as_ptr(a), Arc::as_ptr(b))
}
