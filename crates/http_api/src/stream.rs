use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use axum::extract::{ConnectInfo, State};
use axum::response::sse::{Event, Sse};
use futures::Stream;
use serde_json::Value;
use telemetry_app::util::run_blocking;
use telemetry_app::{BusEvent, EventBus, ListenerHandle, METRIC_COLLECTED, PLAN_EVENT};
use telemetry_core::now_timestamp;
use tokio::sync::mpsc;
use tokio::time::{Instant, interval_at};
use tracing::{debug, warn};

use crate::{errors::HttpError, state::HttpState};

/// Events a subscriber may fall behind by before new ones are dropped.
const SUBSCRIBER_QUEUE: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamKind {
    Metrics,
    Plans,
}

impl StreamKind {
    fn channel(self) -> &'static str {
        match self {
            Self::Metrics => METRIC_COLLECTED,
            Self::Plans => PLAN_EVENT,
        }
    }

    fn name(self) -> &'static str {
        match self {
            Self::Metrics => "metrics",
            Self::Plans => "plans",
        }
    }

    fn snapshot(self, context: &app_api::AppContext) -> telemetry_app::Result<Value> {
        Ok(match self {
            Self::Metrics => serde_json::to_value(app_api::metrics_snapshot(context)?)?,
            Self::Plans => serde_json::to_value(app_api::plans_snapshot(context)?)?,
        })
    }
}

/// A bus subscription owned by one stream. Closing is idempotent, so the
/// disconnect path and drop can both call it.
struct Subscription {
    bus: EventBus,
    channel: &'static str,
    listener: ListenerHandle,
    closed: AtomicBool,
    client: String,
}

impl Subscription {
    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.bus.unsubscribe(self.channel, &self.listener);
        debug!(channel = self.channel, client = %self.client, "stream closed");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.close();
    }
}

fn forwarding_listener(tx: mpsc::Sender<BusEvent>) -> ListenerHandle {
    Arc::new(move |event: BusEvent| {
        let result = match tx.try_send(event) {
            Ok(()) | Err(mpsc::error::TrySendError::Closed(_)) => Ok(()),
            Err(mpsc::error::TrySendError::Full(_)) => {
                Err(anyhow::anyhow!("stream subscriber lagging, event dropped"))
            }
        };
        async move { result }
    })
}

fn bus_event(event: BusEvent) -> Option<Event> {
    let built = match &event {
        BusEvent::Metric(entry) => Event::default().event("metric").json_data(entry.as_ref()),
        BusEvent::Plan(plan_event) => Event::default().event("plan").json_data(plan_event.as_ref()),
    };
    match built {
        Ok(event) => Some(event),
        Err(err) => {
            warn!(error = %err, "failed to encode stream event");
            None
        }
    }
}

fn heartbeat_event() -> Event {
    Event::default().event("heartbeat").data(now_timestamp())
}

pub(crate) fn client_key(connect: Option<ConnectInfo<SocketAddr>>) -> String {
    connect
        .map(|ConnectInfo(addr)| addr.ip().to_string())
        .unwrap_or_else(|| "local".to_string())
}

pub async fn metrics_events(
    State(state): State<HttpState>,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    open_stream(state, client_key(connect), StreamKind::Metrics).await
}

pub async fn plans_events(
    State(state): State<HttpState>,
    connect: Option<ConnectInfo<SocketAddr>>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    open_stream(state, client_key(connect), StreamKind::Plans).await
}

async fn open_stream(
    state: HttpState,
    client: String,
    kind: StreamKind,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, HttpError> {
    state.limiter.check(&client)?;

    let (tx, mut rx) = mpsc::channel(SUBSCRIBER_QUEUE);
    let listener = forwarding_listener(tx);
    let bus = state.context.app_state.bus.clone();
    bus.subscribe(kind.channel(), listener.clone());
    let subscription = Subscription {
        bus,
        channel: kind.channel(),
        listener,
        closed: AtomicBool::new(false),
        client,
    };
    debug!(stream = kind.name(), client = %subscription.client, "stream opened");

    let context = state.context.clone();
    let snapshot = run_blocking(move || kind.snapshot(&context)).await?;
    let snapshot = Event::default()
        .event("snapshot")
        .json_data(snapshot)
        .map_err(|err| telemetry_app::AppError::Message(format!("snapshot encoding: {err}")))?;

    let period = state.context.app_state.config.stream.heartbeat;
    let shutdown = state.shutdown.clone();
    let stream = async_stream::stream! {
        yield Ok(snapshot);
        let mut heartbeat = interval_at(Instant::now() + period, period);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                received = rx.recv() => {
                    match received {
                        Some(event) => {
                            if let Some(event) = bus_event(event) {
                                yield Ok(event);
                            }
                        }
                        None => break,
                    }
                }
                _ = heartbeat.tick() => {
                    yield Ok(heartbeat_event());
                }
            }
        }
        subscription.close();
    };

    Ok(Sse::new(stream))
}
