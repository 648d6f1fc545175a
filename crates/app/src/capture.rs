use std::path::PathBuf;
use std::sync::Arc;

use ingest::{
    PlanBatch, PlanDiffer, TailBatch, TranscriptTailer, WatchEvent, WatchOptions,
    is_manifest_path, is_transcript_path, start_watcher,
};
use telemetry_db::Db;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{BusEvent, EventBus, ListenerHandle, METRIC_INGESTED, PLAN_EVENT};
use crate::error::Result;
use crate::services::SharedConfig;
use crate::util::run_blocking;

/// Session id stamped on plan events, which have no agent session of their own.
pub const PLAN_WATCHER_SESSION: &str = "plan-watcher";

/// Tails transcripts under `transcript.projectsDir` and publishes each new
/// usage line on `metric:ingested` until cancelled.
pub async fn run_transcript_capture(
    config: SharedConfig,
    bus: EventBus,
    cancel: CancellationToken,
) -> Result<()> {
    let root = config.transcript.projects_dir.clone();
    let mut tailer = TranscriptTailer::new();

    let scan_root = root.clone();
    let (next, batch) = run_blocking(move || {
        let batch = tailer.scan(&scan_root);
        Ok((tailer, batch))
    })
    .await?;
    tailer = next;
    publish_metrics(&bus, batch).await;

    let mut watcher = start_watcher(
        "transcripts",
        std::slice::from_ref(&root),
        WatchOptions {
            use_fs_events: config.transcript.use_fs_watch,
            poll_interval: config.transcript.fallback_poll_interval,
            filter: is_transcript_path,
        },
    )?;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = watcher.next() => event,
        };
        let Some(event) = event else {
            warn!("transcript watcher stopped");
            break;
        };
        let scan_root = root.clone();
        let (next, batch) = run_blocking(move || {
            let batch = match &event {
                WatchEvent::Changed(path) => tailer.read_new_lines(path),
                WatchEvent::Rescan => tailer.scan(&scan_root),
            };
            Ok((tailer, batch))
        })
        .await?;
        tailer = next;
        publish_metrics(&bus, batch).await;
    }
    debug!(files = tailer.tracked_files(), "transcript capture stopped");
    Ok(())
}

/// Watches plan manifests under the active and complete roots and publishes
/// every task status transition on `plan:event`. Statuses present at startup
/// are recorded without emitting.
pub async fn run_plan_capture(
    config: SharedConfig,
    bus: EventBus,
    cancel: CancellationToken,
) -> Result<()> {
    let roots = config.plan_roots();
    let differ = PlanDiffer::new(PLAN_WATCHER_SESSION);

    let prime_roots = roots.clone();
    let (mut differ, _) = run_blocking(move || {
        let mut differ = differ;
        let batch = differ.prime(&prime_roots);
        Ok((differ, batch))
    })
    .await?;
    info!(plans = differ.tracked_plans(), "plan manifests primed");

    let mut watcher = start_watcher(
        "plans",
        &roots,
        WatchOptions {
            use_fs_events: true,
            poll_interval: config.transcript.fallback_poll_interval,
            filter: is_manifest_path,
        },
    )?;
    loop {
        let event = tokio::select! {
            _ = cancel.cancelled() => break,
            event = watcher.next() => event,
        };
        let Some(event) = event else {
            warn!("plan watcher stopped");
            break;
        };
        let scan_roots = roots.clone();
        let (next, batch) = run_blocking(move || {
            let batch = match &event {
                WatchEvent::Changed(path) => differ.observe(path),
                WatchEvent::Rescan => differ.scan(&scan_roots),
            };
            Ok((differ, batch))
        })
        .await?;
        differ = next;
        publish_plan_events(&bus, batch).await;
    }
    Ok(())
}

async fn publish_metrics(bus: &EventBus, batch: TailBatch) {
    if batch.metrics.is_empty() {
        return;
    }
    debug!(
        metrics = batch.metrics.len(),
        files = batch.files_read,
        skipped = batch.issues.len(),
        "transcript lines captured"
    );
    for entry in batch.metrics {
        bus.emit(METRIC_INGESTED, BusEvent::Metric(Arc::new(entry))).await;
    }
}

async fn publish_plan_events(bus: &EventBus, batch: PlanBatch) {
    for event in batch.events {
        info!(
            plan = %event.plan_name,
            feature = event.feature_id.as_deref().unwrap_or(""),
            event_type = event.event_type.as_str(),
            "plan status changed"
        );
        bus.emit(PLAN_EVENT, BusEvent::Plan(Arc::new(event))).await;
    }
}

pub fn plan_store_listener(db_path: PathBuf) -> ListenerHandle {
    Arc::new(move |event: BusEvent| {
        let db_path = db_path.clone();
        async move {
            if let BusEvent::Plan(plan_event) = event {
                run_blocking(move || {
                    let mut db = Db::open(&db_path)?;
                    db.insert_plan_event(&plan_event)?;
                    Ok(())
                })
                .await?;
            }
            Ok::<(), anyhow::Error>(())
        }
    })
}
