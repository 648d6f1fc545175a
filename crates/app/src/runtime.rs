use std::future::Future;
use std::time::Duration;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::app::AppState;
use crate::capture;
use crate::error::Result;
use crate::util::run_blocking;

const ARCHIVE_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Long-running tasks that share one cancellation token.
pub struct BackgroundTasks {
    cancel: CancellationToken,
    handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl BackgroundTasks {
    pub fn new(cancel: CancellationToken) -> Self {
        Self {
            cancel,
            handles: Vec::new(),
        }
    }

    pub fn start(state: &AppState, cancel: CancellationToken) -> Self {
        let mut tasks = Self::new(cancel.clone());
        tasks.spawn("collector", state.collector.clone().run(cancel.clone()));
        tasks.spawn(
            "transcript-capture",
            log_failure(
                "transcript capture",
                capture::run_transcript_capture(
                    state.config.clone(),
                    state.bus.clone(),
                    cancel.clone(),
                ),
            ),
        );
        if state.config.plans.watch_manifest {
            tasks.spawn(
                "plan-capture",
                log_failure(
                    "plan capture",
                    capture::run_plan_capture(
                        state.config.clone(),
                        state.bus.clone(),
                        cancel.clone(),
                    ),
                ),
            );
        }

        let aggregation = state.services.aggregation.clone();
        tasks.spawn(
            "aggregation-cache",
            periodic(
                "aggregation cache",
                cancel.clone(),
                state.config.aggregation_interval,
                move || aggregation.refresh_cache(Utc::now()).map(|_| ()),
            ),
        );
        let archive = state.services.archive.clone();
        tasks.spawn(
            "archive",
            periodic("archive", cancel, ARCHIVE_INTERVAL, move || {
                archive.run(Utc::now()).map(|_| ())
            }),
        );
        tasks
    }

    pub fn spawn<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.handles.push((name, tokio::spawn(task)));
    }

    pub fn count(&self) -> usize {
        self.handles.len()
    }

    pub async fn shutdown(self) {
        self.cancel.cancel();
        for (name, handle) in self.handles {
            if let Err(err) = handle.await {
                error!(task = name, error = %err, "background task panicked");
            }
        }
        info!("background tasks stopped");
    }
}

async fn log_failure<F>(name: &'static str, task: F)
where
    F: Future<Output = Result<()>>,
{
    if let Err(err) = task.await {
        error!(task = name, error = %err, "background task failed");
    }
}

/// Runs `job` on the blocking pool immediately and then every `period`.
async fn periodic<F>(name: &'static str, cancel: CancellationToken, period: Duration, job: F)
where
    F: Fn() -> Result<()> + Clone + Send + 'static,
{
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let job = job.clone();
        if let Err(err) = run_blocking(job).await {
            error!(job = name, error = %err, "background job failed");
        }
    }
}
