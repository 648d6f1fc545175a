use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use notify::{EventKind, RecommendedWatcher, RecursiveMode, Watcher as _};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::types::{IngestError, Result};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Changed(PathBuf),
    /// The backend cannot name files; every root should be rescanned.
    Rescan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendKind {
    Notify,
    Poll,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Notify => "notify",
            Self::Poll => "poll",
        }
    }
}

pub trait WatchBackend {
    fn kind(&self) -> BackendKind;
    fn start(&self, roots: &[PathBuf], tx: mpsc::UnboundedSender<WatchEvent>)
    -> Result<WatchGuard>;
}

pub struct WatchGuard {
    inner: GuardInner,
}

enum GuardInner {
    Notify(RecommendedWatcher),
    Poll(JoinHandle<()>),
}

impl Drop for WatchGuard {
    fn drop(&mut self) {
        if let GuardInner::Poll(handle) = &self.inner {
            handle.abort();
        }
    }
}

/// OS change notifications, filtered to paths accepted by `filter`.
pub struct NotifyBackend {
    pub filter: fn(&Path) -> bool,
}

impl WatchBackend for NotifyBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Notify
    }

    fn start(
        &self,
        roots: &[PathBuf],
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<WatchGuard> {
        let filter = self.filter;
        let mut watcher =
            notify::recommended_watcher(move |res: notify::Result<notify::Event>| match res {
                Ok(event) => {
                    if !matches!(
                        event.kind,
                        EventKind::Create(_) | EventKind::Modify(_) | EventKind::Remove(_)
                    ) {
                        return;
                    }
                    for path in event.paths.into_iter().filter(|path| filter(path)) {
                        let _ = tx.send(WatchEvent::Changed(path));
                    }
                }
                Err(err) => {
                    warn!(error = %err, "file watcher error, requesting rescan");
                    let _ = tx.send(WatchEvent::Rescan);
                }
            })?;
        for root in roots {
            watcher.watch(root, RecursiveMode::Recursive)?;
        }
        Ok(WatchGuard {
            inner: GuardInner::Notify(watcher),
        })
    }
}

/// Fixed-interval rescans. Needs a running tokio runtime.
pub struct PollBackend {
    pub interval: Duration,
}

impl WatchBackend for PollBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Poll
    }

    fn start(
        &self,
        _roots: &[PathBuf],
        tx: mpsc::UnboundedSender<WatchEvent>,
    ) -> Result<WatchGuard> {
        let handle = tokio::runtime::Handle::try_current()
            .map_err(|err| IngestError::Io(io::Error::other(err)))?;
        let period = self.interval.max(Duration::from_millis(10));
        let task = handle.spawn(async move {
            let mut ticker =
                tokio::time::interval_at(tokio::time::Instant::now() + period, period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if tx.send(WatchEvent::Rescan).is_err() {
                    break;
                }
            }
        });
        Ok(WatchGuard {
            inner: GuardInner::Poll(task),
        })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WatchOptions {
    pub use_fs_events: bool,
    pub poll_interval: Duration,
    pub filter: fn(&Path) -> bool,
}

pub struct Watcher {
    kind: BackendKind,
    rx: mpsc::UnboundedReceiver<WatchEvent>,
    _guard: WatchGuard,
}

impl Watcher {
    pub fn kind(&self) -> BackendKind {
        self.kind
    }

    pub async fn next(&mut self) -> Option<WatchEvent> {
        self.rx.recv().await
    }
}

fn start_with(backend: &dyn WatchBackend, roots: &[PathBuf]) -> Result<Watcher> {
    let (tx, rx) = mpsc::unbounded_channel();
    let guard = backend.start(roots, tx)?;
    Ok(Watcher {
        kind: backend.kind(),
        rx,
        _guard: guard,
    })
}

/// Starts OS notifications when enabled, falling back to polling when they
/// are disabled or fail to initialise.
pub fn start_watcher(name: &str, roots: &[PathBuf], options: WatchOptions) -> Result<Watcher> {
    if options.use_fs_events {
        let backend = NotifyBackend {
            filter: options.filter,
        };
        match start_with(&backend, roots) {
            Ok(watcher) => {
                info!(watcher = name, backend = "notify", "file watcher started");
                return Ok(watcher);
            }
            Err(err) => {
                warn!(watcher = name, error = %err, "file notifications unavailable, falling back to polling");
            }
        }
    }
    let backend = PollBackend {
        interval: options.poll_interval,
    };
    let watcher = start_with(&backend, roots)?;
    info!(
        watcher = name,
        backend = "poll",
        interval_ms = options.poll_interval.as_millis() as u64,
        "file watcher started"
    );
    Ok(watcher)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn any_path(_: &Path) -> bool {
        true
    }

    #[tokio::test]
    async fn poll_backend_emits_rescans() {
        let mut watcher = start_watcher(
            "test",
            &[],
            WatchOptions {
                use_fs_events: false,
                poll_interval: Duration::from_millis(20),
                filter: any_path,
            },
        )
        .expect("watcher");
        assert_eq!(watcher.kind(), BackendKind::Poll);
        let event = tokio::time::timeout(Duration::from_secs(2), watcher.next())
            .await
            .expect("tick");
        assert_eq!(event, Some(WatchEvent::Rescan));
    }

    #[tokio::test]
    async fn missing_root_falls_back_to_polling() {
        let dir = tempfile::tempdir().expect("temp dir");
        let missing = dir.path().join("does-not-exist");
        let watcher = start_watcher(
            "test",
            &[missing],
            WatchOptions {
                use_fs_events: true,
                poll_interval: Duration::from_millis(50),
                filter: any_path,
            },
        )
        .expect("watcher");
        assert_eq!(watcher.kind(), BackendKind::Poll);
    }
}
