//! Periodic progress rendering for opaque, long-running operations.
//!
//! Extraction backends give no byte callbacks, so progress is approximated by
//! polling how much has landed on disk ([`DirectoryGrowth`]). Transfers that do
//! report bytes feed a [`TransferCounter`] instead. Either way the
//! [`ProgressMonitor`] only sees a [`ProgressSource`].

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::transport::{StatusSink, TransferProgress};
use crate::units::{BAR_CELLS, progress_bar, readable_duration, readable_size, sweep_bar};

/// Never claim completion before the operation has actually returned.
const RUNNING_PERCENT_CAP: f64 = 99.9;

pub trait ProgressSource: Send + Sync + 'static {
    /// Bytes done so far.
    fn measure(&self) -> impl Future<Output = u64> + Send;

    /// Expected total, when known up front.
    fn total(&self) -> Option<u64>;
}

/// Sums the regular files materialized under a directory.
pub struct DirectoryGrowth {
    root: PathBuf,
    total: Option<u64>,
}

impl DirectoryGrowth {
    pub fn new(root: impl Into<PathBuf>, total: Option<u64>) -> Self {
        Self {
            root: root.into(),
            total,
        }
    }
}

impl ProgressSource for DirectoryGrowth {
    async fn measure(&self) -> u64 {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || unpackr_archive::tree_size(&root))
            .await
            .unwrap_or(0)
    }

    fn total(&self) -> Option<u64> {
        self.total
    }
}

/// Byte counter fed by a transfer callback.
#[derive(Debug, Default)]
pub struct TransferCounter {
    done: AtomicU64,
    total: AtomicU64,
}

impl TransferCounter {
    pub fn record(&self, done: u64, total: u64) {
        self.done.store(done, Ordering::Relaxed);
        self.total.store(total, Ordering::Relaxed);
    }

    /// A callback suitable for [`ChatTransport`](crate::transport::ChatTransport) transfers.
    pub fn callback(self: &Arc<Self>) -> TransferProgress {
        let counter = Arc::clone(self);
        Arc::new(move |done, total| counter.record(done, total))
    }
}

impl ProgressSource for TransferCounter {
    async fn measure(&self) -> u64 {
        self.done.load(Ordering::Relaxed)
    }

    fn total(&self) -> Option<u64> {
        match self.total.load(Ordering::Relaxed) {
            0 => None,
            total => Some(total),
        }
    }
}

/// One measurement, as handed to the renderer.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Snapshot {
    pub measured: u64,
    pub total: Option<u64>,
    pub elapsed: Duration,
    /// Monotonic render counter, drives the indeterminate animation.
    pub tick: u64,
}

impl Snapshot {
    /// Percentage done, capped below 100 while running.
    pub fn percent(&self) -> Option<f64> {
        let total = self.total.filter(|t| *t > 0)?;
        Some((self.measured as f64 / total as f64 * 100.0).min(RUNNING_PERCENT_CAP))
    }

    /// Average bytes per second since the start.
    pub fn speed(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 { self.measured as f64 / secs } else { 0.0 }
    }

    pub fn eta(&self) -> Option<Duration> {
        let total = self.total?;
        let speed = self.speed();
        if speed <= 0.0 {
            return None;
        }
        let remaining = total.saturating_sub(self.measured) as f64;
        Some(Duration::from_secs_f64(remaining / speed))
    }
}

/// Turns snapshots into status text.
#[derive(Clone, Debug)]
pub struct Renderer {
    action: String,
}

impl Renderer {
    pub fn new(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
        }
    }

    pub fn render(&self, snapshot: &Snapshot) -> String {
        let speed = readable_size(snapshot.speed() as u64);
        let elapsed = readable_duration(snapshot.elapsed);
        let done = readable_size(snapshot.measured);

        match (snapshot.percent(), snapshot.total) {
            (Some(percent), Some(total)) => {
                let eta = snapshot
                    .eta()
                    .map(readable_duration)
                    .unwrap_or_else(|| "-".to_string());
                format!(
                    "{action}\n[{bar}] {percent:.1}%\n┠ Processed: {done} of {total}\n┠ Speed: {speed}/s | ETA: {eta}\n┠ Elapsed: {elapsed}\n┖",
                    action = self.action,
                    bar = progress_bar(snapshot.measured, total, BAR_CELLS),
                    total = readable_size(total),
                )
            }
            _ => format!(
                "{action}\n[{bar}] working\n┠ Processed: {done}\n┠ Speed: {speed}/s\n┠ Elapsed: {elapsed}\n┖",
                action = self.action,
                bar = sweep_bar(snapshot.tick, BAR_CELLS),
            ),
        }
    }
}

/// A cancellable periodic render task.
///
/// Call [`finish`](Self::finish) to stop it: the loop is joined before the
/// terminal text is written, so no stale frame can land after it.
pub struct ProgressMonitor<S: StatusSink> {
    sink: Arc<S>,
    stop: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
    started: Instant,
}

impl<S: StatusSink> ProgressMonitor<S> {
    pub fn spawn<P: ProgressSource>(
        source: Arc<P>,
        sink: Arc<S>,
        renderer: Renderer,
        interval: Duration,
    ) -> Self {
        let (stop, mut stopped) = oneshot::channel::<()>();
        let started = Instant::now();
        let task_sink = Arc::clone(&sink);

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // The first tick completes immediately; render only after one interval.
            ticker.tick().await;

            let mut last_sent = String::new();
            let mut tick = 0u64;
            loop {
                tokio::select! {
                    _ = &mut stopped => break,
                    _ = ticker.tick() => {}
                }

                let snapshot = Snapshot {
                    measured: source.measure().await,
                    total: source.total(),
                    elapsed: started.elapsed(),
                    tick,
                };
                tick += 1;

                let text = renderer.render(&snapshot);
                if text == last_sent {
                    continue;
                }
                match task_sink.update(&text).await {
                    Ok(()) => last_sent = text,
                    Err(e) => tracing::debug!(error = %e, "progress edit failed"),
                }
            }
        });

        Self {
            sink,
            stop: Some(stop),
            task: Some(task),
            started,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Stop the loop, wait for it, then replace the status with `text`.
    pub async fn finish(mut self, text: &str) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
        if let Some(task) = self.task.take()
            && let Err(e) = task.await
        {
            tracing::debug!(error = %e, "progress task ended abnormally");
        }
        if let Err(e) = self.sink.update(text).await {
            tracing::debug!(error = %e, "final progress edit failed");
        }
    }
}

impl<S: StatusSink> Drop for ProgressMonitor<S> {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}
