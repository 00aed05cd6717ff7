//! Periodic scan orchestration.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use usgmon_core::{
    Config, DEFAULT_BATCH_SIZE, MonitoredPath, ScanId, ScanResult, ScanStatus, UsageRecord,
    format_duration,
};
use usgmon_scan::{ScanOptions, Scanner};
use usgmon_store::{StoreError, UsageStore};

use crate::error::{DaemonError, ScanFailure};
use crate::registry::ActiveScans;

/// Tunables for scan batching and shutdown.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DaemonOptions {
    /// Successful results accumulated before a flush to the store.
    pub batch_size: usize,
    /// Upper bound on how long shutdown waits for scans to unwind.
    pub shutdown_timeout: Duration,
    /// How often shutdown re-checks the active scan registry.
    pub shutdown_poll_interval: Duration,
}

impl Default for DaemonOptions {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            shutdown_timeout: Duration::from_secs(30),
            shutdown_poll_interval: Duration::from_millis(100),
        }
    }
}

impl DaemonOptions {
    /// Defaults with the batch size taken from configuration.
    pub fn from_config(config: &Config) -> Self {
        Self {
            batch_size: config.scan.batch_size,
            ..Self::default()
        }
    }
}

/// Summary of a scan that ran to completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOutcome {
    pub scan_id: ScanId,
    /// Usage records persisted.
    pub recorded: u64,
    /// Directories whose measurement failed and were left out.
    pub failed: u64,
}

#[derive(Debug, Default)]
struct Lifecycle {
    running: bool,
    stop: Option<CancellationToken>,
}

struct Inner {
    config: Config,
    scanner: Scanner,
    store: Arc<dyn UsageStore>,
    options: DaemonOptions,
    active: ActiveScans,
    lifecycle: Mutex<Lifecycle>,
    idle: watch::Sender<bool>,
}

/// Runs one periodic scan loop per monitored path until shut down.
///
/// Cloning yields another handle to the same daemon, so one task can
/// [`run`](Self::run) it while another calls [`stop`](Self::stop).
#[derive(Clone)]
pub struct Daemon {
    inner: Arc<Inner>,
}

impl Daemon {
    /// Create a daemon using the configured worker count and strategy.
    pub fn new(
        config: Config,
        store: Arc<dyn UsageStore>,
        options: DaemonOptions,
    ) -> Result<Self, DaemonError> {
        let scanner = Scanner::with_kind(config.scan.workers, config.scan.strategy);
        Self::with_scanner(config, store, scanner, options)
    }

    /// Create a daemon with an explicit scanner.
    pub fn with_scanner(
        config: Config,
        store: Arc<dyn UsageStore>,
        scanner: Scanner,
        options: DaemonOptions,
    ) -> Result<Self, DaemonError> {
        config.validate()?;

        let (idle, _) = watch::channel(true);
        Ok(Self {
            inner: Arc::new(Inner {
                config,
                scanner,
                store,
                options: DaemonOptions {
                    batch_size: options.batch_size.max(1),
                    ..options
                },
                active: ActiveScans::new(),
                lifecycle: Mutex::new(Lifecycle::default()),
                idle,
            }),
        })
    }

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Run until `shutdown` is cancelled or [`stop`](Self::stop) is called,
    /// then shut down within the configured timeout.
    ///
    /// Returns immediately if the daemon is already running.
    pub async fn run(&self, shutdown: CancellationToken) {
        let stop = {
            let mut lifecycle = self.inner.lifecycle();
            if lifecycle.running {
                debug!("Daemon already running");
                return;
            }
            let stop = shutdown.child_token();
            lifecycle.running = true;
            lifecycle.stop = Some(stop.clone());
            self.inner.idle.send_replace(false);
            stop
        };

        if self.inner.config.paths.is_empty() {
            warn!("No paths configured for monitoring");
        }

        let mut loops = JoinSet::new();
        for path in &self.inner.config.paths {
            let inner = Arc::clone(&self.inner);
            let path = path.clone();
            let cancel = stop.clone();
            loops.spawn(async move { inner.path_loop(path, cancel).await });
        }

        stop.cancelled().await;
        info!("Shutting down");
        self.inner.shutdown(loops).await;

        {
            let mut lifecycle = self.inner.lifecycle();
            lifecycle.running = false;
            lifecycle.stop = None;
        }
        self.inner.idle.send_replace(true);
        info!("Daemon stopped");
    }

    /// Ask a running daemon to shut down. No-op if it is not running.
    pub fn stop(&self) {
        let lifecycle = self.inner.lifecycle();
        if let Some(stop) = &lifecycle.stop {
            stop.cancel();
        }
    }

    /// Wait until the daemon is not running.
    pub async fn wait(&self) {
        let mut idle = self.inner.idle.subscribe();
        // The sender lives as long as `self`, so this only fails on drop.
        let _ = idle.wait_for(|idle| *idle).await;
    }

    pub fn is_running(&self) -> bool {
        self.inner.lifecycle().running
    }

    /// Keys of the monitored paths being scanned right now.
    pub fn active_scans(&self) -> Vec<String> {
        self.inner.active.snapshot()
    }

    /// Run a single scan of `path` and persist it, outside any schedule.
    pub async fn scan_once(
        &self,
        path: &MonitoredPath,
        cancel: &CancellationToken,
    ) -> Result<ScanOutcome, ScanFailure> {
        self.inner.run_scan(path, cancel).await
    }
}

impl Inner {
    fn lifecycle(&self) -> MutexGuard<'_, Lifecycle> {
        self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn path_loop(self: Arc<Self>, path: MonitoredPath, cancel: CancellationToken) {
        let interval = path.effective_interval(self.config.scan.interval);
        info!(
            path = %path.path.display(),
            depth = path.depth,
            interval = %format_duration(interval),
            follow_symlinks = path.follow_symlinks,
            "Starting path scanner"
        );

        // The first tick completes immediately.
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.run_scan(&path, &cancel).await {
                Ok(_) => {}
                Err(ScanFailure::Cancelled) => {}
                Err(err) => error!(path = %path.path.display(), error = %err, "Scan failed"),
            }
        }

        debug!(path = %path.path.display(), "Path scanner stopped");
    }

    async fn run_scan(
        &self,
        path: &MonitoredPath,
        parent: &CancellationToken,
    ) -> Result<ScanOutcome, ScanFailure> {
        let token = parent.child_token();
        let _active = self.active.register(path.key(), token.clone());

        info!(path = %path.path.display(), depth = path.depth, "Starting scan");

        let scan_id = {
            let store = Arc::clone(&self.store);
            let base = path.path.clone();
            blocking(move || store.start_scan(&base)).await.inspect_err(|err| {
                error!(path = %path.path.display(), error = %err, "Failed to create scan record");
            })?
        };

        let mut results = match ScanOptions::for_path(path).and_then(|options| {
            self.scanner
                .scan_streaming(&path.path, path.depth, &options, &token)
        }) {
            Ok(results) => results,
            Err(err) => {
                error!(path = %path.path.display(), error = %err, "Scan failed to start");
                self.fail_scan(&scan_id, &err.to_string()).await;
                return Err(err.into());
            }
        };

        let mut batch = Vec::with_capacity(self.options.batch_size);
        let mut recorded: u64 = 0;
        let mut failed: u64 = 0;

        let cancelled = loop {
            let result = tokio::select! {
                biased;
                _ = token.cancelled() => break true,
                result = results.recv() => match result {
                    Some(result) => result,
                    None => break token.is_cancelled(),
                },
            };

            match result.outcome {
                Ok(size_bytes) => {
                    debug!(
                        directory = %result.path.display(),
                        size_bytes,
                        duration_ms = result.duration.as_millis() as u64,
                        strategy = self.scanner.strategy_name(),
                        "Scanned directory"
                    );
                    batch.push(UsageRecord::now(&path.path, result.path, size_bytes, &scan_id));
                }
                Err(err) if err.is_cancelled() => continue,
                Err(err) => {
                    failed += 1;
                    warn!(directory = %result.path.display(), error = %err, "Failed to measure directory");
                    continue;
                }
            }

            if batch.len() >= self.options.batch_size {
                match self.flush_or_fail(&scan_id, &mut batch).await {
                    Ok(count) => recorded += count,
                    Err(err) => {
                        token.cancel();
                        drain(&mut results).await;
                        return Err(err.into());
                    }
                }
                debug!(path = %path.path.display(), total = recorded, "Flushed batch");
            }
        };

        if cancelled {
            // The scan stays registered until in-flight measurements return.
            let discarded = drain(&mut results).await;
            warn!(
                path = %path.path.display(),
                directories_saved = recorded,
                discarded = batch.len() + discarded,
                "Scan cancelled"
            );
            self.fail_scan(&scan_id, ScanStatus::CANCELLED).await;
            return Err(ScanFailure::Cancelled);
        }

        recorded += self.flush_or_fail(&scan_id, &mut batch).await?;

        {
            let store = Arc::clone(&self.store);
            let id = scan_id.clone();
            blocking(move || store.complete_scan(&id, recorded))
                .await
                .inspect_err(|err| error!(scan_id = %scan_id, error = %err, "Failed to complete scan"))?;
        }

        info!(
            path = %path.path.display(),
            scan_id = %scan_id,
            directories = recorded,
            failed,
            strategy = self.scanner.strategy_name(),
            "Scan completed"
        );

        Ok(ScanOutcome {
            scan_id,
            recorded,
            failed,
        })
    }

    /// Write out the pending batch. On error the scan record is marked failed.
    async fn flush_or_fail(
        &self,
        scan_id: &ScanId,
        batch: &mut Vec<UsageRecord>,
    ) -> Result<u64, StoreError> {
        if batch.is_empty() {
            return Ok(0);
        }

        let records = std::mem::replace(batch, Vec::with_capacity(self.options.batch_size));
        let count = records.len() as u64;
        let store = Arc::clone(&self.store);

        match blocking(move || store.record_usage_batch(&records)).await {
            Ok(()) => Ok(count),
            Err(err) => {
                error!(scan_id = %scan_id, error = %err, "Failed to store batch");
                self.fail_scan(scan_id, &err.to_string()).await;
                Err(err)
            }
        }
    }

    async fn fail_scan(&self, scan_id: &ScanId, reason: &str) {
        let store = Arc::clone(&self.store);
        let id = scan_id.clone();
        let reason = reason.to_string();
        if let Err(err) = blocking(move || store.fail_scan(&id, &reason)).await {
            error!(scan_id = %scan_id, error = %err, "Failed to mark scan as failed");
        }
    }

    /// Wait for the path loops and then the registry to drain, bounded by
    /// the shutdown timeout. Anything left after that is cancelled and
    /// abandoned.
    async fn shutdown(&self, mut loops: JoinSet<()>) {
        let deadline = Instant::now() + self.options.shutdown_timeout;

        let drained = tokio::time::timeout_at(deadline, async {
            while loops.join_next().await.is_some() {}
        })
        .await
        .is_ok();

        if !self.active.is_empty() {
            info!(count = self.active.len(), "Waiting for in-progress scans to complete");
        }
        let mut poll = tokio::time::interval(self.options.shutdown_poll_interval);
        loop {
            if self.active.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                let remaining = self.active.cancel_all();
                warn!(remaining, "Timeout waiting for scans, forcing shutdown");
                break;
            }
            poll.tick().await;
        }

        if !drained {
            loops.abort_all();
        }
    }
}

/// Discard results until every worker has exited. Returns how many were
/// discarded.
async fn drain(results: &mut mpsc::Receiver<ScanResult>) -> usize {
    let mut discarded = 0;
    while results.recv().await.is_some() {
        discarded += 1;
    }
    discarded
}

/// Run a store call on the blocking pool.
async fn blocking<T, F>(call: F) -> Result<T, StoreError>
where
    F: FnOnce() -> Result<T, StoreError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(call)
        .await
        .map_err(|e| StoreError::Task {
            message: e.to_string(),
        })?
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_options() {
        let options = DaemonOptions::default();
        assert_eq!(options.batch_size, 100);
        assert_eq!(options.shutdown_timeout, Duration::from_secs(30));
        assert_eq!(options.shutdown_poll_interval, Duration::from_millis(100));
    }

    #[test]
    fn test_options_from_config() {
        let mut config = Config::default();
        config.scan.batch_size = 25;
        assert_eq!(DaemonOptions::from_config(&config).batch_size, 25);
    }
}
