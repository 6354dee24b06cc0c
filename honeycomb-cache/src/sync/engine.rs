use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;

use futures_util::future::join_all;
use honeycomb_core::{CoordId, HoneycombError, HoneycombResult, SyncConfig, SyncConfigPatch, SyncError};
use tokio::runtime::Handle;
use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::connectivity::{ConnectivityMonitor, EnvironmentEvent, ReachabilityProbe};
use super::events::{notify, RegionFailure, SyncEvent, SyncObserver, SyncReport, SyncState, SyncStatus};
use crate::loader::RegionLoader;
use crate::store::CacheContext;

/// Background reconciliation of the cached regions.
///
/// Cloning is cheap; clones drive the same engine.
#[derive(Clone)]
pub struct SyncEngine {
    inner: Arc<SyncInner>,
}

struct SyncInner {
    ctx: CacheContext,
    loader: Arc<RegionLoader>,
    connectivity: Arc<ConnectivityMonitor>,
    probe: Option<Arc<dyn ReachabilityProbe>>,
    observer: RwLock<Option<Arc<dyn SyncObserver>>>,
    config: RwLock<SyncConfig>,
    runtime: Mutex<SyncRuntime>,
    in_flight: AtomicUsize,
}

#[derive(Default)]
struct SyncRuntime {
    status: SyncStatus,
    handle: Option<Handle>,
    timer: Option<JoinHandle<()>>,
    /// Bumped whenever the timer is replaced or cancelled so a tick that
    /// already fired can tell it is stale.
    timer_epoch: u64,
    listener: Option<JoinHandle<()>>,
}

struct Attempt {
    result: HoneycombResult<SyncReport>,
    /// Delay override for the next tick: a retry backoff, or the periodic
    /// interval once retries are exhausted.
    next_delay: Option<u64>,
}

/// Holds one slot of the in-flight counter.
struct InFlightGuard<'a> {
    inner: &'a SyncInner,
}

impl<'a> InFlightGuard<'a> {
    /// Caller has already incremented `in_flight`.
    fn adopt(inner: &'a SyncInner) -> Self {
        inner.lock_runtime().status.is_syncing = true;
        Self { inner }
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        let remaining = self.inner.in_flight.fetch_sub(1, Ordering::SeqCst).saturating_sub(1);
        self.inner.lock_runtime().status.is_syncing = remaining > 0;
    }
}

impl SyncInner {
    fn lock_runtime(&self) -> MutexGuard<'_, SyncRuntime> {
        self.runtime.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Drop for SyncInner {
    fn drop(&mut self) {
        let runtime = self.runtime.get_mut().unwrap_or_else(PoisonError::into_inner);
        if let Some(timer) = runtime.timer.take() {
            timer.abort();
        }
        if let Some(listener) = runtime.listener.take() {
            listener.abort();
        }
    }
}

impl SyncEngine {
    pub fn new(
        ctx: CacheContext,
        loader: Arc<RegionLoader>,
        connectivity: Arc<ConnectivityMonitor>,
        config: SyncConfig,
        probe: Option<Arc<dyn ReachabilityProbe>>,
    ) -> Self {
        let status = SyncStatus {
            is_online: connectivity.is_online(),
            ..Default::default()
        };
        Self {
            inner: Arc::new(SyncInner {
                ctx,
                loader,
                connectivity,
                probe,
                observer: RwLock::new(None),
                config: RwLock::new(config),
                runtime: Mutex::new(SyncRuntime {
                    status,
                    ..Default::default()
                }),
                in_flight: AtomicUsize::new(0),
            }),
        }
    }

    pub fn set_observer(&self, observer: Option<Arc<dyn SyncObserver>>) {
        *self
            .inner
            .observer
            .write()
            .unwrap_or_else(PoisonError::into_inner) = observer;
    }

    pub fn config(&self) -> SyncConfig {
        self.inner
            .config
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn status(&self) -> SyncStatus {
        self.inner.lock_runtime().status.clone()
    }

    pub fn state(&self) -> SyncState {
        self.inner.lock_runtime().status.state
    }

    /// Start periodic syncing and environment listeners. Starting a running
    /// engine is a no-op; starting a paused one resumes it.
    pub fn start(&self) -> HoneycombResult<()> {
        let config = self.config();
        if !config.enabled {
            info!("Background sync disabled, not starting");
            return Ok(());
        }
        let handle = Handle::try_current()
            .map_err(|_| HoneycombError::other("sync engine requires a tokio runtime"))?;
        {
            let mut runtime = self.inner.lock_runtime();
            match runtime.status.state {
                SyncState::Running => return Ok(()),
                SyncState::Idle => {
                    runtime.listener = Some(self.spawn_listener(&handle));
                }
                SyncState::Paused => {}
            }
            runtime.handle = Some(handle);
            runtime.status.state = SyncState::Running;
            runtime.status.is_online = self.inner.connectivity.is_online();
        }
        info!(interval_ms = config.interval_ms, "Background sync started");
        self.schedule(config.interval_ms);
        Ok(())
    }

    /// Cancel the timer and environment listeners.
    pub fn stop(&self) {
        let mut runtime = self.inner.lock_runtime();
        if let Some(timer) = runtime.timer.take() {
            timer.abort();
        }
        if let Some(listener) = runtime.listener.take() {
            listener.abort();
        }
        runtime.timer_epoch += 1;
        runtime.status.state = SyncState::Idle;
        runtime.status.next_run_epoch = None;
        runtime.status.retry_attempt = 0;
        info!("Background sync stopped");
    }

    /// Cancel the pending tick but keep listening to the environment.
    pub fn pause(&self) {
        let mut runtime = self.inner.lock_runtime();
        if runtime.status.state != SyncState::Running {
            return;
        }
        if let Some(timer) = runtime.timer.take() {
            timer.abort();
        }
        runtime.timer_epoch += 1;
        runtime.status.state = SyncState::Paused;
        runtime.status.next_run_epoch = None;
        debug!("Background sync paused");
    }

    pub fn resume(&self) {
        {
            let mut runtime = self.inner.lock_runtime();
            if runtime.status.state != SyncState::Paused {
                return;
            }
            runtime.status.state = SyncState::Running;
        }
        debug!("Background sync resumed");
        self.schedule(self.config().interval_ms);
    }

    /// Run one attempt now. Fails with [`SyncError::AlreadyInProgress`] if
    /// another attempt is in flight.
    pub async fn perform_sync(&self) -> HoneycombResult<SyncReport> {
        if self
            .inner
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync already in progress");
            return Err(SyncError::AlreadyInProgress.into());
        }
        let attempt = {
            let _guard = InFlightGuard::adopt(&self.inner);
            self.run_attempt(false).await
        };
        if let Some(delay) = attempt.next_delay {
            self.schedule(delay);
        }
        attempt.result
    }

    /// Run one attempt now, even if another is in flight.
    pub async fn force_sync(&self) -> HoneycombResult<SyncReport> {
        self.inner.in_flight.fetch_add(1, Ordering::SeqCst);
        let attempt = {
            let _guard = InFlightGuard::adopt(&self.inner);
            self.run_attempt(true).await
        };
        if let Some(delay) = attempt.next_delay {
            self.schedule(delay);
        }
        attempt.result
    }

    /// Merge `patch` into the config. A changed interval reschedules the
    /// pending tick; disabling stops the engine.
    pub fn update_config(&self, patch: SyncConfigPatch) -> HoneycombResult<()> {
        let (next, interval_changed) = {
            let mut config = self
                .inner
                .config
                .write()
                .unwrap_or_else(PoisonError::into_inner);
            let next = config.merged(&patch);
            next.validate()?;
            let interval_changed = next.interval_ms != config.interval_ms;
            *config = next.clone();
            (next, interval_changed)
        };
        if !next.enabled {
            if self.state() != SyncState::Idle {
                self.stop();
            }
            return Ok(());
        }
        if interval_changed && self.state() == SyncState::Running {
            self.schedule(next.interval_ms);
        }
        Ok(())
    }

    async fn run_attempt(&self, forced: bool) -> Attempt {
        let config = self.config();
        let attempt = self.inner.lock_runtime().status.retry_attempt + 1;

        if let Err(err) = self.check_connectivity(&config).await {
            {
                let mut runtime = self.inner.lock_runtime();
                runtime.status.is_online = false;
                runtime.status.last_error = Some(err.clone());
            }
            warn!(error = %err, "Sync skipped while offline");
            self.emit(SyncEvent::Failed {
                error: err.clone(),
                attempt,
                will_retry: false,
            });
            return Attempt {
                result: Err(err),
                next_delay: None,
            };
        }
        self.inner.lock_runtime().status.is_online = true;

        self.emit(SyncEvent::Started { attempt, forced });
        let report = self.reload(&config).await;

        if report.succeeded() {
            {
                let mut runtime = self.inner.lock_runtime();
                runtime.status.run_count += 1;
                runtime.status.last_run_epoch = Some(report.finished_at);
                runtime.status.last_error = None;
                runtime.status.retry_attempt = 0;
                runtime.status.last_report = Some(report.clone());
            }
            info!(
                regions = report.regions_synced,
                items = report.items_loaded,
                failures = report.failures.len(),
                "Sync completed"
            );
            self.emit(SyncEvent::Completed(report.clone()));
            return Attempt {
                result: Ok(report),
                next_delay: None,
            };
        }

        let error = report
            .primary_error()
            .cloned()
            .unwrap_or_else(|| HoneycombError::other("sync failed"));
        let (will_retry, next_delay) = {
            let mut runtime = self.inner.lock_runtime();
            runtime.status.run_count += 1;
            runtime.status.error_count += 1;
            runtime.status.last_run_epoch = Some(report.finished_at);
            runtime.status.last_error = Some(error.clone());
            runtime.status.last_report = Some(report);
            let failures = runtime.status.retry_attempt + 1;
            let running = runtime.status.state == SyncState::Running;
            if error.is_retryable() && failures <= config.max_retries {
                runtime.status.retry_attempt = failures;
                (running, Some(config.retry_delay_for(failures)))
            } else {
                runtime.status.retry_attempt = 0;
                (false, Some(config.interval_ms))
            }
        };
        warn!(error = %error, attempt, will_retry, "Sync failed");
        self.emit(SyncEvent::Failed {
            error: error.clone(),
            attempt,
            will_retry,
        });
        Attempt {
            result: Err(error),
            next_delay,
        }
    }

    async fn check_connectivity(&self, config: &SyncConfig) -> HoneycombResult<()> {
        if !self.inner.connectivity.is_online() {
            return Err(SyncError::Offline {
                reason: "environment reports offline".to_string(),
            }
            .into());
        }
        if let Some(url) = &config.online_check_url {
            match &self.inner.probe {
                Some(probe) => {
                    let timeout_ms = self.inner.ctx.state().config.request_timeout_ms;
                    probe
                        .check(url, timeout_ms)
                        .await
                        .map_err(|e| SyncError::Offline {
                            reason: format!("online check failed: {}", e),
                        })?;
                }
                None => debug!(url = %url, "No reachability probe, skipping online check"),
            }
        }
        Ok(())
    }

    /// Reload the center at full depth, then every recent region.
    async fn reload(&self, config: &SyncConfig) -> SyncReport {
        let ctx = &self.inner.ctx;
        let started_at = ctx.now_ms();

        let (center, max_depth, regions) = {
            let state = ctx.state();
            let center = state.current_center.clone();
            let regions: Vec<(CoordId, u32)> = state
                .recent_regions(started_at, config.recent_region_window_ms)
                .into_iter()
                .filter(|region| Some(&region.center) != center.as_ref())
                .map(|region| (region.center.clone(), region.depth_loaded))
                .collect();
            (center, state.config.max_depth, regions)
        };

        let mut failures = Vec::new();
        let mut items_loaded = 0;
        let mut center_synced = false;
        if let Some(center) = &center {
            match self.inner.loader.reload_region(center, max_depth).await {
                Ok(outcome) => {
                    center_synced = true;
                    items_loaded += outcome.items_loaded;
                }
                Err(error) => {
                    debug!(center = %center, error = %error, "Center reload failed");
                    failures.push(RegionFailure {
                        center: center.clone(),
                        error,
                    });
                }
            }
        }

        let results = join_all(
            regions
                .iter()
                .map(|(region, depth)| self.inner.loader.reload_region(region, *depth)),
        )
        .await;
        let mut regions_synced = 0;
        for ((region, _), result) in regions.iter().zip(results) {
            match result {
                Ok(outcome) => {
                    regions_synced += 1;
                    items_loaded += outcome.items_loaded;
                }
                Err(error) => {
                    debug!(center = %region, error = %error, "Region reload failed");
                    failures.push(RegionFailure {
                        center: region.clone(),
                        error,
                    });
                }
            }
        }

        SyncReport {
            center,
            center_synced,
            regions_attempted: regions.len(),
            regions_synced,
            items_loaded,
            failures,
            started_at,
            finished_at: ctx.now_ms(),
        }
    }

    fn emit(&self, event: SyncEvent) {
        let observer = self
            .inner
            .observer
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(observer) = observer {
            notify(observer.as_ref(), &event);
        }
    }

    /// Replace the pending tick with one `delay_ms` from now. No-op unless
    /// running.
    fn schedule(&self, delay_ms: u64) {
        let mut runtime = self.inner.lock_runtime();
        if runtime.status.state != SyncState::Running {
            return;
        }
        let Some(handle) = runtime.handle.clone() else {
            return;
        };
        if let Some(timer) = runtime.timer.take() {
            timer.abort();
        }
        runtime.timer_epoch += 1;
        let epoch = runtime.timer_epoch;
        runtime.status.next_run_epoch = Some(self.inner.ctx.now_ms() + delay_ms as i64);

        let weak = Arc::downgrade(&self.inner);
        runtime.timer = Some(handle.spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            if let Some(inner) = weak.upgrade() {
                SyncEngine { inner }.on_tick(epoch).await;
            }
        }));
        debug!(delay_ms, "Scheduled next sync");
    }

    async fn on_tick(&self, epoch: u64) {
        {
            let mut runtime = self.inner.lock_runtime();
            if runtime.timer_epoch != epoch || runtime.status.state != SyncState::Running {
                return;
            }
            // Detach our own handle so rescheduling does not abort this task.
            runtime.timer = None;
            runtime.status.next_run_epoch = None;
        }
        let interval = self.config().interval_ms;
        if self
            .inner
            .in_flight
            .compare_exchange(0, 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            debug!("Sync in flight, skipping tick");
            self.schedule(interval);
            return;
        }
        let attempt = {
            let _guard = InFlightGuard::adopt(&self.inner);
            self.run_attempt(false).await
        };
        self.schedule(attempt.next_delay.unwrap_or(interval));
    }

    fn spawn_listener(&self, handle: &Handle) -> JoinHandle<()> {
        let mut events = self.inner.connectivity.subscribe();
        let weak = Arc::downgrade(&self.inner);
        handle.spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        let Some(inner) = weak.upgrade() else { break };
                        SyncEngine { inner }.on_environment(event);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "Environment listener lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }

    fn on_environment(&self, event: EnvironmentEvent) {
        let config = self.config();
        let running = {
            let mut runtime = self.inner.lock_runtime();
            match event {
                EnvironmentEvent::Online => runtime.status.is_online = true,
                EnvironmentEvent::Offline => runtime.status.is_online = false,
                EnvironmentEvent::VisibilityChanged { .. } => {}
            }
            runtime.status.state == SyncState::Running
        };
        let trigger = running
            && match event {
                EnvironmentEvent::Online => config.sync_on_reconnect,
                EnvironmentEvent::VisibilityChanged { visible: true } => {
                    config.sync_on_visibility_change
                }
                _ => false,
            };
        debug!(?event, trigger, "Environment changed");
        if trigger {
            let engine = self.clone();
            tokio::spawn(async move {
                match engine.perform_sync().await {
                    Ok(_) => {}
                    Err(HoneycombError::Sync(SyncError::AlreadyInProgress)) => {
                        debug!("Triggered sync skipped, one already in flight");
                    }
                    Err(err) => debug!(error = %err, "Triggered sync failed"),
                }
            });
        }
    }
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}
