//! Live location tracking.
//!
//! A tracking session owns exactly one worker thread. The worker sleeps for
//! the poll interval, reads a fix from the provider and hands it to the UI
//! context through a bounded channel. It never touches tracker state: the
//! stop flag is the only thing it reads, and the UI loop applies samples by
//! calling [`LocationTracker::deliver`].

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};

use nimbus_core::LocationConfig;
use nimbus_weather::{Coordinates, LocationError, LocationProvider};

/// Lifecycle of the tracker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackingState {
    Idle,
    RequestingPermission,
    Tracking,
    Stopping,
}

impl fmt::Display for TrackingState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TrackingState::Idle => "idle",
            TrackingState::RequestingPermission => "requesting permission",
            TrackingState::Tracking => "tracking",
            TrackingState::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct TrackerConfig {
    /// Sleep between two samples
    pub poll_interval: Duration,
    /// Upper bound on how long `stop_tracking` waits for the worker
    pub stop_timeout: Duration,
    /// Upper bound on a permission request or a single provider read
    pub provider_timeout: Duration,
    /// Samples buffered between the worker and the UI loop
    pub channel_capacity: usize,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(1),
            provider_timeout: Duration::from_secs(30),
            channel_capacity: 16,
        }
    }
}

impl From<&LocationConfig> for TrackerConfig {
    fn from(config: &LocationConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            stop_timeout: config.stop_timeout(),
            provider_timeout: config.permission_timeout(),
            ..Self::default()
        }
    }
}

/// A fix produced by the worker of one tracking session
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LocationSample {
    pub session: u64,
    pub coordinates: Coordinates,
}

/// UI-side end of the worker hand-off
pub type SampleReceiver = mpsc::Receiver<LocationSample>;

/// Invoked in the UI context with each delivered fix
pub type ChangeCallback = Arc<dyn Fn(Coordinates) + Send + Sync>;

struct Worker {
    stop: Arc<AtomicBool>,
    thread: thread::JoinHandle<()>,
    exited: oneshot::Receiver<()>,
}

impl Worker {
    fn request_stop(&self) {
        self.stop.store(true, Ordering::Release);
        self.thread.thread().unpark();
    }
}

struct Session {
    state: TrackingState,
    id: u64,
    worker: Option<Worker>,
    on_change: Option<ChangeCallback>,
    last_coordinates: Option<Coordinates>,
}

pub struct LocationTracker {
    provider: Arc<dyn LocationProvider>,
    config: TrackerConfig,
    runtime: Handle,
    samples: mpsc::Sender<LocationSample>,
    session: Mutex<Session>,
    live_workers: Arc<AtomicUsize>,
}

/// Puts the tracker back to Idle if a permission flow ends without
/// reaching Tracking, including when the awaiting future is dropped.
struct PermissionGuard<'a> {
    session: &'a Mutex<Session>,
}

impl Drop for PermissionGuard<'_> {
    fn drop(&mut self) {
        let mut session = self.session.lock();
        if session.state == TrackingState::RequestingPermission {
            session.state = TrackingState::Idle;
            tracing::debug!("Location tracker back to idle");
        }
    }
}

impl LocationTracker {
    /// Create an idle tracker. The returned receiver must be drained by the UI loop.
    pub fn new(
        provider: Arc<dyn LocationProvider>,
        config: TrackerConfig,
        runtime: Handle,
    ) -> (Self, SampleReceiver) {
        let (samples, rx) = mpsc::channel(config.channel_capacity.max(1));
        let tracker = Self {
            provider,
            config,
            runtime,
            samples,
            session: Mutex::new(Session {
                state: TrackingState::Idle,
                id: 0,
                worker: None,
                on_change: None,
                last_coordinates: None,
            }),
            live_workers: Arc::new(AtomicUsize::new(0)),
        };
        (tracker, rx)
    }

    pub fn state(&self) -> TrackingState {
        self.session.lock().state
    }

    pub fn is_tracking(&self) -> bool {
        self.state() == TrackingState::Tracking
    }

    /// Most recent fix, kept across stop and callback changes
    pub fn current_coordinates(&self) -> Option<Coordinates> {
        self.session.lock().last_coordinates
    }

    pub fn has_coordinates(&self) -> bool {
        self.current_coordinates().is_some()
    }

    /// Number of worker threads that haven't exited yet
    pub fn live_workers(&self) -> usize {
        self.live_workers.load(Ordering::Acquire)
    }

    pub fn provider_name(&self) -> &str {
        self.provider.name()
    }

    /// Replace (or clear) the callback fed by delivered samples
    pub fn set_change_callback(&self, on_change: Option<ChangeCallback>) {
        self.session.lock().on_change = on_change;
    }

    /// Leave Idle for a permission request, or report why that isn't possible
    fn begin_permission_flow(&self) -> Result<PermissionGuard<'_>, LocationError> {
        let mut session = self.session.lock();
        if session.state != TrackingState::Idle {
            return Err(LocationError::Busy(session.state.to_string()));
        }
        session.state = TrackingState::RequestingPermission;
        tracing::debug!("Requesting location permission from '{}'", self.provider.name());
        Ok(PermissionGuard {
            session: &self.session,
        })
    }

    async fn request_permission(&self) -> Result<(), LocationError> {
        match tokio::time::timeout(self.config.provider_timeout, self.provider.request_permission())
            .await
        {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout),
        }
    }

    async fn read_position(&self) -> Result<Coordinates, LocationError> {
        match tokio::time::timeout(self.config.provider_timeout, self.provider.read_position()).await
        {
            Ok(result) => result,
            Err(_) => Err(LocationError::Timeout),
        }
    }

    /// Read one fix.
    ///
    /// While tracking, the provider is read directly. Otherwise permission is
    /// requested first and the tracker returns to Idle afterwards. Any
    /// failure yields `None`.
    pub async fn get_current_location_once(&self) -> Option<Coordinates> {
        if self.is_tracking() {
            return match self.read_position().await {
                Ok(coordinates) => Some(coordinates),
                Err(e) => {
                    tracing::warn!("One-shot location read failed: {}", e);
                    None
                }
            };
        }

        let _guard = match self.begin_permission_flow() {
            Ok(guard) => guard,
            Err(e) => {
                tracing::debug!("One-shot location skipped: {}", e);
                return None;
            }
        };

        let result = match self.request_permission().await {
            Ok(()) => self.read_position().await,
            Err(e) => Err(e),
        };

        match result {
            Ok(coordinates) => Some(coordinates),
            Err(e) => {
                tracing::warn!("One-shot location failed: {}", e);
                None
            }
        }
    }

    /// Start a tracking session.
    ///
    /// Requests permission, reads an initial fix and spawns the worker.
    /// Returns the initial fix. Every failure leaves the tracker Idle with no
    /// worker. Calling this while already tracking only replaces the callback.
    pub async fn start_tracking(
        &self,
        on_change: Option<ChangeCallback>,
    ) -> Result<Coordinates, LocationError> {
        {
            let mut session = self.session.lock();
            if session.state == TrackingState::Tracking {
                session.on_change = on_change;
                return session
                    .last_coordinates
                    .ok_or_else(|| LocationError::Busy(TrackingState::Tracking.to_string()));
            }
        }

        let _guard = self.begin_permission_flow()?;

        if let Err(e) = self.request_permission().await {
            tracing::warn!("Location tracking not started: {}", e);
            return Err(e);
        }

        let initial = match self.read_position().await {
            Ok(coordinates) => coordinates,
            Err(e) => {
                tracing::warn!("Location tracking not started, no initial fix: {}", e);
                return Err(e);
            }
        };

        let mut session = self.session.lock();
        let id = session.id + 1;
        let worker = self.spawn_worker(id)?;

        session.id = id;
        session.worker = Some(worker);
        session.state = TrackingState::Tracking;
        session.on_change = on_change;
        session.last_coordinates = Some(initial);

        tracing::info!(
            "Location tracking started with '{}' (session {}, every {:?})",
            self.provider.name(),
            id,
            self.config.poll_interval
        );
        Ok(initial)
    }

    fn spawn_worker(&self, session: u64) -> Result<Worker, LocationError> {
        let stop = Arc::new(AtomicBool::new(false));
        let (exit_tx, exited) = oneshot::channel();

        let context = WorkerContext {
            provider: self.provider.clone(),
            runtime: self.runtime.clone(),
            samples: self.samples.clone(),
            session,
            interval: self.config.poll_interval,
            read_timeout: self.config.provider_timeout,
            stop: stop.clone(),
        };
        let live = self.live_workers.clone();

        live.fetch_add(1, Ordering::AcqRel);
        let spawned = thread::Builder::new()
            .name(format!("nimbus-location-{}", session))
            .spawn(move || {
                let _live = LiveWorker(live);
                context.run();
                let _ = exit_tx.send(());
            });

        match spawned {
            Ok(thread) => Ok(Worker {
                stop,
                thread,
                exited,
            }),
            Err(e) => {
                self.live_workers.fetch_sub(1, Ordering::AcqRel);
                Err(LocationError::Other(format!(
                    "failed to spawn location worker: {}",
                    e
                )))
            }
        }
    }

    /// Stop the current session.
    ///
    /// Waits for the worker at most `stop_timeout`; a worker that doesn't
    /// exit in time is detached and `Timeout` is returned. Either way the
    /// tracker is Idle afterwards. Not tracking is a no-op.
    pub async fn stop_tracking(&self) -> Result<(), LocationError> {
        let worker = {
            let mut session = self.session.lock();
            if session.state != TrackingState::Tracking {
                return Ok(());
            }
            session.state = TrackingState::Stopping;
            session.on_change = None;
            session.worker.take()
        };

        let result = match worker {
            Some(worker) => {
                worker.request_stop();
                match tokio::time::timeout(self.config.stop_timeout, worker.exited).await {
                    Ok(_) => {
                        tracing::debug!("Location worker exited");
                        Ok(())
                    }
                    Err(_) => {
                        tracing::warn!(
                            "Location worker did not exit within {:?}, detaching it",
                            self.config.stop_timeout
                        );
                        Err(LocationError::Timeout)
                    }
                }
            }
            None => Ok(()),
        };

        self.session.lock().state = TrackingState::Idle;
        tracing::info!("Location tracking stopped");
        result
    }

    /// Apply a sample in the UI context.
    ///
    /// Samples from an earlier session, or arriving while not tracking, are
    /// dropped. Returns whether the sample was applied.
    pub fn deliver(&self, sample: LocationSample) -> bool {
        let on_change = {
            let mut session = self.session.lock();
            if session.state != TrackingState::Tracking || session.id != sample.session {
                tracing::debug!("Dropping stale location sample from session {}", sample.session);
                return false;
            }
            session.last_coordinates = Some(sample.coordinates);
            session.on_change.clone()
        };

        if let Some(on_change) = on_change {
            on_change(sample.coordinates);
        }
        true
    }
}

impl Drop for LocationTracker {
    fn drop(&mut self) {
        if let Some(worker) = self.session.get_mut().worker.take() {
            worker.request_stop();
        }
    }
}

struct LiveWorker(Arc<AtomicUsize>);

impl Drop for LiveWorker {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::AcqRel);
    }
}

struct WorkerContext {
    provider: Arc<dyn LocationProvider>,
    runtime: Handle,
    samples: mpsc::Sender<LocationSample>,
    session: u64,
    interval: Duration,
    read_timeout: Duration,
    stop: Arc<AtomicBool>,
}

impl WorkerContext {
    fn stopped(&self) -> bool {
        self.stop.load(Ordering::Acquire)
    }

    /// Park until the interval elapses or a stop is requested
    fn sleep(&self) {
        let deadline = Instant::now() + self.interval;
        while !self.stopped() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::park_timeout(deadline - now);
        }
    }

    fn run(&self) {
        tracing::debug!("Location worker {} running", self.session);
        loop {
            self.sleep();
            if self.stopped() {
                break;
            }

            let read = self.runtime.block_on(async {
                tokio::time::timeout(self.read_timeout, self.provider.read_position()).await
            });
            let coordinates = match read {
                Ok(Ok(coordinates)) => coordinates,
                Ok(Err(e)) => {
                    tracing::warn!("Location sample failed: {}", e);
                    continue;
                }
                Err(_) => {
                    tracing::warn!("Location sample timed out");
                    continue;
                }
            };

            if self.stopped() {
                break;
            }

            let sample = LocationSample {
                session: self.session,
                coordinates,
            };
            match self.samples.try_send(sample) {
                Ok(()) => {}
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::debug!("UI loop is behind, dropping location sample");
                }
                Err(mpsc::error::TrySendError::Closed(_)) => break,
            }
        }
        tracing::debug!("Location worker {} exiting", self.session);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nimbus_weather::{DisabledLocationProvider, FixedLocationProvider};

    fn fast_config() -> TrackerConfig {
        TrackerConfig {
            poll_interval: Duration::from_millis(20),
            stop_timeout: Duration::from_millis(500),
            provider_timeout: Duration::from_secs(1),
            channel_capacity: 4,
        }
    }

    fn fixed() -> Arc<dyn LocationProvider> {
        Arc::new(FixedLocationProvider::new(Coordinates::new(60.17, 24.94)))
    }

    #[test]
    fn test_config_from_location_config() {
        let config = TrackerConfig::from(&LocationConfig::default());
        assert_eq!(config.poll_interval, Duration::from_secs(5));
        assert_eq!(config.stop_timeout, Duration::from_millis(1000));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_start_sample_stop() {
        let (tracker, mut rx) = LocationTracker::new(fixed(), fast_config(), Handle::current());

        let initial = tracker.start_tracking(None).await.unwrap();
        assert_eq!(initial, Coordinates::new(60.17, 24.94));
        assert!(tracker.is_tracking());
        assert_eq!(tracker.live_workers(), 1);

        let sample = tokio::time::timeout(Duration::from_secs(2), rx.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(tracker.deliver(sample));

        tracker.stop_tracking().await.unwrap();
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert_eq!(tracker.current_coordinates(), Some(initial));

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(tracker.live_workers(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_denied_provider_returns_to_idle() {
        let (tracker, _rx) = LocationTracker::new(
            Arc::new(DisabledLocationProvider),
            fast_config(),
            Handle::current(),
        );

        let err = tracker.start_tracking(None).await.unwrap_err();
        assert!(matches!(err, LocationError::ProviderUnavailable(_)));
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert_eq!(tracker.live_workers(), 0);
        assert_eq!(tracker.get_current_location_once().await, None);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_stale_samples_are_dropped() {
        let (tracker, _rx) = LocationTracker::new(fixed(), fast_config(), Handle::current());
        let stale = LocationSample {
            session: 42,
            coordinates: Coordinates::new(1.0, 1.0),
        };
        assert!(!tracker.deliver(stale));

        tracker.start_tracking(None).await.unwrap();
        assert!(!tracker.deliver(stale));
        tracker.stop_tracking().await.unwrap();
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn test_once_returns_to_idle() {
        let (tracker, _rx) = LocationTracker::new(fixed(), fast_config(), Handle::current());
        let fix = tracker.get_current_location_once().await;
        assert_eq!(fix, Some(Coordinates::new(60.17, 24.94)));
        assert_eq!(tracker.state(), TrackingState::Idle);
        assert_eq!(tracker.live_workers(), 0);
    }

    #[tokio::test]
    async fn test_stop_when_idle_is_noop() {
        let (tracker, _rx) = LocationTracker::new(fixed(), fast_config(), Handle::current());
        assert!(tracker.stop_tracking().await.is_ok());
        assert_eq!(tracker.state(), TrackingState::Idle);
    }
}
