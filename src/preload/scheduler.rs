//! Preload scheduler
//!
//! Owns the single in-flight preload, the bid cache, the session id and the
//! disablement flags.
//!
//! ```text
//!   on_messages_changed ──► TriggerState::observe ──► start_fetch(gen = n+1)
//!                                                        │  abort fetch n
//!                                                        ▼
//!                          [debounce] ─► repository.preload (timeout)
//!                                                        │
//!                                  commit if state.generation == n+1
//!                                                        │
//!                                  settled.send(n+1) ──► await_in_flight wakes
//! ```
//!
//! Cache, session id, timeout, last error and disablement live behind one
//! mutex and are replaced together, so readers never observe a mix of two
//! preload cycles. A fetch whose generation is no longer current drops its
//! result on the floor.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::repository::{AdsRepository, DeviceInfoProvider, ErrorReport, PreloadRequest};
use super::trigger::{TriggerPolicy, TriggerState};
use crate::config::AdsConfig;
use crate::domain::{Bid, Message, PreloadOutcome};
use crate::error::ApiError;

/// Consistent view of the scheduler state, taken under one lock.
#[derive(Debug, Clone, Default)]
pub struct SchedulerSnapshot {
    pub bids: Option<Arc<Vec<Bid>>>,
    pub session_id: Option<String>,
    pub last_error: Option<ApiError>,
    pub disabled_by_user: bool,
    pub disabled_permanently: bool,
}

impl SchedulerSnapshot {
    pub fn is_disabled(&self) -> bool {
        self.disabled_by_user || self.disabled_permanently
    }
}

#[derive(Debug)]
struct SchedulerState {
    bids: Option<Arc<Vec<Bid>>>,
    session_id: Option<String>,
    preload_timeout: Duration,
    remote_log_level: Option<String>,
    last_error: Option<ApiError>,
    disabled_by_user: bool,
    disabled_permanently: bool,
    /// Bumped on every fetch start and cancellation
    generation: u64,
    in_flight: Option<JoinHandle<()>>,
}

struct SchedulerInner {
    repository: Arc<dyn AdsRepository>,
    device_info: Arc<dyn DeviceInfoProvider>,
    config: Arc<AdsConfig>,
    debounce: Duration,
    /// Runtime fetches are spawned on, so triggers may come from any thread.
    runtime: Option<Handle>,
    state: Mutex<SchedulerState>,
    /// Highest generation that finished or was cancelled
    settled: watch::Sender<u64>,
}

impl SchedulerInner {
    fn lock(&self) -> MutexGuard<'_, SchedulerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

pub struct PreloadScheduler {
    inner: Arc<SchedulerInner>,
    trigger: Mutex<TriggerState>,
}

impl PreloadScheduler {
    pub fn new(
        config: Arc<AdsConfig>,
        repository: Arc<dyn AdsRepository>,
        device_info: Arc<dyn DeviceInfoProvider>,
        policy: TriggerPolicy,
        debounce: Duration,
        preload_timeout: Duration,
    ) -> Self {
        let (settled, _) = watch::channel(0);
        let state = SchedulerState {
            bids: None,
            session_id: None,
            preload_timeout,
            remote_log_level: None,
            last_error: None,
            disabled_by_user: config.disabled,
            disabled_permanently: false,
            generation: 0,
            in_flight: None,
        };

        Self {
            inner: Arc::new(SchedulerInner {
                repository,
                device_info,
                config,
                debounce,
                runtime: Handle::try_current().ok(),
                state: Mutex::new(state),
                settled,
            }),
            trigger: Mutex::new(TriggerState::new(policy)),
        }
    }

    /// Evaluate the trigger for a new conversation snapshot and start a
    /// preload when it fires. Returns whether a preload was started.
    pub fn on_messages_changed(&self, messages: &[Message]) -> bool {
        if self.is_disabled() {
            return false;
        }

        let fire = self
            .trigger
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .observe(messages);

        if fire {
            self.start_fetch(messages.to_vec());
        }
        fire
    }

    /// Start a preload for `messages`, superseding any in-flight one.
    pub fn start_fetch(&self, messages: Vec<Message>) {
        let mut state = self.inner.lock();
        if state.disabled_by_user || state.disabled_permanently {
            return;
        }

        let Some(runtime) = self
            .inner
            .runtime
            .clone()
            .or_else(|| Handle::try_current().ok())
        else {
            tracing::warn!("No runtime to run the preload on, skipping");
            return;
        };

        if let Some(previous) = state.in_flight.take() {
            previous.abort();
            tracing::debug!(
                generation = state.generation,
                "Cancelled superseded preload"
            );
        }

        state.generation += 1;
        state.last_error = None;
        let generation = state.generation;

        tracing::info!(
            generation,
            messages = messages.len(),
            debounce_ms = self.inner.debounce.as_millis() as u64,
            "Starting preload"
        );

        let inner = Arc::clone(&self.inner);
        state.in_flight = Some(runtime.spawn(run_fetch(inner, generation, messages)));
    }

    /// Wait for the in-flight preload to settle, at most `bound`.
    ///
    /// Returns `true` when nothing is in flight anymore. On expiry the awaited
    /// fetch is cancelled, so a late answer can never populate the cache, and
    /// `false` is returned.
    pub async fn await_in_flight(&self, bound: Duration) -> bool {
        let target = self.inner.lock().generation;
        let mut settled = self.inner.settled.subscribe();
        if *settled.borrow() >= target {
            return true;
        }

        let waited = tokio::time::timeout(bound, settled.wait_for(|g| *g >= target))
            .await
            .map(|done| done.is_ok());
        match waited {
            Ok(done) => done,
            Err(_) => {
                tracing::warn!(
                    generation = target,
                    bound_ms = bound.as_millis() as u64,
                    "Preload did not finish in time, cancelling"
                );
                self.cancel_generation(target);
                false
            }
        }
    }

    /// Abort any in-flight preload.
    pub fn cancel(&self) {
        let generation = self.inner.lock().generation;
        self.cancel_generation(generation);
    }

    fn cancel_generation(&self, generation: u64) {
        let mut state = self.inner.lock();
        if state.generation != generation {
            return;
        }
        if let Some(handle) = state.in_flight.take() {
            handle.abort();
            tracing::debug!(generation, "Preload cancelled");
        }
        // Invalidate whatever may still be racing to commit.
        state.generation += 1;
        let settled = state.generation;
        self.inner.settled.send_replace(settled);
    }

    /// User-facing switch. Disabling also cancels the in-flight preload.
    /// Permanent disablement is unaffected.
    pub fn set_disabled(&self, disabled: bool) {
        self.inner.lock().disabled_by_user = disabled;
        if disabled {
            self.cancel();
        }
    }

    pub fn snapshot(&self) -> SchedulerSnapshot {
        let state = self.inner.lock();
        SchedulerSnapshot {
            bids: state.bids.clone(),
            session_id: state.session_id.clone(),
            last_error: state.last_error.clone(),
            disabled_by_user: state.disabled_by_user,
            disabled_permanently: state.disabled_permanently,
        }
    }

    /// Bids of the most recent successful preload.
    pub fn current_bids(&self) -> Option<Arc<Vec<Bid>>> {
        self.inner.lock().bids.clone()
    }

    pub fn session_id(&self) -> Option<String> {
        self.inner.lock().session_id.clone()
    }

    pub fn preload_timeout(&self) -> Duration {
        self.inner.lock().preload_timeout
    }

    pub fn remote_log_level(&self) -> Option<String> {
        self.inner.lock().remote_log_level.clone()
    }

    pub fn last_error(&self) -> Option<ApiError> {
        self.inner.lock().last_error.clone()
    }

    pub fn is_disabled(&self) -> bool {
        let state = self.inner.lock();
        state.disabled_by_user || state.disabled_permanently
    }

    pub fn is_disabled_permanently(&self) -> bool {
        self.inner.lock().disabled_permanently
    }

    pub fn is_in_flight(&self) -> bool {
        self.inner.lock().in_flight.is_some()
    }
}

impl Drop for PreloadScheduler {
    fn drop(&mut self) {
        if let Some(handle) = self.inner.lock().in_flight.take() {
            handle.abort();
        }
    }
}

async fn run_fetch(inner: Arc<SchedulerInner>, generation: u64, messages: Vec<Message>) {
    if !inner.debounce.is_zero() {
        tokio::time::sleep(inner.debounce).await;
    }

    let (session_id, timeout) = {
        let state = inner.lock();
        (state.session_id.clone(), state.preload_timeout)
    };

    let device = inner.device_info.device_info().await;
    let request = PreloadRequest::build(&inner.config, session_id, messages, device);

    let result = match tokio::time::timeout(timeout, inner.repository.preload(&request, timeout)).await
    {
        Ok(result) => result,
        Err(_) => Err(ApiError::Timeout),
    };

    let report = match &result {
        Err(error) if error.is_transport() => Some(ErrorReport::preload_failed(error)),
        _ => None,
    };

    if !commit(&inner, generation, result) {
        return;
    }

    if let Some(report) = report {
        let repository = Arc::clone(&inner.repository);
        tokio::spawn(async move {
            if let Err(e) = repository.report_error(&report).await {
                tracing::debug!(error = %e, "Error report was not delivered");
            }
        });
    }
}

/// Apply a preload result if `generation` is still current. Returns whether
/// the result was applied.
fn commit(
    inner: &SchedulerInner,
    generation: u64,
    result: Result<PreloadOutcome, ApiError>,
) -> bool {
    let mut state = inner.lock();
    if state.generation != generation {
        tracing::debug!(
            generation,
            current = state.generation,
            "Discarding stale preload result"
        );
        return false;
    }

    match result {
        Ok(outcome) => {
            tracing::info!(
                generation,
                session_id = ?outcome.session_id,
                bids = outcome.bids.as_ref().map(Vec::len).unwrap_or(0),
                "Preload completed"
            );
            state.session_id = outcome.session_id;
            if let Some(timeout) = outcome.preload_timeout {
                state.preload_timeout = timeout;
            }
            if outcome.remote_log_level.is_some() {
                state.remote_log_level = outcome.remote_log_level;
            }
            state.bids = outcome.bids.map(Arc::new);
            state.last_error = None;
        }
        Err(error) if error.is_permanent() => {
            tracing::error!(generation, error = %error, "Preload failed permanently, disabling ads");
            state.disabled_permanently = true;
            state.bids = None;
            state.last_error = Some(error);
        }
        Err(error) => {
            tracing::warn!(generation, error = %error, "Preload failed");
            state.last_error = Some(error);
        }
    }

    state.in_flight = None;
    inner.settled.send_replace(generation);
    true
}
