//! Ad session facade
//!
//! One [`AdSession`] per conversation. It owns the conversation window, the
//! preload scheduler and a publisher task that turns every conversation
//! change into an [`AdResult`] on a watch channel.
//!
//! ```text
//!   set_messages / append
//!        │  store updated, trigger evaluated (may start a preload)
//!        ▼
//!   changes (watch<u64>) ──► publisher: await in-flight preload (bounded)
//!                                       resolve placements
//!                                       results (watch<Option<AdResult>>)
//! ```
//!
//! A change arriving while the publisher is still waiting supersedes the
//! pending publish. Callers serialize facade calls per conversation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, watch};
use tokio::task::{AbortHandle, JoinHandle};

use crate::config::{AdsConfig, EngineSettings};
use crate::conversation::ConversationStore;
use crate::domain::{AdPlacement, AdResult, Message, PlacementMap};
use crate::error::AdsError;
use crate::placement::{resolve, RenderContext};
use crate::preload::{AdsRepository, DeviceInfoProvider, PreloadScheduler};
use crate::surface::modal::ModalCloser;
use crate::surface::{
    spawn_dimension_reporter, AdEvent, GeometrySource, InlineSurface, ModalHost, SurfaceBackend,
    SurfacePool,
};

struct SessionShared {
    config: Arc<AdsConfig>,
    context: RenderContext,
    store: Mutex<ConversationStore>,
    scheduler: PreloadScheduler,
    debounce: Duration,
}

impl SessionShared {
    fn store(&self) -> MutexGuard<'_, ConversationStore> {
        self.store.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current result for the current window, waiting for an in-flight
    /// preload first.
    async fn compute(&self) -> AdResult {
        let messages = self.store().snapshot();
        if messages.is_empty() {
            return AdResult::Success(PlacementMap::new());
        }
        if self.scheduler.is_disabled() {
            return AdResult::Error(AdsError::AdUnavailable);
        }

        let bound = self.debounce + self.scheduler.preload_timeout();
        self.scheduler.await_in_flight(bound).await;

        let snapshot = self.scheduler.snapshot();
        if snapshot.is_disabled() {
            return AdResult::Error(AdsError::AdUnavailable);
        }
        if let Some(error) = snapshot.last_error {
            return AdResult::Error(error.into());
        }

        match snapshot.bids {
            Some(bids) if !bids.is_empty() => AdResult::Success(resolve(
                &bids,
                &self.config.enabled_placement_codes,
                &messages,
                &self.context,
            )),
            _ => AdResult::Error(AdsError::AdUnavailable),
        }
    }
}

pub struct AdSession<B: SurfaceBackend> {
    shared: Arc<SessionShared>,
    settings: EngineSettings,
    pool: Arc<SurfacePool<B>>,
    runtime: Handle,
    changes: watch::Sender<u64>,
    results: watch::Sender<Option<AdResult>>,
    publisher: Mutex<Option<JoinHandle<()>>>,
    events_tx: mpsc::UnboundedSender<AdEvent>,
    events_rx: Mutex<Option<mpsc::UnboundedReceiver<AdEvent>>>,
    /// Dimension reporters started through this session
    reporters: Mutex<Vec<AbortHandle>>,
    /// Overlays of attached surfaces, closed with the session
    modals: Mutex<Vec<ModalCloser>>,
    closed: AtomicBool,
}

impl<B: SurfaceBackend> AdSession<B> {
    /// Build a session and start its publisher. Must be called inside a Tokio
    /// runtime; later calls may come from any thread.
    pub fn new(
        config: AdsConfig,
        settings: EngineSettings,
        repository: Arc<dyn AdsRepository>,
        device_info: Arc<dyn DeviceInfoProvider>,
        pool: Arc<SurfacePool<B>>,
    ) -> Self {
        let config = Arc::new(config);
        let context = RenderContext::from_config(&config, settings.message_window);
        let scheduler = PreloadScheduler::new(
            Arc::clone(&config),
            repository,
            device_info,
            settings.trigger_policy,
            settings.debounce,
            settings.preload_timeout,
        );

        tracing::info!(
            conversation_id = %config.conversation_id,
            server = %config.ad_server_url,
            disabled = config.disabled,
            "Ad session created"
        );

        let shared = Arc::new(SessionShared {
            config,
            context,
            store: Mutex::new(ConversationStore::new(settings.message_window)),
            scheduler,
            debounce: settings.debounce,
        });

        let (changes, changes_rx) = watch::channel(0u64);
        let (results, _) = watch::channel(None);
        let (events_tx, events_rx) = mpsc::unbounded_channel();

        let runtime = Handle::current();
        let publisher = runtime.spawn(run_publisher(
            Arc::clone(&shared),
            changes_rx,
            results.clone(),
        ));

        Self {
            shared,
            settings,
            pool,
            runtime,
            changes,
            results,
            publisher: Mutex::new(Some(publisher)),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            reporters: Mutex::new(Vec::new()),
            modals: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Replace the conversation. Ignored while serving is disabled.
    pub fn set_messages(&self, messages: Vec<Message>) {
        if !self.accepting() {
            return;
        }
        let snapshot = {
            let mut store = self.shared.store();
            store.set_messages(messages);
            store.snapshot()
        };
        self.conversation_changed(&snapshot);
    }

    /// Add one message. Ignored while serving is disabled.
    pub fn append(&self, message: Message) {
        if !self.accepting() {
            return;
        }
        let snapshot = {
            let mut store = self.shared.store();
            store.append(message);
            store.snapshot()
        };
        self.conversation_changed(&snapshot);
    }

    fn accepting(&self) -> bool {
        !self.closed.load(Ordering::SeqCst) && !self.shared.scheduler.is_disabled()
    }

    fn conversation_changed(&self, snapshot: &[Message]) {
        // Trigger first so the publisher sees the new in-flight preload.
        self.shared.scheduler.on_messages_changed(snapshot);
        self.changes.send_modify(|version| *version += 1);
    }

    /// Latest published result; `None` until the first conversation change.
    pub fn subscribe(&self) -> watch::Receiver<Option<AdResult>> {
        self.results.subscribe()
    }

    /// Placements for one message, waiting for an in-flight preload (bounded).
    pub async fn ads_for_message(&self, message_id: &str) -> Vec<AdPlacement> {
        if self.closed.load(Ordering::SeqCst) {
            return Vec::new();
        }
        match self.shared.compute().await {
            AdResult::Success(mut map) => map.remove(message_id).unwrap_or_default(),
            AdResult::Error(_) => Vec::new(),
        }
    }

    /// Toggle serving. Permanent disablement by the server is not undone.
    pub fn set_disabled(&self, disabled: bool) {
        tracing::info!(disabled, "Ad serving toggled");
        self.shared.scheduler.set_disabled(disabled);
        if !self.closed.load(Ordering::SeqCst) {
            self.changes.send_modify(|version| *version += 1);
        }
    }

    pub fn is_disabled(&self) -> bool {
        self.shared.scheduler.is_disabled()
    }

    pub fn render_context(&self) -> &RenderContext {
        &self.shared.context
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Log level requested by the ad server in the last preload response.
    pub fn remote_log_level(&self) -> Option<String> {
        self.shared.scheduler.remote_log_level()
    }

    pub fn session_id(&self) -> Option<String> {
        self.shared.scheduler.session_id()
    }

    pub fn surface_pool(&self) -> &Arc<SurfacePool<B>> {
        &self.pool
    }

    /// Interaction events from every attached surface. Only the first call
    /// gets the receiver.
    pub fn take_ad_events(&self) -> Option<mpsc::UnboundedReceiver<AdEvent>> {
        self.events_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    /// Bind a placement to a pooled surface.
    pub fn attach_surface(
        &self,
        placement: AdPlacement,
        host: Arc<dyn ModalHost>,
    ) -> InlineSurface<B> {
        let modal_url = self
            .shared
            .context
            .modal_url(&placement.bid, &placement.message_id);
        let surface = {
            // Modal timers run on the session runtime whatever thread attaches.
            let _entered = self.runtime.enter();
            InlineSurface::attach(
                placement,
                modal_url,
                Arc::clone(&self.pool),
                host,
                self.settings.modal_timeout,
                self.events_tx.clone(),
            )
        };

        let mut modals = self.modals.lock().unwrap_or_else(PoisonError::into_inner);
        modals.retain(ModalCloser::is_alive);
        modals.push(surface.modal().downgrade());
        surface
    }

    /// Cancel the preload, stop publishing, stop dimension reporters, close
    /// open overlays and destroy pooled surfaces. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.shared.scheduler.cancel();
        if let Some(publisher) = self
            .publisher
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            publisher.abort();
        }

        let reporters = std::mem::take(
            &mut *self.reporters.lock().unwrap_or_else(PoisonError::into_inner),
        );
        for reporter in &reporters {
            reporter.abort();
        }
        let modals = std::mem::take(&mut *self.modals.lock().unwrap_or_else(PoisonError::into_inner));
        for modal in &modals {
            modal.close();
        }

        self.pool.clear_all();
        tracing::info!(conversation_id = %self.shared.config.conversation_id, "Ad session closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl<B> AdSession<B>
where
    B: SurfaceBackend + 'static,
    B::Handle: Sync,
{
    /// Report `source` geometry changes to `surface` every
    /// `EngineSettings::dimension_interval` until `shutdown` flips or the
    /// session closes.
    pub fn report_dimensions(
        &self,
        surface: Arc<InlineSurface<B>>,
        source: Arc<dyn GeometrySource>,
        shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let reporter = {
            let _entered = self.runtime.enter();
            spawn_dimension_reporter(surface, source, self.settings.dimension_interval, shutdown)
        };

        let mut reporters = self.reporters.lock().unwrap_or_else(PoisonError::into_inner);
        if self.closed.load(Ordering::SeqCst) {
            reporter.abort();
        } else {
            reporters.retain(|r| !r.is_finished());
            reporters.push(reporter.abort_handle());
        }
        reporter
    }
}

impl<B: SurfaceBackend> Drop for AdSession<B> {
    fn drop(&mut self) {
        self.close();
    }
}

async fn run_publisher(
    shared: Arc<SessionShared>,
    mut changes: watch::Receiver<u64>,
    results: watch::Sender<Option<AdResult>>,
) {
    while changes.changed().await.is_ok() {
        loop {
            tokio::select! {
                result = shared.compute() => {
                    publish(&results, result);
                    break;
                }
                changed = changes.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    tracing::trace!("Pending publish superseded by newer conversation");
                }
            }
        }
    }
}

fn publish(results: &watch::Sender<Option<AdResult>>, result: AdResult) {
    results.send_if_modified(|current| {
        if current.as_ref() == Some(&result) {
            return false;
        }
        match &result {
            AdResult::Success(map) => tracing::debug!(messages_with_ads = map.len(), "Publishing ads"),
            AdResult::Error(e) => tracing::debug!(error = %e, "Publishing ad error"),
        }
        *current = Some(result);
        true
    });
}
