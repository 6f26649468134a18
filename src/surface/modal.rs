//! Modal overlay lifecycle
//!
//! ```text
//!   Closed ──OpenModal──► Opening ──launch──► WaitingInit ──ModalInit──► Visible
//!     ▲                                            │                        │
//!     └────────── timer / ModalClose / ModalError ─┴────────────────────────┘
//! ```
//!
//! Every path into `Closed` from an open state dismisses the overlay exactly
//! once. Host calls are made outside the state lock.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;

use super::event::ProtocolEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModalState {
    Closed,
    Opening,
    WaitingInit,
    Visible,
}

/// Presentation side of the overlay, implemented by the embedding UI.
pub trait ModalHost: Send + Sync {
    /// Create the overlay surface and start loading `url`, hidden.
    fn launch(&self, url: &str);
    /// Make the launched overlay visible.
    fn show(&self);
    /// Tear the overlay down and release its resources.
    fn dismiss(&self);
    /// Open `url` in an external browser view.
    fn open_external(&self, url: &str);
}

#[derive(Debug)]
struct ModalSlot {
    state: ModalState,
    generation: u64,
    timer: Option<JoinHandle<()>>,
}

struct ModalInner {
    host: Arc<dyn ModalHost>,
    modal_url: String,
    ad_server_url: String,
    default_timeout: Duration,
    /// Runtime the timeout task runs on. Captured at construction so protocol
    /// events may arrive from host threads outside the runtime.
    runtime: Option<Handle>,
    slot: Mutex<ModalSlot>,
}

impl ModalInner {
    fn lock(&self) -> MutexGuard<'_, ModalSlot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move to `Closed`. Returns whether the overlay was open, in which case
    /// the caller must dismiss it.
    fn close_locked(slot: &mut ModalSlot) -> bool {
        if slot.state == ModalState::Closed {
            return false;
        }
        slot.state = ModalState::Closed;
        slot.generation += 1;
        if let Some(timer) = slot.timer.take() {
            timer.abort();
        }
        true
    }

    fn close(&self) {
        let was_open = Self::close_locked(&mut self.lock());
        if was_open {
            self.host.dismiss();
        }
    }
}

/// Drives one overlay for one placement.
#[derive(Clone)]
pub struct ModalController {
    inner: Arc<ModalInner>,
}

impl ModalController {
    pub fn new(
        host: Arc<dyn ModalHost>,
        modal_url: impl Into<String>,
        ad_server_url: impl Into<String>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(ModalInner {
                host,
                modal_url: modal_url.into(),
                ad_server_url: ad_server_url.into(),
                default_timeout,
                runtime: Handle::try_current().ok(),
                slot: Mutex::new(ModalSlot {
                    state: ModalState::Closed,
                    generation: 0,
                    timer: None,
                }),
            }),
        }
    }

    pub fn state(&self) -> ModalState {
        self.inner.lock().state
    }

    /// A handle that can close this overlay without keeping it alive.
    pub(crate) fn downgrade(&self) -> ModalCloser {
        ModalCloser(Arc::downgrade(&self.inner))
    }

    /// Feed one protocol event. Returns whether the event concerned the modal.
    pub fn handle(&self, event: &ProtocolEvent) -> bool {
        match event {
            ProtocolEvent::OpenModal { .. } => {
                let timeout = event
                    .modal_timeout(self.inner.default_timeout)
                    .unwrap_or(self.inner.default_timeout);
                self.open(timeout);
                true
            }
            ProtocolEvent::ModalInit(_) => {
                self.on_init();
                true
            }
            ProtocolEvent::ModalClose(component) | ProtocolEvent::ModalError(component) => {
                tracing::debug!(
                    code = %component.code,
                    event = event.type_name(),
                    "Modal closed by content"
                );
                self.close();
                true
            }
            ProtocolEvent::Click { url, .. } if self.state() != ModalState::Closed => {
                let target = format!("{}{}", self.inner.ad_server_url, url);
                self.inner.host.open_external(&target);
                true
            }
            _ => false,
        }
    }

    fn open(&self, timeout: Duration) {
        let generation = {
            let mut slot = self.inner.lock();
            if slot.state != ModalState::Closed {
                tracing::debug!(state = ?slot.state, "Modal already open, ignoring open request");
                return;
            }
            slot.state = ModalState::Opening;
            slot.generation += 1;
            slot.generation
        };

        tracing::info!(url = %self.inner.modal_url, timeout_ms = timeout.as_millis() as u64, "Opening modal");
        self.inner.host.launch(&self.inner.modal_url);

        let runtime = match self.inner.runtime.clone().or_else(|| Handle::try_current().ok()) {
            Some(runtime) => runtime,
            None => {
                tracing::warn!("No runtime for the modal timeout, closing modal");
                self.close();
                return;
            }
        };

        let mut slot = self.inner.lock();
        // Closed while launching.
        if slot.generation != generation {
            return;
        }
        slot.state = ModalState::WaitingInit;

        let inner = Arc::clone(&self.inner);
        slot.timer = Some(runtime.spawn(async move {
            tokio::time::sleep(timeout).await;
            let expired = {
                let mut slot = inner.lock();
                if slot.generation != generation {
                    return;
                }
                // Dropping our own handle; nothing left to abort.
                slot.timer = None;
                ModalInner::close_locked(&mut slot)
            };
            if expired {
                tracing::warn!(timeout_ms = timeout.as_millis() as u64, "Modal did not initialise in time");
                inner.host.dismiss();
            }
        }));
    }

    fn on_init(&self) {
        {
            let mut slot = self.inner.lock();
            if slot.state != ModalState::WaitingInit {
                tracing::debug!(state = ?slot.state, "Ignoring modal init");
                return;
            }
            slot.state = ModalState::Visible;
            if let Some(timer) = slot.timer.take() {
                timer.abort();
            }
        }
        tracing::debug!("Modal visible");
        self.inner.host.show();
    }

    /// Close the overlay if open. Safe to call any number of times.
    pub fn close(&self) {
        self.inner.close();
    }
}

/// Weak reference to a [`ModalController`], held by the owning session.
#[derive(Clone)]
pub(crate) struct ModalCloser(Weak<ModalInner>);

impl ModalCloser {
    pub(crate) fn close(&self) {
        if let Some(inner) = self.0.upgrade() {
            inner.close();
        }
    }

    pub(crate) fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }
}
