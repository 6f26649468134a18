//! Inline surface routing
//!
//! One [`InlineSurface`] per rendered placement. Inbound JSON from the ad
//! content is decoded and dispatched:
//!
//! - `Init` and page load: push `update-iframe` with the placement context
//! - `Resize`: round to whole pixels and remember the height in the pool
//! - `Click`: open the target externally
//! - `OpenModal` and component events: [`ModalController`]
//! - `Callback`: public [`AdEvent`] on the session channel
//! - everything else: logged

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use super::codec::{decode, encode, OutboundMessage};
use super::event::{AdEvent, ProtocolEvent};
use super::modal::{ModalController, ModalHost};
use super::pool::{SurfaceBackend, SurfacePool};
use crate::domain::AdPlacement;

pub struct InlineSurface<B: SurfaceBackend> {
    placement: AdPlacement,
    pool: Arc<SurfacePool<B>>,
    handle: B::Handle,
    host: Arc<dyn ModalHost>,
    modal: ModalController,
    events: mpsc::UnboundedSender<AdEvent>,
}

impl<B: SurfaceBackend> InlineSurface<B> {
    /// Obtain (or reuse) the pooled surface for the placement's message.
    pub fn attach(
        placement: AdPlacement,
        modal_url: String,
        pool: Arc<SurfacePool<B>>,
        host: Arc<dyn ModalHost>,
        modal_timeout: Duration,
        events: mpsc::UnboundedSender<AdEvent>,
    ) -> Self {
        let handle = pool.obtain(&placement.message_id);
        let modal = ModalController::new(
            Arc::clone(&host),
            modal_url,
            placement.ad_server_url.clone(),
            modal_timeout,
        );

        Self {
            placement,
            pool,
            handle,
            host,
            modal,
            events,
        }
    }

    pub fn placement(&self) -> &AdPlacement {
        &self.placement
    }

    pub fn handle(&self) -> &B::Handle {
        &self.handle
    }

    pub fn modal(&self) -> &ModalController {
        &self.modal
    }

    /// Height last reported by the content, in whole pixels.
    pub fn height(&self) -> u32 {
        self.pool.last_height(&self.placement.message_id)
    }

    /// Message from the inline content. Returns the decoded event.
    pub fn on_message(&self, raw: &str) -> ProtocolEvent {
        let event = decode(raw);
        self.route(&event);
        event
    }

    /// Message from the modal overlay content.
    pub fn on_modal_message(&self, raw: &str) -> ProtocolEvent {
        let event = decode(raw);
        if !self.modal.handle(&event) {
            tracing::trace!(event = event.type_name(), "Ignoring modal surface event");
        }
        event
    }

    /// Page finished loading; init may have been missed, so push the context anyway.
    pub fn on_content_loaded(&self) {
        self.send_update();
    }

    pub fn send_update(&self) {
        self.send(&OutboundMessage::update_iframe(&self.placement));
    }

    pub fn send(&self, message: &OutboundMessage) {
        match encode(message) {
            Ok(json) => self.pool.backend().post_message(&self.handle, &json),
            Err(e) => tracing::warn!(error = %e, "Failed to encode surface message"),
        }
    }

    /// Surface is going away; make sure no overlay outlives it.
    pub fn close(&self) {
        self.modal.close();
    }

    fn route(&self, event: &ProtocolEvent) {
        let message_id = self.placement.message_id.as_str();
        match event {
            ProtocolEvent::Init => self.send_update(),
            ProtocolEvent::Resize { height } => {
                let px = height.round().clamp(0.0, u32::MAX as f64) as u32;
                if px != self.height() {
                    self.pool.update_height(message_id, px);
                }
            }
            ProtocolEvent::Click { url, .. } => self.host.open_external(url),
            ProtocolEvent::OpenModal { .. }
            | ProtocolEvent::ModalInit(_)
            | ProtocolEvent::ModalError(_)
            | ProtocolEvent::ModalClose(_) => {
                self.modal.handle(event);
            }
            ProtocolEvent::Callback(callback) => {
                if self.events.send(AdEvent::from(callback.clone())).is_err() {
                    tracing::debug!(message_id, "Ad event dropped, no listener");
                }
            }
            ProtocolEvent::Error { message } => {
                tracing::warn!(message_id, error = %message, "Ad content reported an error");
            }
            ProtocolEvent::Unknown { event_type, .. } => {
                tracing::debug!(message_id, event_type = %event_type, "Unknown surface event");
            }
            ProtocolEvent::Show
            | ProtocolEvent::Hide
            | ProtocolEvent::View { .. }
            | ProtocolEvent::AdDone { .. } => {
                tracing::trace!(message_id, event = event.type_name(), "Surface event");
            }
        }
    }
}

impl<B: SurfaceBackend> Drop for InlineSurface<B> {
    fn drop(&mut self) {
        self.modal.close();
    }
}
