//! Periodic `update-dimensions-iframe` reporting
//!
//! The host samples geometry on a fixed interval; only changes are sent.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::bridge::InlineSurface;
use super::codec::{Dimensions, OutboundMessage};
use super::pool::SurfaceBackend;

/// Current geometry of the window and the ad container, if laid out.
pub trait GeometrySource: Send + Sync {
    fn dimensions(&self) -> Option<Dimensions>;
}

/// Dedups geometry samples by full equality.
#[derive(Debug, Default)]
pub struct DimensionReporter {
    last_sent: Option<Dimensions>,
}

impl DimensionReporter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Message to send for `current`, or `None` when nothing changed.
    pub fn next(&mut self, current: Dimensions) -> Option<OutboundMessage> {
        if self.last_sent == Some(current) {
            return None;
        }
        self.last_sent = Some(current);
        Some(OutboundMessage::update_dimensions(current))
    }
}

/// Report geometry changes to `surface` every `interval` until `shutdown`
/// flips to `true` or its sender is dropped.
pub fn spawn_dimension_reporter<B>(
    surface: Arc<InlineSurface<B>>,
    source: Arc<dyn GeometrySource>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()>
where
    B: SurfaceBackend + 'static,
    B::Handle: Sync,
{
    tokio::spawn(async move {
        let mut reporter = DimensionReporter::new();
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Some(message) = source.dimensions().and_then(|d| reporter.next(d)) {
                        surface.send(&message);
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }
        tracing::trace!("Dimension reporter stopped");
    })
}
