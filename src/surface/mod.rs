//! Host side of the surface protocol: event codec, modal lifecycle, surface
//! pooling and the per-placement router.

pub mod bridge;
pub mod codec;
pub mod dimensions;
pub mod event;
pub mod modal;
pub mod pool;

pub use bridge::InlineSurface;
pub use codec::{decode, encode, Dimensions, OutboundMessage, UpdateIframeData, PARSE_ERROR_TYPE};
pub use dimensions::{spawn_dimension_reporter, DimensionReporter, GeometrySource};
pub use event::{AdEvent, CallbackEvent, ComponentRef, ProtocolEvent};
pub use modal::{ModalController, ModalHost, ModalState};
pub use pool::{SurfaceBackend, SurfacePool};
