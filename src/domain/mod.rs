//! Domain types shared by the preload, placement and surface layers.
//!
//! Wire names follow the ad server's JSON conventions (camelCase fields,
//! lower-case roles, `afterUserMessage`-style positions).

pub mod bid;
pub mod device;
pub mod message;
pub mod placement;

pub use bid::{Bid, DisplayPosition, PreloadOutcome};
pub use device::{AppInfo, Character, DeviceInfo, Regulatory, SdkInfo};
pub use message::{Message, Role};
pub use placement::{AdPlacement, AdResult, PlacementMap};
