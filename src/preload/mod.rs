//! Bid preloading: trigger evaluation, the in-flight fetch, and the ad
//! server seam.

pub mod http;
pub mod repository;
pub mod scheduler;
pub mod trigger;

pub use http::{HttpAdsRepository, PreloadResponse};
pub use repository::{
    AdsRepository, DeviceInfoProvider, ErrorContext, ErrorReport, PreloadRequest,
    StaticDeviceInfo,
};
pub use scheduler::{PreloadScheduler, SchedulerSnapshot};
pub use trigger::{TriggerPolicy, TriggerState};
