//! chat-ads: conversation-aware ad engine
//!
//! Decides which ad accompanies which chat message, fetches candidate bids
//! ahead of need, and speaks the JSON event protocol of the embedded surfaces
//! that render the ads.
//!
//! ```text
//!   AdSession ─┬─ ConversationStore     last N messages
//!              ├─ PreloadScheduler      trigger, in-flight fetch, bid cache
//!              │     └─ AdsRepository   POST /preload, POST /error
//!              ├─ placement::resolve    bids × window → placements
//!              └─ SurfacePool           pooled surfaces keyed by message id
//!                    └─ InlineSurface   codec + ModalController routing
//! ```
//!
//! ```ignore
//! let config = AdsConfig::builder("publisher-token", "user-1", "conversation-1")
//!     .enabled_placement_codes(vec!["inlineAd".into()])
//!     .build()?;
//! let repository = Arc::new(HttpAdsRepository::new(&config.ad_server_url)?);
//! let session = AdSession::new(
//!     config,
//!     EngineSettings::default(),
//!     repository,
//!     Arc::new(StaticDeviceInfo::default()),
//!     Arc::new(SurfacePool::with_default_capacity(backend)),
//! );
//! let mut ads = session.subscribe();
//! session.append(Message::user("Where should I go hiking this weekend?"));
//! ads.changed().await?;
//! ```

pub mod config;
pub mod conversation;
pub mod domain;
pub mod error;
pub mod placement;
pub mod preload;
pub mod session;
pub mod surface;
pub mod telemetry;

pub use config::{AdsConfig, AdsConfigBuilder, EngineSettings, DEFAULT_AD_SERVER_URL};
pub use conversation::{ConversationStore, DEFAULT_MESSAGE_WINDOW};
pub use domain::{
    AdPlacement, AdResult, Bid, Character, DeviceInfo, DisplayPosition, Message, PlacementMap,
    PreloadOutcome, Regulatory, Role,
};
pub use error::{AdsError, ApiError, ConfigError};
pub use placement::{resolve, RenderContext};
pub use preload::{
    AdsRepository, DeviceInfoProvider, HttpAdsRepository, PreloadScheduler, StaticDeviceInfo,
    TriggerPolicy,
};
pub use session::AdSession;
pub use surface::{
    AdEvent, InlineSurface, ModalController, ModalHost, ModalState, ProtocolEvent,
    SurfaceBackend, SurfacePool,
};
