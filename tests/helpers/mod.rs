//! Shared fakes for integration tests.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;

use chat_ads::domain::{DeviceInfo, PreloadOutcome};
use chat_ads::preload::{ErrorReport, PreloadRequest};
use chat_ads::surface::{ModalHost, SurfaceBackend, SurfacePool};
use chat_ads::{
    AdResult, AdSession, AdsConfig, AdsRepository, ApiError, Bid, DisplayPosition,
    EngineSettings, Message, Role, StaticDeviceInfo,
};

pub const SERVER: &str = "https://ads.example.com";

// ============================================================================
// Repository
// ============================================================================

type Scripted = (Duration, Result<PreloadOutcome, ApiError>);

/// Scripted ad server. A response registered for the id of the request's
/// latest message wins; otherwise each preload pops the next `(delay, result)`.
/// An empty script answers immediately with no bids.
#[derive(Default)]
pub struct FakeRepository {
    keyed: Mutex<HashMap<String, Scripted>>,
    script: Mutex<VecDeque<Scripted>>,
    requests: Mutex<Vec<PreloadRequest>>,
    reports: Mutex<Vec<ErrorReport>>,
    calls: AtomicUsize,
}

impl FakeRepository {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn respond(&self, delay: Duration, result: Result<PreloadOutcome, ApiError>) {
        self.script.lock().unwrap().push_back((delay, result));
    }

    pub fn respond_with_bids(&self, delay: Duration, bids: Vec<Bid>) {
        self.respond(delay, Ok(outcome(bids)));
    }

    /// Answer requests whose latest message is `message_id`.
    pub fn respond_for(&self, message_id: &str, delay: Duration, bids: Vec<Bid>) {
        self.keyed
            .lock()
            .unwrap()
            .insert(message_id.to_string(), (delay, Ok(outcome(bids))));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn requests(&self) -> Vec<PreloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn reports(&self) -> Vec<ErrorReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl AdsRepository for FakeRepository {
    async fn preload(
        &self,
        request: &PreloadRequest,
        _timeout: Duration,
    ) -> Result<PreloadOutcome, ApiError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests.lock().unwrap().push(request.clone());
        let latest = request.messages.last().map(|m| m.id.clone()).unwrap_or_default();
        let keyed = self.keyed.lock().unwrap().remove(&latest);
        let next = keyed.or_else(|| self.script.lock().unwrap().pop_front());
        let (delay, result) = next.unwrap_or((Duration::ZERO, Ok(PreloadOutcome::default())));
        tokio::time::sleep(delay).await;
        result
    }

    async fn report_error(&self, report: &ErrorReport) -> Result<(), ApiError> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}

pub fn outcome(bids: Vec<Bid>) -> PreloadOutcome {
    PreloadOutcome {
        session_id: Some("session-1".into()),
        bids: Some(bids),
        remote_log_level: None,
        preload_timeout: None,
    }
}

// ============================================================================
// Presentation fakes
// ============================================================================

#[derive(Default)]
pub struct RecordingHost {
    pub launched: Mutex<Vec<String>>,
    pub shown: AtomicUsize,
    pub dismissed: AtomicUsize,
    pub external: Mutex<Vec<String>>,
}

impl RecordingHost {
    pub fn dismissed(&self) -> usize {
        self.dismissed.load(Ordering::SeqCst)
    }
}

impl ModalHost for RecordingHost {
    fn launch(&self, url: &str) {
        self.launched.lock().unwrap().push(url.to_string());
    }
    fn show(&self) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }
    fn dismiss(&self) {
        self.dismissed.fetch_add(1, Ordering::SeqCst);
    }
    fn open_external(&self, url: &str) {
        self.external.lock().unwrap().push(url.to_string());
    }
}

/// Surfaces are serial numbers; every lifecycle call is recorded.
#[derive(Default)]
pub struct RecordingBackend {
    next: AtomicU64,
    pub created: Mutex<Vec<(String, u64)>>,
    pub destroyed: Mutex<Vec<u64>>,
    pub posted: Mutex<Vec<(u64, String)>>,
}

impl RecordingBackend {
    pub fn posted_to(&self, handle: u64) -> Vec<String> {
        self.posted
            .lock()
            .unwrap()
            .iter()
            .filter(|(h, _)| *h == handle)
            .map(|(_, m)| m.clone())
            .collect()
    }
}

impl SurfaceBackend for RecordingBackend {
    type Handle = u64;

    fn create(&self, key: &str) -> u64 {
        let handle = self.next.fetch_add(1, Ordering::SeqCst);
        self.created.lock().unwrap().push((key.to_string(), handle));
        handle
    }
    fn detach(&self, _handle: &u64) {}
    fn destroy(&self, handle: u64) {
        self.destroyed.lock().unwrap().push(handle);
    }
    fn post_message(&self, handle: &u64, message: &str) {
        self.posted.lock().unwrap().push((*handle, message.to_string()));
    }
}

// ============================================================================
// Builders
// ============================================================================

pub fn user(id: &str) -> Message {
    Message::new(id, Role::User, format!("user says {id}"), "2024-05-01T10:00:00Z")
}

pub fn assistant(id: &str) -> Message {
    Message::new(id, Role::Assistant, format!("assistant says {id}"), "2024-05-01T10:00:01Z")
}

pub fn inline_bid(id: &str) -> Bid {
    Bid::new(id, "inlineAd", DisplayPosition::AfterUserMessage)
}

pub fn config() -> AdsConfig {
    AdsConfig::builder("publisher-token", "user-1", "conversation-1")
        .enabled_placement_codes(vec!["inlineAd".into()])
        .ad_server_url(SERVER)
        .theme("dark")
        .build()
        .unwrap()
}

pub fn session(repository: Arc<FakeRepository>) -> AdSession<RecordingBackend> {
    session_with(repository, EngineSettings::default())
}

pub fn session_with(
    repository: Arc<FakeRepository>,
    settings: EngineSettings,
) -> AdSession<RecordingBackend> {
    let pool = Arc::new(SurfacePool::new(
        RecordingBackend::default(),
        settings.surface_pool_capacity,
    ));
    AdSession::new(
        config(),
        settings,
        repository,
        Arc::new(StaticDeviceInfo(DeviceInfo::default())),
        pool,
    )
}

/// Wait (virtual time) until the session publishes a result matching `accept`.
pub async fn wait_for_result(
    results: &mut watch::Receiver<Option<AdResult>>,
    mut accept: impl FnMut(&AdResult) -> bool,
) -> AdResult {
    let published = tokio::time::timeout(
        Duration::from_secs(30),
        results.wait_for(|r| r.as_ref().is_some_and(&mut accept)),
    )
    .await
    .expect("no matching result published")
    .expect("session dropped its result channel");
    let result: Option<AdResult> = (*published).clone();
    result.unwrap()
}
