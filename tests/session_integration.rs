//! Ad session integration tests
//!
//! Drives [`AdSession`] end to end against a scripted ad server with a paused
//! Tokio clock:
//! 1. Conversation changes trigger preloads (or don't)
//! 2. Published results reflect the newest preload only
//! 3. Error classification and disablement
//! 4. Surface attachment, interaction events and teardown

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use pretty_assertions::assert_eq;

use chat_ads::surface::OutboundMessage;
use chat_ads::{AdEvent, AdResult, AdsError, ApiError, EngineSettings, TriggerPolicy};
use helpers::{
    assistant, inline_bid, session, session_with, user, wait_for_result, FakeRepository,
    RecordingHost, SERVER,
};

fn conversation() -> Vec<chat_ads::Message> {
    vec![user("m1"), assistant("a1"), user("m2")]
}

// ============================================================================
// Triggering
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_no_preload_without_user_message() {
    let repository = FakeRepository::new();
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(vec![assistant("a1")]);
    let result = wait_for_result(&mut results, |_| true).await;

    assert!(result.is_unavailable());
    assert_eq!(repository.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_empty_conversation_publishes_empty_success() {
    let repository = FakeRepository::new();
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(Vec::new());
    let result = wait_for_result(&mut results, |_| true).await;

    assert_eq!(result, AdResult::Success(Default::default()));
    assert_eq!(repository.calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_assistant_reply_does_not_refetch_by_default() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::from_millis(20), vec![inline_bid("b1")]);
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.append(user("m1"));
    wait_for_result(&mut results, |r| r.placements().is_some()).await;
    session.append(assistant("a1"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(repository.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_latest_message_policy_refetches_on_any_message() {
    let repository = FakeRepository::new();
    let settings = EngineSettings {
        trigger_policy: TriggerPolicy::LatestMessageChanged,
        ..EngineSettings::default()
    };
    let session = session_with(repository.clone(), settings);

    session.append(user("m1"));
    tokio::time::sleep(Duration::from_millis(10)).await;
    session.append(assistant("a1"));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert_eq!(repository.calls(), 2);
    assert_eq!(repository.requests()[1].messages.len(), 2);
}

// ============================================================================
// Publishing
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_success_places_bid_after_latest_user_message() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::from_millis(50), vec![inline_bid("b1")]);
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(conversation());
    let result = wait_for_result(&mut results, |r| r.placements().is_some()).await;

    let map = result.placements().unwrap();
    assert_eq!(map.keys().collect::<Vec<_>>(), vec!["m2"]);
    let placement = &map["m2"][0];
    assert_eq!(placement.bid.bid_id, "b1");
    assert!(placement
        .render_url
        .starts_with(&format!("{SERVER}/api/frame/b1?messageId=m2&code=inlineAd&sdk=")));
    assert!(placement.render_url.ends_with("&theme=dark"));
    assert_eq!(placement.messages.len(), 3);
    assert_eq!(session.session_id().as_deref(), Some("session-1"));

    let request = &repository.requests()[0];
    assert_eq!(request.messages.len(), 3);
    assert_eq!(request.session_id, None);
}

#[tokio::test(start_paused = true)]
async fn test_superseded_preload_is_never_published() {
    let repository = FakeRepository::new();
    repository.respond_for("m1", Duration::from_millis(500), vec![inline_bid("stale")]);
    repository.respond_for("m2", Duration::from_millis(50), vec![inline_bid("fresh")]);
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(vec![user("m1")]);
    tokio::time::sleep(Duration::from_millis(10)).await;
    assert_eq!(repository.calls(), 1);

    session.set_messages(conversation());
    let result = wait_for_result(&mut results, |r| r.placements().is_some()).await;
    let bid_ids: Vec<_> = result.placements().unwrap()["m2"]
        .iter()
        .map(|p| p.bid.bid_id.clone())
        .collect();
    assert_eq!(bid_ids, vec!["fresh".to_string()]);

    // Long after the stale answer would have landed, nothing changed.
    tokio::time::sleep(Duration::from_secs(2)).await;
    assert_eq!(*results.borrow(), Some(result));
    assert_eq!(repository.calls(), 2);
}

#[tokio::test(start_paused = true)]
async fn test_second_preload_sends_session_id() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b1")]);
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b2")]);
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.append(user("m1"));
    wait_for_result(&mut results, |r| r.placements().is_some()).await;
    session.append(user("m2"));
    wait_for_result(&mut results, |r| {
        r.placements().is_some_and(|m| m.contains_key("m2"))
    })
    .await;

    let requests = repository.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[1].session_id.as_deref(), Some("session-1"));
}

#[tokio::test(start_paused = true)]
async fn test_ads_for_message_waits_for_in_flight_preload() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::from_millis(300), vec![inline_bid("b1")]);
    let session = session(repository.clone());

    session.set_messages(conversation());
    let placements = session.ads_for_message("m2").await;
    assert_eq!(placements.len(), 1);
    assert_eq!(placements[0].bid.bid_id, "b1");

    assert!(session.ads_for_message("m1").await.is_empty());
}

// ============================================================================
// Errors and disablement
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_temporary_error_is_published_as_network_error() {
    let repository = FakeRepository::new();
    repository.respond(
        Duration::ZERO,
        Err(ApiError::Temporary {
            code: "busy".into(),
        }),
    );
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(conversation());
    let result = wait_for_result(&mut results, |_| true).await;

    assert_eq!(
        result,
        AdResult::Error(AdsError::Network {
            reason: "Server reported temporary error 'busy'".into()
        })
    );
    assert!(!session.is_disabled());
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(repository.reports().is_empty());
}

#[tokio::test(start_paused = true)]
async fn test_transport_error_is_reported_to_server() {
    let repository = FakeRepository::new();
    repository.respond(Duration::ZERO, Err(ApiError::Http { status: 503 }));
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(conversation());
    let result = wait_for_result(&mut results, |_| true).await;
    assert!(matches!(result, AdResult::Error(AdsError::Network { .. })));

    tokio::time::sleep(Duration::from_millis(50)).await;
    let reports = repository.reports();
    assert_eq!(reports.len(), 1);
    assert_eq!(reports[0].error, "Preload failed");
}

#[tokio::test(start_paused = true)]
async fn test_permanent_error_disables_session() {
    let repository = FakeRepository::new();
    repository.respond(
        Duration::ZERO,
        Err(ApiError::Permanent {
            code: "invalid-token".into(),
        }),
    );
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(conversation());
    let result = wait_for_result(&mut results, |_| true).await;
    assert!(result.is_unavailable());
    assert!(session.is_disabled());

    session.append(user("m3"));
    session.set_disabled(false);
    tokio::time::sleep(Duration::from_secs(1)).await;

    assert_eq!(repository.calls(), 1);
    assert!(session.is_disabled());
}

#[tokio::test(start_paused = true)]
async fn test_user_disable_and_reenable() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b1")]);
    let session = session(repository.clone());
    let mut results = session.subscribe();

    session.set_messages(conversation());
    wait_for_result(&mut results, |r| r.placements().is_some()).await;

    session.set_disabled(true);
    let result = wait_for_result(&mut results, |r| r.is_unavailable()).await;
    assert!(result.is_unavailable());

    // Ignored while disabled.
    session.append(user("m3"));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(repository.calls(), 1);

    session.set_disabled(false);
    let result = wait_for_result(&mut results, |r| r.placements().is_some()).await;
    assert!(result.placements().unwrap().contains_key("m2"));
}

// ============================================================================
// Surfaces and teardown
// ============================================================================

#[tokio::test(start_paused = true)]
async fn test_attached_surface_reports_events_and_gets_context() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b1")]);
    let session = session(repository.clone());
    let mut results = session.subscribe();
    let mut events = session.take_ad_events().unwrap();
    assert!(session.take_ad_events().is_none());

    session.set_messages(conversation());
    let result = wait_for_result(&mut results, |r| r.placements().is_some()).await;
    let placement = result.placements().unwrap()["m2"][0].clone();

    let host = Arc::new(RecordingHost::default());
    let surface = session.attach_surface(placement.clone(), host.clone());

    surface.on_message(r#"{"type":"init-iframe"}"#);
    let posted = session
        .surface_pool()
        .backend()
        .posted_to(*surface.handle());
    assert_eq!(posted.len(), 1);
    let update: OutboundMessage = serde_json::from_str(&posted[0]).unwrap();
    assert_eq!(update, OutboundMessage::update_iframe(&placement));

    surface.on_message(
        r#"{"type":"event-iframe","data":{"name":"ad.viewed","code":"inlineAd","payload":{"id":"b1","messageId":"m2","format":"banner"}}}"#,
    );
    assert_eq!(
        events.recv().await,
        Some(AdEvent::Viewed {
            code: "inlineAd".into(),
            bid_id: "b1".into(),
            content: String::new(),
            message_id: "m2".into(),
            format: "banner".into(),
        })
    );
}

#[tokio::test(start_paused = true)]
async fn test_close_is_idempotent_and_releases_surfaces() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b1")]);
    let session = session(repository.clone());

    session.set_messages(conversation());
    let placement = session.ads_for_message("m2").await.remove(0);
    let host = Arc::new(RecordingHost::default());
    let surface = session.attach_surface(placement, host.clone());
    let handle = *surface.handle();

    session.close();
    session.close();

    assert!(session.is_closed());
    assert!(session.surface_pool().is_empty());
    assert_eq!(
        *session.surface_pool().backend().destroyed.lock().unwrap(),
        vec![handle]
    );

    session.append(user("m3"));
    assert!(session.ads_for_message("m2").await.is_empty());
    assert_eq!(repository.calls(), 1);
}

struct FixedGeometry(chat_ads::surface::Dimensions);

impl chat_ads::surface::GeometrySource for FixedGeometry {
    fn dimensions(&self) -> Option<chat_ads::surface::Dimensions> {
        Some(self.0)
    }
}

#[tokio::test(start_paused = true)]
async fn test_session_reports_dimensions_on_its_interval() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b1")]);
    let settings = EngineSettings {
        dimension_interval: Duration::from_millis(50),
        ..EngineSettings::default()
    };
    let session = session_with(repository.clone(), settings);

    session.set_messages(conversation());
    let placement = session.ads_for_message("m2").await.remove(0);
    let surface = Arc::new(session.attach_surface(placement, Arc::new(RecordingHost::default())));
    let handle = *surface.handle();
    let (shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let reporter = session.report_dimensions(
        Arc::clone(&surface),
        Arc::new(FixedGeometry(chat_ads::surface::Dimensions {
            window_width: 1024.0,
            window_height: 768.0,
            ..Default::default()
        })),
        shutdown_rx,
    );
    tokio::time::sleep(Duration::from_millis(500)).await;
    shutdown_tx.send(true).unwrap();
    reporter.await.unwrap();

    let posted = session.surface_pool().backend().posted_to(handle);
    assert_eq!(posted.len(), 1);
    assert!(posted[0].contains(r#""type":"update-dimensions-iframe""#));
}

/// Reports a wider window on every sample.
struct GrowingGeometry(std::sync::atomic::AtomicU32);

impl chat_ads::surface::GeometrySource for GrowingGeometry {
    fn dimensions(&self) -> Option<chat_ads::surface::Dimensions> {
        let step = self.0.fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        Some(chat_ads::surface::Dimensions {
            window_width: 320.0 + step as f64,
            ..Default::default()
        })
    }
}

#[tokio::test(start_paused = true)]
async fn test_close_stops_reporters_and_dismisses_open_modal() {
    let repository = FakeRepository::new();
    repository.respond_with_bids(Duration::ZERO, vec![inline_bid("b1")]);
    let settings = EngineSettings {
        dimension_interval: Duration::from_millis(50),
        ..EngineSettings::default()
    };
    let session = session_with(repository.clone(), settings);

    session.set_messages(conversation());
    let placement = session.ads_for_message("m2").await.remove(0);
    let host = Arc::new(RecordingHost::default());
    let surface = Arc::new(session.attach_surface(placement, host.clone()));
    let handle = *surface.handle();
    let (_shutdown_tx, shutdown_rx) = tokio::sync::watch::channel(false);

    let reporter = session.report_dimensions(
        Arc::clone(&surface),
        Arc::new(GrowingGeometry(Default::default())),
        shutdown_rx,
    );
    surface.on_message(
        r#"{"type":"open-component-iframe","data":{"code":"inlineAd","component":"modal","timeout":60000}}"#,
    );
    tokio::time::sleep(Duration::from_millis(200)).await;
    assert!(!session.surface_pool().backend().posted_to(handle).is_empty());
    assert_eq!(surface.modal().state(), chat_ads::ModalState::WaitingInit);

    session.close();
    let posted_at_close = session.surface_pool().backend().posted_to(handle).len();
    assert_eq!(surface.modal().state(), chat_ads::ModalState::Closed);
    assert_eq!(host.dismissed(), 1);
    assert_eq!(
        *session.surface_pool().backend().destroyed.lock().unwrap(),
        vec![handle]
    );

    tokio::time::sleep(Duration::from_secs(2)).await;
    assert!(reporter.await.unwrap_err().is_cancelled());
    assert_eq!(
        session.surface_pool().backend().posted_to(handle).len(),
        posted_at_close
    );

    // A reporter requested after close never runs.
    let (_late_tx, late_rx) = tokio::sync::watch::channel(false);
    let late = session.report_dimensions(
        Arc::clone(&surface),
        Arc::new(GrowingGeometry(Default::default())),
        late_rx,
    );
    assert!(late.await.unwrap_err().is_cancelled());
    assert_eq!(
        session.surface_pool().backend().posted_to(handle).len(),
        posted_at_close
    );

    drop(surface);
    assert_eq!(host.dismissed(), 1);
}
