//! Integration tests for lingua-relay
//!
//! These drive the pipeline end to end: a roster file on disk, LibreTranslate
//! mirrors and the Twilio API mocked with wiremock.

use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use wiremock::{
    matchers::{body_partial_json, body_string_contains, method, path, path_regex},
    Mock, MockServer, ResponseTemplate,
};

use lingua_relay::{
    config::Config,
    pipeline::{InboundMessage, Pipeline},
    roster::{Member, Role},
    store::Store,
    translation::TranslationClient,
    whatsapp::TwilioClient,
};

// ==================== Test Helpers ====================

/// Create a test config pointing at mocked services
fn create_test_config(twilio_url: &str, mirrors: Vec<String>, temp_dir: &TempDir) -> Config {
    Config {
        twilio_account_sid: "AC_test".to_string(),
        twilio_auth_token: "test-token".to_string(),
        twilio_number: "+14155238886".to_string(),
        twilio_api_url: twilio_url.to_string(),
        translation_mirrors: mirrors,
        translation_api_key: None,
        translation_timeout: Duration::from_millis(500),
        store_path: temp_dir
            .path()
            .join("roster.json")
            .to_str()
            .unwrap()
            .to_string(),
        super_admin_number: Some("+10000000001".to_string()),
        super_admin_lang: "en".to_string(),
        super_admin_name: "root".to_string(),
        webhook_secret: None,
        port: 8080,
        delivery_delay: Duration::ZERO,
    }
}

struct TestRelay {
    pipeline: Pipeline,
    store: Arc<Store>,
    twilio: MockServer,
    mirror: MockServer,
    _temp_dir: TempDir,
}

/// Build a relay whose roster holds `members` (identity, lang, name, role)
async fn create_relay(members: &[(&str, &str, &str, Role)]) -> TestRelay {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let twilio = MockServer::start().await;
    let mirror = MockServer::start().await;
    let config = create_test_config(&twilio.uri(), vec![mirror.uri()], &temp_dir);

    let store = Arc::new(Store::open(&config.store_path).expect("Failed to open store"));
    for &(identity, lang, name, role) in members {
        store
            .add_member(Member::new(identity, lang, name, role).expect("valid member"))
            .expect("Failed to add member");
    }

    let translator = Arc::new(TranslationClient::new(&config).expect("Failed to build client"));
    let pipeline = Pipeline::new(
        store.clone(),
        translator,
        TwilioClient::new(&config),
        config.delivery_delay,
    );

    TestRelay {
        pipeline,
        store,
        twilio,
        mirror,
        _temp_dir: temp_dir,
    }
}

async fn accept_sends(twilio: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/2010-04-01/Accounts/AC_test/Messages.json"))
        .respond_with(ResponseTemplate::new(201))
        .mount(twilio)
        .await;
}

async fn translate_to(mirror: &MockServer, target: &str, translated: &str) {
    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(serde_json::json!({ "target": target })))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "translatedText": translated })),
        )
        .mount(mirror)
        .await;
}

async fn send(relay: &TestRelay, from: &str, body: &str) -> lingua_relay::pipeline::Dispatch {
    relay
        .pipeline
        .handle(InboundMessage::new(format!("whatsapp:{}", from), body))
        .await
}

const TRIO: &[(&str, &str, &str, Role)] = &[
    ("+10000000001", "en", "alice", Role::Super),
    ("+10000000002", "es", "bruno", Role::User),
    ("+10000000003", "es", "carmen", Role::User),
];

// ==================== Fan-out Tests ====================

#[tokio::test]
async fn test_every_other_member_receives_one_copy() {
    let relay = create_relay(&[
        ("+10000000001", "en", "alice", Role::Super),
        ("+10000000002", "en", "ben", Role::User),
        ("+10000000003", "es", "carmen", Role::User),
        ("+10000000004", "cs", "dita", Role::User),
        ("+10000000005", "de", "emil", Role::Admin),
    ])
    .await;
    accept_sends(&relay.twilio).await;
    translate_to(&relay.mirror, "en", "Good morning").await;
    translate_to(&relay.mirror, "es", "Buenos días").await;
    translate_to(&relay.mirror, "de", "Guten Morgen").await;

    let dispatch = send(&relay, "+10000000004", "Dobré ráno").await;

    assert_eq!(dispatch.deliveries.len(), 4);
    assert_eq!(dispatch.delivered(), 4);
    assert!(dispatch
        .deliveries
        .iter()
        .all(|d| d.recipient != "+10000000004"));
    assert_eq!(relay.twilio.received_requests().await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_one_translation_per_language_and_no_echo() {
    let relay = create_relay(TRIO).await;
    accept_sends(&relay.twilio).await;

    Mock::given(method("POST"))
        .and(path("/translate"))
        .and(body_partial_json(serde_json::json!({
            "q": "Hello",
            "source": "en",
            "target": "es"
        })))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({ "translatedText": "Hola" })),
        )
        .expect(1)
        .mount(&relay.mirror)
        .await;

    let dispatch = send(&relay, "+10000000001", "Hello").await;

    let texts: Vec<_> = dispatch.deliveries.iter().map(|d| d.text.as_str()).collect();
    assert_eq!(texts, vec!["alice: Hola", "alice: Hola"]);

    let requests = relay.twilio.received_requests().await.unwrap();
    assert_eq!(requests.len(), 2);
    for request in &requests {
        let body = String::from_utf8_lossy(&request.body);
        assert!(!body.contains("To=whatsapp%3A%2B10000000001"));
    }
}

#[tokio::test]
async fn test_translation_failure_spares_other_languages() {
    let relay = create_relay(&[
        ("+10000000001", "en", "alice", Role::Super),
        ("+10000000002", "es", "bruno", Role::User),
        ("+10000000003", "fr", "claire", Role::User),
    ])
    .await;
    accept_sends(&relay.twilio).await;
    translate_to(&relay.mirror, "es", "Hola").await;
    Mock::given(method("POST"))
        .and(body_partial_json(serde_json::json!({ "target": "fr" })))
        .respond_with(ResponseTemplate::new(503))
        .mount(&relay.mirror)
        .await;

    let dispatch = send(&relay, "+10000000001", "Hello").await;

    assert_eq!(dispatch.delivered(), 2);
    assert_eq!(dispatch.deliveries[0].text, "alice: Hola");
    assert!(dispatch.deliveries[1].text.contains("Hello"));
    assert!(!dispatch.deliveries[1].translated);
}

#[tokio::test]
async fn test_second_mirror_takes_over() {
    let temp_dir = TempDir::new().unwrap();
    let twilio = MockServer::start().await;
    let broken = MockServer::start().await;
    let healthy = MockServer::start().await;
    accept_sends(&twilio).await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&broken)
        .await;
    translate_to(&healthy, "es", "Hola").await;

    let config = create_test_config(&twilio.uri(), vec![broken.uri(), healthy.uri()], &temp_dir);
    let store = Arc::new(Store::open(&config.store_path).unwrap());
    for &(identity, lang, name, role) in TRIO {
        store
            .add_member(Member::new(identity, lang, name, role).unwrap())
            .unwrap();
    }
    let translator = Arc::new(TranslationClient::new(&config).unwrap());
    let pipeline = Pipeline::new(
        store,
        translator.clone(),
        TwilioClient::new(&config),
        Duration::ZERO,
    );

    let dispatch = pipeline
        .handle(InboundMessage::new("+10000000001", "Hello"))
        .await;

    assert!(dispatch.deliveries.iter().all(|d| d.text == "alice: Hola"));
    assert_eq!(translator.metrics().mirror_failovers(), 1);
}

#[tokio::test]
async fn test_unreachable_member_does_not_block_others() {
    let relay = create_relay(TRIO).await;
    Mock::given(method("POST"))
        .and(path_regex(r"/Messages\.json$"))
        .and(body_string_contains("To=whatsapp%3A%2B10000000002"))
        .respond_with(ResponseTemplate::new(400))
        .mount(&relay.twilio)
        .await;
    accept_sends(&relay.twilio).await;
    translate_to(&relay.mirror, "es", "Hola").await;

    let dispatch = send(&relay, "+10000000001", "Hello").await;

    assert_eq!(dispatch.deliveries.len(), 2);
    assert_eq!(dispatch.delivered(), 1);
    assert!(dispatch.reply.is_some());
}

// ==================== Command Tests ====================

#[tokio::test]
async fn test_add_then_remove_restores_roster() {
    let relay = create_relay(TRIO).await;
    let before = relay.store.member_count();

    let added = send(&relay, "+10000000001", "/add +10000000009 de dieter user").await;
    assert!(added.reply.unwrap().contains("dieter, +10000000009, de, user"));
    assert_eq!(relay.store.member_count(), before + 1);

    let duplicate = send(&relay, "+10000000001", "/add +10000000009 de dieter2 user").await;
    assert_eq!(duplicate.reply.as_deref(), Some("User already exists."));
    assert_eq!(relay.store.member_count(), before + 1);

    send(&relay, "+10000000001", "/remove +10000000009").await;
    assert_eq!(relay.store.member_count(), before);
}

#[tokio::test]
async fn test_roster_survives_restart() {
    let relay = create_relay(TRIO).await;
    send(&relay, "+10000000001", "/add +10000000009 de dieter admin").await;

    let path = relay._temp_dir.path().join("roster.json");
    let reopened = Store::open(&path).unwrap();

    assert_eq!(reopened.member_count(), 4);
    assert_eq!(reopened.find("DIETER").unwrap().role, Role::Admin);
}

#[tokio::test]
async fn test_user_cannot_remove_super() {
    let relay = create_relay(TRIO).await;
    translate_to(&relay.mirror, "es", "No tienes permiso.").await;

    let dispatch = send(&relay, "+10000000002", "/remove alice").await;

    assert_eq!(dispatch.reply.as_deref(), Some("No tienes permiso."));
    assert_eq!(relay.store.member_count(), 3);
    assert!(relay.store.find("alice").is_some());
}

#[tokio::test]
async fn test_stats_for_quiet_member_is_zero() {
    let relay = create_relay(TRIO).await;

    let dispatch = send(&relay, "+10000000001", "/stats 7 days carmen").await;

    assert!(dispatch.reply.unwrap().ends_with("carmen, +10000000003, 0"));
}

#[tokio::test]
async fn test_stats_counts_relayed_messages() {
    let relay = create_relay(TRIO).await;
    accept_sends(&relay.twilio).await;
    translate_to(&relay.mirror, "en", "Hi").await;

    send(&relay, "+10000000002", "Hola").await;
    send(&relay, "+10000000002", "¿Qué tal?").await;

    let dispatch = send(&relay, "+10000000001", "/stats 1 day bruno").await;
    assert!(dispatch.reply.unwrap().ends_with("bruno, +10000000002, 2"));
}

#[tokio::test]
async fn test_test_command_replies_with_translation() {
    let relay = create_relay(TRIO).await;
    translate_to(&relay.mirror, "es", "Hola").await;
    translate_to(&relay.mirror, "en", "Hello").await;

    let dispatch = send(&relay, "+10000000001", "/test es Hello").await;

    let reply = dispatch.reply.unwrap();
    assert!(!reply.is_empty());
    assert!(reply.contains("Hola"));
    assert!(!reply.contains("Translation failed"));
    assert!(dispatch.deliveries.is_empty());
}
