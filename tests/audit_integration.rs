//! Audit emission and webhook delivery end to end.

mod common;

use std::sync::{Arc, Mutex};
use std::time::Duration;

use base64::Engine;
use common::{get_as, spawn_guard, spawn_guarded_app, start_capture_sink, test_config};
use gatewall::audit::crypto::{IntegritySigner, PiiCipher};
use gatewall::audit::AuditRecord;
use gatewall::config::schema::WebhookConfig;
use gatewall::Guard;

async fn spawn_with_capture(
    config: gatewall::GuardConfig,
) -> (String, Arc<Mutex<Vec<AuditRecord>>>) {
    let seen: Arc<Mutex<Vec<AuditRecord>>> = Arc::new(Mutex::new(Vec::new()));
    let seen_clone = seen.clone();
    let guard = Guard::builder(config)
        .with_audit_callback(Arc::new(move |record: &AuditRecord| {
            seen_clone.lock().unwrap().push(record.clone());
        }))
        .build()
        .await;
    (spawn_guard(guard).await, seen)
}

#[tokio::test]
async fn test_one_record_per_request_allow_and_deny() {
    let mut config = test_config();
    config.logging.enabled = true;
    config.active_defense.blocked_ips = vec!["1.2.3.4".to_string()];
    let (base, seen) = spawn_with_capture(config).await;

    get_as(&base, "/ok", "5.5.5.5").await;
    get_as(&base, "/blocked", "1.2.3.4").await;

    let records = seen.lock().unwrap();
    assert_eq!(records.len(), 2);

    assert_eq!(records[0].response.status, 200);
    assert_eq!(records[0].level, gatewall::audit::Level::Info);
    assert_eq!(records[0].request.path, "/ok");

    assert_eq!(records[1].response.status, 403);
    assert_eq!(records[1].level, gatewall::audit::Level::Warn);
    assert_eq!(records[1].request.ip, "1.2.3.4");
}

#[tokio::test]
async fn test_anonymization_and_integrity_hash() {
    let mut config = test_config();
    config.logging.enabled = true;
    config.logging.anonymize_ip = true;
    config.integrity_key = Some("integrity-secret".to_string());
    let (base, seen) = spawn_with_capture(config).await;

    get_as(&base, "/", "192.168.1.50").await;

    let records = seen.lock().unwrap();
    let record = &records[0];
    assert_eq!(record.request.ip, "192.168.1.0");

    let hash = record.integrity_hash.as_deref().unwrap();
    assert_eq!(hash.len(), 64);
    let signer = IntegritySigner::new("integrity-secret");
    assert!(signer.verify(record));
}

#[tokio::test]
async fn test_user_id_encrypted_in_record() {
    let key = base64::engine::general_purpose::STANDARD.encode([3u8; 32]);
    let mut config = test_config();
    config.logging.enabled = true;
    config.logging.encrypt_pii = true;
    config.encryption_key = Some(key.clone());
    let (base, seen) = spawn_with_capture(config).await;

    reqwest::Client::new()
        .get(format!("{}/me", base))
        .header("x-forwarded-for", "5.5.5.5")
        .header("x-user-id", "user-42")
        .send()
        .await
        .unwrap();

    let records = seen.lock().unwrap();
    let token = records[0].user_id.as_deref().unwrap();
    assert!(PiiCipher::is_token(token));
    let cipher = PiiCipher::from_base64_key(&key).unwrap();
    assert_eq!(cipher.decrypt(token).unwrap(), "user-42");
}

#[tokio::test]
async fn test_deny_event_reaches_webhook() {
    let (sink_url, received) = start_capture_sink().await;

    let mut config = test_config();
    config.active_defense.blocked_ips = vec!["1.2.3.4".to_string()];
    config.webhooks = vec![WebhookConfig {
        url: format!("{}/hooks", sink_url),
        timeout_ms: 2_000,
    }];
    let base = spawn_guarded_app(config).await;

    get_as(&base, "/", "1.2.3.4").await;

    // delivery is async; poll briefly
    let mut delivered = Vec::new();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        delivered = received.lock().unwrap().clone();
        if !delivered.is_empty() {
            break;
        }
    }

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0]["type"], "security_event");
    assert_eq!(delivered[0]["payload"]["event"], "ip_blocked");
    assert_eq!(delivered[0]["payload"]["ip"], "1.2.3.4");
}

#[tokio::test]
async fn test_audit_records_ship_to_webhook() {
    let (sink_url, received) = start_capture_sink().await;

    let mut config = test_config();
    config.logging.enabled = true;
    config.webhooks = vec![WebhookConfig {
        url: format!("{}/hooks", sink_url),
        timeout_ms: 2_000,
    }];
    let base = spawn_guarded_app(config).await;

    get_as(&base, "/audited", "5.5.5.5").await;

    let mut delivered = Vec::new();
    for _ in 0..20 {
        tokio::time::sleep(Duration::from_millis(100)).await;
        delivered = received.lock().unwrap().clone();
        if !delivered.is_empty() {
            break;
        }
    }

    assert_eq!(delivered.len(), 1);
    assert_eq!(delivered[0]["type"], "audit_record");
    assert_eq!(delivered[0]["payload"]["request"]["path"], "/audited");
    assert_eq!(delivered[0]["payload"]["response"]["status"], 200);
}
