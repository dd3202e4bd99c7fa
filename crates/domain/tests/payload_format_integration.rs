//! Integration tests for the persisted and shell-facing JSON shapes
//!
//! These formats outlive a single process (encrypted files on disk) or cross
//! into the UI bridge, so field names are pinned here.

use chrono::{TimeZone, Utc};
use serde_json::json;
use tabula_domain::{
    AuthFailure, ConnectionStatus, CredentialPayload, FlowStatus, ProviderId, StoredCredentials,
};

#[test]
fn test_payload_field_names() {
    let payload = CredentialPayload {
        access_token: Some("a".into()),
        refresh_token: Some("r".into()),
        expires_at: Some(1_760_000_000_000),
        connected_at: Some(1_759_990_000_000),
        account_id: Some("acct".into()),
        ..CredentialPayload::default()
    };

    let value = serde_json::to_value(&payload).unwrap();
    assert_eq!(
        value,
        json!({
            "accessToken": "a",
            "refreshToken": "r",
            "expiresAt": 1_760_000_000_000_i64,
            "connectedAt": 1_759_990_000_000_i64,
            "accountId": "acct",
        })
    );
}

#[test]
fn test_empty_object_is_empty_payload() {
    let payload: CredentialPayload = serde_json::from_str("{}").unwrap();
    assert!(payload.is_empty());
    assert!(payload.stored_credentials().is_none());
}

#[test]
fn test_payload_from_written_file_shape() {
    let payload: CredentialPayload = serde_json::from_value(json!({
        "accessToken": "a",
        "refreshToken": "r",
        "expiresAt": 1_760_000_000_000_i64,
        "connectedAt": 1_759_990_000_000_i64,
        "email": "user@example.com",
    }))
    .unwrap();

    let credentials: StoredCredentials = payload.stored_credentials().expect("complete set");
    assert_eq!(credentials.expires_at, Utc.timestamp_millis_opt(1_760_000_000_000).unwrap());
    assert_eq!(credentials.email.as_deref(), Some("user@example.com"));
    assert_eq!(credentials.account_id, None);
}

#[test]
fn test_secrets_never_in_debug_output() {
    let payload = CredentialPayload::with_api_key("sk-live-secret");
    assert!(!format!("{payload:?}").contains("sk-live-secret"));
}

#[test]
fn test_flow_status_wire_shape() {
    let failed = FlowStatus::Failed { reason: AuthFailure::ListenerUnavailable {
        port: 1455,
        reason: "in use".into(),
    } };
    let value = serde_json::to_value(&failed).unwrap();
    assert_eq!(value["state"], "failed");
    assert_eq!(value["reason"]["kind"], "listener_unavailable");
    assert_eq!(value["reason"]["detail"]["port"], 1455);

    let status = ConnectionStatus::disconnected(ProviderId::OpenAiCodex);
    assert_eq!(serde_json::to_value(&status).unwrap(), json!({
        "provider": "openai-codex",
        "connected": false,
    }));
}
