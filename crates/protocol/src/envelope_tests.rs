// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::collections::HashSet;

use proptest::prelude::*;

use super::*;

#[test]
fn round_trip() {
    let env = Envelope::new("terminal:input", serde_json::json!({"sessionId": "s1", "data": "ls\r"}));
    let decoded = Envelope::decode(&env.encode()).unwrap();
    assert_eq!(decoded, env);
}

#[test]
fn missing_type_rejected() {
    let err = Envelope::decode(r#"{"id":"1-0","timestamp":5,"payload":{}}"#).unwrap_err();
    assert!(matches!(err, EnvelopeError::Malformed(_)));
}

#[test]
fn missing_id_rejected() {
    let err = Envelope::decode(r#"{"type":"x","timestamp":5,"payload":{}}"#).unwrap_err();
    assert!(matches!(err, EnvelopeError::Malformed(_)));
}

#[test]
fn non_numeric_timestamp_rejected() {
    let err = Envelope::decode(r#"{"type":"x","id":"1-0","timestamp":"now","payload":{}}"#)
        .unwrap_err();
    assert!(matches!(err, EnvelopeError::Malformed(_)));
}

#[test]
fn missing_payload_defaults_to_empty_object() {
    let env = Envelope::decode(r#"{"type":"x","id":"1-0","timestamp":5}"#).unwrap();
    assert_eq!(env.payload, serde_json::json!({}));
}

#[test]
fn not_an_object_rejected() {
    assert!(Envelope::decode("[1,2,3]").is_err());
    assert!(Envelope::decode("not json").is_err());
}

#[test]
fn ids_unique_across_calls() {
    let ids: HashSet<String> = (0..10_000).map(|_| next_id()).collect();
    assert_eq!(ids.len(), 10_000);
}

#[test]
fn id_shape_is_ms_dash_counter() {
    let id = next_id();
    let (ms, counter) = id.split_once('-').unwrap();
    assert!(ms.parse::<i64>().is_ok());
    assert!(counter.parse::<u64>().is_ok());
}

proptest! {
    #[test]
    fn any_object_payload_round_trips(keys in proptest::collection::vec("[a-zA-Z][a-zA-Z0-9]{0,8}", 0..6), vals in proptest::collection::vec(any::<i64>(), 0..6)) {
        let mut payload = serde_json::Map::new();
        for (k, v) in keys.iter().zip(vals.iter()) {
            payload.insert(k.clone(), serde_json::json!(v));
        }
        let env = Envelope::new("prop:test", serde_json::Value::Object(payload));
        let decoded = Envelope::decode(&env.encode()).unwrap();
        prop_assert_eq!(decoded, env);
    }
}
