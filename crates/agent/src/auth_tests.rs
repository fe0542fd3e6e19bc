// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[tokio::test]
async fn static_token_accepts_exact_match() {
    let provider = StaticTokenProvider::new("secret-token");
    let verdict = provider.verify("secret-token").await.unwrap();
    assert!(verdict.ok);
    assert_eq!(verdict.user_id.as_deref(), Some("owner"));
}

#[tokio::test]
async fn static_token_rejects_mismatch() {
    let provider = StaticTokenProvider::new("secret-token");
    assert!(!provider.verify("secret-tokeX").await.unwrap().ok);
    assert!(!provider.verify("").await.unwrap().ok);
    assert!(!provider.verify("secret-token-longer").await.unwrap().ok);
}

#[test]
fn constant_time_eq_basics() {
    assert!(constant_time_eq(b"abc", b"abc"));
    assert!(!constant_time_eq(b"abc", b"abd"));
    assert!(!constant_time_eq(b"abc", b"ab"));
}
