// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Auth capability consumed at transport upgrade time. Provider
//! implementations beyond the static token live outside this crate.

use async_trait::async_trait;

/// Outcome of verifying a bearer credential.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    pub ok: bool,
    pub user_id: Option<String>,
}

impl Verification {
    pub fn allowed(user_id: impl Into<String>) -> Self {
        Self { ok: true, user_id: Some(user_id.into()) }
    }

    pub fn denied() -> Self {
        Self { ok: false, user_id: None }
    }
}

/// Capability the transport server calls during the WebSocket upgrade.
///
/// `Err` means the provider itself failed (network, backend); the upgrade
/// is rejected with a 500 rather than a 403 in that case.
#[async_trait]
pub trait AuthProvider: Send + Sync {
    async fn verify(&self, token: &str) -> anyhow::Result<Verification>;
}

/// Constant-token provider backed by `VP_TOKEN`.
pub struct StaticTokenProvider {
    token: String,
}

impl StaticTokenProvider {
    pub fn new(token: impl Into<String>) -> Self {
        Self { token: token.into() }
    }
}

#[async_trait]
impl AuthProvider for StaticTokenProvider {
    async fn verify(&self, token: &str) -> anyhow::Result<Verification> {
        if constant_time_eq(token.as_bytes(), self.token.as_bytes()) {
            Ok(Verification::allowed("owner"))
        } else {
            Ok(Verification::denied())
        }
    }
}

/// Length-independent comparison so token checks don't leak prefixes.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
#[path = "auth_tests.rs"]
mod tests;
