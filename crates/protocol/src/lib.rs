// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wire protocol for the vibepilot agent: the message envelope and the
//! typed catalogue exchanged between agent and browser clients.
//!
//! Every record on any transport is an [`Envelope`] — a JSON object with
//! `type`, `id`, `timestamp`, and `payload` fields. The payload shapes are
//! the tagged unions in [`messages`]; the envelope itself stays untyped so
//! unknown message types can be skipped without failing the whole stream.

pub mod envelope;
pub mod messages;

pub use envelope::{next_id, Envelope, EnvelopeError};
pub use messages::{AgentEvent, ClientRequest};
