// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Input translation: wire input events become inspector dispatch calls,
//! with coordinates clamped to the viewport.

use serde_json::{json, Value};

use vibepilot_protocol::messages::BrowserInputEvent;

/// An inspector call the service should make for one input event.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectorCall {
    pub method: &'static str,
    pub params: Value,
}

/// Clamp a coordinate pair into `[0, width] x [0, height]`. Non-finite
/// values collapse to zero.
pub fn clamp(x: f64, y: f64, width: u32, height: u32) -> (f64, f64) {
    let sane = |v: f64, max: f64| {
        if v.is_finite() {
            v.clamp(0.0, max)
        } else {
            0.0
        }
    };
    (sane(x, width as f64), sane(y, height as f64))
}

/// Translate one wire event into zero or one inspector call.
///
/// Unknown event kinds are dropped; the browser stream must not die
/// because a client sent something new.
pub fn translate(event: &BrowserInputEvent, width: u32, height: u32) -> Option<InspectorCall> {
    let (x, y) = clamp(event.x.unwrap_or(0.0), event.y.unwrap_or(0.0), width, height);
    match event.kind.as_str() {
        "mousePressed" | "mouseReleased" | "mouseMoved" => Some(InspectorCall {
            method: "Input.dispatchMouseEvent",
            params: json!({
                "type": event.kind,
                "x": x,
                "y": y,
                "button": event.button.clone().unwrap_or_else(|| "none".to_owned()),
                "clickCount": event.click_count.unwrap_or(0),
                "modifiers": event.modifiers.unwrap_or(0),
            }),
        }),
        "wheel" => Some(InspectorCall {
            method: "Input.dispatchMouseEvent",
            params: json!({
                "type": "mouseWheel",
                "x": x,
                "y": y,
                "deltaX": event.delta_x.unwrap_or(0.0),
                "deltaY": event.delta_y.unwrap_or(0.0),
                "modifiers": event.modifiers.unwrap_or(0),
            }),
        }),
        "keyDown" | "keyUp" => Some(InspectorCall {
            method: "Input.dispatchKeyEvent",
            params: json!({
                "type": if event.kind == "keyDown" { "keyDown" } else { "keyUp" },
                "key": event.key.clone().unwrap_or_default(),
                "code": event.code.clone().unwrap_or_default(),
                "text": event.text.clone().unwrap_or_default(),
                "modifiers": event.modifiers.unwrap_or(0),
            }),
        }),
        "char" => Some(InspectorCall {
            method: "Input.dispatchKeyEvent",
            params: json!({
                "type": "char",
                "text": event.text.clone().unwrap_or_default(),
                "modifiers": event.modifiers.unwrap_or(0),
            }),
        }),
        "insertText" => Some(InspectorCall {
            method: "Input.insertText",
            params: json!({ "text": event.text.clone().unwrap_or_default() }),
        }),
        _ => None,
    }
}

/// Whether this event should also trigger a cursor probe.
///
/// Only `mouseMoved` with finite coordinates probes; anything else would
/// evaluate JavaScript for no reason.
pub fn wants_cursor_probe(event: &BrowserInputEvent) -> bool {
    event.kind == "mouseMoved"
        && event.x.map(f64::is_finite).unwrap_or(false)
        && event.y.map(f64::is_finite).unwrap_or(false)
}

/// Build the `Runtime.evaluate` expression returning the computed CSS
/// cursor under the (clamped) point. Probes the top document only.
pub fn cursor_probe_expression(x: f64, y: f64) -> String {
    format!(
        "(() => {{ const el = document.elementFromPoint({x}, {y}); \
         return el ? getComputedStyle(el).cursor : 'default'; }})()"
    )
}

#[cfg(test)]
#[path = "input_tests.rs"]
mod tests;
