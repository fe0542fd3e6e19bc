// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn event(kind: &str) -> BrowserInputEvent {
    BrowserInputEvent {
        kind: kind.to_owned(),
        x: None,
        y: None,
        button: None,
        click_count: None,
        delta_x: None,
        delta_y: None,
        key: None,
        code: None,
        text: None,
        modifiers: None,
    }
}

#[test]
fn clamps_out_of_range_coordinates() {
    assert_eq!(clamp(-50.0, 2000.0, 1280, 720), (0.0, 720.0));
    assert_eq!(clamp(5000.0, -1.0, 1280, 720), (1280.0, 0.0));
    assert_eq!(clamp(640.0, 360.0, 1280, 720), (640.0, 360.0));
}

#[test]
fn non_finite_coordinates_collapse_to_zero() {
    assert_eq!(clamp(f64::NAN, f64::INFINITY, 1280, 720), (0.0, 0.0));
}

#[test]
fn mouse_event_carries_clamped_point() {
    let mut ev = event("mousePressed");
    ev.x = Some(99999.0);
    ev.y = Some(-3.0);
    ev.button = Some("left".to_owned());
    ev.click_count = Some(1);

    let call = translate(&ev, 1280, 720).unwrap();
    assert_eq!(call.method, "Input.dispatchMouseEvent");
    assert_eq!(call.params["x"], 1280.0);
    assert_eq!(call.params["y"], 0.0);
    assert_eq!(call.params["button"], "left");
}

#[test]
fn wheel_maps_to_mouse_wheel() {
    let mut ev = event("wheel");
    ev.x = Some(10.0);
    ev.y = Some(10.0);
    ev.delta_y = Some(-120.0);

    let call = translate(&ev, 1280, 720).unwrap();
    assert_eq!(call.params["type"], "mouseWheel");
    assert_eq!(call.params["deltaY"], -120.0);
}

#[test]
fn key_events_map_to_key_dispatch() {
    let mut ev = event("keyDown");
    ev.key = Some("Enter".to_owned());
    ev.code = Some("Enter".to_owned());

    let call = translate(&ev, 1280, 720).unwrap();
    assert_eq!(call.method, "Input.dispatchKeyEvent");
    assert_eq!(call.params["type"], "keyDown");
    assert_eq!(call.params["key"], "Enter");
}

#[test]
fn insert_text_maps_to_insert_text() {
    let mut ev = event("insertText");
    ev.text = Some("hello".to_owned());
    let call = translate(&ev, 1280, 720).unwrap();
    assert_eq!(call.method, "Input.insertText");
    assert_eq!(call.params["text"], "hello");
}

#[test]
fn unknown_kind_is_dropped() {
    assert!(translate(&event("teleport"), 1280, 720).is_none());
}

#[test]
fn cursor_probe_only_for_finite_mouse_moves() {
    let mut ev = event("mouseMoved");
    assert!(!wants_cursor_probe(&ev));
    ev.x = Some(1.0);
    ev.y = Some(2.0);
    assert!(wants_cursor_probe(&ev));
    ev.y = Some(f64::NAN);
    assert!(!wants_cursor_probe(&ev));
    let mut pressed = event("mousePressed");
    pressed.x = Some(1.0);
    pressed.y = Some(1.0);
    assert!(!wants_cursor_probe(&pressed));
}

#[test]
fn probe_expression_embeds_the_point() {
    let expr = cursor_probe_expression(12.0, 34.0);
    assert!(expr.contains("elementFromPoint(12, 34)"));
    assert!(expr.contains("getComputedStyle"));
}
