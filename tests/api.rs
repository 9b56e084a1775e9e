//! End-to-end exercises of the HTTP handlers against the loopback channel.
//!
//! Handlers are plain async functions, so the suite calls them directly
//! with extractor values and asserts on the JSON envelopes they return.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use pcan_bridge::device::LoopbackDevice;
use pcan_bridge::server::{self, AppState, InitRequest, TpmsStartRequest, WriteRequest};

fn fresh_state() -> Arc<AppState> {
    Arc::new(AppState::new(Box::new(LoopbackDevice::new())))
}

async fn init_default(state: &Arc<AppState>) {
    let (code, _) = server::init_channel(State(state.clone()), None).await;
    assert_eq!(code, StatusCode::OK);
}

#[tokio::test]
async fn read_before_init_is_rejected() {
    let state = fresh_state();
    let (code, Json(body)) = server::read_frame(State(state)).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "CAN channel is not initialized");
}

#[tokio::test]
async fn write_before_init_is_rejected() {
    let state = fresh_state();
    let req = WriteRequest {
        id: Some("100".into()),
        data: vec![1, 2, 3],
        extended: false,
        rtr: false,
    };
    let (code, Json(body)) = server::write_frame(State(state), Some(Json(req))).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn init_applies_defaults_without_body() {
    let state = fresh_state();
    let (code, Json(body)) = server::init_channel(State(state.clone()), None).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["message"].as_str().unwrap().contains("51h"));

    let (code, Json(body)) = server::channel_status(State(state)).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["status_code"], "00000h");
    assert_eq!(body["status_text"], "No error");
    assert!(body["last_error"].is_null());
}

#[tokio::test]
async fn init_falls_back_on_unknown_names() {
    let state = fresh_state();
    let req = InitRequest {
        channel: Some("PCAN_WARPBUS9".into()),
        baudrate: Some("PCAN_BAUD_3M".into()),
        is_fd: false,
    };
    let (code, Json(body)) = server::init_channel(State(state), Some(Json(req))).await;
    assert_eq!(code, StatusCode::OK);
    assert!(body["message"].as_str().unwrap().contains("51h"));
}

#[tokio::test]
async fn fd_init_is_not_implemented() {
    let state = fresh_state();
    let req = InitRequest {
        channel: Some("PCAN_USBBUS1".into()),
        baudrate: None,
        is_fd: true,
    };
    let (code, Json(body)) = server::init_channel(State(state.clone()), Some(Json(req))).await;
    assert_eq!(code, StatusCode::NOT_IMPLEMENTED);
    assert_eq!(body["success"], false);

    // The failed attempt must not leave the channel usable.
    let (code, _) = server::read_frame(State(state)).await;
    assert_eq!(code, StatusCode::CONFLICT);
}

#[tokio::test]
async fn read_empty_queue_short_circuits() {
    let state = fresh_state();
    init_default(&state).await;

    let (code, Json(body)) = server::read_frame(State(state)).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["message"], "Receive queue is empty.");
}

#[tokio::test]
async fn write_read_round_trip_with_tpms_payload() {
    let state = fresh_state();
    init_default(&state).await;

    // Sensor 1, packet type 5, pressure 256, temp_raw 8500, battery 255.
    let req = WriteRequest {
        id: Some("2ab".into()),
        data: vec![0x01, 0x05, 0x01, 0x00, 0x34, 0x21, 0xFF, 0x00],
        extended: false,
        rtr: false,
    };
    let (code, Json(body)) = server::write_frame(State(state.clone()), Some(Json(req))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["message"], "Message sent successfully.");

    let (code, Json(body)) = server::read_frame(State(state)).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert!(body["timestamp_us"].is_u64());

    let message = &body["message"];
    assert_eq!(message["id"], "2AB");
    assert_eq!(message["msg_type"], 0);
    assert_eq!(message["len"], 8);
    assert_eq!(message["data"][2], 1);

    let parsed = &message["parsed"];
    assert_eq!(parsed["sensor_id"], 1);
    assert_eq!(parsed["packet_type"], 5);
    assert_eq!(parsed["pressure"], 256);
    assert_eq!(parsed["temperature"], 0.0);
    assert_eq!(parsed["battery_watts"], 4.55);
}

#[tokio::test]
async fn short_payload_reads_back_unparsed() {
    let state = fresh_state();
    init_default(&state).await;

    let req = WriteRequest {
        id: Some("7F".into()),
        data: vec![1, 2, 3],
        extended: false,
        rtr: false,
    };
    server::write_frame(State(state.clone()), Some(Json(req))).await;

    let (_, Json(body)) = server::read_frame(State(state)).await;
    assert!(body["message"]["parsed"].is_null());
}

#[tokio::test]
async fn write_rejects_malformed_requests() {
    let state = fresh_state();
    init_default(&state).await;

    // Missing body entirely.
    let (code, Json(body)) = server::write_frame(State(state.clone()), None).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], false);

    // Missing id field.
    let req = WriteRequest {
        id: None,
        data: vec![],
        extended: false,
        rtr: false,
    };
    let (code, _) = server::write_frame(State(state.clone()), Some(Json(req))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    // Non-hex id.
    let req = WriteRequest {
        id: Some("not-hex".into()),
        data: vec![],
        extended: false,
        rtr: false,
    };
    let (code, _) = server::write_frame(State(state.clone()), Some(Json(req))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    // Nine data bytes exceed the classic frame limit.
    let req = WriteRequest {
        id: Some("1FF".into()),
        data: vec![0; 9],
        extended: false,
        rtr: false,
    };
    let (code, Json(body)) = server::write_frame(State(state), Some(Json(req))).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("8-byte"));
}

#[tokio::test]
async fn release_twice_succeeds() {
    let state = fresh_state();
    init_default(&state).await;

    let (code, Json(body)) = server::release_channel(State(state.clone())).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["message"], "Channel released.");

    let (code, Json(body)) = server::release_channel(State(state)).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["success"], true);
}

#[tokio::test]
async fn tpms_collection_lifecycle() {
    let state = fresh_state();

    let (_, Json(body)) = server::tpms_status(State(state.clone())).await;
    assert_eq!(body["is_collecting"], false);
    assert_eq!(body["tire_count"], 0);

    let req = TpmsStartRequest { tire_count: 4 };
    let (code, Json(body)) = server::tpms_start(State(state.clone()), Some(Json(req))).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["is_collecting"], true);

    let (_, Json(body)) = server::tpms_status(State(state.clone())).await;
    assert_eq!(body["is_collecting"], true);
    assert_eq!(body["tire_count"], 4);

    let (_, Json(body)) = server::tpms_stop(State(state.clone())).await;
    assert_eq!(body["is_collecting"], false);

    // The tire count persists after stop.
    let (_, Json(body)) = server::tpms_status(State(state)).await;
    assert_eq!(body["is_collecting"], false);
    assert_eq!(body["tire_count"], 4);
}

#[tokio::test]
async fn collection_state_never_gates_the_channel() {
    let state = fresh_state();
    init_default(&state).await;

    // Reads work with collection inactive...
    let (code, _) = server::read_frame(State(state.clone())).await;
    assert_eq!(code, StatusCode::OK);

    // ...and carry on identically once it is active.
    let req = TpmsStartRequest { tire_count: 6 };
    server::tpms_start(State(state.clone()), Some(Json(req))).await;
    let (code, _) = server::read_frame(State(state)).await;
    assert_eq!(code, StatusCode::OK);
}
