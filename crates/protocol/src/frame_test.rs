use bytes::Bytes;
use uuid::Uuid;

use super::*;

#[test]
fn frame_types_use_snake_case_on_the_wire() {
    let json = serde_json::to_string(&Frame::get_stats()).unwrap();
    assert_eq!(json, r#"{"type":"get_stats"}"#);

    let json = serde_json::to_string(&Frame::unsubscribe("c1")).unwrap();
    assert_eq!(json, r#"{"type":"unsubscribe","subscriber_id":"c1"}"#);
}

#[test]
fn subscribe_frame_carries_sentinel_offset() {
    let frame = Frame::subscribe("collector-1", Offset::EARLIEST);
    let json = serde_json::to_string(&frame).unwrap();
    assert_eq!(
        json,
        r#"{"type":"subscribe","subscriber_id":"collector-1","offset":-2}"#
    );

    let decoded: Frame = serde_json::from_str(&json).unwrap();
    assert_eq!(decoded.frame_type, FrameType::Subscribe);
    assert_eq!(decoded.offset, Some(Offset::EARLIEST));
}

#[test]
fn publish_payload_is_carried_verbatim() {
    // Key order and whitespace inside the payload must survive untouched.
    let payload = Bytes::from_static(br#"{"z":1, "a":{"nested":[1,2,3]}}"#);
    let frame = Frame::publish(payload.clone()).unwrap();

    let wire = serde_json::to_vec(&frame).unwrap();
    let decoded: Frame = serde_json::from_slice(&wire).unwrap();

    assert_eq!(decoded.payload_bytes().unwrap(), payload);
}

#[test]
fn publish_rejects_non_json_payload() {
    let err = Frame::publish(Bytes::from_static(b"not json")).unwrap_err();
    assert!(matches!(err, ProtocolError::InvalidPayload(_)));
}

#[test]
fn message_frame_round_trip() {
    let mut message = Message::new(Bytes::from_static(br#"{"batch_id":"b"}"#));
    message.offset = 12;

    let frame = Frame::message(&message).unwrap();
    let wire = serde_json::to_vec(&frame).unwrap();
    let decoded: Frame = serde_json::from_slice(&wire).unwrap();

    assert_eq!(decoded.frame_type, FrameType::Message);
    assert_eq!(decoded.message_id, Some(message.id));
    assert_eq!(decoded.offset, Some(Offset::specific(12)));
    assert_eq!(decoded.payload_bytes().unwrap(), message.payload);
}

#[test]
fn response_frame_reports_failure_reason() {
    let frame = Frame::response(false, Some("subscriber already exists".into()));
    let json = serde_json::to_string(&frame).unwrap();
    assert_eq!(
        json,
        r#"{"type":"response","success":false,"error":"subscriber already exists"}"#
    );
}

#[test]
fn ack_and_nack_carry_message_id() {
    let id = Uuid::new_v4();
    let ack: Frame = serde_json::from_str(&serde_json::to_string(&Frame::ack(id)).unwrap()).unwrap();
    assert_eq!(ack.frame_type, FrameType::Ack);
    assert_eq!(ack.message_id, Some(id));

    let nack = Frame::nack(id);
    assert_eq!(nack.frame_type, FrameType::Nack);
}

#[test]
fn missing_payload_is_an_error() {
    let frame = Frame::get_stats();
    assert!(matches!(
        frame.payload_bytes(),
        Err(ProtocolError::MissingPayload)
    ));
}

#[test]
fn decode_tolerates_unknown_fields() {
    let json = r#"{"type":"publish","payload":{"a":1},"priority":"high"}"#;
    let frame: Frame = serde_json::from_str(json).unwrap();
    assert_eq!(frame.frame_type, FrameType::Publish);
    assert_eq!(frame.payload_bytes().unwrap(), &br#"{"a":1}"#[..]);
}
