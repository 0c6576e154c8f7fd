// Unit tests for router event values

use crate::error::ws::WsError;
use crate::ws::{CloseResponse, DeepgramError, OpenResponse};

/// **VALUE**: Verifies event values serialize with a `type` field.
///
/// **WHY THIS MATTERS**: Routers commonly forward these events as JSON to their own
/// consumers; the field name is part of that contract.
///
/// **BUG THIS CATCHES**: Would catch if the serde rename is removed and the JSON
/// carries `type_field` instead of `type`.
#[test]
fn given_open_and_close_when_serialized_then_type_field_is_named_type() {
    let open = serde_json::to_string(&OpenResponse::default()).expect("serialize");
    let close = serde_json::to_string(&CloseResponse::default()).expect("serialize");

    assert_eq!(open, r#"{"type":"Open"}"#);
    assert_eq!(close, r#"{"type":"Close"}"#);
}

#[test]
fn given_ws_error_when_converted_then_error_code_is_kind_code() {
    let err = WsError::transport_closed("peer went away");

    let service_error = DeepgramError::from(&err);

    assert_eq!(service_error.type_field, "Error");
    assert_eq!(service_error.err_code, "TRANSPORT_CLOSED");
    assert!(service_error.description.contains("peer went away"));
}

#[test]
fn given_close_code_when_converted_then_code_and_reason_kept() {
    let service_error = DeepgramError::from_close(1011, "internal error");

    assert_eq!(service_error.err_code, "1011");
    assert_eq!(service_error.description, "internal error");
    assert_eq!(service_error.to_string(), "1011: internal error");
}

#[test]
fn given_service_error_json_when_deserialized_then_fields_populated() {
    let json = r#"{"type":"Error","err_code":"INVALID_AUTH","description":"bad key","message":"","variant":""}"#;

    let service_error: DeepgramError = serde_json::from_str(json).expect("valid json");

    assert_eq!(service_error.err_code, "INVALID_AUTH");
    assert_eq!(service_error.description, "bad key");
}
