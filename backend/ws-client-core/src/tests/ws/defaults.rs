use crate::config::ClientOptions;
use crate::error::ws::WsErrorKind;
use crate::ws::{CLOSE_STREAM_MESSAGE, DefaultHandler, WebSocketHandler};

/// **VALUE**: Verifies the default handler builds the connect URL from host and path.
///
/// **WHY THIS MATTERS**: `connect()` dials exactly what `get_url` returns.
///
/// **BUG THIS CATCHES**: Would catch if the configured path is dropped or appended
/// to the host's path instead of replacing it.
#[test]
fn given_host_and_path_when_get_url_then_path_replaces_host_path() {
    let options = ClientOptions::new("wss://api.example.com/ignored").with_path("/v1/listen");
    let handler = DefaultHandler::from_options(&options);

    let url = handler.get_url(&options.host).expect("valid url");

    assert_eq!(url, "wss://api.example.com/v1/listen");
}

#[test]
fn given_no_path_when_get_url_then_host_kept() {
    let handler = DefaultHandler::default();

    let url = handler.get_url("ws://127.0.0.1:9000").expect("valid url");

    assert_eq!(url, "ws://127.0.0.1:9000/");
}

#[test]
fn given_invalid_host_when_get_url_then_validation_error() {
    let handler = DefaultHandler::default();

    let err = handler.get_url("not a url").expect_err("must fail");

    assert_eq!(err.kind(), WsErrorKind::Validation);
}

#[test]
fn given_default_handler_when_close_msg_then_close_stream_json() {
    let handler = DefaultHandler::default();

    assert_eq!(
        handler.get_close_msg(),
        Some(CLOSE_STREAM_MESSAGE.as_bytes().to_vec())
    );
}
