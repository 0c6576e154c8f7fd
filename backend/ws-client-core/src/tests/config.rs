// Unit tests for ClientOptions load/save/validate and environment overrides

use crate::config::{ClientOptions, ENV_HOST, ENV_WRITE_DEADLINE};
use crate::error::config::ConfigError;

use std::time::Duration;

use serial_test::serial;
use tempfile::TempDir;

/// **VALUE**: Verifies that a missing config file yields defaults instead of an error.
///
/// **WHY THIS MATTERS**: First run has no config file; the binary then fills the host
/// from the environment or the command line.
///
/// **BUG THIS CATCHES**: Would catch if `load()` starts returning `ReadError` for a
/// missing file.
#[test]
fn given_no_config_file_when_load_then_returns_defaults() {
    // GIVEN: An empty config directory
    let dir = TempDir::new().expect("temp dir");

    // WHEN: Loading
    let options = ClientOptions::load(dir.path()).expect("load should succeed");

    // THEN: Defaults
    assert_eq!(options, ClientOptions::default());
    assert!(options.write_deadline.is_none());
}

/// **VALUE**: Verifies humantime durations in JSON survive save and load.
///
/// **WHY THIS MATTERS**: The write deadline is the one setting that changes runtime
/// behavior under load; a lossy round trip would silently change it.
///
/// **BUG THIS CATCHES**: Would catch if the duration serializer writes a format the
/// deserializer can't read back.
#[test]
fn given_saved_options_when_loaded_then_deadline_and_headers_preserved() {
    // GIVEN: Options with a deadline, keep-alive, and a header
    let dir = TempDir::new().expect("temp dir");
    let options = ClientOptions::new("ws://127.0.0.1:9000")
        .with_write_deadline(Duration::from_millis(250))
        .with_keep_alive_interval(Duration::from_secs(8))
        .with_header("x-request-tag", "demo");

    // WHEN: Saving and loading
    options.save(dir.path()).expect("save should succeed");
    let loaded = ClientOptions::load(dir.path()).expect("load should succeed");

    // THEN: Same values
    assert_eq!(loaded, options);
    assert!(
        !dir.path().join("client.json.tmp").exists(),
        "Temp file should be renamed away"
    );
}

#[test]
fn given_json_with_humantime_deadline_when_parsed_then_duration_matches() {
    let json = r#"{ "host": "wss://example.com", "write_deadline": "1s 500ms" }"#;

    let options: ClientOptions = serde_json::from_str(json).expect("valid json");

    assert_eq!(options.write_deadline, Some(Duration::from_millis(1500)));
    assert_eq!(options.user_agent, crate::DEFAULT_USER_AGENT);
}

/// **VALUE**: Verifies corrupted config is reported rather than silently replaced.
///
/// **BUG THIS CATCHES**: Would catch if parse errors are swallowed into defaults,
/// which would drop the user's configured deadline without notice.
#[test]
fn given_corrupt_config_when_load_then_parse_error() {
    // GIVEN: A file with invalid JSON
    let dir = TempDir::new().expect("temp dir");
    std::fs::write(dir.path().join("client.json"), "{ not json").expect("write");

    // WHEN: Loading
    let result = ClientOptions::load(dir.path());

    // THEN: ParseError
    assert!(matches!(result, Err(ConfigError::ParseError { .. })));
}

#[test]
fn given_zero_deadline_when_effective_deadline_then_none() {
    let options = ClientOptions::new("ws://localhost:1").with_write_deadline(Duration::ZERO);

    assert_eq!(options.effective_write_deadline(), None);
}

/// **VALUE**: Verifies validation rejects every kind of unusable option.
///
/// **WHY THIS MATTERS**: `WsClient::new` validates up front so a bad host or header
/// fails at construction, not halfway through a connect.
///
/// **BUG THIS CATCHES**: Would catch if http(s) hosts, empty hosts, zero keep-alive
/// intervals, relative paths, or malformed header names slip through.
#[test]
fn given_invalid_options_when_validated_then_each_is_rejected() {
    let cases = vec![
        ("empty host", ClientOptions::new("")),
        ("http scheme", ClientOptions::new("http://example.com")),
        ("not a url", ClientOptions::new("example.com:80")),
        (
            "zero keep-alive",
            ClientOptions::new("ws://example.com").with_keep_alive_interval(Duration::ZERO),
        ),
        (
            "relative path",
            ClientOptions::new("ws://example.com").with_path("v1/listen"),
        ),
        (
            "bad header name",
            ClientOptions::new("ws://example.com").with_header("bad header", "x"),
        ),
        (
            "bad header value",
            ClientOptions::new("ws://example.com").with_header("x-ok", "line\nbreak"),
        ),
    ];

    for (label, options) in cases {
        assert!(
            matches!(options.validate(), Err(ConfigError::ValidationError { .. })),
            "Should reject: {label}"
        );
    }
}

#[test]
fn given_ws_and_wss_hosts_when_validated_then_accepted() {
    assert!(ClientOptions::new("ws://127.0.0.1:8080").validate().is_ok());
    assert!(
        ClientOptions::new("wss://api.example.com")
            .with_path("/v1/listen")
            .validate()
            .is_ok()
    );
}

/// **VALUE**: Verifies environment variables override host and deadline.
///
/// **WHY THIS MATTERS**: Deployments tune the deadline per environment without
/// editing the config file.
///
/// **BUG THIS CATCHES**: Would catch if the variable names drift or the deadline
/// is parsed as plain seconds instead of a humantime string.
#[test]
#[serial]
fn given_env_overrides_when_applied_then_host_and_deadline_replaced() {
    // GIVEN: Override variables set
    unsafe {
        std::env::set_var(ENV_HOST, "ws://10.0.0.5:7000");
        std::env::set_var(ENV_WRITE_DEADLINE, "250ms");
    }
    let mut options = ClientOptions::new("ws://127.0.0.1:1");

    // WHEN: Applying overrides
    let result = options.apply_env_overrides();

    unsafe {
        std::env::remove_var(ENV_HOST);
        std::env::remove_var(ENV_WRITE_DEADLINE);
    }

    // THEN: Both replaced
    result.expect("overrides should apply");
    assert_eq!(options.host, "ws://10.0.0.5:7000");
    assert_eq!(options.write_deadline, Some(Duration::from_millis(250)));
}

#[test]
#[serial]
fn given_malformed_deadline_env_when_applied_then_env_error() {
    unsafe {
        std::env::set_var(ENV_WRITE_DEADLINE, "soon");
    }
    let mut options = ClientOptions::new("ws://127.0.0.1:1");

    let result = options.apply_env_overrides();

    unsafe {
        std::env::remove_var(ENV_WRITE_DEADLINE);
    }

    assert!(matches!(result, Err(ConfigError::EnvError { .. })));
    assert!(options.write_deadline.is_none());
}
