// Logger initialization guards and failure handling

use crate::logger::{DEFAULT_LOG_LEVEL, initialize};

use std::path::PathBuf;

use tempfile::TempDir;

/// **VALUE**: Verifies a failed first call leaves the logger installable, and once
/// installed, further calls are harmless.
///
/// **WHY THIS MATTERS**: fern panics if a global logger is set twice. Startup code and
/// tests may both initialize logging, and a bad log directory must surface as an error.
///
/// **BUG THIS CATCHES**: Would catch if:
/// - `fern::log_file()` is unwrapped
/// - The error does not name the log file
/// - A failed call still marks the logger as installed
/// - The Once or AtomicBool guards are removed
///
/// One test covers the whole sequence: the logger is process-global, so separate tests
/// would race for the first call.
#[test]
fn given_fresh_process_when_initialized_bad_then_good_then_again_then_error_ok_ok() {
    // GIVEN: A path that cannot hold a file, and a writable directory
    let invalid_dir = PathBuf::from("/dev/null/invalid-path");
    let temp_dir = TempDir::new().expect("temp dir");

    // WHEN: Initializing with the bad path first
    let failed = initialize(&invalid_dir, DEFAULT_LOG_LEVEL);

    // THEN: Clean App error naming the log file
    let text = format!("{:?}", failed.expect_err("invalid log dir must fail"));
    assert!(text.contains("App"), "Error should be StreamAppError::App: {text}");
    assert!(text.contains("log file"), "Error should name the log file: {text}");

    // WHEN: Initializing with a good path
    let installed = initialize(temp_dir.path(), DEFAULT_LOG_LEVEL);

    // THEN: Installed
    assert!(installed.is_ok(), "Initialization should succeed: {installed:?}");
    assert!(temp_dir.path().join("ws-stream.log").exists());

    // WHEN/THEN: Again, a no-op
    let again = initialize(temp_dir.path(), DEFAULT_LOG_LEVEL);
    assert!(again.is_ok(), "Second initialization should be a no-op: {again:?}");
}
