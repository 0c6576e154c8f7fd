use crate::HttpStatusCode;

/// **VALUE**: Verifies status classification used when an upgrade is rejected.
///
/// **WHY THIS MATTERS**: Upgrade failures are reported to the router with the status
/// code; callers branch on client vs server vs auth rejections.
///
/// **BUG THIS CATCHES**: Would catch off-by-one range errors (e.g. 500 treated as a
/// client error) or 101 not being recognized as the upgrade success status.
#[test]
fn given_status_codes_when_classified_then_ranges_are_correct() {
    assert!(HttpStatusCode(101).is_switching_protocols());
    assert!(!HttpStatusCode(200).is_switching_protocols());

    assert!(HttpStatusCode(400).is_client_error());
    assert!(HttpStatusCode(499).is_client_error());
    assert!(!HttpStatusCode(500).is_client_error());

    assert!(HttpStatusCode(500).is_server_error());
    assert!(HttpStatusCode(503).is_server_error());
    assert!(!HttpStatusCode(404).is_server_error());

    assert!(HttpStatusCode(401).is_auth_rejection());
    assert!(HttpStatusCode(403).is_auth_rejection());
    assert!(!HttpStatusCode(404).is_auth_rejection());
}

#[test]
fn given_u16_when_converted_then_displays_number() {
    let status = HttpStatusCode::from(426);
    assert_eq!(status.to_string(), "426");
}
