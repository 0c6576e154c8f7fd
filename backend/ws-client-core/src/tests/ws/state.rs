use crate::ws::ClientState;

#[test]
fn given_states_when_checking_can_connect_then_only_idle_states_allow_it() {
    assert!(ClientState::Disconnected.can_connect());
    assert!(ClientState::Closed.can_connect());
    assert!(ClientState::Failed.can_connect());
    assert!(!ClientState::Connecting.can_connect());
    assert!(!ClientState::Connected.can_connect());
    assert!(!ClientState::Closing.can_connect());
}

#[test]
fn given_default_state_when_created_then_disconnected() {
    assert_eq!(ClientState::default(), ClientState::Disconnected);
    assert_eq!(ClientState::Connected.to_string(), "connected");
}
