//! Protocol client behavior against the mock agent.

mod common;

use std::io::Read;
use std::time::Duration;

use keyport_agent::{AgentClient, AgentEndpoint, AgentError, ConstraintSet, RemoveOutcome};
use keyport_codec::{Fingerprint, KeyContainer};

use common::*;

fn client_for(agent: &MockAgent) -> AgentClient {
    AgentClient::new(AgentEndpoint::from_path(&agent.socket_path))
}

fn decoded_ed25519() -> keyport_codec::SshKey {
    KeyContainer::detect(&ed25519_container("test@keyport"))
        .unwrap()
        .decode(None)
        .unwrap()
}

#[test]
fn add_list_remove_roundtrip() {
    let agent = MockAgent::spawn();
    let client = client_for(&agent);
    let key = decoded_ed25519();

    client
        .add_identity(&key, "test@keyport", &ConstraintSet::none())
        .unwrap();
    assert_eq!(agent.identity_count(), 1);

    let identities = client.list_identities().unwrap();
    assert_eq!(identities.len(), 1);
    assert_eq!(identities[0].comment, "test@keyport");
    assert_eq!(identities[0].fingerprint(), key.fingerprint());
    assert_eq!(identities[0].algorithm().as_deref(), Some("ssh-ed25519"));

    let outcome = client.remove_identity(&key.public_blob()).unwrap();
    assert_eq!(outcome, RemoveOutcome::Removed);
    assert_eq!(agent.identity_count(), 0);
}

#[test]
fn double_remove_is_already_absent_not_an_error() {
    let agent = MockAgent::spawn();
    let client = client_for(&agent);
    let key = decoded_ed25519();

    client
        .add_identity(&key, "c", &ConstraintSet::none())
        .unwrap();
    assert_eq!(
        client.remove_identity(&key.public_blob()).unwrap(),
        RemoveOutcome::Removed
    );
    assert_eq!(
        client.remove_identity(&key.public_blob()).unwrap(),
        RemoveOutcome::AlreadyAbsent
    );
}

#[test]
fn constrained_add_sends_golden_trailer() {
    let agent = MockAgent::spawn();
    let client = client_for(&agent);
    let key = decoded_ed25519();

    let constraints = ConstraintSet {
        require_confirmation: true,
        lifetime_seconds: Some(60),
    };
    client.add_identity(&key, "c", &constraints).unwrap();

    let state = agent.state.lock().unwrap();
    assert_eq!(state.request_log, vec![SSH_AGENTC_ADD_ID_CONSTRAINED]);
    let payload = state.last_add_payload.as_ref().unwrap();
    assert_eq!(&payload[payload.len() - 6..], [0x02, 0x01, 0x00, 0x00, 0x00, 0x3c]);
}

#[test]
fn rejected_add_is_an_error() {
    let agent = MockAgent::spawn();
    agent.state.lock().unwrap().fail_next_add = true;
    let client = client_for(&agent);
    let key = decoded_ed25519();

    let err = client
        .add_identity(&key, "c", &ConstraintSet::none())
        .unwrap_err();
    assert!(matches!(err, AgentError::Rejected));
    assert_eq!(agent.identity_count(), 0);
}

#[test]
fn remove_all_clears_the_agent() {
    let agent = MockAgent::spawn();
    let client = client_for(&agent);
    let key = decoded_ed25519();

    client
        .add_identity(&key, "c", &ConstraintSet::none())
        .unwrap();
    client.remove_all().unwrap();
    assert_eq!(agent.identity_count(), 0);
}

#[test]
fn unresponsive_agent_times_out() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("silent.sock");
    let listener = std::os::unix::net::UnixListener::bind(&path).unwrap();
    // accept and read but never answer
    std::thread::spawn(move || {
        if let Ok((mut stream, _)) = listener.accept() {
            let mut sink = Vec::new();
            let _ = stream.read_to_end(&mut sink);
        }
    });

    let client = AgentClient::new(AgentEndpoint::from_path(&path))
        .with_timeout(Duration::from_millis(200));
    let err = client.list_identities().unwrap_err();
    assert!(matches!(err, AgentError::Timeout));
}

#[test]
fn fingerprints_match_between_container_and_agent_list() {
    // the blob the agent reports must hash to the same fingerprint the
    // codec computes from the decoded key
    let agent = MockAgent::spawn();
    let client = client_for(&agent);
    let key = decoded_ed25519();

    client
        .add_identity(&key, "fp", &ConstraintSet::none())
        .unwrap();
    let listed = &client.list_identities().unwrap()[0];
    assert_eq!(
        Fingerprint::of_blob(&listed.blob),
        Fingerprint::of_blob(&key.public_blob())
    );
}
