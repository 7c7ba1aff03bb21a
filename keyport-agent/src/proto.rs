//! Agent protocol messages.
//!
//! Framing per draft-miller-ssh-agent: a 4-byte big-endian length prefix,
//! a 1-byte opcode, then opcode-specific payload.  Only the client half
//! of the protocol is implemented — requests are built here, replies
//! parsed.

use keyport_codec::wire::{Reader, Writer};
use keyport_codec::{Fingerprint, SshKey};

use crate::constraints::ConstraintSet;
use crate::error::AgentError;

pub(crate) const SSH_AGENT_FAILURE: u8 = 5;
pub(crate) const SSH_AGENT_SUCCESS: u8 = 6;
pub(crate) const SSH_AGENTC_REQUEST_IDENTITIES: u8 = 11;
pub(crate) const SSH_AGENT_IDENTITIES_ANSWER: u8 = 12;
pub(crate) const SSH_AGENTC_ADD_IDENTITY: u8 = 17;
pub(crate) const SSH_AGENTC_REMOVE_IDENTITY: u8 = 18;
pub(crate) const SSH_AGENTC_REMOVE_ALL_IDENTITIES: u8 = 19;
pub(crate) const SSH_AGENTC_ADD_ID_CONSTRAINED: u8 = 25;

/// One identity as reported by the agent.
///
/// The blob is kept raw: fingerprints hash the exact bytes, so identities
/// of key types this codec cannot parse still list and compare correctly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentIdentity {
    /// SSH wire-format public key blob.
    pub blob: Vec<u8>,
    /// Comment the identity was added with.
    pub comment: String,
}

impl AgentIdentity {
    pub fn fingerprint(&self) -> Fingerprint {
        Fingerprint::of_blob(&self.blob)
    }

    /// The key type name from the blob header, if readable.
    pub fn algorithm(&self) -> Option<String> {
        let mut r = Reader::new(&self.blob);
        r.read_str().ok().map(str::to_string)
    }
}

/// A parsed agent reply.
#[derive(Debug)]
pub(crate) enum Response {
    Success,
    Failure,
    Identities(Vec<AgentIdentity>),
}

/// Wrap an opcode + payload in the length-prefixed frame.
fn frame(opcode: u8, payload: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_u32(payload.len() as u32 + 1);
    w.put_u8(opcode);
    w.put_raw(payload);
    w.into_bytes()
}

pub(crate) fn request_identities() -> Vec<u8> {
    frame(SSH_AGENTC_REQUEST_IDENTITIES, &[])
}

pub(crate) fn remove_all_identities() -> Vec<u8> {
    frame(SSH_AGENTC_REMOVE_ALL_IDENTITIES, &[])
}

pub(crate) fn remove_identity(blob: &[u8]) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_string(blob);
    frame(SSH_AGENTC_REMOVE_IDENTITY, &w.into_bytes())
}

/// Add-identity request: key payload, comment, then the constraint
/// trailer.  Uses the constrained opcode only when constraints are
/// present.
pub(crate) fn add_identity(key: &SshKey, comment: &str, constraints: &ConstraintSet) -> Vec<u8> {
    let mut w = Writer::new();
    w.put_raw(&key.agent_key_payload());
    w.put_str(comment);
    let opcode = if constraints.is_empty() {
        SSH_AGENTC_ADD_IDENTITY
    } else {
        constraints.encode(&mut w);
        SSH_AGENTC_ADD_ID_CONSTRAINED
    };
    frame(opcode, &w.into_bytes())
}

/// Parse a reply frame body (opcode already split off by the transport).
pub(crate) fn parse_response(opcode: u8, payload: &[u8]) -> Result<Response, AgentError> {
    match opcode {
        SSH_AGENT_SUCCESS => Ok(Response::Success),
        SSH_AGENT_FAILURE => Ok(Response::Failure),
        SSH_AGENT_IDENTITIES_ANSWER => {
            let mut r = Reader::new(payload);
            let count = r
                .read_u32()
                .map_err(|e| AgentError::Protocol(e.to_string()))?;
            let mut identities = Vec::with_capacity(count.min(1024) as usize);
            for _ in 0..count {
                let blob = r
                    .read_string()
                    .map_err(|e| AgentError::Protocol(e.to_string()))?
                    .to_vec();
                let comment = r
                    .read_str()
                    .map_err(|e| AgentError::Protocol(e.to_string()))?
                    .to_string();
                identities.push(AgentIdentity { blob, comment });
            }
            if !r.is_empty() {
                return Err(AgentError::Protocol(
                    "trailing bytes after identity list".to_string(),
                ));
            }
            Ok(Response::Identities(identities))
        }
        other => Err(AgentError::Protocol(format!("unexpected reply opcode {other}"))),
    }
}
