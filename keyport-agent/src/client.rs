//! Blocking SSH agent protocol client.
//!
//! One short-lived connection per operation: connect, write the request
//! frame, read the reply frame, disconnect.  Every step is bounded by the
//! exchange timeout so a hung agent cannot wedge the calling thread; on
//! timeout the connection is simply dropped and the agent's own state
//! becomes the source of truth.

use std::io::{Read, Write};
use std::os::unix::net::UnixStream;
use std::path::{Path, PathBuf};
use std::time::Duration;

use tracing::{debug, trace};

use keyport_codec::SshKey;

use crate::constraints::ConstraintSet;
use crate::error::AgentError;
use crate::proto::{self, AgentIdentity, Response};

/// Environment variable naming the agent's Unix socket.
pub const SSH_AUTH_SOCK: &str = "SSH_AUTH_SOCK";

/// Upper bound on a reply frame, matching OpenSSH's message limit.
const MAX_AGENT_REPLY: usize = 256 * 1024;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Resolved location of the running agent.
#[derive(Debug, Clone)]
pub struct AgentEndpoint {
    socket_path: PathBuf,
}

impl AgentEndpoint {
    /// Resolve the endpoint from `SSH_AUTH_SOCK`.
    pub fn from_env() -> Result<Self, AgentError> {
        match std::env::var_os(SSH_AUTH_SOCK) {
            Some(path) if !path.is_empty() => Ok(Self {
                socket_path: PathBuf::from(path),
            }),
            _ => Err(AgentError::Unavailable(format!(
                "{SSH_AUTH_SOCK} is not set"
            ))),
        }
    }

    pub fn from_path(path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: path.into(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.socket_path
    }
}

/// The protocol client.  Cheap to construct; holds no connection between
/// operations, so it is freely shared behind a reference.
#[derive(Debug, Clone)]
pub struct AgentClient {
    endpoint: AgentEndpoint,
    timeout: Duration,
}

/// What a remove request did.
///
/// An agent failure reply on remove means the identity was not there —
/// possibly already expired by its own lifetime constraint — which
/// callers treat the same as a successful removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveOutcome {
    Removed,
    AlreadyAbsent,
}

impl AgentClient {
    pub fn new(endpoint: AgentEndpoint) -> Self {
        Self {
            endpoint,
            timeout: DEFAULT_TIMEOUT,
        }
    }

    /// Client against the `SSH_AUTH_SOCK` agent.
    pub fn from_env() -> Result<Self, AgentError> {
        Ok(Self::new(AgentEndpoint::from_env()?))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> &AgentEndpoint {
        &self.endpoint
    }

    /// Ask the agent for every identity it currently holds.
    pub fn list_identities(&self) -> Result<Vec<AgentIdentity>, AgentError> {
        match self.exchange(&proto::request_identities())? {
            Response::Identities(ids) => {
                debug!(count = ids.len(), "agent identity list");
                Ok(ids)
            }
            Response::Failure => Err(AgentError::Rejected),
            Response::Success => Err(AgentError::Protocol(
                "bare success reply to identity request".to_string(),
            )),
        }
    }

    /// Register a key, with constraints when any are set.
    pub fn add_identity(
        &self,
        key: &SshKey,
        comment: &str,
        constraints: &ConstraintSet,
    ) -> Result<(), AgentError> {
        match self.exchange(&proto::add_identity(key, comment, constraints))? {
            Response::Success => {
                debug!(
                    fingerprint = %key.fingerprint(),
                    constrained = !constraints.is_empty(),
                    "identity added"
                );
                Ok(())
            }
            Response::Failure => Err(AgentError::Rejected),
            Response::Identities(_) => Err(AgentError::Protocol(
                "identity list in reply to add".to_string(),
            )),
        }
    }

    /// Deregister the identity with this public key blob.
    pub fn remove_identity(&self, blob: &[u8]) -> Result<RemoveOutcome, AgentError> {
        match self.exchange(&proto::remove_identity(blob))? {
            Response::Success => Ok(RemoveOutcome::Removed),
            Response::Failure => {
                debug!("remove refused; identity treated as already absent");
                Ok(RemoveOutcome::AlreadyAbsent)
            }
            Response::Identities(_) => Err(AgentError::Protocol(
                "identity list in reply to remove".to_string(),
            )),
        }
    }

    /// Ask the agent to drop every identity, whoever added it.
    pub fn remove_all(&self) -> Result<(), AgentError> {
        match self.exchange(&proto::remove_all_identities())? {
            Response::Success => Ok(()),
            Response::Failure => Err(AgentError::Rejected),
            Response::Identities(_) => Err(AgentError::Protocol(
                "identity list in reply to remove-all".to_string(),
            )),
        }
    }

    /// One request/response exchange on a fresh connection.
    fn exchange(&self, request: &[u8]) -> Result<Response, AgentError> {
        let path = self.endpoint.path();
        let mut stream = UnixStream::connect(path)
            .map_err(|e| AgentError::Unavailable(format!("{}: {e}", path.display())))?;
        stream
            .set_read_timeout(Some(self.timeout))
            .and_then(|()| stream.set_write_timeout(Some(self.timeout)))
            .map_err(|e| AgentError::Unavailable(format!("socket setup: {e}")))?;

        trace!(len = request.len(), opcode = request.get(4).copied(), "agent request");
        stream.write_all(request).map_err(io_error)?;

        let mut len_buf = [0u8; 4];
        stream.read_exact(&mut len_buf).map_err(io_error)?;
        let len = u32::from_be_bytes(len_buf) as usize;
        if len == 0 {
            return Err(AgentError::Protocol("empty reply frame".to_string()));
        }
        if len > MAX_AGENT_REPLY {
            return Err(AgentError::Protocol(format!(
                "reply frame of {len} bytes exceeds limit"
            )));
        }

        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).map_err(io_error)?;
        trace!(len, opcode = body[0], "agent reply");
        proto::parse_response(body[0], &body[1..])
    }
}

/// Mid-exchange I/O failures: timeouts get their own variant, everything
/// else means the agent went away under us.
fn io_error(e: std::io::Error) -> AgentError {
    match e.kind() {
        std::io::ErrorKind::WouldBlock | std::io::ErrorKind::TimedOut => AgentError::Timeout,
        _ => AgentError::Unavailable(e.to_string()),
    }
}
