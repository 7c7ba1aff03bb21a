//! Error types for the agent client and session layers.

use keyport_codec::DecodeError;
use keyport_core::EntryError;

/// Failures talking to the SSH agent.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// No agent endpoint, or the endpoint refused the connection.
    /// Reported once and never retried here — the caller decides.
    #[error("SSH agent unavailable: {0}")]
    Unavailable(String),

    /// The agent did not answer within the exchange timeout.  The
    /// connection is torn down; the agent's own state is then the source
    /// of truth.
    #[error("SSH agent did not respond in time")]
    Timeout,

    /// The agent answered with a failure status.
    #[error("SSH agent refused the request")]
    Rejected,

    /// The agent's reply violated the wire protocol.
    #[error("SSH agent protocol violation: {0}")]
    Protocol(String),
}

/// Failures of a single session operation, per entry.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("no entry found at path {0:?}")]
    EntryNotFound(String),

    #[error("entry {0:?} has no agent settings")]
    NoAgentSettings(String),

    #[error(transparent)]
    Entry(#[from] EntryError),

    #[error(transparent)]
    Decode(#[from] DecodeError),

    #[error(transparent)]
    Agent(#[from] AgentError),
}

impl SessionError {
    /// Short machine-matchable kind for reports and logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::EntryNotFound(_) => "entry-not-found",
            Self::NoAgentSettings(_) => "no-agent-settings",
            Self::Entry(_) => "entry",
            Self::Decode(DecodeError::WrongPassphrase) => "wrong-passphrase",
            Self::Decode(DecodeError::PassphraseRequired) => "passphrase-required",
            Self::Decode(_) => "decode",
            Self::Agent(AgentError::Unavailable(_)) => "agent-unavailable",
            Self::Agent(AgentError::Timeout) => "agent-timeout",
            Self::Agent(_) => "agent",
        }
    }
}
