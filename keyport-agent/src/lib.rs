//! SSH agent integration for keyport.
//!
//! Registers keys decoded from vault entries with the user's running SSH
//! agent and removes them again when the owning database locks, tracking
//! ownership per database so identities added by other tools are never
//! touched.
//!
//! # Architecture
//!
//! ```text
//! host app ──lifecycle events──► AgentSession
//!                                   │     │
//!                     IdentityRegistry   AgentClient ──UnixStream──► ssh-agent
//!                    (per-db ownership)  (one blocking exchange per op)
//! ```
//!
//! The session is constructed once per process with an explicitly owned
//! [`AgentClient`] and injected wherever the host dispatches database
//! lock/unlock notifications.  All calls block with a bounded timeout and
//! are safe to issue from a worker thread; nothing here spawns threads of
//! its own.

pub mod client;
pub mod constraints;
pub mod error;
mod proto;
pub mod registry;
pub mod session;

pub use client::{AgentClient, AgentEndpoint, RemoveOutcome, SSH_AUTH_SOCK};
pub use constraints::ConstraintSet;
pub use error::{AgentError, SessionError};
pub use proto::AgentIdentity;
pub use registry::{IdentityRegistry, OwnedIdentity};
pub use session::{AgentSession, LockReport, RegisteredIdentity, UnlockReport};
