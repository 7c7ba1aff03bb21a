//! Shared vocabulary for the keyport SSH agent integration layer.
//!
//! This crate defines the types that cross the boundary between the host
//! password-vault application and the agent integration: zeroizing secret
//! wrappers, per-entry agent-forwarding settings, and the read-only
//! [`Vault`] / [`VaultEntry`] traits the host implements.  It performs no
//! I/O and never mutates vault state.

use serde::{Deserialize, Serialize};
use zeroize::Zeroizing;

/// Stable identifier of a vault database.
///
/// Hosts derive this from the database file's UUID; it only needs to be
/// stable for the lifetime of the process so that identities added when a
/// database unlocks can be matched up when the same database locks again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DatabaseId(uuid::Uuid);

impl DatabaseId {
    pub fn new(id: uuid::Uuid) -> Self {
        Self(id)
    }

    pub fn as_uuid(&self) -> &uuid::Uuid {
        &self.0
    }
}

impl From<uuid::Uuid> for DatabaseId {
    fn from(id: uuid::Uuid) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for DatabaseId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

/// Byte buffer holding secret material, zeroized on drop.
pub struct SecretBytes(Zeroizing<Vec<u8>>);

impl SecretBytes {
    pub fn new(bytes: Vec<u8>) -> Self {
        Self(Zeroizing::new(bytes))
    }

    /// Wrap an already-zeroizing buffer without copying it.
    pub fn from_zeroizing(bytes: Zeroizing<Vec<u8>>) -> Self {
        Self(bytes)
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Vec<u8>> for SecretBytes {
    fn from(bytes: Vec<u8>) -> Self {
        Self::new(bytes)
    }
}

impl From<&[u8]> for SecretBytes {
    fn from(bytes: &[u8]) -> Self {
        Self::new(bytes.to_vec())
    }
}

impl Clone for SecretBytes {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.to_vec()))
    }
}

impl std::fmt::Debug for SecretBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretBytes([redacted])")
    }
}

/// A passphrase or other secret text, zeroized on drop.
pub struct SecretString(Zeroizing<String>);

impl SecretString {
    pub fn new(s: String) -> Self {
        Self(Zeroizing::new(s))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        Self::new(s.to_string())
    }
}

impl Clone for SecretString {
    fn clone(&self) -> Self {
        Self(Zeroizing::new(self.0.to_string()))
    }
}

impl std::fmt::Debug for SecretString {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretString([redacted])")
    }
}

/// Per-entry agent-forwarding options, parsed by the host from the entry's
/// settings attachment.
///
/// An entry without these settings does not participate in agent
/// integration at all — [`VaultEntry::settings`] returns `None` for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentSettings {
    /// Register the key when the owning database unlocks.
    #[serde(default)]
    pub add_at_open: bool,

    /// Deregister the key when the owning database locks or closes.
    #[serde(default)]
    pub remove_at_close: bool,

    /// Ask the agent to require per-use confirmation for this identity.
    #[serde(default)]
    pub require_confirmation: bool,

    /// Ask the agent to expire this identity after the given number of
    /// seconds.
    #[serde(default)]
    pub lifetime_seconds: Option<u32>,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            add_at_open: false,
            remove_at_close: true,
            require_confirmation: false,
            lifetime_seconds: None,
        }
    }
}

/// Errors surfaced by the host when reading key material off an entry.
#[derive(Debug, thiserror::Error)]
pub enum EntryError {
    #[error("entry has no SSH key attachment")]
    NoKeyAttachment,

    #[error("could not read key attachment: {0}")]
    AttachmentUnreadable(String),
}

/// Read-only view of a single vault entry carrying an SSH key.
///
/// Implemented by the host application's entry model.  All methods are
/// lookups; nothing here mutates the entry.
pub trait VaultEntry {
    /// Opaque entry identifier used in reports and logs.
    fn id(&self) -> String;

    /// Human-readable entry title, used as the identity comment when the
    /// key container carries none.
    fn title(&self) -> String;

    /// Raw bytes of the private-key container attachment.
    fn key_container(&self) -> Result<SecretBytes, EntryError>;

    /// Agent-forwarding settings, or `None` if the entry has none.
    fn settings(&self) -> Option<AgentSettings>;

    /// Stored passphrase for the key container, if the entry carries one.
    fn passphrase(&self) -> Option<SecretString>;

    /// Fingerprint the host recorded for this entry's key, if any.
    /// Advisory only — the decoded key is authoritative.
    fn fingerprint_hint(&self) -> Option<String> {
        None
    }
}

/// Read-only view of an unlocked vault database.
pub trait Vault {
    fn id(&self) -> DatabaseId;

    /// All entries in the database, in iteration order.
    fn entries(&self) -> Vec<&dyn VaultEntry>;

    /// Resolve an entry by its human-supplied path, if present.
    fn find_entry(&self, path: &str) -> Option<&dyn VaultEntry>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn secret_bytes_debug_redacts() {
        let sb = SecretBytes::new(b"hunter2".to_vec());
        let debug = format!("{sb:?}");
        assert_eq!(debug, "SecretBytes([redacted])");
        assert!(!debug.contains("hunter2"));
    }

    #[test]
    fn secret_string_debug_redacts() {
        let s = SecretString::from("correct horse");
        let debug = format!("{s:?}");
        assert!(!debug.contains("horse"));
    }

    #[test]
    fn secret_bytes_clone_preserves_data() {
        let sb = SecretBytes::new(b"hello".to_vec());
        assert_eq!(sb.clone().as_slice(), b"hello");
    }

    #[test]
    fn agent_settings_default_is_inert_on_open() {
        let s = AgentSettings::default();
        assert!(!s.add_at_open);
        assert!(s.remove_at_close);
        assert!(!s.require_confirmation);
        assert_eq!(s.lifetime_seconds, None);
    }

    #[test]
    fn database_id_display_matches_uuid() {
        let raw = uuid::Uuid::new_v4();
        let id = DatabaseId::from(raw);
        assert_eq!(id.to_string(), raw.to_string());
    }
}
