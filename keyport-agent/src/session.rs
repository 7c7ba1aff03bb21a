//! Lock/unlock orchestration.
//!
//! [`AgentSession`] is the single point of contact between the host
//! application and the agent: it decodes entry key material, talks to the
//! [`AgentClient`], and keeps the [`IdentityRegistry`] in step so that a
//! locking database removes exactly the identities it added.
//!
//! Constructed once per process with an explicitly owned client and
//! passed wherever lifecycle events are handled — there is no global
//! instance.

use std::collections::HashSet;

use tracing::{info, warn};

use keyport_codec::{DecodeError, Fingerprint, KeyContainer};
use keyport_core::{AgentSettings, DatabaseId, Vault, VaultEntry};

use crate::client::{AgentClient, RemoveOutcome};
use crate::constraints::ConstraintSet;
use crate::error::SessionError;
use crate::registry::{IdentityRegistry, OwnedIdentity};

/// One identity from [`AgentSession::list_registered`].
#[derive(Debug, Clone)]
pub struct RegisteredIdentity {
    pub fingerprint: Fingerprint,
    pub comment: String,
    /// Key type name, when the blob header is readable.
    pub algorithm: Option<String>,
}

/// Per-entry success in a bulk add.
#[derive(Debug)]
pub struct EntryAdded {
    pub entry_id: String,
    pub title: String,
    pub fingerprint: Fingerprint,
}

/// Per-entry failure in a bulk add.  One bad entry never aborts the
/// batch; it lands here instead.
#[derive(Debug)]
pub struct EntryFailed {
    pub entry_id: String,
    pub title: String,
    pub error: SessionError,
}

/// Outcome of processing a database unlock.
#[derive(Debug, Default)]
pub struct UnlockReport {
    pub added: Vec<EntryAdded>,
    pub failed: Vec<EntryFailed>,
}

impl UnlockReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Outcome of processing a database lock or close.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct LockReport {
    /// Identities the agent confirmed removing.
    pub removed: usize,
    /// Identities the agent no longer had (e.g. expired by lifetime).
    pub already_absent: usize,
    /// Removal requests that failed outright; ownership is released
    /// anyway.
    pub failed: usize,
    /// Identities whose settings did not ask for removal at close.
    pub released: usize,
}

/// Process-lifetime orchestrator between vault lifecycle events and the
/// agent.
#[derive(Debug)]
pub struct AgentSession {
    client: AgentClient,
    registry: IdentityRegistry,
}

impl AgentSession {
    pub fn new(client: AgentClient) -> Self {
        Self {
            client,
            registry: IdentityRegistry::new(),
        }
    }

    pub fn client(&self) -> &AgentClient {
        &self.client
    }

    pub fn registry(&self) -> &IdentityRegistry {
        &self.registry
    }

    /// Handle a database unlock: register every entry with agent settings
    /// and `add_at_open`.  Per-entry failures are collected, not fatal.
    pub fn database_unlocked(&self, vault: &dyn Vault) -> UnlockReport {
        let db = vault.id();
        let mut report = UnlockReport::default();

        for entry in vault.entries() {
            let Some(settings) = entry.settings() else {
                continue;
            };
            if !settings.add_at_open {
                continue;
            }
            match self.add_decoded(db, entry, &settings) {
                Ok(fingerprint) => report.added.push(EntryAdded {
                    entry_id: entry.id(),
                    title: entry.title(),
                    fingerprint,
                }),
                Err(error) => {
                    warn!(
                        entry = %entry.id(),
                        kind = error.kind(),
                        "entry skipped during unlock: {error}"
                    );
                    report.failed.push(EntryFailed {
                        entry_id: entry.id(),
                        title: entry.title(),
                        error,
                    });
                }
            }
        }

        info!(
            db = %db,
            added = report.added.len(),
            failed = report.failed.len(),
            "database unlock processed"
        );
        report
    }

    /// Handle a database lock: best-effort removal of every identity the
    /// database owns whose settings asked for it, then release ownership
    /// of everything regardless of individual outcomes.
    pub fn database_locked(&self, db: &DatabaseId) -> LockReport {
        let mut report = LockReport::default();

        for identity in self.registry.take(db) {
            if !identity.remove_at_close {
                report.released += 1;
                continue;
            }
            match self.client.remove_identity(&identity.blob) {
                Ok(RemoveOutcome::Removed) => report.removed += 1,
                Ok(RemoveOutcome::AlreadyAbsent) => report.already_absent += 1,
                Err(error) => {
                    warn!(
                        fingerprint = %identity.fingerprint,
                        "removal failed during lock: {error}"
                    );
                    report.failed += 1;
                }
            }
        }

        info!(
            db = %db,
            removed = report.removed,
            already_absent = report.already_absent,
            failed = report.failed,
            released = report.released,
            "database lock processed"
        );
        report
    }

    /// A closed database gets the same cleanup as a locked one.
    pub fn database_closed(&self, db: &DatabaseId) -> LockReport {
        self.database_locked(db)
    }

    /// Register a single entry's key.  The entry must carry agent
    /// settings; the first error propagates verbatim.
    pub fn add_entry(
        &self,
        db: DatabaseId,
        entry: &dyn VaultEntry,
    ) -> Result<Fingerprint, SessionError> {
        let settings = entry
            .settings()
            .ok_or_else(|| SessionError::NoAgentSettings(entry.id()))?;
        self.add_decoded(db, entry, &settings)
    }

    /// Deregister a single entry's key and drop its ownership record.
    ///
    /// Only the public half is needed, so encrypted OpenSSH/PPK
    /// containers work without a passphrase; encrypted legacy PEM falls
    /// back to a full decode with the entry's stored passphrase.
    pub fn remove_entry(
        &self,
        db: &DatabaseId,
        entry: &dyn VaultEntry,
    ) -> Result<RemoveOutcome, SessionError> {
        let raw = entry.key_container()?;
        let container = KeyContainer::detect(raw.as_slice())?;

        let public_blob = match container.decode_public() {
            Ok(public) => public.to_blob(),
            Err(DecodeError::PassphraseRequired) => {
                let passphrase = entry.passphrase();
                let key = container.decode(passphrase.as_ref().map(|p| p.as_str()))?;
                key.public_blob()
            }
            Err(error) => return Err(error.into()),
        };

        let fingerprint = Fingerprint::of_blob(&public_blob);
        let outcome = self.client.remove_identity(&public_blob)?;
        self.registry.forget(db, &fingerprint);
        Ok(outcome)
    }

    /// Resolve an entry by path and register it.
    pub fn add_from_path(
        &self,
        vault: &dyn Vault,
        path: &str,
    ) -> Result<Fingerprint, SessionError> {
        let entry = vault
            .find_entry(path)
            .ok_or_else(|| SessionError::EntryNotFound(path.to_string()))?;
        self.add_entry(vault.id(), entry)
    }

    /// Resolve an entry by path and deregister it.
    pub fn remove_from_path(
        &self,
        vault: &dyn Vault,
        path: &str,
    ) -> Result<RemoveOutcome, SessionError> {
        let entry = vault
            .find_entry(path)
            .ok_or_else(|| SessionError::EntryNotFound(path.to_string()))?;
        self.remove_entry(&vault.id(), entry)
    }

    /// Identities this database registered that the agent still holds.
    ///
    /// The agent is the source of truth for liveness — keys it expired
    /// under a lifetime constraint no longer appear even though the
    /// registry remembers them.
    pub fn list_registered(
        &self,
        db: &DatabaseId,
    ) -> Result<Vec<RegisteredIdentity>, SessionError> {
        let owned: HashSet<Fingerprint> = self.registry.owned_by(db).into_iter().collect();
        if owned.is_empty() {
            return Ok(Vec::new());
        }

        let identities = self.client.list_identities()?;
        Ok(identities
            .into_iter()
            .filter(|identity| owned.contains(&identity.fingerprint()))
            .map(|identity| RegisteredIdentity {
                fingerprint: identity.fingerprint(),
                algorithm: identity.algorithm(),
                comment: identity.comment,
            })
            .collect())
    }

    fn add_decoded(
        &self,
        db: DatabaseId,
        entry: &dyn VaultEntry,
        settings: &AgentSettings,
    ) -> Result<Fingerprint, SessionError> {
        let raw = entry.key_container()?;
        let container = KeyContainer::detect(raw.as_slice())?;
        let passphrase = entry.passphrase();
        let key = container.decode(passphrase.as_ref().map(|p| p.as_str()))?;

        // the container's comment wins; entries without one fall back to
        // their title so the agent list stays readable
        let comment = if key.comment().is_empty() {
            entry.title()
        } else {
            key.comment().to_string()
        };

        self.client
            .add_identity(&key, &comment, &ConstraintSet::from(settings))?;

        let fingerprint = key.fingerprint();
        if let Some(hint) = entry.fingerprint_hint()
            && hint != fingerprint.as_str()
        {
            warn!(
                entry = %entry.id(),
                hint = %hint,
                actual = %fingerprint,
                "entry fingerprint hint does not match decoded key"
            );
        }
        self.registry.record(
            db,
            OwnedIdentity {
                fingerprint: fingerprint.clone(),
                blob: key.public_blob(),
                comment,
                remove_at_close: settings.remove_at_close,
            },
        );
        Ok(fingerprint)
    }
}
