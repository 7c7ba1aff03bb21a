//! Process-wide identity ownership bookkeeping.
//!
//! Maps each database to the set of fingerprints this process registered
//! on its behalf, so that locking a database removes exactly the
//! identities it owns — never identities added by other databases or
//! other agent clients.  Pure in-memory state behind a single mutex held
//! only per map operation, never across an agent round trip.

use std::collections::HashMap;
use std::sync::Mutex;

use tracing::debug;

use keyport_codec::Fingerprint;
use keyport_core::DatabaseId;

/// One identity owned by a database.
///
/// The public blob is retained because the agent removes identities by
/// blob, not by fingerprint.
#[derive(Debug, Clone)]
pub struct OwnedIdentity {
    pub fingerprint: Fingerprint,
    pub blob: Vec<u8>,
    pub comment: String,
    /// Whether the owning entry asked for removal when its database
    /// locks.
    pub remove_at_close: bool,
}

/// Registry of identity ownership, keyed by database.
#[derive(Debug, Default)]
pub struct IdentityRegistry {
    inner: Mutex<HashMap<DatabaseId, HashMap<Fingerprint, OwnedIdentity>>>,
}

impl IdentityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<DatabaseId, HashMap<Fingerprint, OwnedIdentity>>> {
        // each map operation leaves the table consistent, so a poisoned
        // lock is still safe to reuse
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Record that `db` owns `identity`.
    ///
    /// Last add wins: the fingerprint is stripped from any other database
    /// first, matching the agent's behavior of keeping one copy of a key
    /// no matter who re-adds it.
    pub fn record(&self, db: DatabaseId, identity: OwnedIdentity) {
        let mut table = self.lock();
        for (other_db, owned) in table.iter_mut() {
            if *other_db != db && owned.remove(&identity.fingerprint).is_some() {
                debug!(
                    fingerprint = %identity.fingerprint,
                    from = %other_db,
                    to = %db,
                    "identity ownership transferred"
                );
            }
        }
        table.retain(|_, owned| !owned.is_empty());
        debug!(fingerprint = %identity.fingerprint, db = %db, "identity recorded");
        table
            .entry(db)
            .or_default()
            .insert(identity.fingerprint.clone(), identity);
    }

    /// Drop one fingerprint from a database's set.  Returns whether it
    /// was present.
    pub fn forget(&self, db: &DatabaseId, fingerprint: &Fingerprint) -> bool {
        let mut table = self.lock();
        let Some(owned) = table.get_mut(db) else {
            return false;
        };
        let removed = owned.remove(fingerprint).is_some();
        if owned.is_empty() {
            table.remove(db);
        }
        removed
    }

    /// Fingerprints currently owned by a database, sorted for stable
    /// reporting.
    pub fn owned_by(&self, db: &DatabaseId) -> Vec<Fingerprint> {
        let table = self.lock();
        let mut fingerprints: Vec<Fingerprint> = table
            .get(db)
            .map(|owned| owned.keys().cloned().collect())
            .unwrap_or_default();
        fingerprints.sort();
        fingerprints
    }

    pub fn contains(&self, db: &DatabaseId, fingerprint: &Fingerprint) -> bool {
        self.lock()
            .get(db)
            .is_some_and(|owned| owned.contains_key(fingerprint))
    }

    /// Drain and return everything a database owns, clearing its entry.
    pub fn take(&self, db: &DatabaseId) -> Vec<OwnedIdentity> {
        let mut identities: Vec<OwnedIdentity> = self
            .lock()
            .remove(db)
            .map(|owned| owned.into_values().collect())
            .unwrap_or_default();
        identities.sort_by(|a, b| a.fingerprint.cmp(&b.fingerprint));
        identities
    }

    /// Drop a database's entry without returning it.
    pub fn clear(&self, db: &DatabaseId) {
        self.lock().remove(db);
    }

    /// Total identities tracked across all databases.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}
