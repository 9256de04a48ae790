//! Flagged candidates awaiting an operator decision

use super::{IngestCandidate, SimilarDocument};
use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingIngestion {
    pub id: Uuid,
    pub candidate: IngestCandidate,
    pub similar: Vec<SimilarDocument>,
    pub flagged_at: DateTime<Utc>,
}

/// In-memory registry of flagged candidates, keyed by UUID
///
/// Entries older than `max_age` are dropped the next time the registry is
/// touched; `None` keeps them until an operator decides.
#[derive(Debug, Default)]
pub struct PendingIngestions {
    entries: Mutex<HashMap<Uuid, PendingIngestion>>,
    max_age: Option<Duration>,
}

impl PendingIngestions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_age(max_age: Option<Duration>) -> Self {
        Self {
            entries: Mutex::default(),
            max_age,
        }
    }

    /// Lock the map with expired entries already removed
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, PendingIngestion>> {
        // Entries are inserted and removed whole, so a poisoned map is still consistent
        let mut guard = match self.entries.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        if let Some(max_age) = self.max_age {
            let cutoff = Utc::now() - max_age;
            let before = guard.len();
            guard.retain(|_, entry| entry.flagged_at >= cutoff);
            let expired = before - guard.len();
            if expired > 0 {
                tracing::info!("Expired {} pending ingestions older than {}h", expired, max_age.num_hours());
            }
        }
        guard
    }

    /// Park a flagged candidate and return its review id
    pub fn park(&self, candidate: IngestCandidate, similar: Vec<SimilarDocument>) -> Uuid {
        let id = Uuid::new_v4();
        let entry = PendingIngestion {
            id,
            candidate,
            similar,
            flagged_at: Utc::now(),
        };
        let mut entries = self.lock();
        entries.insert(id, entry);
        tracing::info!("Parked {} for review ({} pending)", id, entries.len());
        id
    }

    /// Put back an entry that could not be committed
    pub fn restore(&self, entry: PendingIngestion) {
        self.lock().insert(entry.id, entry);
    }

    /// Remove and return a parked entry
    pub fn take(&self, id: &Uuid) -> Option<PendingIngestion> {
        self.lock().remove(id)
    }

    pub fn get(&self, id: &Uuid) -> Option<PendingIngestion> {
        self.lock().get(id).cloned()
    }

    /// All parked entries, oldest first
    pub fn list(&self) -> Vec<PendingIngestion> {
        let mut entries: Vec<PendingIngestion> = self.lock().values().cloned().collect();
        entries.sort_by_key(|e| e.flagged_at);
        entries
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
