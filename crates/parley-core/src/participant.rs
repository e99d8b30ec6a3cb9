//! Participant registry for Parley.
//!
//! Tracks which participants are live and when each last proved it. Names are
//! unique among live participants; the sweeper evicts anyone whose last
//! heartbeat is older than the TTL.

use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::time::Instant;
use tracing::debug;

fn epoch_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/// A live participant.
#[derive(Debug, Clone, Serialize)]
pub struct Participant {
    /// Unique display name.
    pub name: String,
    /// Wall-clock time of the last registration or heartbeat, in epoch millis.
    #[serde(rename = "lastStatus")]
    pub last_status: u64,
    /// Monotonic time of the last registration or heartbeat.
    #[serde(skip)]
    pub last_seen: Instant,
}

impl Participant {
    /// Create a participant seen just now.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            last_status: epoch_millis(),
            last_seen: Instant::now(),
        }
    }

    /// Refresh the liveness timestamps.
    pub fn touch(&mut self) {
        self.last_status = epoch_millis();
        self.last_seen = Instant::now();
    }

    /// Check if the last heartbeat happened before `cutoff`.
    #[must_use]
    pub fn is_expired(&self, cutoff: Instant) -> bool {
        self.last_seen < cutoff
    }
}

/// Outcome of [`ParticipantRegistry::register`].
#[derive(Debug, Clone)]
pub enum Registration {
    /// The participant was created.
    Created(Participant),
    /// A live participant already holds the name.
    Taken,
}

/// Storage backend for live participants.
///
/// Implementations must make `register` a single atomic check-and-insert, and
/// must re-check expiry at removal time in `evict_expired` so that a heartbeat
/// landing after the cutoff keeps the participant.
#[async_trait]
pub trait ParticipantRegistry: Send + Sync {
    /// Create a participant unless the name is already live.
    async fn register(&self, name: &str) -> Result<Registration, StoreError>;

    /// Refresh a participant. Returns `false` if no live participant has the name.
    async fn heartbeat(&self, name: &str) -> Result<bool, StoreError>;

    /// Check if a participant with this name is live.
    async fn is_live(&self, name: &str) -> Result<bool, StoreError>;

    /// Snapshot of all live participants, ordered by name.
    async fn list_live(&self) -> Result<Vec<Participant>, StoreError>;

    /// Remove and return every participant last seen before `cutoff`.
    async fn evict_expired(&self, cutoff: Instant) -> Result<Vec<Participant>, StoreError>;

    /// Undo a registration that could not be completed.
    async fn withdraw(&self, name: &str) -> Result<bool, StoreError>;
}

/// In-process registry backed by a concurrent map.
#[derive(Debug, Default)]
pub struct MemoryRegistry {
    participants: DashMap<String, Participant>,
}

impl MemoryRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live participants.
    #[must_use]
    pub fn count(&self) -> usize {
        self.participants.len()
    }
}

#[async_trait]
impl ParticipantRegistry for MemoryRegistry {
    async fn register(&self, name: &str) -> Result<Registration, StoreError> {
        match self.participants.entry(name.to_string()) {
            Entry::Occupied(_) => Ok(Registration::Taken),
            Entry::Vacant(slot) => {
                let participant = Participant::new(name);
                slot.insert(participant.clone());
                debug!(participant = %name, "Participant registered");
                Ok(Registration::Created(participant))
            }
        }
    }

    async fn heartbeat(&self, name: &str) -> Result<bool, StoreError> {
        match self.participants.get_mut(name) {
            Some(mut participant) => {
                participant.touch();
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn is_live(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.participants.contains_key(name))
    }

    async fn list_live(&self) -> Result<Vec<Participant>, StoreError> {
        let mut live: Vec<Participant> = self
            .participants
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        live.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(live)
    }

    async fn evict_expired(&self, cutoff: Instant) -> Result<Vec<Participant>, StoreError> {
        let candidates: Vec<String> = self
            .participants
            .iter()
            .filter(|entry| entry.value().is_expired(cutoff))
            .map(|entry| entry.key().clone())
            .collect();

        // A heartbeat may land between the scan and the removal.
        let evicted: Vec<Participant> = candidates
            .iter()
            .filter_map(|name| {
                self.participants
                    .remove_if(name, |_, participant| participant.is_expired(cutoff))
                    .map(|(_, participant)| participant)
            })
            .collect();

        for participant in &evicted {
            debug!(participant = %participant.name, "Participant evicted");
        }
        Ok(evicted)
    }

    async fn withdraw(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.participants.remove(name).is_some())
    }
}
