//! # Client Registry
//!
//! Tracks every display client that has ever polled, keyed by its opaque
//! client id, and carries the per-client command mailbox. The mailbox is a
//! single bounded slot, capacity one: enqueueing overwrites an unconsumed
//! command (newest wins, never queued) and consuming reads and clears in
//! one step under the registry guard, so two concurrent polls can never
//! both receive the same command. Delivery is best-effort: a command for a
//! client that never polls again is silently lost.

use crate::errors::{RegistryError, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// Remote power action for a headless client.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PowerCommand {
    Restart,
    Shutdown,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClientRecord {
    pub client_id: String,
    pub display_version: String,
    pub sync_version: String,
    pub last_update: DateTime<Utc>,
    /// At most one unconsumed command.
    pub pending_command: Option<PowerCommand>,
}

pub struct ClientRegistry {
    clients: Mutex<BTreeMap<String, ClientRecord>>,
    snapshot_path: Option<PathBuf>,
}

impl ClientRegistry {
    pub fn new_in_memory() -> Self {
        Self {
            clients: Mutex::new(BTreeMap::new()),
            snapshot_path: None,
        }
    }

    /// Opens the registry backed by a JSON snapshot file. Records are never
    /// auto-deleted, so the file only grows with genuinely new clients.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let clients = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            BTreeMap::new()
        };
        Ok(Self {
            clients: Mutex::new(clients),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, ClientRecord>> {
        self.clients.lock().expect("Registry lock poisoned")
    }

    fn persist(
        &self,
        clients: &BTreeMap<String, ClientRecord>,
    ) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot_path {
            let raw = serde_json::to_string_pretty(clients)?;
            fs::write(path, raw)?;
        }
        Ok(())
    }

    /// Upserts the client's record: an unseen id creates a fresh record
    /// with an empty mailbox, a known id refreshes versions and
    /// `last_update`. The mailbox is left untouched either way.
    pub fn heartbeat(
        &self,
        client_id: &str,
        display_version: &str,
        sync_version: &str,
    ) -> Result<ClientRecord, StoreError> {
        let mut clients = self.lock();
        let record = clients
            .entry(client_id.to_string())
            .or_insert_with(|| {
                log::info!("Client '{}' registered", client_id);
                ClientRecord {
                    client_id: client_id.to_string(),
                    display_version: String::new(),
                    sync_version: String::new(),
                    last_update: Utc::now(),
                    pending_command: None,
                }
            });
        record.display_version = display_version.to_string();
        record.sync_version = sync_version.to_string();
        record.last_update = Utc::now();
        let record = record.clone();
        self.persist(&clients)?;
        Ok(record)
    }

    /// Places a command in the client's slot, overwriting any unconsumed
    /// one. Fails without state change when the client never polled.
    pub fn enqueue_command(
        &self,
        client_id: &str,
        command: PowerCommand,
    ) -> Result<Option<PowerCommand>, RegistryError> {
        let mut clients = self.lock();
        let record = clients
            .get_mut(client_id)
            .ok_or_else(|| RegistryError::UnknownClient(client_id.to_string()))?;
        let replaced = record.pending_command.replace(command);
        self.persist(&clients)?;
        match replaced {
            Some(old) => log::warn!(
                "Client '{}': replaced unconsumed {:?} with {:?}",
                client_id,
                old,
                command
            ),
            None => log::info!("Client '{}': {:?} queued", client_id, command),
        }
        Ok(replaced)
    }

    /// Atomically reads and clears the client's slot. The read and the
    /// clear happen as one step under the registry guard, giving
    /// at-most-once handoff to whichever poll arrives first.
    pub fn consume_command(
        &self,
        client_id: &str,
    ) -> Result<Option<PowerCommand>, StoreError> {
        let mut clients = self.lock();
        let command = clients
            .get_mut(client_id)
            .and_then(|record| record.pending_command.take());
        if let Some(command) = command {
            self.persist(&clients)?;
            log::info!("Client '{}': {:?} handed off", client_id, command);
        }
        Ok(command)
    }

    pub fn client(&self, client_id: &str) -> Option<ClientRecord> {
        self.lock().get(client_id).cloned()
    }

    pub fn all_clients(&self) -> Vec<ClientRecord> {
        self.lock().values().cloned().collect()
    }
}
