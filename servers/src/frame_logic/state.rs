use anyhow::Result;
use lib_frame::{
    ClientRegistry, NeutralMatting, PhotoInventory, SettingsStore, SyncProtocol,
};
use std::path::Path;
use std::sync::Arc;

/// Shared handles to the three stores and the poll orchestrator. Each store
/// carries its own guard; cloning the state is cheap and every axum handler
/// gets the same instances.
#[derive(Clone)]
pub struct AppState {
    pub inventory: Arc<PhotoInventory>,
    pub settings: Arc<SettingsStore>,
    pub registry: Arc<ClientRegistry>,
    pub protocol: Arc<SyncProtocol>,
}

impl AppState {
    /// Opens the snapshot-backed stores under `data_dir` and wires the
    /// protocol. The dominant-color extractor is the thumbnailer
    /// collaborator's; until one is wired in, auto matting falls back to
    /// neutral gray.
    pub fn open(data_dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(data_dir)?;
        let inventory = Arc::new(PhotoInventory::open(&data_dir.join("photos.json"))?);
        let settings = Arc::new(SettingsStore::open(&data_dir.join("settings.json"))?);
        let registry = Arc::new(ClientRegistry::open(&data_dir.join("clients.json"))?);

        // Converge pairing with the settings that survived the restart.
        if settings.snapshot().enable_portrait_pairs {
            inventory.reconcile_pairs()?;
        } else {
            inventory.dissolve_pairs()?;
        }

        let protocol = Arc::new(SyncProtocol::new(
            Arc::clone(&inventory),
            Arc::clone(&settings),
            Arc::clone(&registry),
            Box::new(NeutralMatting),
        ));

        Ok(Self {
            inventory,
            settings,
            registry,
            protocol,
        })
    }

    /// Re-runs the pairing reconciliation when pairing is enabled. Called
    /// after every inventory change.
    pub fn reconcile_if_enabled(&self) -> Result<(), lib_frame::InventoryError> {
        if self.settings.snapshot().enable_portrait_pairs {
            self.inventory.reconcile_pairs()?;
        }
        Ok(())
    }
}
