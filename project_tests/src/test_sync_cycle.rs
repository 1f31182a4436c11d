//! # Full Poll Cycle Scenario Test
//!
//! Drives the complete sync protocol against in-process, snapshot-backed
//! stores: portrait pairing over uploads and deletes, sort order, the
//! command mailbox handoff, and persistence across a reopen.

use anyhow::{Context, Result, ensure};
use chrono::{TimeZone, Utc};
use lib_frame::{
    ClientRegistry, ManifestKind, NeutralMatting, NewPhoto, PhotoInventory, PollRequest,
    PowerCommand, SettingsStore, SettingsUpdate, SortMode, SyncProtocol,
};
use std::path::Path;
use std::sync::Arc;

fn new_photo(name: &str, width: u32, height: u32, minute: u32) -> NewPhoto {
    NewPhoto {
        filename: format!("{name}.jpg"),
        original_filename: format!("{name}.jpg"),
        file_hash: format!("hash-{name}"),
        size: 1000,
        width,
        height,
        upload_timestamp: Some(Utc.with_ymd_and_hms(2026, 1, 1, 12, minute, 0).unwrap()),
    }
}

struct Harness {
    inventory: Arc<PhotoInventory>,
    settings: Arc<SettingsStore>,
    registry: Arc<ClientRegistry>,
    protocol: SyncProtocol,
}

impl Harness {
    fn open(data_dir: &Path) -> Result<Self> {
        let inventory = Arc::new(PhotoInventory::open(&data_dir.join("photos.json"))?);
        let settings = Arc::new(SettingsStore::open(&data_dir.join("settings.json"))?);
        let registry = Arc::new(ClientRegistry::open(&data_dir.join("clients.json"))?);
        let protocol = SyncProtocol::new(
            Arc::clone(&inventory),
            Arc::clone(&settings),
            Arc::clone(&registry),
            Box::new(NeutralMatting),
        );
        Ok(Self {
            inventory,
            settings,
            registry,
            protocol,
        })
    }

    fn pairs(&self) -> Vec<(i64, i64)> {
        let mut pairs: Vec<(i64, i64)> = self
            .inventory
            .all_photos()
            .iter()
            .filter_map(|p| p.paired_photo_id.map(|q| (p.id.min(q), p.id.max(q))))
            .collect();
        pairs.sort();
        pairs.dedup();
        pairs
    }

    fn poll(&self, client_id: &str) -> Result<lib_frame::PollResponse> {
        self.protocol
            .poll(&PollRequest {
                client_id: client_id.to_string(),
                display_version: "1.0.5".to_string(),
                sync_version: "1.0.5".to_string(),
            })
            .context("poll failed")
    }
}

fn run() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let harness = Harness::open(dir.path())?;
    harness.settings.update(SettingsUpdate {
        sort_mode: Some(SortMode::Sequential),
        ..Default::default()
    })?;

    println!("[*] Registering P1, P2, L1, P3 with pairing enabled...");
    let p1 = harness.inventory.add_photo(new_photo("p1", 1080, 1920, 0))?;
    harness.inventory.reconcile_pairs()?;
    let p2 = harness.inventory.add_photo(new_photo("p2", 1080, 1920, 1))?;
    harness.inventory.reconcile_pairs()?;
    let l1 = harness.inventory.add_photo(new_photo("l1", 1920, 1080, 2))?;
    harness.inventory.reconcile_pairs()?;
    let p3 = harness.inventory.add_photo(new_photo("p3", 1080, 1920, 3))?;
    harness.inventory.reconcile_pairs()?;

    ensure!(
        harness.pairs() == vec![(p1.id, p2.id)],
        "expected exactly the (P1,P2) pair, got {:?}",
        harness.pairs()
    );
    ensure!(harness.inventory.photo(l1.id).unwrap().paired_photo_id.is_none());
    ensure!(harness.inventory.photo(p3.id).unwrap().paired_photo_id.is_none());

    println!("[*] First poll: manifest, settings, no command...");
    let response = harness.poll("frame-01")?;
    ensure!(response.command.is_none(), "no command was queued yet");
    ensure!(
        response.manifest.len() == 3,
        "pair + L1 + P3 should be 3 units, got {}",
        response.manifest.len()
    );
    ensure!(response.manifest[0].kind == ManifestKind::Pair);
    ensure!(response.manifest[0].gap_px == Some(20));
    ensure!(response.settings.sort_mode == SortMode::Sequential);

    println!("[*] Sort order: sequential vs newest are exact reverses...");
    let sequential: Vec<i64> = response
        .manifest
        .iter()
        .map(|entry| entry.photos[0].id)
        .collect();
    harness.settings.update(SettingsUpdate {
        sort_mode: Some(SortMode::Newest),
        ..Default::default()
    })?;
    let newest: Vec<i64> = harness
        .poll("frame-01")?
        .manifest
        .iter()
        .map(|entry| entry.photos[0].id)
        .collect();
    let mut reversed = newest.clone();
    reversed.reverse();
    ensure!(
        sequential == reversed,
        "sequential {sequential:?} must reverse newest {newest:?}"
    );
    harness.settings.update(SettingsUpdate {
        sort_mode: Some(SortMode::Sequential),
        ..Default::default()
    })?;

    println!("[*] Command mailbox: exactly-once handoff...");
    harness
        .registry
        .enqueue_command("frame-01", PowerCommand::Restart)?;
    // Newest wins in the single slot.
    harness
        .registry
        .enqueue_command("frame-01", PowerCommand::Shutdown)?;
    let first = harness.poll("frame-01")?;
    ensure!(
        first.command == Some(PowerCommand::Shutdown),
        "latest queued command must be handed off"
    );
    let wire = serde_json::to_value(&first)?;
    ensure!(wire["command"] == "shutdown", "commands serialize lowercase");
    ensure!(wire["manifest"][0]["kind"] == "pair");
    ensure!(wire["manifest"][0]["matting_color"] == "#ffffff");
    let second = harness.poll("frame-01")?;
    ensure!(second.command.is_none(), "the slot must be empty after handoff");

    ensure!(
        harness
            .registry
            .enqueue_command("ghost", PowerCommand::Restart)
            .is_err(),
        "commands for unknown clients must be rejected"
    );

    println!("[*] Delete P1, recompute: P2 pairs with P3...");
    harness.inventory.delete_photo(p1.id)?;
    ensure!(harness.inventory.photo(p2.id).unwrap().paired_photo_id.is_none());
    harness.inventory.reconcile_pairs()?;
    ensure!(
        harness.pairs() == vec![(p2.id, p3.id)],
        "earliest surviving portraits must pair, got {:?}",
        harness.pairs()
    );

    println!("[*] Pairing toggle off/on reproduces the pairing...");
    let before = harness.pairs();
    harness.settings.update(SettingsUpdate {
        enable_portrait_pairs: Some(false),
        ..Default::default()
    })?;
    harness.inventory.dissolve_pairs()?;
    ensure!(harness.pairs().is_empty());
    harness.settings.update(SettingsUpdate {
        enable_portrait_pairs: Some(true),
        ..Default::default()
    })?;
    harness.inventory.reconcile_pairs()?;
    ensure!(harness.pairs() == before);

    println!("[*] Invalid settings update leaves everything unchanged...");
    ensure!(
        harness
            .settings
            .update(SettingsUpdate {
                display_time: Some(301.0),
                ..Default::default()
            })
            .is_err(),
        "display_time=301 must fail validation"
    );
    ensure!(harness.settings.snapshot().display_time == 15.0);

    println!("[*] Reopen from snapshots: state survives a restart...");
    drop(harness);
    let reopened = Harness::open(dir.path())?;
    ensure!(reopened.pairs() == before);
    ensure!(reopened.inventory.all_photos().len() == 3);
    ensure!(
        reopened.registry.client("frame-01").is_some(),
        "client records are never auto-deleted"
    );
    ensure!(reopened.settings.snapshot().sort_mode == SortMode::Sequential);

    Ok(())
}

fn main() {
    match run() {
        Ok(()) => {
            println!("\n[SUCCESS] Full poll cycle scenario passed.");
        }
        Err(e) => {
            eprintln!("\n[ERROR] Scenario failed:");
            eprintln!(">>> {e:#}");
            std::process::exit(1);
        }
    }
}
