//! # Sync Protocol
//!
//! One poll cycle, start to finish: heartbeat, settings snapshot, display
//! manifest, command handoff. Polling is pull-based and stateless between
//! requests -- no session survives the response, and a dropped poll is
//! simply retried by the client on its own schedule.

use crate::configs::settings::{MattingMode, Settings, SettingsStore};
use crate::core::inventory::{Photo, PhotoInventory};
use crate::core::ota::{self, FileVersionStatus};
use crate::core::registry::{ClientRecord, ClientRegistry, PowerCommand};
use crate::core::sorting::{DisplayUnit, SortingEngine};
use crate::errors::StoreError;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// 24-bit background color.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Rgb(pub u8, pub u8, pub u8);

impl Rgb {
    pub const BLACK: Rgb = Rgb(0, 0, 0);
    pub const WHITE: Rgb = Rgb(255, 255, 255);

    pub fn to_hex(self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.0, self.1, self.2)
    }
}

/// Source of per-photo dominant colors for `matting_mode = auto`. The real
/// extractor lives with the thumbnailing collaborator; the server injects
/// an implementation here.
pub trait DominantColorSource: Send + Sync {
    fn dominant_color(&self, photo: &Photo) -> Rgb;
}

/// Fallback source when no extractor is wired in: a neutral mid gray.
pub struct NeutralMatting;

impl DominantColorSource for NeutralMatting {
    fn dominant_color(&self, _photo: &Photo) -> Rgb {
        Rgb(128, 128, 128)
    }
}

/// What a client sends on every poll.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollRequest {
    pub client_id: String,
    #[serde(default)]
    pub display_version: String,
    #[serde(default)]
    pub sync_version: String,
}

/// One photo inside a manifest entry.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestPhoto {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    pub file_hash: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// Relative content URL, served by the storage collaborator.
    pub url: String,
}

impl From<&Photo> for ManifestPhoto {
    fn from(photo: &Photo) -> Self {
        Self {
            id: photo.id,
            filename: photo.filename.clone(),
            original_filename: photo.original_filename.clone(),
            file_hash: photo.file_hash.clone(),
            size: photo.size,
            width: photo.width,
            height: photo.height,
            url: format!("/photos/{}", photo.filename),
        }
    }
}

/// One display unit of the manifest, in display order.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub kind: ManifestKind,
    pub photos: Vec<ManifestPhoto>,
    /// Pixel gap between the two photos; pairs only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub gap_px: Option<u32>,
    /// Background fill as `#rrggbb`.
    pub matting_color: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ManifestKind {
    Single,
    Pair,
}

/// The combined payload returned by one poll.
#[derive(Debug, Clone, Serialize)]
pub struct PollResponse {
    pub settings: Settings,
    pub manifest: Vec<ManifestEntry>,
    /// At most one pending command, consumed by this poll.
    pub command: Option<PowerCommand>,
}

/// Derived client liveness, computed at read time and never stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ClientStatus {
    Active,
    Stale,
}

/// Registry view for the admin surface: the record plus everything derived
/// from it.
#[derive(Debug, Clone, Serialize)]
pub struct ClientReport {
    #[serde(flatten)]
    pub record: ClientRecord,
    pub status: ClientStatus,
    pub versions: Vec<FileVersionStatus>,
}

/// A client is stale once its last heartbeat is older than twice the
/// configured display time; two missed display slots means it is not
/// cycling photos anymore.
pub fn staleness_threshold(settings: &Settings) -> Duration {
    Duration::milliseconds((settings.display_time * 2.0 * 1000.0) as i64)
}

pub fn client_status(
    record: &ClientRecord,
    now: DateTime<Utc>,
    threshold: Duration,
) -> ClientStatus {
    if now - record.last_update > threshold {
        ClientStatus::Stale
    } else {
        ClientStatus::Active
    }
}

/// Orchestrates the stores for each poll. Holds no per-client state of its
/// own; everything a poll returns is recomputed from the shared stores.
pub struct SyncProtocol {
    inventory: Arc<PhotoInventory>,
    settings: Arc<SettingsStore>,
    registry: Arc<ClientRegistry>,
    sorting: SortingEngine,
    colors: Box<dyn DominantColorSource>,
}

impl SyncProtocol {
    pub fn new(
        inventory: Arc<PhotoInventory>,
        settings: Arc<SettingsStore>,
        registry: Arc<ClientRegistry>,
        colors: Box<dyn DominantColorSource>,
    ) -> Self {
        Self {
            inventory,
            settings,
            registry,
            sorting: SortingEngine::new(),
            colors,
        }
    }

    /// Runs one poll cycle: (1) heartbeat, (2) settings snapshot,
    /// (3) manifest, (4) command handoff, (5) combined payload.
    pub fn poll(&self, request: &PollRequest) -> Result<PollResponse, StoreError> {
        self.registry.heartbeat(
            &request.client_id,
            &request.display_version,
            &request.sync_version,
        )?;
        let settings = self.settings.snapshot();
        let manifest = self.manifest(&settings);
        let command = self.registry.consume_command(&request.client_id)?;
        log::debug!(
            "Poll from '{}': {} unit(s), command {:?}",
            request.client_id,
            manifest.len(),
            command
        );
        Ok(PollResponse {
            settings,
            manifest,
            command,
        })
    }

    /// The current manifest under the given settings snapshot.
    pub fn manifest(&self, settings: &Settings) -> Vec<ManifestEntry> {
        let photos = self.inventory.all_photos();
        let units = self.sorting.order(&photos, settings.sort_mode);
        units
            .iter()
            .map(|unit| self.manifest_entry(unit, settings))
            .collect()
    }

    fn manifest_entry(&self, unit: &DisplayUnit, settings: &Settings) -> ManifestEntry {
        let photos = unit.photos();
        let matting_color = match settings.matting_mode {
            MattingMode::Black => Rgb::BLACK,
            MattingMode::White => Rgb::WHITE,
            // One color per displayed unit; the leading photo decides.
            MattingMode::Auto => self.colors.dominant_color(photos[0]),
        };
        let (kind, gap_px) = match unit {
            DisplayUnit::Single(_) => (ManifestKind::Single, None),
            DisplayUnit::Pair(_, _) => (ManifestKind::Pair, Some(settings.portrait_gap)),
        };
        ManifestEntry {
            kind,
            photos: photos.into_iter().map(ManifestPhoto::from).collect(),
            gap_px,
            matting_color: matting_color.to_hex(),
        }
    }

    /// Admin view of every registered client with derived status and OTA
    /// verdicts.
    pub fn client_report(&self) -> Vec<ClientReport> {
        let settings = self.settings.snapshot();
        let threshold = staleness_threshold(&settings);
        let now = Utc::now();
        self.registry
            .all_clients()
            .into_iter()
            .map(|record| {
                let status = client_status(&record, now, threshold);
                let versions = ota::compare(&record, &settings.client_versions);
                ClientReport {
                    record,
                    status,
                    versions,
                }
            })
            .collect()
    }

    /// Restarts the display cycle, forcing a fresh random permutation.
    pub fn restart_cycle(&self) {
        self.sorting.restart_cycle();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::configs::settings::{SettingsUpdate, SortMode};
    use crate::core::inventory::test_support::{landscape, portrait};

    fn protocol() -> SyncProtocol {
        let inventory = Arc::new(PhotoInventory::new_in_memory());
        let mut settings = Settings::default();
        settings.sort_mode = SortMode::Sequential;
        SyncProtocol::new(
            inventory,
            Arc::new(SettingsStore::new_in_memory(settings)),
            Arc::new(ClientRegistry::new_in_memory()),
            Box::new(NeutralMatting),
        )
    }

    fn poll_request(client_id: &str) -> PollRequest {
        PollRequest {
            client_id: client_id.to_string(),
            display_version: "1.0.5".to_string(),
            sync_version: "1.0.5".to_string(),
        }
    }

    #[test]
    fn poll_registers_heartbeat_and_returns_payload() {
        let protocol = protocol();
        protocol
            .inventory
            .add_photo(landscape("l1", 0))
            .unwrap();

        let response = protocol.poll(&poll_request("frame-01")).unwrap();
        assert_eq!(response.manifest.len(), 1);
        assert_eq!(response.command, None);
        assert_eq!(response.settings.sort_mode, SortMode::Sequential);

        let record = protocol.registry.client("frame-01").unwrap();
        assert_eq!(record.display_version, "1.0.5");
    }

    #[test]
    fn command_handoff_is_exactly_once() {
        let protocol = protocol();
        protocol.poll(&poll_request("frame-01")).unwrap();
        protocol
            .registry
            .enqueue_command("frame-01", PowerCommand::Restart)
            .unwrap();

        let first = protocol.poll(&poll_request("frame-01")).unwrap();
        assert_eq!(first.command, Some(PowerCommand::Restart));
        let second = protocol.poll(&poll_request("frame-01")).unwrap();
        assert_eq!(second.command, None);
    }

    #[test]
    fn manifest_carries_matting_and_gap() {
        let protocol = protocol();
        protocol.inventory.add_photo(portrait("p1", 0)).unwrap();
        protocol.inventory.add_photo(portrait("p2", 1)).unwrap();
        protocol.inventory.reconcile_pairs().unwrap();

        let response = protocol.poll(&poll_request("frame-01")).unwrap();
        assert_eq!(response.manifest.len(), 1);
        let entry = &response.manifest[0];
        assert_eq!(entry.kind, ManifestKind::Pair);
        assert_eq!(entry.gap_px, Some(20));
        assert_eq!(entry.photos.len(), 2);
        assert_eq!(entry.matting_color, "#ffffff");
        assert_eq!(entry.photos[0].url, "/photos/p1.jpg");

        protocol
            .settings
            .update(SettingsUpdate {
                matting_mode: Some(MattingMode::Auto),
                ..Default::default()
            })
            .unwrap();
        let auto = protocol.poll(&poll_request("frame-01")).unwrap();
        assert_eq!(auto.manifest[0].matting_color, "#808080");
    }

    #[test]
    fn staleness_is_derived_from_display_time() {
        let settings = Settings::default(); // display_time = 15s
        let threshold = staleness_threshold(&settings);
        assert_eq!(threshold, Duration::seconds(30));

        let now = Utc::now();
        let record = ClientRecord {
            client_id: "frame-01".to_string(),
            display_version: String::new(),
            sync_version: String::new(),
            last_update: now - Duration::seconds(31),
            pending_command: None,
        };
        assert_eq!(client_status(&record, now, threshold), ClientStatus::Stale);

        let fresh = ClientRecord {
            last_update: now - Duration::seconds(29),
            ..record
        };
        assert_eq!(client_status(&fresh, now, threshold), ClientStatus::Active);
    }

    #[test]
    fn client_report_flags_version_skew() {
        let protocol = protocol();
        let mut request = poll_request("frame-01");
        request.display_version = "0.9.0".to_string();
        protocol.poll(&request).unwrap();

        let report = protocol.client_report();
        assert_eq!(report.len(), 1);
        assert_eq!(report[0].status, ClientStatus::Active);
        let display = report[0]
            .versions
            .iter()
            .find(|v| v.filename == ota::DISPLAY_FILE)
            .unwrap();
        assert!(!display.up_to_date);
    }
}
