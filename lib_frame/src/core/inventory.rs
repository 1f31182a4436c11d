//! # Photo Inventory
//!
//! Owns photo metadata and the pairing state derived from it. Both live
//! under one guard: pairing is a function of the inventory, so every
//! recompute is validated and applied while the same lock is held and no
//! reader can observe a half-updated set.
//!
//! Photo binaries never pass through here. The upload collaborator stores
//! the file, measures it, and registers the metadata; deletion removes the
//! metadata and unpairs the partner, leaving file cleanup to the same
//! collaborator.

use crate::core::pairing;
use crate::errors::{InventoryError, StoreError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    pub id: i64,
    pub filename: String,
    pub original_filename: String,
    /// Content hash supplied by the upload collaborator.
    pub file_hash: String,
    pub upload_timestamp: DateTime<Utc>,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    pub paired_photo_id: Option<i64>,
}

impl Photo {
    /// Orientation is derived, never stored: strictly taller than wide.
    pub fn is_portrait(&self) -> bool {
        self.height > self.width
    }
}

/// Metadata for a freshly uploaded photo, as measured by the upload
/// collaborator. The inventory assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewPhoto {
    pub filename: String,
    pub original_filename: String,
    pub file_hash: String,
    pub size: u64,
    pub width: u32,
    pub height: u32,
    /// Defaults to now. Importers registering pre-existing files pass the
    /// original capture/upload time to keep display order meaningful.
    pub upload_timestamp: Option<DateTime<Utc>>,
}

/// Inventory statistics for the admin surface.
#[derive(Debug, Clone, Serialize)]
pub struct PhotoStats {
    pub total: usize,
    pub portraits: usize,
    pub paired: usize,
    pub total_size_bytes: u64,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct InventoryState {
    next_id: i64,
    photos: BTreeMap<i64, Photo>,
}

pub struct PhotoInventory {
    state: Mutex<InventoryState>,
    snapshot_path: Option<PathBuf>,
}

impl PhotoInventory {
    pub fn new_in_memory() -> Self {
        Self {
            state: Mutex::new(InventoryState {
                next_id: 1,
                ..Default::default()
            }),
            snapshot_path: None,
        }
    }

    /// Opens the inventory backed by a JSON snapshot file, creating an
    /// empty one when missing.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        let state = if path.exists() {
            let raw = fs::read_to_string(path)?;
            serde_json::from_str(&raw)?
        } else {
            InventoryState {
                next_id: 1,
                ..Default::default()
            }
        };
        Ok(Self {
            state: Mutex::new(state),
            snapshot_path: Some(path.to_path_buf()),
        })
    }

    fn lock(&self) -> MutexGuard<'_, InventoryState> {
        self.state.lock().expect("Inventory lock poisoned")
    }

    fn persist(&self, state: &InventoryState) -> Result<(), StoreError> {
        if let Some(path) = &self.snapshot_path {
            let raw = serde_json::to_string_pretty(state)?;
            fs::write(path, raw)?;
        }
        Ok(())
    }

    /// Registers an uploaded photo and returns the stored record. Pairing
    /// is not touched here; callers run [`reconcile_pairs`] after any
    /// inventory change while pairing is enabled.
    ///
    /// [`reconcile_pairs`]: PhotoInventory::reconcile_pairs
    pub fn add_photo(&self, new: NewPhoto) -> Result<Photo, StoreError> {
        let mut state = self.lock();
        let id = state.next_id;
        state.next_id += 1;
        let photo = Photo {
            id,
            filename: new.filename,
            original_filename: new.original_filename,
            file_hash: new.file_hash,
            upload_timestamp: new.upload_timestamp.unwrap_or_else(Utc::now),
            size: new.size,
            width: new.width,
            height: new.height,
            paired_photo_id: None,
        };
        state.photos.insert(id, photo.clone());
        self.persist(&state)?;
        log::info!(
            "Photo {} registered ({}x{}, '{}')",
            id,
            photo.width,
            photo.height,
            photo.original_filename
        );
        Ok(photo)
    }

    /// Deletes a photo. A paired partner is unpaired in the same step and
    /// re-enters the unpaired pool for the next recomputation.
    pub fn delete_photo(&self, id: i64) -> Result<Photo, InventoryError> {
        let mut state = self.lock();
        let photo = state
            .photos
            .remove(&id)
            .ok_or(InventoryError::UnknownPhoto(id))?;
        if let Some(partner_id) = photo.paired_photo_id {
            if let Some(partner) = state.photos.get_mut(&partner_id) {
                partner.paired_photo_id = None;
            }
        }
        self.persist(&state)?;
        log::info!("Photo {} deleted", id);
        Ok(photo)
    }

    pub fn photo(&self, id: i64) -> Option<Photo> {
        self.lock().photos.get(&id).cloned()
    }

    /// All photos in upload order (ties broken by id).
    pub fn all_photos(&self) -> Vec<Photo> {
        let state = self.lock();
        let mut photos: Vec<Photo> = state.photos.values().cloned().collect();
        photos.sort_by_key(|p| (p.upload_timestamp, p.id));
        photos
    }

    pub fn stats(&self) -> PhotoStats {
        let state = self.lock();
        PhotoStats {
            total: state.photos.len(),
            portraits: state.photos.values().filter(|p| p.is_portrait()).count(),
            paired: state
                .photos
                .values()
                .filter(|p| p.paired_photo_id.is_some())
                .count(),
            total_size_bytes: state.photos.values().map(|p| p.size).sum(),
        }
    }

    /// Runs the full pairing reconciliation: the complete next pairing
    /// assignment is computed, validated for symmetry and single-reference,
    /// and swapped in wholesale. On a validation failure nothing is applied
    /// and the previous valid pairing stays in place.
    pub fn reconcile_pairs(&self) -> Result<Vec<(i64, i64)>, InventoryError> {
        let mut state = self.lock();
        let next = pairing::plan(&state.photos);
        pairing::validate(&state.photos, &next)?;
        let formed = pairing::new_pairs(&state.photos, &next);
        for (id, partner) in &next {
            if let Some(photo) = state.photos.get_mut(id) {
                photo.paired_photo_id = *partner;
            }
        }
        self.persist(&state)?;
        for (a, b) in &formed {
            log::info!("Paired photos {} and {}", a, b);
        }
        Ok(formed)
    }

    /// Dissolves every pair without deleting photos. Used when portrait
    /// pairing is disabled; re-enabling recomputes from scratch.
    pub fn dissolve_pairs(&self) -> Result<usize, StoreError> {
        let mut state = self.lock();
        let mut dissolved = 0;
        for photo in state.photos.values_mut() {
            if photo.paired_photo_id.take().is_some() {
                dissolved += 1;
            }
        }
        self.persist(&state)?;
        if dissolved > 0 {
            log::info!("Dissolved {} pair side(s)", dissolved);
        }
        Ok(dissolved / 2)
    }

    /// Manually unpairs one photo, nulling both sides.
    pub fn unpair_photo(&self, id: i64) -> Result<bool, InventoryError> {
        let mut state = self.lock();
        let partner_id = match state.photos.get(&id) {
            Some(photo) => photo.paired_photo_id,
            None => return Err(InventoryError::UnknownPhoto(id)),
        };
        let Some(partner_id) = partner_id else {
            return Ok(false);
        };
        if let Some(photo) = state.photos.get_mut(&id) {
            photo.paired_photo_id = None;
        }
        if let Some(partner) = state.photos.get_mut(&partner_id) {
            partner.paired_photo_id = None;
        }
        self.persist(&state)?;
        log::info!("Unpaired photos {} and {}", id, partner_id);
        Ok(true)
    }

    /// Manually pairs two portrait photos, dissolving any pairs either one
    /// was part of first.
    pub fn pair_photos(&self, a: i64, b: i64) -> Result<(), InventoryError> {
        if a == b {
            return Err(InventoryError::PairingInconsistency {
                photo_id: a,
                detail: "a photo cannot pair with itself".to_string(),
            });
        }
        let mut state = self.lock();
        for id in [a, b] {
            let photo = state
                .photos
                .get(&id)
                .ok_or(InventoryError::UnknownPhoto(id))?;
            if !photo.is_portrait() {
                return Err(InventoryError::NotPortrait(id));
            }
        }
        // Release both photos' previous partners before linking them.
        for id in [a, b] {
            let partner_id = state.photos[&id].paired_photo_id;
            if let Some(partner_id) = partner_id {
                if let Some(partner) = state.photos.get_mut(&partner_id) {
                    partner.paired_photo_id = None;
                }
            }
        }
        if let Some(photo) = state.photos.get_mut(&a) {
            photo.paired_photo_id = Some(b);
        }
        if let Some(photo) = state.photos.get_mut(&b) {
            photo.paired_photo_id = Some(a);
        }
        self.persist(&state)?;
        log::info!("Manually paired photos {} and {}", a, b);
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;

    /// Builds a registration with the given shape and a deterministic
    /// timestamp offset so upload order matches the `minute` argument.
    pub fn new_photo(name: &str, width: u32, height: u32, minute: u32) -> NewPhoto {
        use chrono::TimeZone;
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

    pub fn portrait(name: &str, minute: u32) -> NewPhoto {
        new_photo(name, 1080, 1920, minute)
    }

    pub fn landscape(name: &str, minute: u32) -> NewPhoto {
        new_photo(name, 1920, 1080, minute)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn orientation_is_derived() {
        let inv = PhotoInventory::new_in_memory();
        let p = inv.add_photo(portrait("p", 0)).unwrap();
        let l = inv.add_photo(landscape("l", 1)).unwrap();
        assert!(p.is_portrait());
        assert!(!l.is_portrait());
        // A square photo is not portrait.
        let s = inv.add_photo(new_photo("s", 500, 500, 2)).unwrap();
        assert!(!s.is_portrait());
    }

    #[test]
    fn delete_unknown_photo_fails() {
        let inv = PhotoInventory::new_in_memory();
        assert!(matches!(
            inv.delete_photo(7),
            Err(InventoryError::UnknownPhoto(7))
        ));
    }

    #[test]
    fn delete_cascades_unpair() {
        let inv = PhotoInventory::new_in_memory();
        let p1 = inv.add_photo(portrait("p1", 0)).unwrap();
        let p2 = inv.add_photo(portrait("p2", 1)).unwrap();
        inv.reconcile_pairs().unwrap();
        assert_eq!(inv.photo(p1.id).unwrap().paired_photo_id, Some(p2.id));

        inv.delete_photo(p1.id).unwrap();
        let survivor = inv.photo(p2.id).unwrap();
        assert_eq!(survivor.paired_photo_id, None);
    }

    #[test]
    fn manual_pair_rejects_landscape() {
        let inv = PhotoInventory::new_in_memory();
        let p = inv.add_photo(portrait("p", 0)).unwrap();
        let l = inv.add_photo(landscape("l", 1)).unwrap();
        assert!(matches!(
            inv.pair_photos(p.id, l.id),
            Err(InventoryError::NotPortrait(_))
        ));
        assert_eq!(inv.photo(p.id).unwrap().paired_photo_id, None);
    }

    #[test]
    fn manual_pair_releases_previous_partners() {
        let inv = PhotoInventory::new_in_memory();
        let p1 = inv.add_photo(portrait("p1", 0)).unwrap();
        let p2 = inv.add_photo(portrait("p2", 1)).unwrap();
        let p3 = inv.add_photo(portrait("p3", 2)).unwrap();
        inv.pair_photos(p1.id, p2.id).unwrap();
        inv.pair_photos(p1.id, p3.id).unwrap();
        assert_eq!(inv.photo(p1.id).unwrap().paired_photo_id, Some(p3.id));
        assert_eq!(inv.photo(p2.id).unwrap().paired_photo_id, None);
        assert_eq!(inv.photo(p3.id).unwrap().paired_photo_id, Some(p1.id));
    }

    #[test]
    fn stats_count_pairs_and_sizes() {
        let inv = PhotoInventory::new_in_memory();
        inv.add_photo(portrait("p1", 0)).unwrap();
        inv.add_photo(portrait("p2", 1)).unwrap();
        inv.add_photo(landscape("l1", 2)).unwrap();
        inv.reconcile_pairs().unwrap();
        let stats = inv.stats();
        assert_eq!(stats.total, 3);
        assert_eq!(stats.portraits, 2);
        assert_eq!(stats.paired, 2);
        assert_eq!(stats.total_size_bytes, 3000);
    }

    #[test]
    fn snapshot_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("photos.json");
        let (p1_id, p2_id);
        {
            let inv = PhotoInventory::open(&path).unwrap();
            p1_id = inv.add_photo(portrait("p1", 0)).unwrap().id;
            p2_id = inv.add_photo(portrait("p2", 1)).unwrap().id;
            inv.reconcile_pairs().unwrap();
        }
        let reopened = PhotoInventory::open(&path).unwrap();
        assert_eq!(reopened.all_photos().len(), 2);
        assert_eq!(reopened.photo(p1_id).unwrap().paired_photo_id, Some(p2_id));
        // Ids keep advancing after a reload.
        let p3 = reopened.add_photo(portrait("p3", 2)).unwrap();
        assert!(p3.id > p2_id);
    }
}
