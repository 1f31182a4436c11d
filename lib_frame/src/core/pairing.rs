//! # Portrait Pairing Engine
//!
//! Plans the full next pairing assignment for the inventory. The rule:
//! walk the currently portrait-oriented, unpaired photos in upload order
//! (ties by id) and pair them consecutively, 1st with 2nd, 3rd with 4th; a
//! trailing odd photo stays unpaired until a future portrait arrives.
//! Landscape photos never pair, and existing pairs are carried over
//! untouched, which makes the recompute idempotent on an unchanged
//! inventory.
//!
//! The plan is a complete id -> partner map so the caller can validate it
//! and swap it in as one unit while holding the inventory guard.

use crate::core::inventory::Photo;
use crate::errors::InventoryError;
use std::collections::BTreeMap;

/// The complete next pairing assignment, one entry per live photo.
pub type PairingPlan = BTreeMap<i64, Option<i64>>;

/// Computes the next assignment from the current inventory state.
pub fn plan(photos: &BTreeMap<i64, Photo>) -> PairingPlan {
    let mut next: PairingPlan = photos
        .iter()
        .map(|(id, photo)| (*id, photo.paired_photo_id))
        .collect();

    let mut pool: Vec<&Photo> = photos
        .values()
        .filter(|p| p.is_portrait() && p.paired_photo_id.is_none())
        .collect();
    pool.sort_by_key(|p| (p.upload_timestamp, p.id));

    for chunk in pool.chunks(2) {
        if let [a, b] = chunk {
            next.insert(a.id, Some(b.id));
            next.insert(b.id, Some(a.id));
        }
    }
    next
}

/// Checks the invariants of a planned assignment before it is applied:
/// every referenced partner exists, points back (symmetry, which also rules
/// out a photo being referenced by a third), is distinct, and both sides
/// are portrait-oriented.
pub fn validate(photos: &BTreeMap<i64, Photo>, next: &PairingPlan) -> Result<(), InventoryError> {
    for (&id, &partner) in next {
        let Some(partner_id) = partner else { continue };
        if partner_id == id {
            return Err(InventoryError::PairingInconsistency {
                photo_id: id,
                detail: "photo paired with itself".to_string(),
            });
        }
        let Some(&back) = next.get(&partner_id) else {
            return Err(InventoryError::PairingInconsistency {
                photo_id: id,
                detail: format!("partner {partner_id} does not exist"),
            });
        };
        if back != Some(id) {
            return Err(InventoryError::PairingInconsistency {
                photo_id: id,
                detail: format!("partner {partner_id} does not point back"),
            });
        }
        for side in [id, partner_id] {
            if photos.get(&side).is_some_and(|p| !p.is_portrait()) {
                return Err(InventoryError::PairingInconsistency {
                    photo_id: side,
                    detail: "landscape photo in a pair".to_string(),
                });
            }
        }
    }
    Ok(())
}

/// The pairs present in `next` but not in the current state, each reported
/// once with the lower id first.
pub fn new_pairs(photos: &BTreeMap<i64, Photo>, next: &PairingPlan) -> Vec<(i64, i64)> {
    let mut formed = Vec::new();
    for (&id, &partner) in next {
        let Some(partner_id) = partner else { continue };
        if id < partner_id && photos.get(&id).map(|p| p.paired_photo_id) != Some(Some(partner_id)) {
            formed.push((id, partner_id));
        }
    }
    formed
}
