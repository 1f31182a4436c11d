//! # Display Order
//!
//! Turns the live inventory into an ordered sequence of display units --
//! one unpaired photo, or one portrait pair, each counted exactly once per
//! cycle. The random mode keeps one full permutation per display cycle and
//! only reseeds when the unit set changes or the cycle is restarted, so
//! polling clients never see the order churn mid-cycle.

use crate::configs::settings::SortMode;
use crate::core::inventory::Photo;
use chrono::{DateTime, Utc};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::Mutex;

/// One atomic item of the display sequence.
#[derive(Debug, Clone, PartialEq)]
pub enum DisplayUnit {
    Single(Photo),
    /// Earlier photo first.
    Pair(Photo, Photo),
}

impl DisplayUnit {
    /// Stable identity of the unit: the smaller photo id it contains.
    pub fn key(&self) -> i64 {
        match self {
            DisplayUnit::Single(p) => p.id,
            DisplayUnit::Pair(a, b) => a.id.min(b.id),
        }
    }

    /// A pair sorts by its earlier photo's timestamp.
    pub fn effective_timestamp(&self) -> DateTime<Utc> {
        match self {
            DisplayUnit::Single(p) => p.upload_timestamp,
            DisplayUnit::Pair(a, _) => a.upload_timestamp,
        }
    }

    pub fn photos(&self) -> Vec<&Photo> {
        match self {
            DisplayUnit::Single(p) => vec![p],
            DisplayUnit::Pair(a, b) => vec![a, b],
        }
    }
}

/// Folds pairs into units. `photos` must already be in upload order, which
/// puts the earlier photo first within each pair.
fn build_units(photos: &[Photo]) -> Vec<DisplayUnit> {
    let by_id: HashMap<i64, &Photo> = photos.iter().map(|p| (p.id, p)).collect();
    let mut consumed: Vec<i64> = Vec::new();
    let mut units = Vec::new();
    for photo in photos {
        if consumed.contains(&photo.id) {
            continue;
        }
        match photo.paired_photo_id.and_then(|id| by_id.get(&id)) {
            Some(partner) => {
                consumed.push(partner.id);
                units.push(DisplayUnit::Pair(photo.clone(), (*partner).clone()));
            }
            None => {
                if let Some(missing) = photo.paired_photo_id {
                    // A dangling reference should have been caught at
                    // recompute time; keep the photo on screen regardless.
                    log::error!(
                        "Photo {} references missing partner {}; displaying as single",
                        photo.id,
                        missing
                    );
                }
                units.push(DisplayUnit::Single(photo.clone()));
            }
        }
    }
    units
}

struct RandomCycle {
    /// Canonical unit set (key + partner) the permutation was drawn for.
    fingerprint: Vec<(i64, Option<i64>)>,
    order: Vec<i64>,
}

fn fingerprint_of(units: &[DisplayUnit]) -> Vec<(i64, Option<i64>)> {
    units
        .iter()
        .map(|u| match u {
            DisplayUnit::Single(p) => (p.id, None),
            DisplayUnit::Pair(a, b) => (a.id.min(b.id), Some(a.id.max(b.id))),
        })
        .collect()
}

/// Computes the display manifest order for the current settings.
#[derive(Default)]
pub struct SortingEngine {
    cycle: Mutex<Option<RandomCycle>>,
}

impl SortingEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Orders the live display units per `mode`. `photos` must come from
    /// [`PhotoInventory::all_photos`], i.e. ascending upload order.
    ///
    /// [`PhotoInventory::all_photos`]: crate::core::inventory::PhotoInventory::all_photos
    pub fn order(&self, photos: &[Photo], mode: SortMode) -> Vec<DisplayUnit> {
        let mut units = build_units(photos);
        match mode {
            // Already ascending by upload order, stable.
            SortMode::Sequential => units,
            SortMode::Oldest => {
                units.sort_by_key(|u| (u.effective_timestamp(), u.key()));
                units
            }
            SortMode::Newest => {
                units.sort_by_key(|u| (u.effective_timestamp(), u.key()));
                units.reverse();
                units
            }
            SortMode::Random => self.random_order(units),
        }
    }

    /// Forces a fresh permutation at the next random-mode manifest.
    pub fn restart_cycle(&self) {
        *self.cycle.lock().expect("Sorting cycle lock poisoned") = None;
    }

    fn random_order(&self, units: Vec<DisplayUnit>) -> Vec<DisplayUnit> {
        let fingerprint = fingerprint_of(&units);
        let mut cycle = self.cycle.lock().expect("Sorting cycle lock poisoned");
        let stale = match cycle.as_ref() {
            Some(current) => current.fingerprint != fingerprint,
            None => true,
        };
        if stale {
            let mut order: Vec<i64> = units.iter().map(DisplayUnit::key).collect();
            order.shuffle(&mut rand::rng());
            log::debug!("Random display cycle reseeded ({} units)", order.len());
            *cycle = Some(RandomCycle { fingerprint, order });
        }
        let permutation = cycle.as_ref().expect("cycle seeded above");
        let mut by_key: HashMap<i64, DisplayUnit> =
            units.into_iter().map(|u| (u.key(), u)).collect();
        permutation
            .order
            .iter()
            .filter_map(|key| by_key.remove(key))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::inventory::test_support::{landscape, portrait};
    use crate::core::inventory::PhotoInventory;

    fn keys(units: &[DisplayUnit]) -> Vec<i64> {
        units.iter().map(DisplayUnit::key).collect()
    }

    #[test]
    fn sequential_follows_upload_order_every_cycle() {
        let inv = PhotoInventory::new_in_memory();
        let a = inv.add_photo(landscape("a", 0)).unwrap();
        let b = inv.add_photo(landscape("b", 1)).unwrap();
        let c = inv.add_photo(landscape("c", 2)).unwrap();
        let engine = SortingEngine::new();
        for _ in 0..3 {
            let units = engine.order(&inv.all_photos(), SortMode::Sequential);
            assert_eq!(keys(&units), vec![a.id, b.id, c.id]);
        }
    }

    #[test]
    fn newest_is_exact_reverse_of_oldest() {
        let inv = PhotoInventory::new_in_memory();
        for (name, minute) in [("a", 0), ("b", 1), ("c", 2), ("d", 3)] {
            inv.add_photo(landscape(name, minute)).unwrap();
        }
        let engine = SortingEngine::new();
        let photos = inv.all_photos();
        let oldest = keys(&engine.order(&photos, SortMode::Oldest));
        let mut newest = keys(&engine.order(&photos, SortMode::Newest));
        newest.reverse();
        assert_eq!(oldest, newest);
    }

    #[test]
    fn pair_sorts_by_its_earlier_photo() {
        let inv = PhotoInventory::new_in_memory();
        let p1 = inv.add_photo(portrait("p1", 0)).unwrap();
        let l1 = inv.add_photo(landscape("l1", 1)).unwrap();
        let p2 = inv.add_photo(portrait("p2", 2)).unwrap();
        inv.reconcile_pairs().unwrap();

        let engine = SortingEngine::new();
        let units = engine.order(&inv.all_photos(), SortMode::Oldest);
        // The (p1,p2) pair takes p1's timestamp and therefore leads.
        assert_eq!(keys(&units), vec![p1.id, l1.id]);
        match &units[0] {
            DisplayUnit::Pair(first, second) => {
                assert_eq!(first.id, p1.id);
                assert_eq!(second.id, p2.id);
            }
            other => panic!("expected pair, got {other:?}"),
        }

        let newest = engine.order(&inv.all_photos(), SortMode::Newest);
        assert_eq!(keys(&newest), vec![l1.id, p1.id]);
    }

    #[test]
    fn every_unit_appears_exactly_once_in_all_modes() {
        let inv = PhotoInventory::new_in_memory();
        for (name, minute) in [("p1", 0), ("p2", 1), ("p3", 2)] {
            inv.add_photo(portrait(name, minute)).unwrap();
        }
        for (name, minute) in [("l1", 3), ("l2", 4)] {
            inv.add_photo(landscape(name, minute)).unwrap();
        }
        inv.reconcile_pairs().unwrap();
        let engine = SortingEngine::new();
        let photos = inv.all_photos();
        for mode in [
            SortMode::Sequential,
            SortMode::Oldest,
            SortMode::Newest,
            SortMode::Random,
        ] {
            let units = engine.order(&photos, mode);
            // (p1,p2) pair + p3 + l1 + l2.
            assert_eq!(units.len(), 4, "mode {mode:?}");
            let mut seen: Vec<i64> = units
                .iter()
                .flat_map(|u| u.photos().into_iter().map(|p| p.id))
                .collect();
            seen.sort();
            assert_eq!(seen.len(), 5, "mode {mode:?}");
            seen.dedup();
            assert_eq!(seen.len(), 5, "mode {mode:?}");
        }
    }

    #[test]
    fn random_permutation_is_stable_within_a_cycle() {
        let inv = PhotoInventory::new_in_memory();
        for minute in 0..8 {
            inv.add_photo(landscape(&format!("l{minute}"), minute)).unwrap();
        }
        let engine = SortingEngine::new();
        let photos = inv.all_photos();
        let first = keys(&engine.order(&photos, SortMode::Random));
        for _ in 0..5 {
            assert_eq!(keys(&engine.order(&photos, SortMode::Random)), first);
        }
    }

    #[test]
    fn random_reseeds_when_unit_set_changes() {
        let inv = PhotoInventory::new_in_memory();
        for minute in 0..4 {
            inv.add_photo(landscape(&format!("l{minute}"), minute)).unwrap();
        }
        let engine = SortingEngine::new();
        let before = keys(&engine.order(&inv.all_photos(), SortMode::Random));
        assert_eq!(before.len(), 4);

        let extra = inv.add_photo(landscape("l9", 9)).unwrap();
        let after = keys(&engine.order(&inv.all_photos(), SortMode::Random));
        assert_eq!(after.len(), 5);
        assert!(after.contains(&extra.id));
    }

    #[test]
    fn restart_cycle_reshuffles_eventually() {
        let inv = PhotoInventory::new_in_memory();
        for minute in 0..10 {
            inv.add_photo(landscape(&format!("l{minute}"), minute)).unwrap();
        }
        let engine = SortingEngine::new();
        let photos = inv.all_photos();
        let first = keys(&engine.order(&photos, SortMode::Random));
        // With 10! permutations, ten restarts virtually never all
        // reproduce the same order.
        let reshuffled = (0..10).any(|_| {
            engine.restart_cycle();
            keys(&engine.order(&photos, SortMode::Random)) != first
        });
        assert!(reshuffled);
    }
}
