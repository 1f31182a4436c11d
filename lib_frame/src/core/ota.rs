//! # OTA Version Comparison
//!
//! Flags clients whose reported code versions differ from the latest ones
//! configured in the settings. Comparison is exact string equality, not
//! semantic ordering: a client reporting a "newer" but differently
//! formatted string is still flagged as mismatched. That is a documented
//! limitation, kept deliberately.

use crate::core::registry::ClientRecord;
use serde::Serialize;
use std::collections::BTreeMap;

/// Client file whose version the display reports.
pub const DISPLAY_FILE: &str = "display.py";
/// Client file whose version the sync agent reports.
pub const SYNC_FILE: &str = "sync_client.py";

/// Up-to-date verdict for one client code file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileVersionStatus {
    pub filename: String,
    pub reported: String,
    /// Latest known version, absent when the settings do not track the file.
    pub latest: Option<String>,
    pub up_to_date: bool,
}

/// Compares one client's reported versions against the latest versions
/// from the settings, one verdict per tracked file.
pub fn compare(
    record: &ClientRecord,
    latest_versions: &BTreeMap<String, String>,
) -> Vec<FileVersionStatus> {
    [
        (DISPLAY_FILE, &record.display_version),
        (SYNC_FILE, &record.sync_version),
    ]
    .into_iter()
    .map(|(filename, reported)| {
        let latest = latest_versions.get(filename).cloned();
        let up_to_date = latest.as_deref() == Some(reported.as_str());
        FileVersionStatus {
            filename: filename.to_string(),
            reported: reported.clone(),
            latest,
            up_to_date,
        }
    })
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn record(display: &str, sync: &str) -> ClientRecord {
        ClientRecord {
            client_id: "frame-01".to_string(),
            display_version: display.to_string(),
            sync_version: sync.to_string(),
            last_update: Utc::now(),
            pending_command: None,
        }
    }

    fn latest(display: &str, sync: &str) -> BTreeMap<String, String> {
        let mut map = BTreeMap::new();
        map.insert(DISPLAY_FILE.to_string(), display.to_string());
        map.insert(SYNC_FILE.to_string(), sync.to_string());
        map
    }

    #[test]
    fn exact_match_is_up_to_date() {
        let statuses = compare(&record("1.0.5", "1.0.5"), &latest("1.0.5", "1.0.5"));
        assert!(statuses.iter().all(|s| s.up_to_date));
    }

    #[test]
    fn mismatch_is_flagged_per_file() {
        let statuses = compare(&record("1.0.4", "1.0.5"), &latest("1.0.5", "1.0.5"));
        assert!(!statuses[0].up_to_date);
        assert!(statuses[1].up_to_date);
    }

    #[test]
    fn formatted_newer_string_is_still_a_mismatch() {
        // No semantic ordering: "v1.0.6" vs "1.0.5" is just "different".
        let statuses = compare(&record("v1.0.6", "1.0.5"), &latest("1.0.5", "1.0.5"));
        assert!(!statuses[0].up_to_date);
    }

    #[test]
    fn untracked_file_is_never_up_to_date() {
        let statuses = compare(&record("1.0.5", "1.0.5"), &BTreeMap::new());
        assert!(statuses.iter().all(|s| !s.up_to_date && s.latest.is_none()));
    }
}
