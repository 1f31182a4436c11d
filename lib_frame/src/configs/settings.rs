//! # Display Settings Store
//!
//! The single authoritative configuration object shared by every poll and
//! admin request. All fields are validated on every update: a violation in
//! any supplied field rejects the whole update, so a reader can never
//! observe a partially-applied or out-of-range value. The store is an
//! injectable instance with its own guard, not an ambient global.

use crate::errors::{SettingsError, StoreError};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Background fill around photos that do not cover the display area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MattingMode {
    Auto,
    Black,
    White,
}

/// Ordering policy for the display manifest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortMode {
    Sequential,
    Random,
    Newest,
    Oldest,
}

/// Validated display and environment configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub matting_mode: MattingMode,
    /// Seconds each display unit stays on screen, 5..=300.
    pub display_time: f64,
    /// Seconds per transition, 1..=30 in 0.5 steps.
    pub transition_speed: f64,
    pub sort_mode: SortMode,
    pub enable_portrait_pairs: bool,
    /// Pixel gap between the two photos of a portrait pair, 0..=100.
    pub portrait_gap: u32,
    pub dev_mode: bool,
    /// Address advertised to clients for building photo URLs.
    pub server_address: String,
    pub server_port: u16,
    /// Latest client code versions, keyed by client file name.
    pub client_versions: BTreeMap<String, String>,
}

impl Default for Settings {
    fn default() -> Self {
        let mut client_versions = BTreeMap::new();
        client_versions.insert("display.py".to_string(), "1.0.5".to_string());
        client_versions.insert("sync_client.py".to_string(), "1.0.5".to_string());
        Self {
            matting_mode: MattingMode::White,
            display_time: 15.0,
            transition_speed: 10.0,
            sort_mode: SortMode::Random,
            enable_portrait_pairs: true,
            portrait_gap: 20,
            dev_mode: false,
            server_address: "localhost".to_string(),
            server_port: 5000,
            client_versions,
        }
    }
}

impl Settings {
    fn validate(&self) -> Result<(), SettingsError> {
        if !(5.0..=300.0).contains(&self.display_time) {
            return Err(SettingsError::Validation {
                field: "display_time",
                reason: format!("{} is outside 5..=300 seconds", self.display_time),
            });
        }
        if !(1.0..=30.0).contains(&self.transition_speed) {
            return Err(SettingsError::Validation {
                field: "transition_speed",
                reason: format!("{} is outside 1..=30 seconds", self.transition_speed),
            });
        }
        if ((self.transition_speed * 2.0).round() - self.transition_speed * 2.0).abs() > 1e-9 {
            return Err(SettingsError::Validation {
                field: "transition_speed",
                reason: format!("{} is not a multiple of 0.5", self.transition_speed),
            });
        }
        if self.portrait_gap > 100 {
            return Err(SettingsError::Validation {
                field: "portrait_gap",
                reason: format!("{} is outside 0..=100 pixels", self.portrait_gap),
            });
        }
        if self.server_address.trim().is_empty() {
            return Err(SettingsError::Validation {
                field: "server_address",
                reason: "must not be empty".to_string(),
            });
        }
        if self.server_port == 0 {
            return Err(SettingsError::Validation {
                field: "server_port",
                reason: "must be in 1..=65535".to_string(),
            });
        }
        Ok(())
    }
}

/// A partial settings update. Absent fields keep their current value.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SettingsUpdate {
    pub matting_mode: Option<MattingMode>,
    pub display_time: Option<f64>,
    pub transition_speed: Option<f64>,
    pub sort_mode: Option<SortMode>,
    pub enable_portrait_pairs: Option<bool>,
    pub portrait_gap: Option<u32>,
    pub dev_mode: Option<bool>,
    pub server_address: Option<String>,
    pub server_port: Option<u16>,
    pub client_versions: Option<BTreeMap<String, String>>,
}

impl SettingsUpdate {
    fn apply_to(&self, settings: &mut Settings) {
        if let Some(v) = self.matting_mode {
            settings.matting_mode = v;
        }
        if let Some(v) = self.display_time {
            settings.display_time = v;
        }
        if let Some(v) = self.transition_speed {
            settings.transition_speed = v;
        }
        if let Some(v) = self.sort_mode {
            settings.sort_mode = v;
        }
        if let Some(v) = self.enable_portrait_pairs {
            settings.enable_portrait_pairs = v;
        }
        if let Some(v) = self.portrait_gap {
            settings.portrait_gap = v;
        }
        if let Some(v) = self.dev_mode {
            settings.dev_mode = v;
        }
        if let Some(v) = &self.server_address {
            settings.server_address = v.clone();
        }
        if let Some(v) = self.server_port {
            settings.server_port = v;
        }
        if let Some(v) = &self.client_versions {
            settings.client_versions = v.clone();
        }
    }
}

/// The outcome of a successful update, exposing both generations so callers
/// can apply side effects (pairing toggle) of the transition.
#[derive(Debug, Clone)]
pub struct SettingsChange {
    pub previous: Settings,
    pub current: Settings,
}

impl SettingsChange {
    pub fn pairing_toggled(&self) -> bool {
        self.previous.enable_portrait_pairs != self.current.enable_portrait_pairs
    }

    pub fn sort_mode_changed(&self) -> bool {
        self.previous.sort_mode != self.current.sort_mode
    }
}

pub struct SettingsStore {
    state: Mutex<Settings>,
    path: Option<PathBuf>,
}

impl SettingsStore {
    /// In-memory store seeded with the given settings. Used by tests and
    /// callers that manage persistence themselves.
    pub fn new_in_memory(settings: Settings) -> Self {
        Self {
            state: Mutex::new(settings),
            path: None,
        }
    }

    /// Opens the store backed by a JSON file. A missing file is seeded with
    /// defaults; a present file must parse and validate.
    pub fn open(path: &Path) -> Result<Self, SettingsError> {
        let settings = if path.exists() {
            let raw = fs::read_to_string(path).map_err(StoreError::from)?;
            let settings: Settings = serde_json::from_str(&raw).map_err(StoreError::from)?;
            settings.validate()?;
            settings
        } else {
            let defaults = Settings::default();
            write_snapshot(path, &defaults)?;
            log::info!(
                "Settings file not found at {}. Seeded defaults.",
                path.display()
            );
            defaults
        };
        Ok(Self {
            state: Mutex::new(settings),
            path: Some(path.to_path_buf()),
        })
    }

    /// Current settings. Always a complete, validated value.
    pub fn snapshot(&self) -> Settings {
        self.state.lock().expect("Settings lock poisoned").clone()
    }

    /// Validates and applies a whole update atomically. Any violation
    /// rejects every supplied field; concurrent updates are last-writer-wins
    /// at whole-update granularity.
    pub fn update(&self, delta: SettingsUpdate) -> Result<SettingsChange, SettingsError> {
        let mut state = self.state.lock().expect("Settings lock poisoned");
        let mut candidate = state.clone();
        delta.apply_to(&mut candidate);
        candidate.validate()?;
        if let Some(path) = &self.path {
            write_snapshot(path, &candidate)?;
        }
        let previous = std::mem::replace(&mut *state, candidate.clone());
        log::info!("Settings updated");
        Ok(SettingsChange {
            previous,
            current: candidate,
        })
    }
}

fn write_snapshot(path: &Path, settings: &Settings) -> Result<(), StoreError> {
    let raw = serde_json::to_string_pretty(settings)?;
    fs::write(path, raw)?;
    Ok(())
}
