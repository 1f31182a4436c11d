use thiserror::Error;

/// Errors raised while reading or writing a JSON snapshot store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("snapshot I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("snapshot encoding error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// A settings update was rejected. The previous settings remain in effect.
#[derive(Debug, Error)]
pub enum SettingsError {
    /// One of the supplied fields failed validation; nothing was applied.
    #[error("invalid value for '{field}': {reason}")]
    Validation { field: &'static str, reason: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the client registry and command mailbox.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// A command was targeted at a client that never polled. No state change.
    #[error("unknown client '{0}'")]
    UnknownClient(String),
    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Errors raised by the photo inventory and the pairing engine.
#[derive(Debug, Error)]
pub enum InventoryError {
    #[error("unknown photo {0}")]
    UnknownPhoto(i64),
    /// Manual pairing only applies to portrait photos.
    #[error("photo {0} is not portrait-oriented")]
    NotPortrait(i64),
    /// A recompute produced an asymmetric or multiply-referenced pairing.
    /// The recompute was aborted and the previous pairing retained.
    #[error("pairing inconsistency at photo {photo_id}: {detail}")]
    PairingInconsistency { photo_id: i64, detail: String },
    #[error(transparent)]
    Store(#[from] StoreError),
}
