//! Persisted terminal configuration, a flat key-value view.

pub mod pairing;
mod store;

pub use pairing::{PairingPayload, ParsePairingError};
pub use store::{ConfigError, ConfigStore, FileStore, MemoryStore};

/// Keys used in the persisted config store.
pub mod keys {
    /// backend origin, `host[:port]` without scheme
    pub const ORIGIN: &str = "origin";
    /// tenant (tpos) id
    pub const TENANT_ID: &str = "tposId";
    /// admin bearer token
    pub const BEARER: &str = "bearer";
    /// terminal location id
    pub const LOCATION_ID: &str = "locId";
    /// use simulated reader
    pub const SIMULATED: &str = "simulated";
    /// kiosk mode flag
    pub const KIOSK_MODE: &str = "kioskMode";
    /// display timeout saved before kiosk mode overrode it
    pub const SAVED_SCREEN_TIMEOUT_MS: &str = "savedScreenTimeoutMs";
}

/// Whether the store holds all four identity keys.
///
/// This only checks presence, a blank value still passes. Use
/// [`ConnectionConfig::is_complete`] to check values.
pub fn has_saved_config(store: &dyn ConfigStore) -> bool {
    [keys::ORIGIN, keys::TENANT_ID, keys::BEARER, keys::LOCATION_ID]
        .iter()
        .all(|key| store.contains(key))
}

/// Immutable snapshot of the connection related config.
///
/// Every connection or reader attempt takes a fresh snapshot, nothing is cached
/// across retries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionConfig {
    /// backend origin, `host[:port]`
    pub origin: String,
    /// tenant id scoping the event feed
    pub tenant_id: String,
    /// bearer token for backend calls
    pub bearer: String,
    /// terminal location id
    pub location_id: String,
    /// use simulated reader instead of a live one
    pub simulated: bool,
    /// kiosk mode flag, only reported to the host
    pub kiosk_mode: bool,
}

impl ConnectionConfig {
    /// Read a snapshot from store, missing strings become empty.
    pub fn snapshot(store: &dyn ConfigStore) -> Self {
        Self {
            origin: store.get_string(keys::ORIGIN).unwrap_or_default(),
            tenant_id: store.get_string(keys::TENANT_ID).unwrap_or_default(),
            bearer: store.get_string(keys::BEARER).unwrap_or_default(),
            location_id: store.get_string(keys::LOCATION_ID).unwrap_or_default(),
            simulated: store
                .get_bool(keys::SIMULATED)
                .unwrap_or(cfg!(debug_assertions)),
            kiosk_mode: store.get_bool(keys::KIOSK_MODE).unwrap_or_default(),
        }
    }

    /// Origin and tenant id are set, enough to open the event feed.
    pub fn has_feed_identity(&self) -> bool {
        !self.origin.trim().is_empty() && !self.tenant_id.trim().is_empty()
    }

    /// All four identity fields are non-blank.
    pub fn is_complete(&self) -> bool {
        self.has_feed_identity()
            && !self.bearer.trim().is_empty()
            && !self.location_id.trim().is_empty()
    }
}
