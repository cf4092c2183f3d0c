//! Primary/secondary store composition
//!
//! Writes go to the primary store. When the primary fails, the failure is
//! logged and the value is written to the secondary instead. A value held
//! by the secondary is therefore always newer than the primary's copy: reads
//! prefer it and replay it into the primary once the primary accepts writes
//! again.

use super::{SessionStore, SharedStore, StorageError};

pub struct FallbackStore {
    primary: SharedStore,
    secondary: SharedStore,
}

impl FallbackStore {
    pub fn new(primary: SharedStore, secondary: SharedStore) -> Self {
        Self { primary, secondary }
    }

    /// Moves a value written during a primary outage back into the primary
    fn replay(&self, key: &str, blob: &str) {
        match self.primary.save(key, blob) {
            Ok(()) => {
                tracing::info!("Replayed {} from fallback store into primary", key);
                if let Err(e) = self.secondary.remove(key) {
                    tracing::warn!("Failed to clear replayed fallback entry {}: {}", key, e);
                }
            }
            Err(e) => tracing::debug!("Primary still unavailable for {}: {}", key, e),
        }
    }
}

impl SessionStore for FallbackStore {
    fn load(&self, key: &str) -> Result<Option<String>, StorageError> {
        match self.secondary.load(key) {
            Ok(Some(blob)) => {
                self.replay(key, &blob);
                return Ok(Some(blob));
            }
            Ok(None) => {}
            Err(e) => tracing::warn!("Fallback store load failed for {}: {}", key, e),
        }
        self.primary.load(key)
    }

    fn save(&self, key: &str, blob: &str) -> Result<(), StorageError> {
        match self.primary.save(key, blob) {
            Ok(()) => {
                // An older copy from an outage must not shadow this write
                if let Err(e) = self.secondary.remove(key) {
                    tracing::warn!("Failed to clear stale fallback entry {}: {}", key, e);
                }
                Ok(())
            }
            Err(e) => {
                tracing::warn!("Primary store save failed for {}, using fallback: {}", key, e);
                self.secondary.save(key, blob)
            }
        }
    }

    fn remove(&self, key: &str) -> Result<(), StorageError> {
        let primary = self.primary.remove(key);
        let secondary = self.secondary.remove(key);
        if let Err(e) = primary {
            tracing::warn!("Primary store remove failed for {}: {}", key, e);
            return secondary;
        }
        secondary
    }
}
