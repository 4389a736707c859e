//! Pending Payment Storage
//!
//! The checkout-initiation flow stages a [`PendingPayment`] here; the
//! controller reads it once at start and clears it on success.

use std::path::{Path, PathBuf};
use std::sync::RwLock;

use crate::error::{PaymentError, Result};
use crate::model::PendingPayment;

/// Namespaced key of the staged record
pub const PENDING_PAYMENT_KEY: &str = "paymentInfo";

/// Pending payment storage trait
pub trait PendingPaymentStore: Send + Sync {
    /// Load the staged record. `Ok(None)` when nothing is staged, an error
    /// when something is staged but unusable.
    fn load(&self) -> Result<Option<PendingPayment>>;

    /// Stage a record, replacing any previous one
    fn save(&self, payment: &PendingPayment) -> Result<()>;

    /// Remove the staged record
    fn clear(&self) -> Result<()>;
}

/// In-memory store (for development and tests).
///
/// Keeps the raw JSON text so a corrupted record can be represented.
#[derive(Default)]
pub struct MemoryPendingPaymentStore {
    raw: RwLock<Option<String>>,
}

impl MemoryPendingPaymentStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store seeded with a record
    pub fn with_payment(payment: &PendingPayment) -> Result<Self> {
        let store = Self::new();
        store.save(payment)?;
        Ok(store)
    }

    /// Store seeded with arbitrary text
    pub fn with_raw(raw: impl Into<String>) -> Self {
        Self { raw: RwLock::new(Some(raw.into())) }
    }

    pub fn is_empty(&self) -> bool {
        self.raw.read().map(|raw| raw.is_none()).unwrap_or(true)
    }
}

fn poisoned<T>(_: T) -> PaymentError {
    PaymentError::Storage("pending payment lock poisoned".into())
}

impl PendingPaymentStore for MemoryPendingPaymentStore {
    fn load(&self) -> Result<Option<PendingPayment>> {
        let raw = self.raw.read().map_err(poisoned)?;
        raw.as_deref().map(PendingPayment::from_json).transpose()
    }

    fn save(&self, payment: &PendingPayment) -> Result<()> {
        let json = serde_json::to_string(payment)?;
        *self.raw.write().map_err(poisoned)? = Some(json);
        Ok(())
    }

    fn clear(&self) -> Result<()> {
        *self.raw.write().map_err(poisoned)? = None;
        Ok(())
    }
}

/// File-backed store: one JSON document named after [`PENDING_PAYMENT_KEY`]
pub struct FilePendingPaymentStore {
    path: PathBuf,
}

impl FilePendingPaymentStore {
    /// Store the record inside `dir`
    pub fn new(dir: impl AsRef<Path>) -> Self {
        Self {
            path: dir.as_ref().join(format!("{PENDING_PAYMENT_KEY}.json")),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl PendingPaymentStore for FilePendingPaymentStore {
    fn load(&self) -> Result<Option<PendingPayment>> {
        match std::fs::read_to_string(&self.path) {
            Ok(raw) => PendingPayment::from_json(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(PaymentError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }

    fn save(&self, payment: &PendingPayment) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| PaymentError::Storage(format!("{}: {e}", parent.display())))?;
        }
        let json = serde_json::to_vec_pretty(payment)?;
        std::fs::write(&self.path, json)
            .map_err(|e| PaymentError::Storage(format!("{}: {e}", self.path.display())))
    }

    fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(PaymentError::Storage(format!("{}: {e}", self.path.display()))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> PendingPayment {
        PendingPayment::new("tx-7", 120_000, "user-7").with_tier("3").with_days(90)
    }

    #[test]
    fn test_memory_store_round_trip() {
        let store = MemoryPendingPaymentStore::new();
        assert!(store.load().unwrap().is_none());

        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        store.clear().unwrap();
        assert!(store.is_empty());
        assert!(store.load().unwrap().is_none());
    }

    #[test]
    fn test_memory_store_malformed() {
        let store = MemoryPendingPaymentStore::with_raw("{\"transactionId\":");
        assert!(matches!(store.load(), Err(PaymentError::MalformedRecord(_))));
    }

    #[test]
    fn test_file_store() {
        let dir = std::env::temp_dir().join(format!("payflow-{}", uuid::Uuid::new_v4()));
        let store = FilePendingPaymentStore::new(&dir);
        assert!(store.path().ends_with("paymentInfo.json"));

        assert!(store.load().unwrap().is_none());
        store.save(&sample()).unwrap();
        assert_eq!(store.load().unwrap(), Some(sample()));

        store.clear().unwrap();
        assert!(store.load().unwrap().is_none());
        // clearing twice is fine
        store.clear().unwrap();

        let _ = std::fs::remove_dir_all(&dir);
    }
}
