use async_trait::async_trait;

use crate::error::StorageError;
use crate::record::StepSnapshotRecord;

/// Key/value store for multi-step snapshots.
///
/// ## Semantics
///
/// - `load` of a key that was never saved (or was cleared) is `Ok(None)`,
///   never an error: an absent key means a fresh start.
/// - `save` replaces any previous record under the key.
/// - `clear` of an absent key succeeds.
/// - Keys are independent of each other.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` so a store can be shared by a
/// state machine used across async tasks.
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn load(&self, key: &str) -> Result<Option<StepSnapshotRecord>, StorageError>;

    async fn save(&self, key: &str, record: &StepSnapshotRecord) -> Result<(), StorageError>;

    async fn clear(&self, key: &str) -> Result<(), StorageError>;
}
