//! formwork-storage: persistence for resumable multi-step forms.
//!
//! The engine persists exactly one kind of record, the
//! [`StepSnapshotRecord`], under a caller-chosen key. Backends implement
//! [`StateStore`]; [`MemoryStore`] and [`FileStore`] ship here, and
//! [`conformance::run_conformance_suite`] checks any other backend against
//! the same contract.

pub mod conformance;
mod error;
mod file;
mod memory;
mod record;
mod traits;

pub use error::StorageError;
pub use file::FileStore;
pub use memory::MemoryStore;
pub use record::{now_rfc3339, StepSnapshotRecord};
pub use traits::StateStore;
