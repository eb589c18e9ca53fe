/// All errors that can be returned by a [`StateStore`](crate::StateStore)
/// implementation.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The key cannot be used by this backend (empty, or unsafe as a file
    /// name).
    #[error("invalid snapshot key '{0}'")]
    InvalidKey(String),

    /// The stored snapshot could not be encoded or decoded.
    #[error("snapshot for '{key}' could not be (de)serialized: {source}")]
    Serialization {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    /// Filesystem failure in a file-backed store.
    #[error("snapshot I/O failed for '{key}': {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },

    /// A backend-specific storage error.
    #[error("storage backend error: {0}")]
    Backend(String),
}
