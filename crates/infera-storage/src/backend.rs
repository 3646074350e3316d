use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    #[error("Serialization error in table {table}: {reason}")]
    SerializationError { table: &'static str, reason: String },

    #[error("Malformed key: {0}")]
    KeyDecode(String),

    #[error("No transaction in progress")]
    NoTransaction,

    #[error("Snapshot integrity check failed: expected {expected}, got {actual}")]
    SnapshotMismatch { expected: String, actual: String },

    #[error("Storage backend error: {0}")]
    BackendError(String),
}

pub type Result<T> = std::result::Result<T, StorageError>;

pub type KvPair = (Vec<u8>, Vec<u8>);

/// Ordered byte-keyed store used by the keeper.
///
/// Iteration is always in ascending byte order of the keys, which makes every
/// scan deterministic across nodes. Transactions nest: each `begin` must be
/// matched by exactly one `commit` or `rollback`.
pub trait KvBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>>;

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()>;

    fn delete(&mut self, key: &[u8]) -> Result<()>;

    /// Lazily iterate all entries whose key starts with `prefix`.
    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> Result<Box<dyn Iterator<Item = KvPair> + 'a>>;

    fn begin_transaction(&mut self) -> Result<()>;

    fn commit_transaction(&mut self) -> Result<()>;

    fn rollback_transaction(&mut self) -> Result<()>;

    /// Depth of the open transaction stack.
    fn transaction_depth(&self) -> usize;

    fn stats(&self) -> StorageStats;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StorageStats {
    pub entry_count: usize,
    pub key_bytes: usize,
    pub value_bytes: usize,
}

/// Run `f` inside a transaction, committing on success and rolling back on error.
pub fn with_transaction<T, E, F>(backend: &mut dyn KvBackend, f: F) -> std::result::Result<T, E>
where
    F: FnOnce(&mut dyn KvBackend) -> std::result::Result<T, E>,
    E: From<StorageError>,
{
    backend.begin_transaction()?;
    match f(&mut *backend) {
        Ok(value) => {
            backend.commit_transaction()?;
            Ok(value)
        }
        Err(err) => {
            backend.rollback_transaction()?;
            Err(err)
        }
    }
}
