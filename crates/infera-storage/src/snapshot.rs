use crate::backend::{KvBackend, Result, StorageError};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Raw dump of every store entry, hex-encoded, with an integrity hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreSnapshot {
    pub block_height: u64,
    pub entries: Vec<(String, String)>,
    pub hash: String,
}

impl StoreSnapshot {
    /// Capture the current state of the store
    pub fn capture(backend: &dyn KvBackend, block_height: u64) -> Result<Self> {
        let mut hasher = blake3::Hasher::new();
        let mut entries = Vec::new();
        for (key, value) in backend.scan_prefix(&[])? {
            hash_entry(&mut hasher, &key, &value);
            entries.push((hex::encode(&key), hex::encode(&value)));
        }
        let hash = hasher.finalize().to_hex().to_string();
        info!(
            block_height,
            entry_count = entries.len(),
            hash = %hash,
            "📸 Store snapshot captured"
        );
        Ok(Self {
            block_height,
            entries,
            hash,
        })
    }

    /// Replace the store contents with this snapshot after verifying its hash
    pub fn restore_into(&self, backend: &mut dyn KvBackend) -> Result<()> {
        let mut decoded = Vec::with_capacity(self.entries.len());
        let mut hasher = blake3::Hasher::new();
        for (key_hex, value_hex) in &self.entries {
            let key = hex::decode(key_hex).map_err(|e| StorageError::KeyDecode(e.to_string()))?;
            let value =
                hex::decode(value_hex).map_err(|e| StorageError::BackendError(e.to_string()))?;
            hash_entry(&mut hasher, &key, &value);
            decoded.push((key, value));
        }
        let actual = hasher.finalize().to_hex().to_string();
        if actual != self.hash {
            return Err(StorageError::SnapshotMismatch {
                expected: self.hash.clone(),
                actual,
            });
        }

        let existing: Vec<Vec<u8>> = backend.scan_prefix(&[])?.map(|(k, _)| k).collect();
        for key in &existing {
            backend.delete(key)?;
        }
        for (key, value) in &decoded {
            backend.put(key, value)?;
        }
        info!(
            block_height = self.block_height,
            entry_count = decoded.len(),
            "♻️ Store snapshot restored"
        );
        Ok(())
    }
}

/// Blake3 digest over all entries in key order; equal states hash equally.
pub fn state_hash(backend: &dyn KvBackend) -> Result<String> {
    let mut hasher = blake3::Hasher::new();
    for (key, value) in backend.scan_prefix(&[])? {
        hash_entry(&mut hasher, &key, &value);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

fn hash_entry(hasher: &mut blake3::Hasher, key: &[u8], value: &[u8]) {
    hasher.update(&(key.len() as u64).to_be_bytes());
    hasher.update(key);
    hasher.update(&(value.len() as u64).to_be_bytes());
    hasher.update(value);
}
