use crate::backend::{KvBackend, KvPair, Result, StorageError, StorageStats};
use std::collections::BTreeMap;
use tracing::{debug, trace};

type Entries = BTreeMap<Vec<u8>, Vec<u8>>;

/// In-memory ordered store.
///
/// Transactions snapshot the whole map on `begin` and restore it on
/// `rollback`, which keeps nested savepoints trivially correct.
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    entries: Entries,
    transaction_backups: Vec<Entries>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// All entries in key order.
    pub fn entries(&self) -> impl Iterator<Item = (&Vec<u8>, &Vec<u8>)> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl KvBackend for MemoryBackend {
    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.entries.get(key).cloned())
    }

    fn put(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        trace!(key = %hex::encode(key), value_len = value.len(), "💾 put");
        self.entries.insert(key.to_vec(), value.to_vec());
        Ok(())
    }

    fn delete(&mut self, key: &[u8]) -> Result<()> {
        trace!(key = %hex::encode(key), "🗑️ delete");
        self.entries.remove(key);
        Ok(())
    }

    fn scan_prefix<'a>(&'a self, prefix: &[u8]) -> Result<Box<dyn Iterator<Item = KvPair> + 'a>> {
        let owned = prefix.to_vec();
        let iter = self
            .entries
            .range(owned.clone()..)
            .take_while(move |(k, _)| k.starts_with(&owned))
            .map(|(k, v)| (k.clone(), v.clone()));
        Ok(Box::new(iter))
    }

    fn begin_transaction(&mut self) -> Result<()> {
        self.transaction_backups.push(self.entries.clone());
        debug!(depth = self.transaction_backups.len(), "📝 Transaction started");
        Ok(())
    }

    fn commit_transaction(&mut self) -> Result<()> {
        self.transaction_backups
            .pop()
            .ok_or(StorageError::NoTransaction)?;
        debug!(depth = self.transaction_backups.len(), "✅ Transaction committed");
        Ok(())
    }

    fn rollback_transaction(&mut self) -> Result<()> {
        let backup = self
            .transaction_backups
            .pop()
            .ok_or(StorageError::NoTransaction)?;
        self.entries = backup;
        debug!(depth = self.transaction_backups.len(), "↩️ Transaction rolled back");
        Ok(())
    }

    fn transaction_depth(&self) -> usize {
        self.transaction_backups.len()
    }

    fn stats(&self) -> StorageStats {
        StorageStats {
            entry_count: self.entries.len(),
            key_bytes: self.entries.keys().map(Vec::len).sum(),
            value_bytes: self.entries.values().map(Vec::len).sum(),
        }
    }
}
