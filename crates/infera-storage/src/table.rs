use crate::backend::{KvBackend, Result, StorageError};
use crate::key::KeyCodec;
use crate::key_prefix::{hash_prefix, PREFIX_LEN};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use tracing::debug;

/// A typed view over one key range of a [`KvBackend`].
///
/// Keys are `prefix || K::encode_key`, values are bincode-encoded `V`.
pub struct Table<K, V> {
    name: &'static str,
    prefix: [u8; PREFIX_LEN],
    _marker: PhantomData<fn() -> (K, V)>,
}

impl<K, V> Clone for Table<K, V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name,
            prefix: self.prefix,
            _marker: PhantomData,
        }
    }
}

impl<K, V> std::fmt::Debug for Table<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Table")
            .field("name", &self.name)
            .field("prefix", &hex::encode(self.prefix))
            .finish()
    }
}

impl<K, V> Table<K, V>
where
    K: KeyCodec + 'static,
    V: Serialize + DeserializeOwned + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            prefix: hash_prefix(name),
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn prefix(&self) -> &[u8; PREFIX_LEN] {
        &self.prefix
    }

    fn full_key<P: KeyCodec>(&self, key: &P) -> Vec<u8> {
        let mut out = self.prefix.to_vec();
        key.encode_key(&mut out);
        out
    }

    fn encode_value(&self, value: &V) -> Result<Vec<u8>> {
        bincode::serialize(value).map_err(|e| StorageError::SerializationError {
            table: self.name,
            reason: e.to_string(),
        })
    }

    fn decode_entry(name: &'static str, raw_key: &[u8], raw_value: &[u8]) -> Result<(K, V)> {
        let mut rest = &raw_key[PREFIX_LEN.min(raw_key.len())..];
        let key = K::decode_key(&mut rest)?;
        if !rest.is_empty() {
            return Err(StorageError::KeyDecode(format!(
                "{} trailing bytes in {} key",
                rest.len(),
                name
            )));
        }
        let value = bincode::deserialize(raw_value).map_err(|e| {
            StorageError::SerializationError {
                table: name,
                reason: e.to_string(),
            }
        })?;
        Ok((key, value))
    }

    pub fn get(&self, backend: &dyn KvBackend, key: &K) -> Result<Option<V>> {
        match backend.get(&self.full_key(key))? {
            Some(raw) => bincode::deserialize(&raw).map(Some).map_err(|e| {
                StorageError::SerializationError {
                    table: self.name,
                    reason: e.to_string(),
                }
            }),
            None => Ok(None),
        }
    }

    pub fn has(&self, backend: &dyn KvBackend, key: &K) -> Result<bool> {
        Ok(backend.get(&self.full_key(key))?.is_some())
    }

    pub fn set(&self, backend: &mut dyn KvBackend, key: &K, value: &V) -> Result<()> {
        let raw = self.encode_value(value)?;
        backend.put(&self.full_key(key), &raw)
    }

    pub fn remove(&self, backend: &mut dyn KvBackend, key: &K) -> Result<()> {
        backend.delete(&self.full_key(key))
    }

    /// Lazily enumerate every record of the table in key order.
    pub fn iter<'a>(
        &self,
        backend: &'a dyn KvBackend,
    ) -> Result<Box<dyn Iterator<Item = Result<(K, V)>> + 'a>> {
        self.iter_prefix(backend, &())
    }

    /// Lazily enumerate records whose key begins with the encoding of `partial`.
    pub fn iter_prefix<'a, P: KeyCodec>(
        &self,
        backend: &'a dyn KvBackend,
        partial: &P,
    ) -> Result<Box<dyn Iterator<Item = Result<(K, V)>> + 'a>> {
        let name = self.name;
        let raw = backend.scan_prefix(&self.full_key(partial))?;
        Ok(Box::new(
            raw.map(move |(k, v)| Self::decode_entry(name, &k, &v)),
        ))
    }

    /// Eagerly collect a prefix range; use before mutating the same table.
    pub fn collect_prefix<P: KeyCodec>(
        &self,
        backend: &dyn KvBackend,
        partial: &P,
    ) -> Result<Vec<(K, V)>> {
        self.iter_prefix(backend, partial)?.collect()
    }

    /// Lazy genesis export of the table.
    pub fn enumerate<'a>(
        &self,
        backend: &'a dyn KvBackend,
    ) -> Result<Box<dyn Iterator<Item = Result<(K, V)>> + 'a>> {
        self.iter(backend)
    }

    /// Replace the table contents with `records`. Returns the number written.
    pub fn restore<I>(&self, backend: &mut dyn KvBackend, records: I) -> Result<usize>
    where
        I: IntoIterator<Item = (K, V)>,
    {
        let cleared = self.clear(backend)?;
        let mut written = 0usize;
        for (key, value) in records {
            self.set(backend, &key, &value)?;
            written += 1;
        }
        debug!(table = self.name, cleared, written, "🧬 Table restored");
        Ok(written)
    }

    /// Delete every record of the table. Returns the number removed.
    pub fn clear(&self, backend: &mut dyn KvBackend) -> Result<usize> {
        let keys: Vec<Vec<u8>> = backend
            .scan_prefix(&self.prefix)?
            .map(|(k, _)| k)
            .collect();
        for key in &keys {
            backend.delete(key)?;
        }
        Ok(keys.len())
    }

    pub fn count(&self, backend: &dyn KvBackend) -> Result<usize> {
        Ok(backend.scan_prefix(&self.prefix)?.count())
    }
}

/// A table holding a single value under the bare prefix.
pub type Item<V> = Table<(), V>;
