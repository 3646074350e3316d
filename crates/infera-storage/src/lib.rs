//! Ordered key-value storage for the emissions keeper.
//!
//! The keeper sees the store only through [`KvBackend`]; typed access goes
//! through [`Table`], which prefixes every key with a Blake3-derived table id
//! and encodes composite keys so that byte order matches key order.

pub mod backend;
pub mod key;
pub mod key_prefix;
pub mod memory;
pub mod snapshot;
pub mod table;

pub use backend::{with_transaction, KvBackend, KvPair, Result, StorageError, StorageStats};
pub use key::KeyCodec;
pub use key_prefix::{hash_prefix, prefix_name, PREFIX_LEN};
pub use memory::MemoryBackend;
pub use snapshot::{state_hash, StoreSnapshot};
pub use table::{Item, Table};
