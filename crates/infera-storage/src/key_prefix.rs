//! Table key prefixes derived with Blake3.
//!
//! Every table key starts with the first 10 bytes of `blake3(table_name)`,
//! so prefix scans of one table never touch another.

/// Fixed prefix length for all table keys
pub const PREFIX_LEN: usize = 10;

/// Hash a table name to a fixed 10-byte array
pub fn hash_prefix(name: &str) -> [u8; PREFIX_LEN] {
    let hash = blake3::hash(name.as_bytes());
    let mut result = [0u8; PREFIX_LEN];
    result.copy_from_slice(&hash.as_bytes()[..PREFIX_LEN]);
    result
}

/// Find which of `names` produced `prefix` (for debugging/tooling)
pub fn prefix_name<'a>(prefix: &[u8], names: &[&'a str]) -> Option<&'a str> {
    if prefix.len() < PREFIX_LEN {
        return None;
    }
    names
        .iter()
        .copied()
        .find(|name| hash_prefix(name)[..] == prefix[..PREFIX_LEN])
}
