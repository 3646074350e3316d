use crate::error::{Result, TypesError};
use bech32::{Bech32, Hrp};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Human-readable part of every account address on the chain.
pub const ACCOUNT_HRP: &str = "infera";

/// Accepted payload lengths: 20-byte account hashes and 32-byte module/contract ids.
const VALID_PAYLOAD_LENGTHS: [usize; 2] = [20, 32];

/// A validated bech32 account address.
///
/// Stored in canonical lowercase form so that key ordering is byte-stable.
#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ActorId(String);

impl ActorId {
    pub fn parse(address: &str) -> Result<Self> {
        let invalid = |reason: String| TypesError::InvalidAddress {
            address: address.to_string(),
            reason,
        };

        let (hrp, data) = bech32::decode(address).map_err(|e| invalid(e.to_string()))?;
        if hrp.as_str() != ACCOUNT_HRP {
            return Err(invalid(format!(
                "expected prefix '{}', got '{}'",
                ACCOUNT_HRP,
                hrp.as_str()
            )));
        }
        if !VALID_PAYLOAD_LENGTHS.contains(&data.len()) {
            return Err(invalid(format!("unexpected payload length {}", data.len())));
        }
        Ok(ActorId(address.to_ascii_lowercase()))
    }

    /// Encodes raw account bytes under [`ACCOUNT_HRP`].
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if !VALID_PAYLOAD_LENGTHS.contains(&bytes.len()) {
            return Err(TypesError::InvalidAddress {
                address: hex::encode(bytes),
                reason: format!("unexpected payload length {}", bytes.len()),
            });
        }
        let hrp = Hrp::parse(ACCOUNT_HRP).map_err(|e| TypesError::InvalidAddress {
            address: hex::encode(bytes),
            reason: e.to_string(),
        })?;
        let encoded =
            bech32::encode::<Bech32>(hrp, bytes).map_err(|e| TypesError::InvalidAddress {
                address: hex::encode(bytes),
                reason: e.to_string(),
            })?;
        Ok(ActorId(encoded))
    }

    /// Accepts `0x`-prefixed or bare hex account bytes.
    pub fn from_hex(hex_addr: &str) -> Result<Self> {
        let hex_str = hex_addr.strip_prefix("0x").unwrap_or(hex_addr);
        let bytes = hex::decode(hex_str).map_err(|e| TypesError::InvalidAddress {
            address: hex_addr.to_string(),
            reason: e.to_string(),
        })?;
        Self::from_bytes(&bytes)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        bech32::decode(&self.0)
            .map(|(_, data)| data)
            .unwrap_or_default()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ActorId({})", self.0)
    }
}

impl FromStr for ActorId {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for ActorId {
    type Error = TypesError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<ActorId> for String {
    fn from(id: ActorId) -> Self {
        id.0
    }
}
