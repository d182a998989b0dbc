//! Ciphertext handles

use alloy_primitives::{keccak256, B256};
use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::value::FheType;

/// Layout version of the trailing handle metadata.
pub const HANDLE_VERSION: u8 = 1;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("invalid ciphertext handle: {0}")]
pub struct ParseHandleError(pub String);

/// Opaque 32-byte reference to a ciphertext held by the execution
/// environment.
///
/// Byte 30 carries the FHE type id and byte 31 the layout version, so a
/// handle alone tells the protocol how to decode the cleartext behind it.
/// On the wire a handle is 0x-prefixed lowercase hex, zero-padded to 64
/// digits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(B256);

impl Handle {
    /// Derive the handle for value `index` of an input whose ciphertext
    /// digest is `input_digest`. Deterministic on both sides of the wire.
    pub fn derive(input_digest: B256, index: u8, ty: FheType) -> Self {
        let mut buf = [0u8; 33];
        buf[..32].copy_from_slice(input_digest.as_slice());
        buf[32] = index;
        let mut out = keccak256(buf).0;
        out[30] = ty.type_id();
        out[31] = HANDLE_VERSION;
        Handle(B256::from(out))
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Handle(B256::from(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0 .0
    }

    pub fn to_b256(&self) -> B256 {
        self.0
    }

    /// Type id recorded in the handle, if it names a known type.
    pub fn fhe_type(&self) -> Option<FheType> {
        FheType::from_type_id(self.0 .0[30])
    }

    pub fn version(&self) -> u8 {
        self.0 .0[31]
    }

    pub fn to_hex(&self) -> String {
        format!("0x{}", hex::encode(self.0))
    }
}

impl FromStr for Handle {
    type Err = ParseHandleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.len() != 64 {
            return Err(ParseHandleError(format!(
                "expected 64 hex digits, got {}",
                digits.len()
            )));
        }
        let mut bytes = [0u8; 32];
        hex::decode_to_slice(digits, &mut bytes)
            .map_err(|e| ParseHandleError(e.to_string()))?;
        Ok(Handle(B256::from(bytes)))
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl Serialize for Handle {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        if serializer.is_human_readable() {
            serializer.serialize_str(&self.to_hex())
        } else {
            self.0.serialize(serializer)
        }
    }
}

impl<'de> Deserialize<'de> for Handle {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        if deserializer.is_human_readable() {
            let s = String::deserialize(deserializer)?;
            s.parse().map_err(de::Error::custom)
        } else {
            B256::deserialize(deserializer).map(Handle)
        }
    }
}
