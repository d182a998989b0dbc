//! Typed plaintext values and the local bounds checks that guard them

use alloy_primitives::{Address, B256, U256};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{FhevmError, Result};

/// Encrypted-type discriminants, matching the on-chain FHEVM type ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FheType {
    Bool,
    Uint8,
    Uint16,
    Uint32,
    Uint64,
    Uint128,
    Address,
    Uint256,
}

impl FheType {
    /// On-chain type id. This is the byte embedded at position 30 of every
    /// ciphertext handle.
    pub fn type_id(self) -> u8 {
        match self {
            FheType::Bool => 0,
            FheType::Uint8 => 2,
            FheType::Uint16 => 3,
            FheType::Uint32 => 4,
            FheType::Uint64 => 5,
            FheType::Uint128 => 6,
            FheType::Address => 7,
            FheType::Uint256 => 8,
        }
    }

    pub fn from_type_id(id: u8) -> Option<Self> {
        match id {
            0 => Some(FheType::Bool),
            2 => Some(FheType::Uint8),
            3 => Some(FheType::Uint16),
            4 => Some(FheType::Uint32),
            5 => Some(FheType::Uint64),
            6 => Some(FheType::Uint128),
            7 => Some(FheType::Address),
            8 => Some(FheType::Uint256),
            _ => None,
        }
    }

    /// Bits this type charges against an input's encrypted-bit budget.
    pub fn bit_width(self) -> usize {
        match self {
            FheType::Bool => 2,
            FheType::Uint8 => 8,
            FheType::Uint16 => 16,
            FheType::Uint32 => 32,
            FheType::Uint64 => 64,
            FheType::Uint128 => 128,
            FheType::Address => 160,
            FheType::Uint256 => 256,
        }
    }

    /// Largest plaintext this type can carry, as a 256-bit word.
    pub fn max_value(self) -> U256 {
        match self {
            FheType::Bool => U256::ONE,
            FheType::Uint8 => U256::from(u8::MAX),
            FheType::Uint16 => U256::from(u16::MAX),
            FheType::Uint32 => U256::from(u32::MAX),
            FheType::Uint64 => U256::from(u64::MAX),
            FheType::Uint128 => U256::from(u128::MAX),
            FheType::Address => (U256::ONE << 160) - U256::ONE,
            FheType::Uint256 => U256::MAX,
        }
    }
}

impl fmt::Display for FheType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FheType::Bool => "ebool",
            FheType::Uint8 => "euint8",
            FheType::Uint16 => "euint16",
            FheType::Uint32 => "euint32",
            FheType::Uint64 => "euint64",
            FheType::Uint128 => "euint128",
            FheType::Address => "eaddress",
            FheType::Uint256 => "euint256",
        };
        f.write_str(name)
    }
}

/// A plaintext value tagged with the encrypted type it will become.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FheValue {
    Bool(bool),
    Uint8(u8),
    Uint16(u16),
    Uint32(u32),
    Uint64(u64),
    Uint128(u128),
    Address(Address),
    Uint256(U256),
}

impl FheValue {
    pub fn fhe_type(&self) -> FheType {
        match self {
            FheValue::Bool(_) => FheType::Bool,
            FheValue::Uint8(_) => FheType::Uint8,
            FheValue::Uint16(_) => FheType::Uint16,
            FheValue::Uint32(_) => FheType::Uint32,
            FheValue::Uint64(_) => FheType::Uint64,
            FheValue::Uint128(_) => FheType::Uint128,
            FheValue::Address(_) => FheType::Address,
            FheValue::Uint256(_) => FheType::Uint256,
        }
    }

    /// Build a value from an untyped 256-bit word, rejecting anything
    /// outside the target type's range before it can reach the engine.
    pub fn checked(ty: FheType, raw: U256) -> Result<Self> {
        let max = ty.max_value();
        if raw > max {
            return Err(FhevmError::validation(format!(
                "value {raw} out of range for {ty} (max {max})"
            )));
        }
        Ok(match ty {
            FheType::Bool => FheValue::Bool(raw == U256::ONE),
            FheType::Uint8 => FheValue::Uint8(raw.to::<u8>()),
            FheType::Uint16 => FheValue::Uint16(raw.to::<u16>()),
            FheType::Uint32 => FheValue::Uint32(raw.to::<u32>()),
            FheType::Uint64 => FheValue::Uint64(raw.to::<u64>()),
            FheType::Uint128 => FheValue::Uint128(raw.to::<u128>()),
            FheType::Address => FheValue::Address(Address::from_word(B256::from(raw))),
            FheType::Uint256 => FheValue::Uint256(raw),
        })
    }

    /// Parse an EIP-55 checksummed address. Mixed-case strings with a wrong
    /// checksum are rejected, not silently lowercased.
    pub fn address_checked(s: &str) -> Result<Self> {
        Address::parse_checksummed(s, None)
            .map(FheValue::Address)
            .map_err(|_| FhevmError::validation(format!("invalid checksummed address: {s}")))
    }

    /// ABI-style 32-byte big-endian encoding, used on the public-decrypt
    /// wire and in handle derivation.
    pub fn to_word(&self) -> B256 {
        B256::from(self.to_u256().to_be_bytes::<32>())
    }

    /// Decode a 32-byte word as `ty`, with the same range check as
    /// [`FheValue::checked`].
    pub fn from_word(ty: FheType, word: B256) -> Result<Self> {
        Self::checked(ty, U256::from_be_bytes(word.0))
    }

    pub fn to_u256(&self) -> U256 {
        match self {
            FheValue::Bool(b) => U256::from(*b as u8),
            FheValue::Uint8(v) => U256::from(*v),
            FheValue::Uint16(v) => U256::from(*v),
            FheValue::Uint32(v) => U256::from(*v),
            FheValue::Uint64(v) => U256::from(*v),
            FheValue::Uint128(v) => U256::from(*v),
            FheValue::Address(a) => U256::from_be_bytes(a.into_word().0),
            FheValue::Uint256(v) => *v,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FheValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric accessor for types that fit in 64 bits.
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            FheValue::Uint8(v) => Some(u64::from(*v)),
            FheValue::Uint16(v) => Some(u64::from(*v)),
            FheValue::Uint32(v) => Some(u64::from(*v)),
            FheValue::Uint64(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_address(&self) -> Option<Address> {
        match self {
            FheValue::Address(a) => Some(*a),
            _ => None,
        }
    }
}

/// Serialize an ordered value batch into an envelope payload.
pub fn encode_batch(values: &[FheValue]) -> Result<Vec<u8>> {
    bincode::serialize(values).map_err(|e| FhevmError::protocol(format!("encode batch: {e}")))
}

pub fn decode_batch(bytes: &[u8]) -> Result<Vec<FheValue>> {
    bincode::deserialize(bytes).map_err(|e| FhevmError::protocol(format!("decode batch: {e}")))
}

/// Serialize a single cleartext for a reencryption envelope.
pub fn encode_value(value: &FheValue) -> Result<Vec<u8>> {
    bincode::serialize(value).map_err(|e| FhevmError::protocol(format!("encode value: {e}")))
}

pub fn decode_value(bytes: &[u8]) -> Result<FheValue> {
    bincode::deserialize(bytes).map_err(|e| FhevmError::protocol(format!("decode value: {e}")))
}
