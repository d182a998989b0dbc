//! Requests and results that cross the relayer wire

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{FhevmError, Result};
use crate::handle::Handle;

/// Longest user-decrypt authorization the protocol accepts.
pub const MAX_VALIDITY_DAYS: u64 = 365;

/// Replay-bounding window of a user-decrypt authorization: an epoch start
/// plus a duration in whole days. Both ends of the wire validate it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidityWindow {
    pub start_timestamp: u64,
    pub duration_days: u64,
}

impl ValidityWindow {
    pub fn starting_now(duration_days: u64) -> Self {
        let start_timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_secs();
        ValidityWindow {
            start_timestamp,
            duration_days,
        }
    }

    pub fn end_timestamp(&self) -> u64 {
        self.start_timestamp
            .saturating_add(self.duration_days.saturating_mul(86_400))
    }

    pub fn is_expired_at(&self, now_secs: u64) -> bool {
        now_secs >= self.end_timestamp()
    }

    pub fn validate(&self) -> Result<()> {
        if self.start_timestamp == 0 {
            return Err(FhevmError::protocol("validity window start is unset"));
        }
        if self.duration_days == 0 || self.duration_days > MAX_VALIDITY_DAYS {
            return Err(FhevmError::protocol(format!(
                "validity duration must be 1..={MAX_VALIDITY_DAYS} days, got {}",
                self.duration_days
            )));
        }
        Ok(())
    }
}

/// One ciphertext to disclose, paired with the contract that owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HandleContractPair {
    pub handle: Handle,
    pub contract_address: Address,
}

/// A user-decrypt request before authorization is attached.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecryptionRequest {
    pub pairs: Vec<HandleContractPair>,
    pub window: ValidityWindow,
}

impl DecryptionRequest {
    /// Contract addresses in first-occurrence order, deduplicated. This is
    /// the exact list that goes into the EIP-712 message.
    pub fn contract_addresses(&self) -> Vec<Address> {
        let mut out: Vec<Address> = Vec::new();
        for pair in &self.pairs {
            if !out.contains(&pair.contract_address) {
                out.push(pair.contract_address);
            }
        }
        out
    }

    pub fn validate(&self) -> Result<()> {
        if self.pairs.is_empty() {
            return Err(FhevmError::protocol("no handles to decrypt"));
        }
        self.window.validate()
    }
}

/// Output of encrypting an input batch: the ciphertext blob, one handle per
/// value in insertion order, and the relayer's input proof.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptedValue {
    #[serde(with = "hex::serde")]
    pub data: Vec<u8>,
    pub handles: Vec<Handle>,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

impl EncryptedValue {
    /// Handle for the value added at `index`, preserving insertion order.
    pub fn handle(&self, index: usize) -> Option<Handle> {
        self.handles.get(index).copied()
    }
}
