//! Encrypted input building
//!
//! The builder accumulates typed values for one `(contract, user)` binding
//! and validates every add locally. `encrypt()` is the only step that talks
//! to the network: the batch is sealed to the network key, registered, and
//! the returned handles are checked against what was added.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use fhevm_core::{
    encode_batch, limits, EncryptedValue, FhevmError, FheType, FheValue, Result, SealedEnvelope,
    HANDLE_VERSION,
};

use crate::engine::{Engine, InputRequest};

/// Ordered, validated batch of plaintexts awaiting encryption.
pub struct EncryptedInputBuilder {
    engine: Arc<dyn Engine>,
    contract_address: Address,
    user_address: Address,
    values: Vec<FheValue>,
    bits: usize,
}

impl std::fmt::Debug for EncryptedInputBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedInputBuilder")
            .field("contract_address", &self.contract_address)
            .field("user_address", &self.user_address)
            .field("values", &self.values.len())
            .field("bits", &self.bits)
            .finish_non_exhaustive()
    }
}

impl EncryptedInputBuilder {
    pub(crate) fn new(
        engine: Arc<dyn Engine>,
        contract_address: Address,
        user_address: Address,
    ) -> Self {
        EncryptedInputBuilder {
            engine,
            contract_address,
            user_address,
            values: Vec::new(),
            bits: 0,
        }
    }

    pub fn contract_address(&self) -> Address {
        self.contract_address
    }

    pub fn user_address(&self) -> Address {
        self.user_address
    }

    pub fn add_bool(&mut self, value: bool) -> Result<&mut Self> {
        self.push(FheValue::Bool(value))
    }

    pub fn add_u8(&mut self, value: u8) -> Result<&mut Self> {
        self.push(FheValue::Uint8(value))
    }

    pub fn add_u16(&mut self, value: u16) -> Result<&mut Self> {
        self.push(FheValue::Uint16(value))
    }

    pub fn add_u32(&mut self, value: u32) -> Result<&mut Self> {
        self.push(FheValue::Uint32(value))
    }

    pub fn add_u64(&mut self, value: u64) -> Result<&mut Self> {
        self.push(FheValue::Uint64(value))
    }

    pub fn add_u128(&mut self, value: u128) -> Result<&mut Self> {
        self.push(FheValue::Uint128(value))
    }

    pub fn add_u256(&mut self, value: U256) -> Result<&mut Self> {
        self.push(FheValue::Uint256(value))
    }

    pub fn add_address(&mut self, value: Address) -> Result<&mut Self> {
        self.push(FheValue::Address(value))
    }

    /// Parse and add an EIP-55 checksummed address string.
    pub fn add_address_str(&mut self, value: &str) -> Result<&mut Self> {
        let value = FheValue::address_checked(value)?;
        self.push(value)
    }

    /// Dynamic entry point: range-check `raw` against `ty` and add it.
    pub fn add_uint(&mut self, ty: FheType, raw: U256) -> Result<&mut Self> {
        let value = FheValue::checked(ty, raw)?;
        self.push(value)
    }

    /// Add an already-typed value.
    pub fn add_value(&mut self, value: FheValue) -> Result<&mut Self> {
        self.push(value)
    }

    fn push(&mut self, value: FheValue) -> Result<&mut Self> {
        if self.values.len() >= limits::MAX_INPUT_VALUES {
            return Err(FhevmError::validation(format!(
                "input already carries {} values, the maximum",
                limits::MAX_INPUT_VALUES
            )));
        }
        let bits = self.bits + value.fhe_type().bit_width();
        if bits > limits::MAX_INPUT_BITS {
            return Err(FhevmError::validation(format!(
                "adding {} would exceed the {}-bit input budget ({} already used)",
                value.fhe_type(),
                limits::MAX_INPUT_BITS,
                self.bits
            )));
        }
        self.values.push(value);
        self.bits = bits;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Bits consumed so far of the input budget.
    pub fn bits_used(&self) -> usize {
        self.bits
    }

    pub fn types(&self) -> Vec<FheType> {
        self.values.iter().map(|v| v.fhe_type()).collect()
    }

    /// Seal the batch to the network key and register it. Consumes the
    /// builder; handles come back in insertion order, one per value.
    pub async fn encrypt(self) -> Result<EncryptedValue> {
        if self.values.is_empty() {
            return Err(FhevmError::validation("encrypted input has no values"));
        }

        let types = self.types();
        let payload = encode_batch(&self.values)?;
        let ciphertext = SealedEnvelope::seal(&self.engine.network_public_key().0, &payload)?;

        let request = InputRequest {
            contract_address: self.contract_address,
            user_address: self.user_address,
            ciphertext,
            types: types.clone(),
        };
        let encrypted = self.engine.encrypt_input(request).await?;

        verify_handles(&encrypted, &types)?;

        tracing::debug!(
            values = types.len(),
            bits = self.bits,
            contract = %self.contract_address,
            "input encrypted"
        );

        Ok(encrypted)
    }
}

/// The response must carry exactly one handle per value, in order, each
/// tagged with the value's type and the current layout version.
fn verify_handles(encrypted: &EncryptedValue, types: &[FheType]) -> Result<()> {
    if encrypted.handles.len() != types.len() {
        return Err(FhevmError::protocol(format!(
            "expected {} handles, relayer returned {}",
            types.len(),
            encrypted.handles.len()
        )));
    }
    for (index, (handle, ty)) in encrypted.handles.iter().zip(types).enumerate() {
        if handle.version() != HANDLE_VERSION {
            return Err(FhevmError::protocol(format!(
                "handle {index} has unsupported version {}",
                handle.version()
            )));
        }
        if handle.fhe_type() != Some(*ty) {
            return Err(FhevmError::protocol(format!(
                "handle {index} should be {ty}, relayer tagged it differently"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeEngine;
    use alloy_primitives::address;

    fn builder() -> EncryptedInputBuilder {
        let engine: Arc<dyn Engine> = Arc::new(FakeEngine::new(31_337));
        EncryptedInputBuilder::new(
            engine,
            address!("0x1111111111111111111111111111111111111111"),
            address!("0x2222222222222222222222222222222222222222"),
        )
    }

    #[tokio::test]
    async fn encrypt_returns_ordered_typed_handles() {
        let mut input = builder();
        input
            .add_u64(1_000)
            .unwrap()
            .add_bool(true)
            .unwrap()
            .add_u8(42)
            .unwrap();

        let encrypted = input.encrypt().await.unwrap();
        assert_eq!(encrypted.handles.len(), 3);
        assert_eq!(encrypted.handles[0].fhe_type(), Some(FheType::Uint64));
        assert_eq!(encrypted.handles[1].fhe_type(), Some(FheType::Bool));
        assert_eq!(encrypted.handles[2].fhe_type(), Some(FheType::Uint8));
        assert!(!encrypted.proof.is_empty());
        assert_eq!(encrypted.handle(2), Some(encrypted.handles[2]));
    }

    #[tokio::test]
    async fn empty_input_is_rejected_locally() {
        let err = builder().encrypt().await.unwrap_err();
        assert!(matches!(err, FhevmError::Validation(_)), "got {err:?}");
    }

    #[test]
    fn add_uint_range_checks_before_any_network_call() {
        let mut input = builder();
        let err = input
            .add_uint(FheType::Uint8, U256::from(256u16))
            .unwrap_err();
        assert!(matches!(err, FhevmError::Validation(_)));
        assert!(input.is_empty(), "rejected value must not be kept");
    }

    #[test]
    fn value_count_limit_is_enforced() {
        let mut input = builder();
        for _ in 0..limits::MAX_INPUT_VALUES {
            input.add_bool(true).unwrap();
        }
        let err = input.add_bool(false).unwrap_err();
        assert!(matches!(err, FhevmError::Validation(_)));
        assert_eq!(input.len(), limits::MAX_INPUT_VALUES);
    }

    #[test]
    fn bit_budget_is_enforced() {
        let mut input = builder();
        // 8 x 256 bits fills the 2048-bit budget exactly
        for _ in 0..8 {
            input.add_u256(U256::MAX).unwrap();
        }
        assert_eq!(input.bits_used(), limits::MAX_INPUT_BITS);
        let err = input.add_bool(true).unwrap_err();
        assert!(matches!(err, FhevmError::Validation(_)));
    }

    #[test]
    fn address_strings_must_be_checksummed() {
        let mut input = builder();
        assert!(input
            .add_address_str("0x8ba1f109551bD432803012645Ac136ddd64DBA72")
            .is_ok());
        let err = input
            .add_address_str("0x8ba1f109551bd432803012645ac136ddd64dba72")
            .unwrap_err();
        assert!(matches!(err, FhevmError::Validation(_)));
    }
}
