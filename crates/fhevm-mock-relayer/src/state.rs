//! Relayer state: network key material and the registered ciphertext store

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use alloy_primitives::{keccak256, Address};
use x25519_dalek::{PublicKey, StaticSecret};

use fhevm_core::limits::{MAX_INPUT_BITS, MAX_INPUT_VALUES};
use fhevm_core::{
    decode_batch, encode_value, FheType, FheValue, Handle, NetworkPublicKey, SealedEnvelope,
};

use crate::error::{RelayerError, Result};

/// One registered ciphertext and its access grants.
///
/// The mock keeps the cleartext directly where a real deployment keeps an
/// FHE ciphertext only the KMS can threshold-decrypt.
pub struct StoredCiphertext {
    /// Cleartext behind the handle.
    pub value: FheValue,
    /// Contract the input was bound to at registration.
    pub contract_address: Address,
    /// Users allowed to request reencryption of this handle.
    pub allowed_users: HashSet<Address>,
    /// Whether the cleartext may be revealed via public decrypt.
    pub publicly_decryptable: bool,
}

/// In-memory stand-in for the relayer and the KMS and ACL behind it.
pub struct RelayerState {
    secret: StaticSecret,
    public: NetworkPublicKey,
    /// Chain the mock claims to serve.
    pub chain_id: u64,
    /// Gateway chain id, part of the EIP-712 domain clients sign against.
    pub gateway_chain_id: u64,
    /// Verifying contract for user-decrypt authorization signatures.
    pub decryption_oracle: Address,
    store: BTreeMap<Handle, StoredCiphertext>,
}

impl RelayerState {
    /// Create state with a fresh network keypair.
    pub fn new(chain_id: u64, gateway_chain_id: u64, decryption_oracle: Address) -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = NetworkPublicKey(*PublicKey::from(&secret).as_bytes());
        RelayerState {
            secret,
            public,
            chain_id,
            gateway_chain_id,
            decryption_oracle,
            store: BTreeMap::new(),
        }
    }

    pub fn network_public_key(&self) -> NetworkPublicKey {
        self.public
    }

    /// Identifier of the active key set, derived from the public key.
    pub fn key_id(&self) -> String {
        hex::encode(&keccak256(self.public.0)[..8])
    }

    /// Register a sealed input batch: open it, re-check the batching limits
    /// the SDK enforced locally, derive one handle per value and store the
    /// cleartexts under them. The registering user gets the initial grant.
    pub fn register_input(
        &mut self,
        contract_address: Address,
        user_address: Address,
        envelope: &SealedEnvelope,
        declared: &[FheType],
    ) -> Result<(Vec<Handle>, Vec<u8>)> {
        let plaintext = envelope.open(&self.secret).ok_or_else(|| {
            RelayerError::InvalidRequest("ciphertext is not sealed to the network key".into())
        })?;
        let values =
            decode_batch(&plaintext).map_err(|e| RelayerError::InvalidRequest(e.to_string()))?;

        if values.is_empty() {
            return Err(RelayerError::InvalidRequest("empty input batch".into()));
        }
        if values.len() > MAX_INPUT_VALUES {
            return Err(RelayerError::InvalidRequest(format!(
                "batch carries {} values, limit is {MAX_INPUT_VALUES}",
                values.len()
            )));
        }
        let bits: usize = values.iter().map(|v| v.fhe_type().bit_width()).sum();
        if bits > MAX_INPUT_BITS {
            return Err(RelayerError::InvalidRequest(format!(
                "batch carries {bits} encrypted bits, limit is {MAX_INPUT_BITS}"
            )));
        }
        if declared.len() != values.len() {
            return Err(RelayerError::InvalidRequest(format!(
                "declared {} types for {} values",
                declared.len(),
                values.len()
            )));
        }
        for (i, (value, ty)) in values.iter().zip(declared).enumerate() {
            if value.fhe_type() != *ty {
                return Err(RelayerError::InvalidRequest(format!(
                    "value {i} is {} but was declared {ty}",
                    value.fhe_type()
                )));
            }
        }

        let digest = keccak256(&envelope.ciphertext);
        let mut handles = Vec::with_capacity(values.len());
        for (index, value) in values.into_iter().enumerate() {
            let handle = Handle::derive(digest, index as u8, value.fhe_type());
            self.store.insert(
                handle,
                StoredCiphertext {
                    value,
                    contract_address,
                    allowed_users: HashSet::from([user_address]),
                    publicly_decryptable: false,
                },
            );
            handles.push(handle);
        }

        tracing::info!(
            handles = handles.len(),
            contract = %contract_address,
            user = %user_address,
            "input registered"
        );

        Ok((handles, digest.to_vec()))
    }

    /// Reencrypt a handle's cleartext to `recipient`, enforcing the ACL:
    /// the handle must be bound to `contract_address` and `user_address`
    /// must hold a grant.
    pub fn reencrypt(
        &self,
        handle: Handle,
        contract_address: Address,
        user_address: Address,
        recipient: &[u8; 32],
    ) -> Result<SealedEnvelope> {
        let stored = self
            .store
            .get(&handle)
            .ok_or_else(|| RelayerError::UnknownHandle(handle.to_hex()))?;

        if stored.contract_address != contract_address {
            return Err(RelayerError::AccessDenied(format!(
                "handle {} is not bound to contract {contract_address}",
                handle.to_hex()
            )));
        }
        if !stored.allowed_users.contains(&user_address) {
            return Err(RelayerError::AccessDenied(format!(
                "user {user_address} has no grant for handle {}",
                handle.to_hex()
            )));
        }

        let bytes =
            encode_value(&stored.value).map_err(|e| RelayerError::Internal(e.to_string()))?;
        SealedEnvelope::seal(recipient, &bytes).map_err(|e| RelayerError::Internal(e.to_string()))
    }

    /// Reveal a handle's cleartext if it was marked publicly decryptable.
    pub fn public_value(&self, handle: Handle) -> Result<FheValue> {
        let stored = self
            .store
            .get(&handle)
            .ok_or_else(|| RelayerError::UnknownHandle(handle.to_hex()))?;
        if !stored.publicly_decryptable {
            return Err(RelayerError::AccessDenied(format!(
                "handle {} is not publicly decryptable",
                handle.to_hex()
            )));
        }
        Ok(stored.value)
    }

    /// Grant `user` reencryption access to `handle`.
    pub fn grant_user(&mut self, handle: Handle, user: Address) -> Result<()> {
        let stored = self
            .store
            .get_mut(&handle)
            .ok_or_else(|| RelayerError::UnknownHandle(handle.to_hex()))?;
        stored.allowed_users.insert(user);
        Ok(())
    }

    /// Mark `handle` as revealable through public decrypt.
    pub fn set_publicly_decryptable(&mut self, handle: Handle, allowed: bool) -> Result<()> {
        let stored = self
            .store
            .get_mut(&handle)
            .ok_or_else(|| RelayerError::UnknownHandle(handle.to_hex()))?;
        stored.publicly_decryptable = allowed;
        Ok(())
    }

    /// Current grants for a handle, in stable order.
    pub fn acl_entry(&self, handle: Handle) -> Result<AclEntry> {
        let stored = self
            .store
            .get(&handle)
            .ok_or_else(|| RelayerError::UnknownHandle(handle.to_hex()))?;
        let mut allowed_users: Vec<Address> = stored.allowed_users.iter().copied().collect();
        allowed_users.sort();
        Ok(AclEntry {
            handle,
            contract_address: stored.contract_address,
            allowed_users,
            publicly_decryptable: stored.publicly_decryptable,
        })
    }

    /// Store statistics for monitoring.
    pub fn stats(&self) -> RelayerStats {
        RelayerStats {
            chain_id: self.chain_id,
            stored_handles: self.store.len(),
            public_handles: self
                .store
                .values()
                .filter(|s| s.publicly_decryptable)
                .count(),
        }
    }
}

/// Relayer statistics for monitoring
#[derive(Debug, Clone, serde::Serialize)]
pub struct RelayerStats {
    pub chain_id: u64,
    pub stored_handles: usize,
    pub public_handles: usize,
}

/// Access-control view of one handle
#[derive(Debug, Clone, serde::Serialize)]
pub struct AclEntry {
    pub handle: Handle,
    pub contract_address: Address,
    pub allowed_users: Vec<Address>,
    pub publicly_decryptable: bool,
}

/// Shared relayer state type
pub type SharedState = Arc<tokio::sync::RwLock<RelayerState>>;

/// Create shared state with a fresh network keypair
pub fn create_shared_state(
    chain_id: u64,
    gateway_chain_id: u64,
    decryption_oracle: Address,
) -> SharedState {
    Arc::new(tokio::sync::RwLock::new(RelayerState::new(
        chain_id,
        gateway_chain_id,
        decryption_oracle,
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use fhevm_core::encode_batch;

    fn seeded_state() -> (RelayerState, Vec<Handle>, Address, Address) {
        let mut state = RelayerState::new(31_337, 55_815, Address::ZERO);
        let contract = Address::repeat_byte(0xc0);
        let user = Address::repeat_byte(0x01);
        let values = vec![FheValue::Bool(true), FheValue::Uint64(42)];
        let batch = encode_batch(&values).unwrap();
        let envelope = SealedEnvelope::seal(&state.network_public_key().0, &batch).unwrap();
        let (handles, _) = state
            .register_input(
                contract,
                user,
                &envelope,
                &[FheType::Bool, FheType::Uint64],
            )
            .unwrap();
        (state, handles, contract, user)
    }

    #[test]
    fn register_derives_typed_handles() {
        let (_, handles, _, _) = seeded_state();
        assert_eq!(handles.len(), 2);
        assert_eq!(handles[0].fhe_type(), Some(FheType::Bool));
        assert_eq!(handles[1].fhe_type(), Some(FheType::Uint64));
    }

    #[test]
    fn register_rejects_foreign_envelope() {
        let mut state = RelayerState::new(31_337, 55_815, Address::ZERO);
        let other = RelayerState::new(31_337, 55_815, Address::ZERO);
        let batch = encode_batch(&[FheValue::Uint8(1)]).unwrap();
        let envelope = SealedEnvelope::seal(&other.network_public_key().0, &batch).unwrap();
        let err = state
            .register_input(
                Address::ZERO,
                Address::ZERO,
                &envelope,
                &[FheType::Uint8],
            )
            .unwrap_err();
        assert!(matches!(err, RelayerError::InvalidRequest(_)));
    }

    #[test]
    fn reencrypt_enforces_the_grant() {
        let (state, handles, contract, user) = seeded_state();
        let stranger = Address::repeat_byte(0xee);
        let recipient = fhevm_core::Keypair::generate();

        let err = state
            .reencrypt(handles[0], contract, stranger, &recipient.public_key())
            .unwrap_err();
        assert!(matches!(err, RelayerError::AccessDenied(_)));

        let envelope = state
            .reencrypt(handles[0], contract, user, &recipient.public_key())
            .unwrap();
        let bytes = recipient.open(&envelope).unwrap();
        assert_eq!(
            fhevm_core::decode_value(&bytes).unwrap(),
            FheValue::Bool(true)
        );
    }

    #[test]
    fn reencrypt_enforces_the_contract_binding() {
        let (state, handles, _, user) = seeded_state();
        let wrong_contract = Address::repeat_byte(0xdd);
        let recipient = fhevm_core::Keypair::generate();
        let err = state
            .reencrypt(handles[0], wrong_contract, user, &recipient.public_key())
            .unwrap_err();
        assert!(matches!(err, RelayerError::AccessDenied(_)));
    }

    #[test]
    fn public_decrypt_needs_the_flag() {
        let (mut state, handles, _, _) = seeded_state();
        assert!(matches!(
            state.public_value(handles[1]).unwrap_err(),
            RelayerError::AccessDenied(_)
        ));
        state.set_publicly_decryptable(handles[1], true).unwrap();
        assert_eq!(state.public_value(handles[1]).unwrap(), FheValue::Uint64(42));
    }

    #[test]
    fn unknown_handle_is_not_found() {
        let (state, _, contract, user) = seeded_state();
        let ghost = Handle::from_bytes([9u8; 32]);
        let recipient = fhevm_core::Keypair::generate();
        assert!(matches!(
            state
                .reencrypt(ghost, contract, user, &recipient.public_key())
                .unwrap_err(),
            RelayerError::UnknownHandle(_)
        ));
        assert!(matches!(
            state.public_value(ghost).unwrap_err(),
            RelayerError::UnknownHandle(_)
        ));
    }
}
