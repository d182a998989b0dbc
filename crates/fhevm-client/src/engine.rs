//! Engine boundary
//!
//! Everything that talks FHE to the network sits behind [`Engine`]. The
//! production implementation is the relayer-backed engine; tests swap in an
//! in-process fake. Loading is a separate concern so the instance manager
//! can retry, coalesce and reset without knowing what an engine is made of.

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::Address;

use fhevm_core::{
    EncryptedValue, FhevmConfig, FheType, FheValue, Handle, NetworkPublicKey, Result,
    SealedEnvelope, ValidityWindow,
};

/// Input batch handed to the engine: the sealed payload plus the binding
/// and declared types the network verifies against it.
#[derive(Debug, Clone)]
pub struct InputRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub ciphertext: SealedEnvelope,
    pub types: Vec<FheType>,
}

/// A user-decrypt request with its authorization attached. The signature is
/// hex without a 0x prefix, exactly as the relayer wire expects it.
#[derive(Debug, Clone)]
pub struct AuthorizedRequest {
    pub pairs: Vec<(Handle, Address)>,
    pub window: ValidityWindow,
    pub public_key: [u8; 32],
    pub signature: String,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
}

/// One reencrypted cleartext coming back from a user-decrypt.
#[derive(Debug, Clone)]
pub struct ReencryptedResult {
    pub handle: Handle,
    pub envelope: SealedEnvelope,
}

/// The loaded FHE engine. All plaintext-revealing decisions (the ACL) live
/// on the other side of this boundary.
#[async_trait::async_trait]
pub trait Engine: Send + Sync {
    /// Chain the engine was loaded for.
    fn chain_id(&self) -> u64;

    /// X25519 key input payloads are sealed to.
    fn network_public_key(&self) -> NetworkPublicKey;

    /// Register an input batch, returning ciphertext data, ordered handles
    /// and the input proof.
    async fn encrypt_input(&self, request: InputRequest) -> Result<EncryptedValue>;

    /// Reencrypt the requested handles to the authorization's ephemeral
    /// key. Denials surface as `AccessDenied`; nothing is filtered locally.
    async fn user_decrypt(&self, request: AuthorizedRequest) -> Result<Vec<ReencryptedResult>>;

    /// Publicly reveal handles marked decryptable by their contracts.
    async fn public_decrypt(&self, handles: &[Handle]) -> Result<BTreeMap<Handle, FheValue>>;
}

/// Builds an [`Engine`] from a deployment config. Any failure here is an
/// `EngineLoad` error, whatever its underlying cause.
#[async_trait::async_trait]
pub trait EngineFactory: Send + Sync {
    async fn load(&self, config: &FhevmConfig) -> Result<Arc<dyn Engine>>;
}
