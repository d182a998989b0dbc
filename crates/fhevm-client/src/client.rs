//! Top-level SDK handle

use std::collections::BTreeMap;
use std::sync::Arc;

use alloy_primitives::{Address, U256};
use fhevm_core::{
    EncryptedValue, FhevmConfig, FheValue, Handle, HandleContractPair, Result,
};

use crate::coordinator::{Operation, RequestCoordinator};
use crate::engine::EngineFactory;
use crate::input::EncryptedInputBuilder;
use crate::instance::{FhevmInstance, InstanceManager, InstanceStatus};
use crate::relayer::RelayerEngineFactory;
use crate::wallet::WalletSigner;

/// One client per deployment: owns the instance lifecycle and routes every
/// operation through the coordinator, so busy state and the last error are
/// always observable in one place.
pub struct FhevmClient {
    manager: InstanceManager,
    coordinator: RequestCoordinator,
}

impl FhevmClient {
    /// Client against the real relayer named by `config`.
    pub fn new(config: FhevmConfig) -> Self {
        Self::builder(config).build()
    }

    pub fn builder(config: FhevmConfig) -> FhevmClientBuilder {
        FhevmClientBuilder::new(config)
    }

    /// Load the engine. Safe to call from many tasks at once; see
    /// [`InstanceManager::init`] for the coalescing rules.
    pub async fn init(&self) -> Result<Arc<FhevmInstance>> {
        self.coordinator
            .run(Operation::Init, self.manager.init())
            .await
    }

    /// The ready instance, or `NotInitialized`.
    pub fn instance(&self) -> Result<Arc<FhevmInstance>> {
        self.manager.instance()
    }

    pub fn is_ready(&self) -> bool {
        self.manager.is_ready()
    }

    pub async fn status(&self) -> InstanceStatus {
        self.manager.status().await
    }

    /// Drop the instance (or a stored failure) and the last-error marker.
    pub async fn reset(&self) {
        self.manager.reset().await;
        self.coordinator.clear_error();
    }

    /// Start an input batch bound to `(contract, user)`.
    pub fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedInputBuilder> {
        Ok(self
            .instance()?
            .create_encrypted_input(contract_address, user_address))
    }

    /// Encrypt a finished batch under coordinator tracking.
    pub async fn encrypt(&self, input: EncryptedInputBuilder) -> Result<EncryptedValue> {
        self.coordinator
            .run(Operation::Encrypt, input.encrypt())
            .await
    }

    /// One-shot helper: encrypt a single value in its own batch.
    pub async fn encrypt_value(
        &self,
        value: FheValue,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        let mut input = self.create_encrypted_input(contract_address, user_address)?;
        input.add_value(value)?;
        self.encrypt(input).await
    }

    pub async fn encrypt_bool(
        &self,
        value: bool,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Bool(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_u8(
        &self,
        value: u8,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Uint8(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_u16(
        &self,
        value: u16,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Uint16(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_u32(
        &self,
        value: u32,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Uint32(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_u64(
        &self,
        value: u64,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Uint64(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_u128(
        &self,
        value: u128,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Uint128(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_u256(
        &self,
        value: U256,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Uint256(value), contract_address, user_address)
            .await
    }

    pub async fn encrypt_address(
        &self,
        value: Address,
        contract_address: Address,
        user_address: Address,
    ) -> Result<EncryptedValue> {
        self.encrypt_value(FheValue::Address(value), contract_address, user_address)
            .await
    }

    /// Decrypt one handle for the signer's address.
    pub async fn user_decrypt(
        &self,
        signer: &dyn WalletSigner,
        handle: Handle,
        contract_address: Address,
    ) -> Result<FheValue> {
        let instance = self.instance()?;
        self.coordinator
            .run(Operation::UserDecrypt, async move {
                instance.user_decrypt(signer, handle, contract_address).await
            })
            .await
    }

    /// Decrypt a batch of handles under one wallet signature.
    pub async fn user_decrypt_many(
        &self,
        signer: &dyn WalletSigner,
        pairs: &[HandleContractPair],
    ) -> Result<BTreeMap<Handle, FheValue>> {
        let instance = self.instance()?;
        self.coordinator
            .run(Operation::UserDecrypt, async move {
                instance.user_decrypt_many(signer, pairs).await
            })
            .await
    }

    /// Reveal publicly-decryptable handles.
    pub async fn public_decrypt(
        &self,
        handles: &[Handle],
    ) -> Result<BTreeMap<Handle, FheValue>> {
        let instance = self.instance()?;
        self.coordinator
            .run(Operation::PublicDecrypt, async move {
                instance.public_decrypt(handles).await
            })
            .await
    }

    /// Busy/error bookkeeping for UIs.
    pub fn coordinator(&self) -> &RequestCoordinator {
        &self.coordinator
    }

    pub fn config(&self) -> &FhevmConfig {
        self.manager.config()
    }
}

/// Builder for [`FhevmClient`].
pub struct FhevmClientBuilder {
    config: FhevmConfig,
    factory: Option<Arc<dyn EngineFactory>>,
}

impl FhevmClientBuilder {
    pub fn new(config: FhevmConfig) -> Self {
        FhevmClientBuilder {
            config,
            factory: None,
        }
    }

    /// Swap the engine source, e.g. for an in-process fake.
    pub fn engine_factory(mut self, factory: Arc<dyn EngineFactory>) -> Self {
        self.factory = Some(factory);
        self
    }

    pub fn build(self) -> FhevmClient {
        let factory = self
            .factory
            .unwrap_or_else(|| Arc::new(RelayerEngineFactory));
        FhevmClient {
            manager: InstanceManager::new(self.config, factory),
            coordinator: RequestCoordinator::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeEngine, FakeEngineFactory};
    use crate::wallet::LocalWalletSigner;
    use alloy_primitives::address;
    use fhevm_core::{FheType, FhevmError};

    const CONTRACT: Address = address!("0x1111111111111111111111111111111111111111");

    fn client_with(engine: Arc<FakeEngine>) -> FhevmClient {
        FhevmClient::builder(FhevmConfig::local())
            .engine_factory(Arc::new(FakeEngineFactory::with_engine(engine)))
            .build()
    }

    #[tokio::test]
    async fn encrypt_then_decrypt_through_the_facade() {
        let engine = Arc::new(FakeEngine::new(31_337));
        let client = client_with(engine);
        let signer = LocalWalletSigner::random();

        client.init().await.unwrap();
        assert!(client.is_ready());

        let mut input = client
            .create_encrypted_input(CONTRACT, signer.address())
            .unwrap();
        input.add_u64(1_000).unwrap().add_bool(true).unwrap();
        let encrypted = client.encrypt(input).await.unwrap();

        let value = client
            .user_decrypt(&signer, encrypted.handles[0], CONTRACT)
            .await
            .unwrap();
        assert_eq!(value.as_u64(), Some(1_000));

        let values = client
            .public_decrypt(&encrypted.handles)
            .await
            .unwrap();
        assert_eq!(values.len(), 2);

        assert!(!client.coordinator().is_busy());
        assert!(client.coordinator().last_error().is_none());
    }

    #[tokio::test]
    async fn one_shot_helpers_encrypt_a_single_handle() {
        let engine = Arc::new(FakeEngine::new(31_337));
        let client = client_with(engine);
        let signer = LocalWalletSigner::random();
        client.init().await.unwrap();

        let encrypted = client
            .encrypt_u64(1_000, CONTRACT, signer.address())
            .await
            .unwrap();
        assert_eq!(encrypted.handles.len(), 1);
        assert_eq!(encrypted.handles[0].fhe_type(), Some(FheType::Uint64));

        let value = client
            .user_decrypt(&signer, encrypted.handles[0], CONTRACT)
            .await
            .unwrap();
        assert_eq!(value.as_u64(), Some(1_000));
    }

    #[tokio::test]
    async fn operations_before_init_fail_fast() {
        let client = client_with(Arc::new(FakeEngine::new(31_337)));
        let err = client
            .create_encrypted_input(CONTRACT, Address::ZERO)
            .unwrap_err();
        assert!(matches!(err, FhevmError::NotInitialized));

        let err = client.public_decrypt(&[]).await.unwrap_err();
        assert!(matches!(err, FhevmError::NotInitialized));
    }

    #[tokio::test]
    async fn failures_are_returned_and_recorded() {
        let engine = Arc::new(FakeEngine::new(31_337));
        let client = client_with(engine.clone());
        let signer = LocalWalletSigner::random();
        client.init().await.unwrap();

        let mut input = client
            .create_encrypted_input(CONTRACT, signer.address())
            .unwrap();
        input.add_u8(1).unwrap();
        engine.fail_next(FhevmError::network("relayer down"));
        let err = client.encrypt(input).await.unwrap_err();
        assert!(err.is_retryable());

        let stored = client.coordinator().last_error().unwrap();
        assert_eq!(*stored, err);

        client.reset().await;
        assert!(client.coordinator().last_error().is_none());
        assert!(!client.is_ready());
    }
}
