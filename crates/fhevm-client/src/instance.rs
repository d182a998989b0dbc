//! Instance lifecycle
//!
//! One engine load per manager, however many callers race `init()`.
//! Concurrent calls coalesce onto a single in-flight load; a failed load is
//! replayed to every later caller until `reset()`. The ready instance sits
//! in a lock-free slot so `instance()` stays synchronous.

use std::collections::BTreeMap;
use std::sync::Arc;

use arc_swap::ArcSwapOption;
use futures::future::{BoxFuture, FutureExt, Shared};
use tokio::sync::Mutex;

use alloy_primitives::Address;
use fhevm_core::{
    Eip712Request, FhevmConfig, FhevmError, FheValue, Handle, HandleContractPair, Keypair,
    NetworkPublicKey, Result, ValidityWindow,
};

use crate::decrypt;
use crate::engine::{Engine, EngineFactory};
use crate::input::EncryptedInputBuilder;
use crate::wallet::WalletSigner;

/// A loaded engine bound to its deployment config. Cheap to clone through
/// the `Arc` the manager hands out.
pub struct FhevmInstance {
    engine: Arc<dyn Engine>,
    config: FhevmConfig,
}

impl FhevmInstance {
    pub(crate) fn new(engine: Arc<dyn Engine>, config: FhevmConfig) -> Self {
        FhevmInstance { engine, config }
    }

    pub fn config(&self) -> &FhevmConfig {
        &self.config
    }

    pub fn chain_id(&self) -> u64 {
        self.engine.chain_id()
    }

    /// Key input payloads are sealed to.
    pub fn network_public_key(&self) -> NetworkPublicKey {
        self.engine.network_public_key()
    }

    /// Fresh reencryption keypair for one user-decrypt exchange.
    pub fn generate_keypair(&self) -> Keypair {
        Keypair::generate()
    }

    /// The typed-data request a wallet signs to authorize reencryption of
    /// handles under `contracts` to `public_key`, bound to this deployment's
    /// gateway chain and decryption oracle.
    pub fn create_eip712(
        &self,
        public_key: &[u8],
        contracts: &[Address],
        window: &ValidityWindow,
    ) -> Eip712Request {
        Eip712Request::user_decrypt(
            self.config.gateway_chain_id,
            self.config.decryption_oracle_contract,
            public_key,
            contracts,
            window,
        )
    }

    /// Start an input batch bound to `(contract, user)`. Values are
    /// validated as they are added; nothing touches the network until
    /// `encrypt()`.
    pub fn create_encrypted_input(
        &self,
        contract_address: Address,
        user_address: Address,
    ) -> EncryptedInputBuilder {
        EncryptedInputBuilder::new(self.engine.clone(), contract_address, user_address)
    }

    /// Decrypt one handle for the signer's address.
    pub async fn user_decrypt(
        &self,
        signer: &dyn WalletSigner,
        handle: Handle,
        contract_address: Address,
    ) -> Result<FheValue> {
        let pair = HandleContractPair {
            handle,
            contract_address,
        };
        let mut values = self.user_decrypt_many(signer, &[pair]).await?;
        values
            .remove(&handle)
            .ok_or_else(|| FhevmError::protocol("response missing requested handle"))
    }

    /// Decrypt a batch of handles, possibly across contracts, under one
    /// signature. Returns cleartexts keyed by handle.
    pub async fn user_decrypt_many(
        &self,
        signer: &dyn WalletSigner,
        pairs: &[HandleContractPair],
    ) -> Result<BTreeMap<Handle, FheValue>> {
        decrypt::user_decrypt_many(&self.engine, &self.config, signer, pairs).await
    }

    /// Reveal handles their contracts marked publicly decryptable. No
    /// signature involved; the ACL decides on the network side.
    pub async fn public_decrypt(&self, handles: &[Handle]) -> Result<BTreeMap<Handle, FheValue>> {
        decrypt::public_decrypt(&self.engine, handles).await
    }

    pub(crate) fn engine(&self) -> &Arc<dyn Engine> {
        &self.engine
    }
}

impl std::fmt::Debug for FhevmInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FhevmInstance")
            .field("chain_id", &self.chain_id())
            .field("relayer_url", &self.config.relayer_url)
            .finish_non_exhaustive()
    }
}

/// Observable lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstanceStatus {
    Uninitialized,
    Initializing,
    Ready,
    Failed,
}

type LoadFuture = Shared<BoxFuture<'static, Result<Arc<FhevmInstance>>>>;

enum LoadState {
    Uninitialized,
    Initializing(LoadFuture),
    Ready(Arc<FhevmInstance>),
    Failed(FhevmError),
}

struct LoadSlot {
    generation: u64,
    state: LoadState,
}

/// Owns the engine lifecycle: coalesced loading, error replay, reset.
pub struct InstanceManager {
    config: FhevmConfig,
    factory: Arc<dyn EngineFactory>,
    current: ArcSwapOption<FhevmInstance>,
    slot: Mutex<LoadSlot>,
}

impl InstanceManager {
    pub fn new(config: FhevmConfig, factory: Arc<dyn EngineFactory>) -> Self {
        InstanceManager {
            config,
            factory,
            current: ArcSwapOption::const_empty(),
            slot: Mutex::new(LoadSlot {
                generation: 0,
                state: LoadState::Uninitialized,
            }),
        }
    }

    /// Load the engine, or join the load already in flight. Idempotent:
    /// once ready, returns the same instance without touching the network;
    /// once failed, replays the same `EngineLoad` error until [`reset`].
    ///
    /// [`reset`]: InstanceManager::reset
    pub async fn init(&self) -> Result<Arc<FhevmInstance>> {
        let (generation, shared) = {
            let mut slot = self.slot.lock().await;
            match &slot.state {
                LoadState::Ready(instance) => return Ok(instance.clone()),
                LoadState::Failed(err) => return Err(err.clone()),
                LoadState::Initializing(fut) => (slot.generation, fut.clone()),
                LoadState::Uninitialized => {
                    let factory = self.factory.clone();
                    let config = self.config.clone();
                    let fut = async move {
                        match factory.load(&config).await {
                            Ok(engine) => {
                                let instance = Arc::new(FhevmInstance::new(engine, config));
                                tracing::info!(
                                    chain_id = instance.chain_id(),
                                    "FHEVM instance initialized"
                                );
                                Ok(instance)
                            }
                            // every load failure surfaces as EngineLoad,
                            // whatever the factory returned
                            Err(FhevmError::EngineLoad(msg)) => {
                                tracing::warn!(error = %msg, "FHEVM instance failed to load");
                                Err(FhevmError::EngineLoad(msg))
                            }
                            Err(other) => {
                                tracing::warn!(error = %other, "FHEVM instance failed to load");
                                Err(FhevmError::EngineLoad(other.to_string()))
                            }
                        }
                    }
                    .boxed()
                    .shared();
                    slot.state = LoadState::Initializing(fut.clone());
                    (slot.generation, fut)
                }
            }
        };

        let result = shared.await;

        // settle, unless a reset superseded this load mid-flight
        let mut slot = self.slot.lock().await;
        if slot.generation == generation {
            match &result {
                Ok(instance) => {
                    slot.state = LoadState::Ready(instance.clone());
                    self.current.store(Some(instance.clone()));
                }
                Err(err) => {
                    slot.state = LoadState::Failed(err.clone());
                }
            }
        }
        result
    }

    /// The ready instance, without waiting. `NotInitialized` until an
    /// `init()` has settled successfully.
    pub fn instance(&self) -> Result<Arc<FhevmInstance>> {
        self.current.load_full().ok_or(FhevmError::NotInitialized)
    }

    pub fn is_ready(&self) -> bool {
        self.current.load().is_some()
    }

    pub async fn status(&self) -> InstanceStatus {
        match &self.slot.lock().await.state {
            LoadState::Uninitialized => InstanceStatus::Uninitialized,
            LoadState::Initializing(_) => InstanceStatus::Initializing,
            LoadState::Ready(_) => InstanceStatus::Ready,
            LoadState::Failed(_) => InstanceStatus::Failed,
        }
    }

    /// Drop the current instance or failure and require a fresh `init()`.
    /// A load still in flight keeps running for its callers, but its result
    /// is discarded here.
    pub async fn reset(&self) {
        let mut slot = self.slot.lock().await;
        slot.generation += 1;
        slot.state = LoadState::Uninitialized;
        self.current.store(None);
        tracing::info!("instance manager reset");
    }

    pub fn config(&self) -> &FhevmConfig {
        &self.config
    }
}
