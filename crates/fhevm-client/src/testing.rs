//! In-process fakes for lifecycle and protocol tests
//!
//! [`FakeEngine`] behaves like the relayer-backed engine without a network:
//! it opens sealed inputs with its own key, derives real handles, enforces
//! an owner-only ACL and reencrypts to the caller's ephemeral key. The
//! factory adds failure injection and a gate for races around `reset()`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::Notify;
use x25519_dalek::{PublicKey, StaticSecret};

use alloy_primitives::{keccak256, Address};
use fhevm_core::{
    decode_batch, encode_value, limits, EncryptedValue, FhevmConfig, FhevmError, FheType,
    FheValue, Handle, NetworkPublicKey, Result, SealedEnvelope,
};

use crate::engine::{AuthorizedRequest, Engine, EngineFactory, InputRequest, ReencryptedResult};
use crate::wallet::WalletSigner;

struct Stored {
    value: FheValue,
    contract: Address,
    user: Address,
}

/// Engine double with a real key and a real store.
pub struct FakeEngine {
    chain_id: u64,
    secret: StaticSecret,
    public: NetworkPublicKey,
    store: Mutex<BTreeMap<Handle, Stored>>,
    public_allowed: AtomicBool,
    fail_next: Mutex<Option<FhevmError>>,
}

impl FakeEngine {
    pub fn new(chain_id: u64) -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = NetworkPublicKey(*PublicKey::from(&secret).as_bytes());
        FakeEngine {
            chain_id,
            secret,
            public,
            store: Mutex::new(BTreeMap::new()),
            public_allowed: AtomicBool::new(true),
            fail_next: Mutex::new(None),
        }
    }

    /// Make the next engine call fail with `err` instead of running.
    pub fn fail_next(&self, err: FhevmError) {
        *self.fail_next.lock().unwrap() = Some(err);
    }

    /// Toggle the public-decrypt side of the ACL.
    pub fn allow_public(&self, allowed: bool) {
        self.public_allowed.store(allowed, Ordering::SeqCst);
    }

    pub fn stored_handles(&self) -> Vec<Handle> {
        self.store.lock().unwrap().keys().copied().collect()
    }

    fn take_injected(&self) -> Result<()> {
        match self.fail_next.lock().unwrap().take() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl Engine for FakeEngine {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn network_public_key(&self) -> NetworkPublicKey {
        self.public
    }

    async fn encrypt_input(&self, request: InputRequest) -> Result<EncryptedValue> {
        self.take_injected()?;

        let payload = request.ciphertext.open(&self.secret).ok_or_else(|| {
            FhevmError::protocol("input envelope does not open with the network key")
        })?;
        let values = decode_batch(&payload)?;

        if values.is_empty() || values.len() > limits::MAX_INPUT_VALUES {
            return Err(FhevmError::protocol("batch size out of bounds"));
        }
        let actual: Vec<FheType> = values.iter().map(|v| v.fhe_type()).collect();
        if actual != request.types {
            return Err(FhevmError::protocol(
                "declared types do not match the sealed batch",
            ));
        }

        let digest = keccak256(&request.ciphertext.ciphertext);
        let mut handles = Vec::with_capacity(values.len());
        let mut store = self.store.lock().unwrap();
        for (index, value) in values.into_iter().enumerate() {
            let handle = Handle::derive(digest, index as u8, value.fhe_type());
            store.insert(
                handle,
                Stored {
                    value,
                    contract: request.contract_address,
                    user: request.user_address,
                },
            );
            handles.push(handle);
        }

        Ok(EncryptedValue {
            data: request.ciphertext.ciphertext,
            handles,
            proof: digest.to_vec(),
        })
    }

    async fn user_decrypt(&self, request: AuthorizedRequest) -> Result<Vec<ReencryptedResult>> {
        self.take_injected()?;
        request.window.validate()?;

        let signature = hex::decode(&request.signature)
            .map_err(|_| FhevmError::protocol("signature is not bare hex"))?;
        if signature.len() != 65 {
            return Err(FhevmError::protocol("signature must be 65 bytes"));
        }

        let store = self.store.lock().unwrap();
        let mut results = Vec::with_capacity(request.pairs.len());
        for (handle, contract) in &request.pairs {
            let stored = store
                .get(handle)
                .ok_or_else(|| FhevmError::protocol(format!("unknown handle {handle}")))?;
            if stored.contract != *contract || stored.user != request.user_address {
                return Err(FhevmError::AccessDenied(format!(
                    "user {} has no grant for handle {handle}",
                    request.user_address
                )));
            }
            let payload = encode_value(&stored.value)?;
            let envelope = SealedEnvelope::seal(&request.public_key, &payload)?;
            results.push(ReencryptedResult {
                handle: *handle,
                envelope,
            });
        }
        Ok(results)
    }

    async fn public_decrypt(&self, handles: &[Handle]) -> Result<BTreeMap<Handle, FheValue>> {
        self.take_injected()?;

        if !self.public_allowed.load(Ordering::SeqCst) {
            return Err(FhevmError::AccessDenied(
                "handle is not publicly decryptable".into(),
            ));
        }

        let store = self.store.lock().unwrap();
        let mut out = BTreeMap::new();
        for handle in handles {
            let stored = store
                .get(handle)
                .ok_or_else(|| FhevmError::protocol(format!("unknown handle {handle}")))?;
            out.insert(*handle, stored.value);
        }
        Ok(out)
    }
}

/// Shared view of how many loads a [`FakeEngineFactory`] has run.
#[derive(Clone)]
pub struct LoadCounter(Arc<AtomicUsize>);

impl LoadCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

/// Two-phase gate: the test waits for a load to enter, then releases it.
pub struct FakeGate {
    entered: Arc<Notify>,
    release: Arc<Notify>,
}

impl FakeGate {
    /// Wait until a load has started and is parked on the gate.
    pub async fn entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.release.notify_one();
    }
}

/// Factory double with failure injection and load counting.
pub struct FakeEngineFactory {
    loads: Arc<AtomicUsize>,
    failures_remaining: AtomicUsize,
    fail_message: String,
    gate: Option<(Arc<Notify>, Arc<Notify>)>,
    fixed: Option<Arc<FakeEngine>>,
}

impl FakeEngineFactory {
    pub fn new() -> Self {
        FakeEngineFactory {
            loads: Arc::new(AtomicUsize::new(0)),
            failures_remaining: AtomicUsize::new(0),
            fail_message: String::new(),
            gate: None,
            fixed: None,
        }
    }

    /// Always hand out this exact engine, so tests can keep a handle on it.
    pub fn with_engine(engine: Arc<FakeEngine>) -> Self {
        FakeEngineFactory {
            fixed: Some(engine),
            ..Self::new()
        }
    }

    /// Fail the first `times` loads with an `EngineLoad(message)`.
    pub fn failing(times: usize, message: &str) -> Self {
        FakeEngineFactory {
            failures_remaining: AtomicUsize::new(times),
            fail_message: message.to_string(),
            ..Self::new()
        }
    }

    /// A factory whose loads park on a gate until released.
    pub fn gated() -> (Self, FakeGate) {
        let entered = Arc::new(Notify::new());
        let release = Arc::new(Notify::new());
        let factory = FakeEngineFactory {
            gate: Some((entered.clone(), release.clone())),
            ..Self::new()
        };
        (factory, FakeGate { entered, release })
    }

    pub fn load_counter(&self) -> LoadCounter {
        LoadCounter(self.loads.clone())
    }
}

impl Default for FakeEngineFactory {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl EngineFactory for FakeEngineFactory {
    async fn load(&self, config: &FhevmConfig) -> Result<Arc<dyn Engine>> {
        self.loads.fetch_add(1, Ordering::SeqCst);

        if let Some((entered, release)) = &self.gate {
            entered.notify_one();
            release.notified().await;
        }

        if self.failures_remaining.load(Ordering::SeqCst) > 0 {
            self.failures_remaining.fetch_sub(1, Ordering::SeqCst);
            return Err(FhevmError::EngineLoad(self.fail_message.clone()));
        }

        match &self.fixed {
            Some(engine) => Ok(engine.clone()),
            None => Ok(Arc::new(FakeEngine::new(config.chain_id))),
        }
    }
}

/// Signer that declines every request, the way a wallet prompt can.
pub struct DenyingSigner {
    address: Address,
}

impl DenyingSigner {
    pub fn new(address: Address) -> Self {
        DenyingSigner { address }
    }
}

#[async_trait::async_trait]
impl WalletSigner for DenyingSigner {
    fn address(&self) -> Address {
        self.address
    }

    async fn sign_typed_data(&self, _request: &fhevm_core::Eip712Request) -> Result<Vec<u8>> {
        Err(FhevmError::UserRejected)
    }
}
