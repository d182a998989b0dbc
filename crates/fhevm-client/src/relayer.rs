//! Relayer-backed engine implementation

use std::collections::BTreeMap;
use std::sync::Arc;

use reqwest::Client;
use serde::{Deserialize, Serialize};

use alloy_primitives::Address;
use fhevm_core::{
    EncryptedValue, FhevmConfig, FhevmError, FheType, FheValue, Handle, NetworkPublicKey, Result,
    SealedEnvelope,
};

use crate::engine::{AuthorizedRequest, Engine, EngineFactory, InputRequest, ReencryptedResult};

/// Response from the key-material endpoint.
#[derive(Serialize, Deserialize)]
pub struct KeyUrlResponse {
    pub chain_id: u64,
    pub key_id: String,
    pub network_public_key: NetworkPublicKey,
}

/// Request to the input-proof endpoint.
#[derive(Serialize, Deserialize)]
pub struct InputProofRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub chain_id: u64,
    pub ciphertext: SealedEnvelope,
    pub types: Vec<FheType>,
}

/// Response from the input-proof endpoint.
#[derive(Serialize, Deserialize)]
pub struct InputProofResponse {
    pub handles: Vec<Handle>,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

/// Request to the user-decrypt endpoint. Field names and the unprefixed
/// signature follow the relayer wire format.
#[derive(Serialize, Deserialize)]
pub struct UserDecryptWireRequest {
    pub handle_contract_pairs: Vec<WirePair>,
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],
    pub signature: String,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

#[derive(Serialize, Deserialize)]
pub struct WirePair {
    pub handle: Handle,
    pub contract_address: Address,
}

/// Response from the user-decrypt endpoint.
#[derive(Serialize, Deserialize)]
pub struct UserDecryptWireResponse {
    pub results: Vec<WireReencrypted>,
}

#[derive(Serialize, Deserialize)]
pub struct WireReencrypted {
    pub handle: Handle,
    pub envelope: SealedEnvelope,
}

/// Request to the public-decrypt endpoint.
#[derive(Serialize, Deserialize)]
pub struct PublicDecryptRequest {
    pub handles: Vec<Handle>,
}

/// Response from the public-decrypt endpoint.
#[derive(Serialize, Deserialize)]
pub struct PublicDecryptResponse {
    pub values: Vec<DecryptedEntry>,
}

#[derive(Serialize, Deserialize)]
pub struct DecryptedEntry {
    pub handle: Handle,
    pub value: FheValue,
}

/// Engine that fronts a relayer over HTTP.
#[derive(Debug)]
pub struct RelayerEngine {
    http: Client,
    relayer_url: String,
    chain_id: u64,
    network_public_key: NetworkPublicKey,
}

impl RelayerEngine {
    /// Load against the configured relayer: fetch key material and pin the
    /// chain id. Every failure on this path is an `EngineLoad`.
    pub async fn load(config: &FhevmConfig) -> Result<Self> {
        config.validate()?;
        let http = Client::new();
        let relayer_url = config.relayer_url.trim_end_matches('/').to_string();

        let keys = fetch_keyurl(&http, &relayer_url)
            .await
            .map_err(|e| FhevmError::EngineLoad(e.to_string()))?;

        if keys.chain_id != config.chain_id {
            return Err(FhevmError::EngineLoad(format!(
                "relayer serves chain {}, config expects {}",
                keys.chain_id, config.chain_id
            )));
        }

        tracing::info!(
            chain_id = keys.chain_id,
            key_id = %keys.key_id,
            relayer = %relayer_url,
            "FHEVM engine loaded"
        );

        Ok(RelayerEngine {
            http,
            relayer_url,
            chain_id: keys.chain_id,
            network_public_key: keys.network_public_key,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.relayer_url, path)
    }
}

#[async_trait::async_trait]
impl Engine for RelayerEngine {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn network_public_key(&self) -> NetworkPublicKey {
        self.network_public_key
    }

    async fn encrypt_input(&self, request: InputRequest) -> Result<EncryptedValue> {
        let wire = InputProofRequest {
            contract_address: request.contract_address,
            user_address: request.user_address,
            chain_id: self.chain_id,
            ciphertext: request.ciphertext.clone(),
            types: request.types,
        };

        let resp = self
            .http
            .post(self.url("/v1/input-proof"))
            .json(&wire)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp).await?;
        let proof: InputProofResponse = resp.json().await.map_err(transport)?;

        tracing::debug!(
            handles = proof.handles.len(),
            contract = %request.contract_address,
            "input registered"
        );

        Ok(EncryptedValue {
            data: request.ciphertext.ciphertext,
            handles: proof.handles,
            proof: proof.proof,
        })
    }

    async fn user_decrypt(&self, request: AuthorizedRequest) -> Result<Vec<ReencryptedResult>> {
        let wire = UserDecryptWireRequest {
            handle_contract_pairs: request
                .pairs
                .iter()
                .map(|(handle, contract_address)| WirePair {
                    handle: *handle,
                    contract_address: *contract_address,
                })
                .collect(),
            public_key: request.public_key,
            signature: request.signature,
            user_address: request.user_address,
            contract_addresses: request.contract_addresses,
            start_timestamp: request.window.start_timestamp,
            duration_days: request.window.duration_days,
        };

        let resp = self
            .http
            .post(self.url("/v1/user-decrypt"))
            .json(&wire)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp).await?;
        let body: UserDecryptWireResponse = resp.json().await.map_err(transport)?;

        Ok(body
            .results
            .into_iter()
            .map(|r| ReencryptedResult {
                handle: r.handle,
                envelope: r.envelope,
            })
            .collect())
    }

    async fn public_decrypt(&self, handles: &[Handle]) -> Result<BTreeMap<Handle, FheValue>> {
        let wire = PublicDecryptRequest {
            handles: handles.to_vec(),
        };

        let resp = self
            .http
            .post(self.url("/v1/public-decrypt"))
            .json(&wire)
            .send()
            .await
            .map_err(transport)?;
        let resp = check_status(resp).await?;
        let body: PublicDecryptResponse = resp.json().await.map_err(transport)?;

        Ok(body
            .values
            .into_iter()
            .map(|entry| (entry.handle, entry.value))
            .collect())
    }
}

/// Default factory: loads a [`RelayerEngine`] from the config.
pub struct RelayerEngineFactory;

#[async_trait::async_trait]
impl EngineFactory for RelayerEngineFactory {
    async fn load(&self, config: &FhevmConfig) -> Result<Arc<dyn Engine>> {
        let engine = RelayerEngine::load(config).await?;
        Ok(Arc::new(engine))
    }
}

async fn fetch_keyurl(http: &Client, relayer_url: &str) -> Result<KeyUrlResponse> {
    let resp = http
        .get(format!("{relayer_url}/v1/keyurl"))
        .send()
        .await
        .map_err(transport)?;
    let resp = check_status(resp).await?;
    resp.json().await.map_err(transport)
}

/// Map an HTTP status onto the error taxonomy. 403 is the ACL speaking;
/// 4xx is a request the relayer understood and refused; everything else is
/// the network's problem and worth retrying.
async fn check_status(resp: reqwest::Response) -> Result<reqwest::Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let message = resp.text().await.unwrap_or_default();
    Err(match status.as_u16() {
        403 => FhevmError::AccessDenied(message),
        400 | 404 | 422 => FhevmError::protocol(format!("relayer rejected request: {message}")),
        code => FhevmError::network(format!("relayer returned {code}: {message}")),
    })
}

fn transport(e: reqwest::Error) -> FhevmError {
    FhevmError::network(e.to_string())
}
