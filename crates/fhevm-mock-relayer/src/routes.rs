//! HTTP routes for the mock relayer

use std::time::{SystemTime, UNIX_EPOCH};

use axum::{
    extract::State,
    http::Method,
    response::Json,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};

use alloy_primitives::{Address, Signature};
use fhevm_core::{
    Eip712Request, FheType, FheValue, Handle, NetworkPublicKey, SealedEnvelope, ValidityWindow,
};

use crate::error::{RelayerError, Result};
use crate::state::{AclEntry, RelayerStats, SharedState};

/// Health check response
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub stats: RelayerStats,
}

/// Key material served to clients during engine load
#[derive(Serialize)]
pub struct KeyUrlResponse {
    pub chain_id: u64,
    pub key_id: String,
    pub network_public_key: NetworkPublicKey,
}

/// Input registration request
#[derive(Deserialize)]
pub struct InputProofRequest {
    pub contract_address: Address,
    pub user_address: Address,
    pub chain_id: u64,
    pub ciphertext: SealedEnvelope,
    pub types: Vec<FheType>,
}

/// Input registration response
#[derive(Serialize)]
pub struct InputProofResponse {
    pub handles: Vec<Handle>,
    #[serde(with = "hex::serde")]
    pub proof: Vec<u8>,
}

/// User-decrypt request. The signature travels as bare hex, no 0x prefix.
#[derive(Deserialize)]
pub struct UserDecryptRequest {
    pub handle_contract_pairs: Vec<HandlePair>,
    #[serde(with = "hex::serde")]
    pub public_key: [u8; 32],
    pub signature: String,
    pub user_address: Address,
    pub contract_addresses: Vec<Address>,
    pub start_timestamp: u64,
    pub duration_days: u64,
}

#[derive(Deserialize)]
pub struct HandlePair {
    pub handle: Handle,
    pub contract_address: Address,
}

/// User-decrypt response
#[derive(Serialize)]
pub struct UserDecryptResponse {
    pub results: Vec<ReencryptedEntry>,
}

#[derive(Serialize)]
pub struct ReencryptedEntry {
    pub handle: Handle,
    pub envelope: SealedEnvelope,
}

/// Public-decrypt request
#[derive(Deserialize)]
pub struct PublicDecryptRequest {
    pub handles: Vec<Handle>,
}

/// Public-decrypt response
#[derive(Serialize)]
pub struct PublicDecryptResponse {
    pub values: Vec<DecryptedEntry>,
}

#[derive(Serialize)]
pub struct DecryptedEntry {
    pub handle: Handle,
    pub value: FheValue,
}

/// ACL update standing in for the on-chain grant transactions a real
/// deployment would make.
#[derive(Deserialize)]
pub struct AclUpdateRequest {
    pub handle: Handle,
    #[serde(default)]
    pub grant_user: Option<Address>,
    #[serde(default)]
    pub publicly_decryptable: Option<bool>,
}

/// Health check endpoint
async fn health(State(state): State<SharedState>) -> Json<HealthResponse> {
    let state = state.read().await;
    Json(HealthResponse {
        status: "ready".to_string(),
        stats: state.stats(),
    })
}

/// Key material endpoint
async fn keyurl(State(state): State<SharedState>) -> Json<KeyUrlResponse> {
    let state = state.read().await;
    Json(KeyUrlResponse {
        chain_id: state.chain_id,
        key_id: state.key_id(),
        network_public_key: state.network_public_key(),
    })
}

/// Register an encrypted input batch and derive its handles
async fn input_proof(
    State(state): State<SharedState>,
    Json(req): Json<InputProofRequest>,
) -> Result<Json<InputProofResponse>> {
    let mut state = state.write().await;

    if req.chain_id != state.chain_id {
        return Err(RelayerError::InvalidRequest(format!(
            "request targets chain {}, relayer serves chain {}",
            req.chain_id, state.chain_id
        )));
    }

    let (handles, proof) = state.register_input(
        req.contract_address,
        req.user_address,
        &req.ciphertext,
        &req.types,
    )?;

    Ok(Json(InputProofResponse { handles, proof }))
}

/// Reencrypt handles to the caller's ephemeral key. The EIP-712
/// authorization must recover to the claimed user address and every pair
/// must pass the ACL.
async fn user_decrypt(
    State(state): State<SharedState>,
    Json(req): Json<UserDecryptRequest>,
) -> Result<Json<UserDecryptResponse>> {
    let state = state.read().await;

    let window = ValidityWindow {
        start_timestamp: req.start_timestamp,
        duration_days: req.duration_days,
    };
    window
        .validate()
        .map_err(|e| RelayerError::InvalidRequest(e.to_string()))?;
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs();
    if window.is_expired_at(now) {
        return Err(RelayerError::InvalidRequest(
            "authorization window has expired".into(),
        ));
    }

    let signer = recover_signer(state.gateway_chain_id, state.decryption_oracle, &req, &window)?;
    if signer != req.user_address {
        return Err(RelayerError::AccessDenied(format!(
            "authorization signed by {signer}, request claims {}",
            req.user_address
        )));
    }

    let mut results = Vec::with_capacity(req.handle_contract_pairs.len());
    for pair in &req.handle_contract_pairs {
        if !req.contract_addresses.contains(&pair.contract_address) {
            return Err(RelayerError::InvalidRequest(format!(
                "contract {} is missing from the signed contract list",
                pair.contract_address
            )));
        }
        let envelope = state.reencrypt(
            pair.handle,
            pair.contract_address,
            req.user_address,
            &req.public_key,
        )?;
        results.push(ReencryptedEntry {
            handle: pair.handle,
            envelope,
        });
    }

    tracing::debug!(
        user = %req.user_address,
        handles = results.len(),
        "user decrypt served"
    );

    Ok(Json(UserDecryptResponse { results }))
}

/// Reveal publicly decryptable handles
async fn public_decrypt(
    State(state): State<SharedState>,
    Json(req): Json<PublicDecryptRequest>,
) -> Result<Json<PublicDecryptResponse>> {
    if req.handles.is_empty() {
        return Err(RelayerError::InvalidRequest("no handles given".into()));
    }
    let state = state.read().await;
    let mut values = Vec::with_capacity(req.handles.len());
    for handle in req.handles {
        values.push(DecryptedEntry {
            handle,
            value: state.public_value(handle)?,
        });
    }
    Ok(Json(PublicDecryptResponse { values }))
}

/// Apply an ACL update and echo the resulting entry
async fn acl_update(
    State(state): State<SharedState>,
    Json(req): Json<AclUpdateRequest>,
) -> Result<Json<AclEntry>> {
    let mut state = state.write().await;
    if let Some(user) = req.grant_user {
        state.grant_user(req.handle, user)?;
    }
    if let Some(flag) = req.publicly_decryptable {
        state.set_publicly_decryptable(req.handle, flag)?;
    }
    state.acl_entry(req.handle).map(Json)
}

/// Recover the address behind the request's EIP-712 authorization
fn recover_signer(
    gateway_chain_id: u64,
    decryption_oracle: Address,
    req: &UserDecryptRequest,
    window: &ValidityWindow,
) -> Result<Address> {
    if req.signature.starts_with("0x") {
        return Err(RelayerError::InvalidRequest(
            "signature must be bare hex without a 0x prefix".into(),
        ));
    }
    let bytes = hex::decode(&req.signature)
        .map_err(|e| RelayerError::InvalidRequest(format!("signature is not hex: {e}")))?;
    if bytes.len() != 65 {
        return Err(RelayerError::InvalidRequest(format!(
            "signature must be 65 bytes, got {}",
            bytes.len()
        )));
    }
    let signature = Signature::from_raw(&bytes)
        .map_err(|e| RelayerError::InvalidRequest(format!("malformed signature: {e}")))?;

    let typed = Eip712Request::user_decrypt(
        gateway_chain_id,
        decryption_oracle,
        &req.public_key,
        &req.contract_addresses,
        window,
    );
    signature
        .recover_address_from_prehash(&typed.signing_hash())
        .map_err(|e| RelayerError::InvalidRequest(format!("signature recovery failed: {e}")))
}

/// Create the router with all routes
pub fn create_router(state: SharedState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any);

    Router::new()
        .route("/v1/health", get(health))
        .route("/v1/keyurl", get(keyurl))
        .route("/v1/input-proof", post(input_proof))
        .route("/v1/user-decrypt", post(user_decrypt))
        .route("/v1/public-decrypt", post(public_decrypt))
        .route("/v1/acl", post(acl_update))
        .layer(cors)
        .with_state(state)
}
