//! End-to-end SDK integration tests
//!
//! Runs the full client flow against an in-process mock relayer over real
//! HTTP: engine load -> encrypted input -> user decrypt -> public decrypt,
//! plus ACL updates through the admin route.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{address, Address, U256};
use fhevm_client::{FhevmClient, LocalWalletSigner, WalletSigner};
use fhevm_core::{FhevmConfig, FhevmError, FheType, FheValue, Handle, HANDLE_VERSION};
use fhevm_mock_relayer::{create_router, create_shared_state, SharedState};
use reqwest::Client;
use serde_json::json;
use tokio::net::TcpListener;

static PORT_COUNTER: AtomicU16 = AtomicU16::new(19200);

fn next_port() -> u16 {
    PORT_COUNTER.fetch_add(1, Ordering::SeqCst)
}

const CONTRACT: Address = address!("0x1111111111111111111111111111111111111111");
const OTHER_CONTRACT: Address = address!("0x2222222222222222222222222222222222222222");

/// Test harness running a mock relayer for real clients to talk to
pub struct TestHarness {
    pub relayer_url: String,
    pub config: FhevmConfig,
    pub state: SharedState,
    pub http: Client,
    _shutdown: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestHarness {
    pub async fn new() -> Self {
        let port = next_port();
        let addr: SocketAddr = ([127, 0, 0, 1], port).into();
        let relayer_url = format!("http://127.0.0.1:{}", port);

        let config = FhevmConfig::local().with_relayer_url(&relayer_url);
        let state = create_shared_state(
            config.chain_id,
            config.gateway_chain_id,
            config.decryption_oracle_contract,
        );

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let router = create_router(state.clone());
        let listener = TcpListener::bind(addr).await.expect("Bind should succeed");

        tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await
                .ok();
        });

        tokio::time::sleep(Duration::from_millis(100)).await;

        for _ in 0..10 {
            if Client::new()
                .get(format!("{}/v1/health", relayer_url))
                .send()
                .await
                .is_ok()
            {
                break;
            }
            tokio::time::sleep(Duration::from_millis(50)).await;
        }

        Self {
            relayer_url,
            config,
            state,
            http: Client::new(),
            _shutdown: Some(shutdown_tx),
        }
    }

    pub fn client(&self) -> FhevmClient {
        FhevmClient::new(self.config.clone())
    }

    /// Client with a loaded engine
    pub async fn ready_client(&self) -> FhevmClient {
        let client = self.client();
        client.init().await.expect("init against mock relayer");
        client
    }

    /// Health check
    pub async fn health(&self) -> anyhow::Result<serde_json::Value> {
        let health = self
            .http
            .get(format!("{}/v1/health", self.relayer_url))
            .send()
            .await?
            .json()
            .await?;
        Ok(health)
    }

    pub async fn stored_handles(&self) -> anyhow::Result<u64> {
        self.health().await?["stats"]["stored_handles"]
            .as_u64()
            .ok_or_else(|| anyhow::anyhow!("health report lacks stored_handles"))
    }

    /// Apply an ACL update over the admin route
    pub async fn acl_update(&self, body: serde_json::Value) -> anyhow::Result<reqwest::Response> {
        let resp = self
            .http
            .post(format!("{}/v1/acl", self.relayer_url))
            .json(&body)
            .send()
            .await?;
        Ok(resp)
    }

    pub async fn grant_user(&self, handle: Handle, user: Address) {
        let resp = self
            .acl_update(json!({ "handle": handle, "grant_user": user }))
            .await
            .expect("acl request");
        assert!(resp.status().is_success(), "grant should succeed");
    }

    pub async fn make_public(&self, handle: Handle) {
        let resp = self
            .acl_update(json!({ "handle": handle, "publicly_decryptable": true }))
            .await
            .expect("acl request");
        assert!(resp.status().is_success(), "acl update should succeed");
    }
}

// ============================================================================
// Happy Path Tests
// ============================================================================

#[tokio::test]
async fn test_relayer_health() {
    let harness = TestHarness::new().await;
    let health = harness.health().await.expect("health");

    assert_eq!(health["status"], "ready");
    assert_eq!(health["stats"]["stored_handles"], 0);
}

#[tokio::test]
async fn test_client_init_against_relayer() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;

    assert!(client.is_ready());
    let instance = client.instance().expect("instance after init");
    assert_eq!(instance.chain_id(), harness.config.chain_id);

    let relayer_key = harness.state.read().await.network_public_key();
    assert_eq!(instance.network_public_key(), relayer_key);
}

#[tokio::test]
async fn test_encrypt_registers_typed_handles() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_bool(true).expect("bool");
    input.add_u64(123_456).expect("u64");
    input
        .add_address(address!("0x00000000000000000000000000000000DeaDBeef"))
        .expect("address");

    let encrypted = client.encrypt(input).await.expect("encrypt");

    assert_eq!(encrypted.handles.len(), 3);
    assert_eq!(encrypted.handles[0].fhe_type(), Some(FheType::Bool));
    assert_eq!(encrypted.handles[1].fhe_type(), Some(FheType::Uint64));
    assert_eq!(encrypted.handles[2].fhe_type(), Some(FheType::Address));
    assert!(encrypted.handles.iter().all(|h| h.version() == HANDLE_VERSION));
    assert!(!encrypted.data.is_empty());
    assert!(!encrypted.proof.is_empty());

    assert_eq!(harness.stored_handles().await.expect("stats"), 3);
}

#[tokio::test]
async fn test_user_decrypt_round_trip() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_u64(7_777).expect("u64");
    input.add_bool(false).expect("bool");
    let encrypted = client.encrypt(input).await.expect("encrypt");

    let value = client
        .user_decrypt(&signer, encrypted.handles[0], CONTRACT)
        .await
        .expect("user decrypt");
    assert_eq!(value, FheValue::Uint64(7_777));

    let value = client
        .user_decrypt(&signer, encrypted.handles[1], CONTRACT)
        .await
        .expect("user decrypt");
    assert_eq!(value, FheValue::Bool(false));
}

#[tokio::test]
async fn test_round_trip_law_for_every_type() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    let values = [
        FheValue::Bool(true),
        FheValue::Uint8(255),
        FheValue::Uint16(65_535),
        FheValue::Uint32(4_000_000_000),
        FheValue::Uint64(u64::MAX),
        FheValue::Uint128(1 << 100),
        FheValue::Uint256(U256::MAX),
        FheValue::Address(address!("0x8ba1f109551bD432803012645Ac136ddd64DBA72")),
    ];

    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    for value in values {
        input.add_value(value).expect("add");
    }
    let encrypted = client.encrypt(input).await.expect("encrypt");
    assert_eq!(encrypted.handles.len(), values.len());

    let pairs: Vec<fhevm_core::HandleContractPair> = encrypted
        .handles
        .iter()
        .map(|&handle| fhevm_core::HandleContractPair {
            handle,
            contract_address: CONTRACT,
        })
        .collect();
    let decrypted = client
        .user_decrypt_many(&signer, &pairs)
        .await
        .expect("batch decrypt");

    for (value, handle) in values.iter().zip(&encrypted.handles) {
        assert_eq!(decrypted.get(handle), Some(value), "{} diverged", value.fhe_type());
    }
}

#[tokio::test]
async fn test_user_decrypt_many_across_contracts() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_u32(11).expect("u32");
    let first = client.encrypt(input).await.expect("encrypt");

    let mut input = client
        .create_encrypted_input(OTHER_CONTRACT, signer.address())
        .expect("builder");
    input.add_u32(22).expect("u32");
    let second = client.encrypt(input).await.expect("encrypt");

    let pairs = vec![
        fhevm_core::HandleContractPair {
            handle: first.handles[0],
            contract_address: CONTRACT,
        },
        fhevm_core::HandleContractPair {
            handle: second.handles[0],
            contract_address: OTHER_CONTRACT,
        },
    ];

    let values = client
        .user_decrypt_many(&signer, &pairs)
        .await
        .expect("batch decrypt");

    assert_eq!(values.get(&first.handles[0]), Some(&FheValue::Uint32(11)));
    assert_eq!(values.get(&second.handles[0]), Some(&FheValue::Uint32(22)));
}

#[tokio::test]
async fn test_public_decrypt_after_acl_update() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_u128(1 << 100).expect("u128");
    let encrypted = client.encrypt(input).await.expect("encrypt");
    let handle = encrypted.handles[0];

    let err = client.public_decrypt(&[handle]).await.unwrap_err();
    assert!(matches!(err, FhevmError::AccessDenied(_)), "got {err:?}");

    harness.make_public(handle).await;

    let values = client.public_decrypt(&[handle]).await.expect("reveal");
    assert_eq!(values.get(&handle), Some(&FheValue::Uint128(1 << 100)));
}

#[tokio::test]
async fn test_acl_grant_allows_second_user() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let owner = LocalWalletSigner::random();
    let friend = LocalWalletSigner::random();

    let mut input = client
        .create_encrypted_input(CONTRACT, owner.address())
        .expect("builder");
    input.add_u8(42).expect("u8");
    let encrypted = client.encrypt(input).await.expect("encrypt");
    let handle = encrypted.handles[0];

    let err = client
        .user_decrypt(&friend, handle, CONTRACT)
        .await
        .unwrap_err();
    assert!(matches!(err, FhevmError::AccessDenied(_)), "got {err:?}");

    harness.grant_user(handle, friend.address()).await;

    let value = client
        .user_decrypt(&friend, handle, CONTRACT)
        .await
        .expect("decrypt after grant");
    assert_eq!(value, FheValue::Uint8(42));
}

// ============================================================================
// Error Handling Tests
// ============================================================================

#[tokio::test]
async fn test_unknown_handle_is_protocol_error() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    let ghost = Handle::from_bytes([0xab; 32]);
    let err = client
        .user_decrypt(&signer, ghost, CONTRACT)
        .await
        .unwrap_err();
    assert!(matches!(err, FhevmError::Validation(_)), "got {err:?}");

    // a well-formed but never registered handle makes it to the relayer
    let ghost = Handle::derive(alloy_primitives::keccak256(b"ghost"), 0, FheType::Uint64);
    let err = client
        .user_decrypt(&signer, ghost, CONTRACT)
        .await
        .unwrap_err();
    assert!(matches!(err, FhevmError::Protocol(_)), "got {err:?}");
}

#[tokio::test]
async fn test_wrong_chain_is_rejected_on_the_wire() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    // grab a valid sealed payload by encrypting through the client first
    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_u8(1).expect("u8");
    let _ = client.encrypt(input).await.expect("encrypt");

    let resp = harness
        .http
        .post(format!("{}/v1/input-proof", harness.relayer_url))
        .json(&json!({
            "contract_address": CONTRACT,
            "user_address": signer.address(),
            "chain_id": 999,
            "ciphertext": { "ephemeral_pk": "00".repeat(32), "nonce": "00".repeat(12), "ciphertext": "00" },
            "types": ["Uint8"],
        }))
        .send()
        .await
        .expect("request");
    assert_eq!(resp.status().as_u16(), 400);
    let body = resp.text().await.expect("body");
    assert!(body.contains("chain"), "unexpected body: {body}");
}

#[tokio::test]
async fn test_relayer_rejection_surfaces_as_protocol_error() {
    let harness = TestHarness::new().await;
    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();

    // relayer switches networks after the client pinned its chain
    harness.state.write().await.chain_id = 999;

    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_u8(1).expect("u8");
    let err = client.encrypt(input).await.expect_err("must fail");
    assert!(matches!(err, FhevmError::Protocol(_)), "got {err:?}");
    assert!(!err.is_retryable());
}

#[tokio::test]
async fn test_invalid_json_returns_4xx() {
    let harness = TestHarness::new().await;

    let resp = harness
        .http
        .post(format!("{}/v1/user-decrypt", harness.relayer_url))
        .header("content-type", "application/json")
        .body(r#"{"invalid": "json"}"#)
        .send()
        .await
        .expect("request");

    let status = resp.status().as_u16();
    assert!((400..500).contains(&status), "Expected 4xx, got {}", status);
}

#[tokio::test]
async fn test_relayer_continues_after_error() {
    let harness = TestHarness::new().await;

    let _ = harness
        .http
        .post(format!("{}/v1/input-proof", harness.relayer_url))
        .header("content-type", "application/json")
        .body("not json")
        .send()
        .await;

    let health = harness.health().await.expect("health");
    assert_eq!(health["status"], "ready");

    let client = harness.ready_client().await;
    let signer = LocalWalletSigner::random();
    let mut input = client
        .create_encrypted_input(CONTRACT, signer.address())
        .expect("builder");
    input.add_u16(9).expect("u16");
    let encrypted = client.encrypt(input).await.expect("encrypt after error");
    let value = client
        .user_decrypt(&signer, encrypted.handles[0], CONTRACT)
        .await
        .expect("decrypt after error");
    assert_eq!(value, FheValue::Uint16(9));
}

// ============================================================================
// Concurrency Tests
// ============================================================================

#[tokio::test]
async fn test_concurrent_encrypts_all_register() {
    let harness = TestHarness::new().await;
    let client = Arc::new(harness.ready_client().await);

    let mut tasks = vec![];
    for i in 0..8u64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let signer = LocalWalletSigner::random();
            let mut input = client.create_encrypted_input(CONTRACT, signer.address())?;
            input.add_u64(i)?;
            let encrypted = client.encrypt(input).await?;
            Ok::<_, FhevmError>((signer, encrypted))
        }));
    }

    let mut encrypted = vec![];
    for task in tasks {
        encrypted.push(task.await.expect("join").expect("encrypt"));
    }

    assert_eq!(harness.stored_handles().await.expect("stats"), 8);

    // every task can still decrypt its own value
    for (i, (signer, enc)) in encrypted.iter().enumerate() {
        let value = client
            .user_decrypt(signer, enc.handles[0], CONTRACT)
            .await
            .expect("decrypt");
        assert_eq!(value, FheValue::Uint64(i as u64));
    }
}
