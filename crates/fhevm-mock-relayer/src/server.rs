//! Mock relayer server

use std::net::SocketAddr;

use alloy_primitives::Address;
use fhevm_core::FhevmConfig;
use tokio::net::TcpListener;

use crate::error::Result;
use crate::routes::create_router;
use crate::state::{create_shared_state, SharedState};

/// In-process relayer with a fresh network keypair per instance
pub struct MockRelayer {
    state: SharedState,
    addr: SocketAddr,
}

impl MockRelayer {
    /// Create a new relayer for the given deployment parameters
    pub fn new(
        chain_id: u64,
        gateway_chain_id: u64,
        decryption_oracle: Address,
        addr: SocketAddr,
    ) -> Self {
        let state = create_shared_state(chain_id, gateway_chain_id, decryption_oracle);
        Self { state, addr }
    }

    /// Run the server
    pub async fn run(self) -> Result<()> {
        let router = create_router(self.state);

        tracing::info!("Starting mock relayer on {}", self.addr);

        let listener = TcpListener::bind(self.addr).await?;
        axum::serve(listener, router)
            .await
            .map_err(|e| crate::error::RelayerError::Internal(e.to_string()))?;

        Ok(())
    }

    /// Get the relayer state for testing
    pub fn state(&self) -> SharedState {
        self.state.clone()
    }
}

/// Builder for MockRelayer
pub struct MockRelayerBuilder {
    chain_id: u64,
    gateway_chain_id: u64,
    decryption_oracle: Address,
    addr: SocketAddr,
}

impl MockRelayerBuilder {
    /// Defaults match the local development preset.
    pub fn new() -> Self {
        Self {
            chain_id: 31_337,
            gateway_chain_id: 55_815,
            decryption_oracle: Address::ZERO,
            addr: ([127, 0, 0, 1], 8547).into(),
        }
    }

    /// Take chain ids and the oracle address from a client config, so the
    /// EIP-712 domain both sides use is the same.
    pub fn for_config(config: &FhevmConfig) -> Self {
        Self {
            chain_id: config.chain_id,
            gateway_chain_id: config.gateway_chain_id,
            decryption_oracle: config.decryption_oracle_contract,
            addr: ([127, 0, 0, 1], 8547).into(),
        }
    }

    pub fn chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn gateway_chain_id(mut self, gateway_chain_id: u64) -> Self {
        self.gateway_chain_id = gateway_chain_id;
        self
    }

    pub fn decryption_oracle(mut self, oracle: Address) -> Self {
        self.decryption_oracle = oracle;
        self
    }

    pub fn addr(mut self, addr: SocketAddr) -> Self {
        self.addr = addr;
        self
    }

    pub fn port(mut self, port: u16) -> Self {
        self.addr = ([127, 0, 0, 1], port).into();
        self
    }

    pub fn build(self) -> MockRelayer {
        MockRelayer::new(
            self.chain_id,
            self.gateway_chain_id,
            self.decryption_oracle,
            self.addr,
        )
    }
}

impl Default for MockRelayerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
