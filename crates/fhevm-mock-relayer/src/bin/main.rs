//! Standalone mock relayer for local development
//!
//! Run with:
//! ```bash
//! cargo run -p fhevm-mock-relayer -- --port 8547
//! ```

use alloy_primitives::Address;
use clap::Parser;
use fhevm_mock_relayer::MockRelayerBuilder;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "fhevm-mock-relayer")]
#[command(about = "In-memory FHEVM relayer for local development")]
struct Args {
    /// Port to listen on
    #[arg(long, default_value = "8547")]
    port: u16,

    /// Chain id the relayer claims to serve
    #[arg(long, default_value = "31337")]
    chain_id: u64,

    /// Gateway chain id, part of the EIP-712 domain
    #[arg(long, default_value = "55815")]
    gateway_chain_id: u64,

    /// Decryption oracle address, part of the EIP-712 domain
    #[arg(long, default_value = "0x0000000000000000000000000000000000000000")]
    decryption_oracle: Address,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fhevm_mock_relayer=info".into()),
        )
        .init();

    let args = Args::parse();

    let relayer = MockRelayerBuilder::new()
        .chain_id(args.chain_id)
        .gateway_chain_id(args.gateway_chain_id)
        .decryption_oracle(args.decryption_oracle)
        .port(args.port)
        .build();

    tracing::info!("Mock relayer ready on port {}", args.port);
    relayer.run().await?;

    Ok(())
}
