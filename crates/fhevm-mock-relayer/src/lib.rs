//! fhevm-mock-relayer: In-process relayer for tests and local development
//!
//! Speaks the same wire protocol as a hosted relayer but keeps cleartexts
//! in memory where a real deployment keeps FHE ciphertexts only the KMS
//! can decrypt. Registration, the EIP-712 authorization check, the ACL and
//! both decryption flows behave like the real thing; the cryptography
//! behind the handles does not exist.

pub mod error;
pub mod routes;
pub mod server;
pub mod state;

pub use error::{RelayerError, Result};
pub use routes::create_router;
pub use server::{MockRelayer, MockRelayerBuilder};
pub use state::{create_shared_state, RelayerState, SharedState};
