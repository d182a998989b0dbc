//! fhevm-client: Engine lifecycle, encrypted inputs and decryption
//!
//! The client side of the FHEVM SDK:
//! - [`FhevmClient`] / [`InstanceManager`]: one coalesced engine load,
//!   failure replay, reset
//! - [`EncryptedInputBuilder`]: typed, locally-validated input batches
//! - user and public decryption with EIP-712 authorization
//! - [`RequestCoordinator`]: busy and last-error observation
//!
//! The FHE engine itself stays behind the [`Engine`] trait; production uses
//! the relayer-backed implementation, tests swap in [`testing::FakeEngine`].

mod client;
mod coordinator;
mod decrypt;
mod engine;
mod input;
mod instance;
mod relayer;
pub mod testing;
mod wallet;

pub use client::{FhevmClient, FhevmClientBuilder};
pub use coordinator::{Operation, OperationEvent, RequestCoordinator};
pub use engine::{AuthorizedRequest, Engine, EngineFactory, InputRequest, ReencryptedResult};
pub use input::EncryptedInputBuilder;
pub use instance::{FhevmInstance, InstanceManager, InstanceStatus};
pub use relayer::{
    DecryptedEntry, InputProofRequest, InputProofResponse, KeyUrlResponse, PublicDecryptRequest,
    PublicDecryptResponse, RelayerEngine, RelayerEngineFactory, UserDecryptWireRequest,
    UserDecryptWireResponse, WirePair, WireReencrypted,
};
pub use wallet::{LocalWalletSigner, WalletSigner};
