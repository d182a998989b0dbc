//! fhevm-core: Shared types for the FHEVM confidential-computation SDK
//!
//! This crate defines the protocol objects every other crate builds on:
//! deployment configuration, ciphertext handles, typed plaintext values,
//! EIP-712 decryption authorizations, sealed transport envelopes and the
//! error taxonomy.
//!
//! # Trust Model
//!
//! The SDK is a client of a relayer-fronted FHE network. Plaintexts exist
//! only on the client; everything that crosses the wire is sealed.
//!
//! ## What Each Party Learns
//!
//! | Information | Relayer Knowledge |
//! |-------------|-------------------|
//! | Input plaintexts | NO - sealed to the network key |
//! | User-decrypt cleartexts | NO - resealed to the caller's ephemeral key |
//! | Public-decrypt cleartexts | **YES** - public by definition |
//! | Handle/contract/user linkage | YES - required for ACL checks |
//!
//! ## Enforcement Boundaries
//!
//! - Range and format validation happens on the client, before any network
//!   round-trip.
//! - Access control happens on the network side and is never pre-checked
//!   locally: a denial always comes back as `AccessDenied`.

mod config;
mod eip712;
mod envelope;
mod error;
mod handle;
mod request;
mod value;

pub use config::{FhevmConfig, DEFAULT_VALIDITY_DAYS};
pub use eip712::{Eip712Request, UserDecryptRequestVerification};
pub use envelope::{Keypair, NetworkPublicKey, SealedEnvelope};
pub use error::{FhevmError, Result};
pub use handle::{Handle, ParseHandleError, HANDLE_VERSION};
pub use request::{
    DecryptionRequest, EncryptedValue, HandleContractPair, ValidityWindow, MAX_VALIDITY_DAYS,
};
pub use value::{
    decode_batch, decode_value, encode_batch, encode_value, FheType, FheValue,
};

/// Batching limits enforced before any network round-trip.
pub mod limits {
    /// Most values a single encrypted input may carry.
    pub const MAX_INPUT_VALUES: usize = 256;

    /// Total encrypted-bit budget of a single input.
    pub const MAX_INPUT_BITS: usize = 2048;
}
