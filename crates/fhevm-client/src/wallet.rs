//! Wallet signing boundary

use alloy_primitives::{Address, B256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;

use fhevm_core::{Eip712Request, FhevmError, Result};

/// Anything that can produce an EIP-712 signature for a user address.
/// Browser and hardware wallets implement this against their own prompt
/// flow; a declined prompt must surface as `UserRejected`.
#[async_trait::async_trait]
pub trait WalletSigner: Send + Sync {
    /// Address the signature will recover to.
    fn address(&self) -> Address;

    /// Sign the typed-data request, returning the 65-byte signature.
    async fn sign_typed_data(&self, request: &Eip712Request) -> Result<Vec<u8>>;
}

/// In-process signer over a raw private key. Never rejects; useful for
/// tools, tests and server-side flows.
pub struct LocalWalletSigner {
    signer: PrivateKeySigner,
}

impl LocalWalletSigner {
    pub fn random() -> Self {
        LocalWalletSigner {
            signer: PrivateKeySigner::random(),
        }
    }

    pub fn from_bytes(key: &B256) -> Result<Self> {
        let signer = PrivateKeySigner::from_bytes(key)
            .map_err(|e| FhevmError::validation(format!("invalid private key: {e}")))?;
        Ok(LocalWalletSigner { signer })
    }

    /// Parse a hex private key, with or without a 0x prefix.
    pub fn from_hex(key: &str) -> Result<Self> {
        let digits = key.strip_prefix("0x").unwrap_or(key);
        let bytes: [u8; 32] = hex::decode(digits)
            .ok()
            .and_then(|v| v.try_into().ok())
            .ok_or_else(|| FhevmError::validation("private key must be 32 bytes of hex"))?;
        Self::from_bytes(&B256::from(bytes))
    }
}

#[async_trait::async_trait]
impl WalletSigner for LocalWalletSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    async fn sign_typed_data(&self, request: &Eip712Request) -> Result<Vec<u8>> {
        let signature = self
            .signer
            .sign_hash_sync(&request.signing_hash())
            .map_err(|e| FhevmError::protocol(format!("signing failed: {e}")))?;
        Ok(signature.as_bytes().to_vec())
    }
}
