//! EIP-712 authorization for user decryption
//!
//! The gateway's decryption oracle verifies a `UserDecryptRequestVerification`
//! signature before reencrypting anything. The domain is pinned to the
//! gateway chain and the oracle's verifying contract, so a signature for one
//! deployment is useless on another.

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{eip712_domain, sol, Eip712Domain, SolStruct};
use serde_json::{json, Value};

use crate::request::ValidityWindow;

sol! {
    /// The typed message a wallet renders and signs.
    #[derive(Debug)]
    struct UserDecryptRequestVerification {
        bytes publicKey;
        address[] contractAddresses;
        uint256 startTimestamp;
        uint256 durationDays;
    }
}

const DOMAIN_NAME: &str = "Decryption";
const DOMAIN_VERSION: &str = "1";

/// A fully-built typed-data request: domain plus message, ready for a
/// wallet signature.
#[derive(Debug, Clone)]
pub struct Eip712Request {
    chain_id: u64,
    verifying_contract: Address,
    domain: Eip712Domain,
    message: UserDecryptRequestVerification,
}

impl Eip712Request {
    /// Bind an ephemeral public key, the target contracts and a validity
    /// window under the decryption oracle's domain.
    pub fn user_decrypt(
        gateway_chain_id: u64,
        verifying_contract: Address,
        public_key: &[u8],
        contracts: &[Address],
        window: &ValidityWindow,
    ) -> Self {
        let domain = eip712_domain! {
            name: DOMAIN_NAME,
            version: DOMAIN_VERSION,
            chain_id: gateway_chain_id,
            verifying_contract: verifying_contract,
        };
        let message = UserDecryptRequestVerification {
            publicKey: public_key.to_vec().into(),
            contractAddresses: contracts.to_vec(),
            startTimestamp: U256::from(window.start_timestamp),
            durationDays: U256::from(window.duration_days),
        };
        Eip712Request {
            chain_id: gateway_chain_id,
            verifying_contract,
            domain,
            message,
        }
    }

    /// The digest a wallet actually signs.
    pub fn signing_hash(&self) -> B256 {
        self.message.eip712_signing_hash(&self.domain)
    }

    pub fn domain(&self) -> &Eip712Domain {
        &self.domain
    }

    pub fn message(&self) -> &UserDecryptRequestVerification {
        &self.message
    }

    /// `eth_signTypedData_v4`-shaped JSON, for wallets that display the
    /// request to the user before signing.
    pub fn to_typed_json(&self) -> Value {
        let contracts: Vec<String> = self
            .message
            .contractAddresses
            .iter()
            .map(|a| format!("{a}"))
            .collect();
        json!({
            "domain": {
                "name": DOMAIN_NAME,
                "version": DOMAIN_VERSION,
                "chainId": self.chain_id,
                "verifyingContract": format!("{}", self.verifying_contract),
            },
            "primaryType": "UserDecryptRequestVerification",
            "types": {
                "UserDecryptRequestVerification": [
                    { "name": "publicKey", "type": "bytes" },
                    { "name": "contractAddresses", "type": "address[]" },
                    { "name": "startTimestamp", "type": "uint256" },
                    { "name": "durationDays", "type": "uint256" },
                ],
            },
            "message": {
                "publicKey": format!("0x{}", hex::encode(&self.message.publicKey)),
                "contractAddresses": contracts,
                "startTimestamp": self.message.startTimestamp.to_string(),
                "durationDays": self.message.durationDays.to_string(),
            },
        })
    }
}
