//! Deployment configuration and presets

use alloy_primitives::{address, Address};
use serde::{Deserialize, Serialize};

use crate::error::{FhevmError, Result};
use crate::request::MAX_VALIDITY_DAYS;

/// Default lifetime of a user-decrypt authorization, in days.
pub const DEFAULT_VALIDITY_DAYS: u64 = 10;

/// Everything the SDK needs to know about one FHEVM deployment: the host
/// chain, the gateway, the relayer endpoint and the protocol contracts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FhevmConfig {
    /// Chain where the confidential contracts live.
    pub chain_id: u64,
    /// Gateway chain where decryption verification happens.
    pub gateway_chain_id: u64,
    /// JSON-RPC endpoint of the host chain.
    pub network_url: String,
    /// Relayer endpoint the engine talks to.
    pub relayer_url: String,
    pub acl_contract: Address,
    pub kms_verifier_contract: Address,
    pub input_verifier_contract: Address,
    /// Verifying contract of the decryption oracle (EIP-712 domain).
    pub decryption_oracle_contract: Address,
    /// Verifying contract for input verification on the gateway.
    pub input_verification_contract: Address,
    /// Validity window length requested for user-decrypt authorizations.
    #[serde(default = "default_validity_days")]
    pub user_decrypt_validity_days: u64,
}

fn default_validity_days() -> u64 {
    DEFAULT_VALIDITY_DAYS
}

impl FhevmConfig {
    /// Sepolia testnet deployment, the documented default.
    pub fn sepolia() -> Self {
        FhevmConfig {
            chain_id: 11_155_111,
            gateway_chain_id: 55_815,
            network_url: "https://eth-sepolia.public.blastapi.io".into(),
            relayer_url: "https://relayer.testnet.zama.cloud".into(),
            acl_contract: address!("0x687820221192C5B662b25367F70076A37bc79b6c"),
            kms_verifier_contract: address!("0x1364cBBf2cDF5032C47d8226a6f6FBD2AFCDacAC"),
            input_verifier_contract: address!("0xbc91f3daD1A5F19F8390c400196e58073B6a0BC4"),
            decryption_oracle_contract: address!("0xb6E160B1ff80D67Bfe90A85eE06Ce0A2613607D1"),
            input_verification_contract: address!("0x7048C39f048125eDa9d678AEbaDfB22F7900a29F"),
            user_decrypt_validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    /// Local development stack: anvil on 8545, a relayer on 8547. Contract
    /// addresses are zero until the stack deploys its own.
    pub fn local() -> Self {
        FhevmConfig {
            chain_id: 31_337,
            gateway_chain_id: 55_815,
            network_url: "http://127.0.0.1:8545".into(),
            relayer_url: "http://127.0.0.1:8547".into(),
            acl_contract: Address::ZERO,
            kms_verifier_contract: Address::ZERO,
            input_verifier_contract: Address::ZERO,
            decryption_oracle_contract: Address::ZERO,
            input_verification_contract: Address::ZERO,
            user_decrypt_validity_days: DEFAULT_VALIDITY_DAYS,
        }
    }

    pub fn with_network_url(mut self, url: impl Into<String>) -> Self {
        self.network_url = url.into();
        self
    }

    pub fn with_relayer_url(mut self, url: impl Into<String>) -> Self {
        self.relayer_url = url.into();
        self
    }

    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    pub fn with_validity_days(mut self, days: u64) -> Self {
        self.user_decrypt_validity_days = days;
        self
    }

    /// Checks the fields `init()` cannot proceed without. Failures here are
    /// load failures, not validation failures: nothing user-supplied is
    /// involved.
    pub fn validate(&self) -> Result<()> {
        if self.network_url.is_empty() {
            return Err(FhevmError::EngineLoad("no network provider configured".into()));
        }
        if self.relayer_url.is_empty() {
            return Err(FhevmError::EngineLoad("no relayer endpoint configured".into()));
        }
        if self.user_decrypt_validity_days == 0
            || self.user_decrypt_validity_days > MAX_VALIDITY_DAYS
        {
            return Err(FhevmError::EngineLoad(format!(
                "user_decrypt_validity_days must be 1..={MAX_VALIDITY_DAYS}, got {}",
                self.user_decrypt_validity_days
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sepolia_preset_pins_the_gateway() {
        let config = FhevmConfig::sepolia();
        assert_eq!(config.chain_id, 11_155_111);
        assert_eq!(config.gateway_chain_id, 55_815);
        assert!(config.relayer_url.starts_with("https://"));
        assert_ne!(config.decryption_oracle_contract, Address::ZERO);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn builder_overrides() {
        let config = FhevmConfig::local()
            .with_relayer_url("http://127.0.0.1:9999")
            .with_chain_id(1337)
            .with_validity_days(30);
        assert_eq!(config.relayer_url, "http://127.0.0.1:9999");
        assert_eq!(config.chain_id, 1337);
        assert_eq!(config.user_decrypt_validity_days, 30);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_missing_endpoints() {
        let config = FhevmConfig::local().with_relayer_url("");
        assert!(matches!(
            config.validate().unwrap_err(),
            FhevmError::EngineLoad(_)
        ));

        let config = FhevmConfig::local().with_network_url("");
        assert!(matches!(
            config.validate().unwrap_err(),
            FhevmError::EngineLoad(_)
        ));
    }

    #[test]
    fn validate_bounds_validity_days() {
        assert!(FhevmConfig::local().with_validity_days(0).validate().is_err());
        assert!(FhevmConfig::local().with_validity_days(365).validate().is_ok());
        assert!(FhevmConfig::local().with_validity_days(366).validate().is_err());
    }

    #[test]
    fn serde_fills_default_validity() {
        let json = serde_json::to_value(FhevmConfig::sepolia()).unwrap();
        let mut trimmed = json.as_object().unwrap().clone();
        trimmed.remove("user_decrypt_validity_days");
        let config: FhevmConfig =
            serde_json::from_value(serde_json::Value::Object(trimmed)).unwrap();
        assert_eq!(config.user_decrypt_validity_days, DEFAULT_VALIDITY_DAYS);
    }
}
