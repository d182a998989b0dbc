//! Decryption protocol
//!
//! User decrypt runs the full authorization dance: fresh ephemeral keypair,
//! EIP-712 signature over the request, reencryption on the network side,
//! local opening and type verification. Public decrypt is a direct reveal
//! of handles whose contracts opted them in; the ACL answers either way.

use std::collections::BTreeMap;
use std::sync::Arc;

use fhevm_core::{
    decode_value, DecryptionRequest, Eip712Request, FhevmConfig, FhevmError, FheValue, Handle,
    HandleContractPair, Keypair, Result, SealedEnvelope, ValidityWindow,
};

use crate::engine::{AuthorizedRequest, Engine};
use crate::wallet::WalletSigner;

pub(crate) async fn user_decrypt_many(
    engine: &Arc<dyn Engine>,
    config: &FhevmConfig,
    signer: &dyn WalletSigner,
    pairs: &[HandleContractPair],
) -> Result<BTreeMap<Handle, FheValue>> {
    if pairs.is_empty() {
        return Err(FhevmError::validation("no handles to decrypt"));
    }
    for pair in pairs {
        if pair.handle.fhe_type().is_none() {
            return Err(FhevmError::validation(format!(
                "handle {} carries an unknown type id",
                pair.handle
            )));
        }
    }

    let request = DecryptionRequest {
        pairs: pairs.to_vec(),
        window: ValidityWindow::starting_now(config.user_decrypt_validity_days),
    };
    request.validate()?;

    let keypair = Keypair::generate();
    let contracts = request.contract_addresses();
    let eip712 = Eip712Request::user_decrypt(
        config.gateway_chain_id,
        config.decryption_oracle_contract,
        &keypair.public_key(),
        &contracts,
        &request.window,
    );

    // a wallet refusal propagates untouched as UserRejected
    let signature = signer.sign_typed_data(&eip712).await?;

    let authorized = AuthorizedRequest {
        pairs: request
            .pairs
            .iter()
            .map(|p| (p.handle, p.contract_address))
            .collect(),
        window: request.window,
        public_key: keypair.public_key(),
        // the relayer wire takes the signature without a 0x prefix
        signature: hex::encode(&signature),
        user_address: signer.address(),
        contract_addresses: contracts,
    };

    let results = engine.user_decrypt(authorized).await?;
    let by_handle: BTreeMap<Handle, SealedEnvelope> = results
        .into_iter()
        .map(|r| (r.handle, r.envelope))
        .collect();

    let mut out = BTreeMap::new();
    for pair in &request.pairs {
        let envelope = by_handle.get(&pair.handle).ok_or_else(|| {
            FhevmError::protocol(format!("response missing handle {}", pair.handle))
        })?;
        let payload = keypair.open(envelope).ok_or_else(|| {
            FhevmError::protocol("reencrypted payload does not open with the request keypair")
        })?;
        let value = decode_value(&payload)?;
        // fhe_type() was checked non-None above
        if Some(value.fhe_type()) != pair.handle.fhe_type() {
            return Err(FhevmError::protocol(format!(
                "handle {} is tagged {:?} but the cleartext decodes as {}",
                pair.handle,
                pair.handle.fhe_type(),
                value.fhe_type()
            )));
        }
        out.insert(pair.handle, value);
    }

    tracing::debug!(handles = out.len(), user = %signer.address(), "user decrypt complete");
    Ok(out)
}

pub(crate) async fn public_decrypt(
    engine: &Arc<dyn Engine>,
    handles: &[Handle],
) -> Result<BTreeMap<Handle, FheValue>> {
    if handles.is_empty() {
        return Err(FhevmError::validation("no handles to decrypt"));
    }
    for handle in handles {
        if handle.fhe_type().is_none() {
            return Err(FhevmError::validation(format!(
                "handle {handle} carries an unknown type id"
            )));
        }
    }

    let values = engine.public_decrypt(handles).await?;

    for handle in handles {
        let value = values.get(handle).ok_or_else(|| {
            FhevmError::protocol(format!("response missing handle {handle}"))
        })?;
        if Some(value.fhe_type()) != handle.fhe_type() {
            return Err(FhevmError::protocol(format!(
                "handle {handle} is tagged {:?} but the relayer sent {}",
                handle.fhe_type(),
                value.fhe_type()
            )));
        }
    }

    tracing::debug!(handles = handles.len(), "public decrypt complete");
    Ok(values)
}
