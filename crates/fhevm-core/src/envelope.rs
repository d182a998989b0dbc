//! Sealed envelopes for input submission and reencryption responses
//!
//! X25519 against the recipient key, blake3 `derive_key` for the symmetric
//! key, ChaCha20-Poly1305 for the payload. Inputs travel sealed to the
//! network key; user-decrypt responses come back sealed to the request's
//! ephemeral key, so cleartexts are never readable in transit.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use x25519_dalek::{EphemeralSecret, PublicKey, StaticSecret};

use crate::error::{FhevmError, Result};

/// Domain separator for envelope key derivation.
const ENVELOPE_CONTEXT: &str = "fhevm-envelope-v1";

/// X25519 public key whose secret half is held by the KMS side of the
/// network. Inputs are sealed to this key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkPublicKey(#[serde(with = "hex::serde")] pub [u8; 32]);

impl NetworkPublicKey {
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

/// Ephemeral reencryption keypair, generated per user-decrypt request and
/// dropped with it.
pub struct Keypair {
    secret: StaticSecret,
    public: [u8; 32],
}

impl Keypair {
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(rand::thread_rng());
        let public = *PublicKey::from(&secret).as_bytes();
        Keypair { secret, public }
    }

    pub fn public_key(&self) -> [u8; 32] {
        self.public
    }

    /// Open an envelope sealed to this keypair. `None` on any mismatch or
    /// tampering.
    pub fn open(&self, envelope: &SealedEnvelope) -> Option<Vec<u8>> {
        envelope.open(&self.secret)
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &hex::encode(self.public))
            .finish_non_exhaustive()
    }
}

/// Ciphertext addressed to a single X25519 public key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SealedEnvelope {
    #[serde(with = "hex::serde")]
    pub ephemeral_pk: [u8; 32],
    #[serde(with = "hex::serde")]
    pub nonce: [u8; 12],
    #[serde(with = "hex::serde")]
    pub ciphertext: Vec<u8>,
}

impl SealedEnvelope {
    /// Seal `plaintext` to `recipient` under a fresh ephemeral key.
    pub fn seal(recipient: &[u8; 32], plaintext: &[u8]) -> Result<Self> {
        let mut rng = rand::thread_rng();
        let ephemeral = EphemeralSecret::random_from_rng(&mut rng);
        let ephemeral_pk = *PublicKey::from(&ephemeral).as_bytes();
        let shared = ephemeral.diffie_hellman(&PublicKey::from(*recipient));
        let key = derive_envelope_key(shared.as_bytes(), &ephemeral_pk);

        let mut nonce = [0u8; 12];
        rng.fill_bytes(&mut nonce);

        let cipher = ChaCha20Poly1305::new(&key.into());
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| FhevmError::protocol("envelope encryption failed"))?;

        Ok(SealedEnvelope {
            ephemeral_pk,
            nonce,
            ciphertext,
        })
    }

    /// Open with the recipient's secret key. Returns `None` if the envelope
    /// was sealed to a different key or the payload was altered.
    pub fn open(&self, secret: &StaticSecret) -> Option<Vec<u8>> {
        let shared = secret.diffie_hellman(&PublicKey::from(self.ephemeral_pk));
        let key = derive_envelope_key(shared.as_bytes(), &self.ephemeral_pk);
        let cipher = ChaCha20Poly1305::new(&key.into());
        cipher
            .decrypt(Nonce::from_slice(&self.nonce), self.ciphertext.as_slice())
            .ok()
    }
}

fn derive_envelope_key(shared_secret: &[u8], ephemeral_pk: &[u8]) -> [u8; 32] {
    let mut hasher = blake3::Hasher::new_derive_key(ENVELOPE_CONTEXT);
    hasher.update(shared_secret);
    hasher.update(ephemeral_pk);
    *hasher.finalize().as_bytes()
}
