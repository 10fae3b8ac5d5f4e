//! Signing primitives for synthetic chains.
//!
//! Two schemes are provided:
//!
//! - **Pseudo signatures**: a deterministic 64-byte BLAKE3 XOF over
//!   `(public key, message, domain)`. Anyone holding the public key can
//!   produce or check them. Aggregation is byte-wise XOR.
//! - **Ed25519** via ed25519-dalek, used for genesis proofs of possession
//!   when `SpecConfig::verify_proof_of_possession` is set.

use ed25519_dalek::{Signer, Verifier};
use std::fmt;

use crate::error::CryptoError;
use crate::traits::{MessageSigner, SignerFactory};
use crate::types::{Domain, Hash256, PublicKeyBytes, Signature};

const PSEUDO_SIG_CONTEXT: &[u8] = b"beacon-sim/pseudo-signature";
const INTEROP_KEY_CONTEXT: &[u8] = b"beacon-sim/interop-key";

/// Ed25519 keypair.
///
/// The secret key is zeroized on drop by the underlying library.
pub struct KeyPair {
    signing_key: ed25519_dalek::SigningKey,
}

impl KeyPair {
    /// Create a keypair from 32-byte secret key material.
    pub fn from_secret_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: ed25519_dalek::SigningKey::from_bytes(&bytes),
        }
    }

    pub fn public_key(&self) -> PublicKeyBytes {
        PublicKeyBytes(self.signing_key.verifying_key().to_bytes())
    }

    pub fn secret_bytes(&self) -> [u8; 32] {
        self.signing_key.to_bytes()
    }

    /// Sign raw bytes, returning the 64-byte Ed25519 signature.
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature(self.signing_key.sign(message).to_bytes())
    }
}

impl Clone for KeyPair {
    fn clone(&self) -> Self {
        Self::from_secret_bytes(self.secret_bytes())
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// Deterministic interop key for validator `index`.
pub fn interop_keypair(index: u64) -> KeyPair {
    let mut hasher = blake3::Hasher::new();
    hasher.update(INTEROP_KEY_CONTEXT);
    hasher.update(&index.to_le_bytes());
    KeyPair::from_secret_bytes(hasher.finalize().into())
}

/// Bytes covered by a signature over `message` in `domain`.
pub fn signing_bytes(message: Hash256, domain: Domain) -> [u8; 40] {
    let mut out = [0u8; 40];
    out[..32].copy_from_slice(message.as_bytes());
    out[32..].copy_from_slice(&domain.to_le_bytes());
    out
}

pub fn pseudo_sign(pubkey: &PublicKeyBytes, message: Hash256, domain: Domain) -> Signature {
    let mut hasher = blake3::Hasher::new();
    hasher.update(PSEUDO_SIG_CONTEXT);
    hasher.update(&pubkey.0);
    hasher.update(&signing_bytes(message, domain));
    let mut out = [0u8; 64];
    hasher.finalize_xof().fill(&mut out);
    Signature(out)
}

/// XOR-aggregate pseudo signatures.
pub fn pseudo_aggregate(signatures: impl IntoIterator<Item = Signature>) -> Signature {
    signatures
        .into_iter()
        .fold(Signature::ZERO, |acc, sig| acc.xor(&sig))
}

/// Check an aggregate pseudo signature of `pubkeys` over `message`.
///
/// An empty signer set never verifies.
pub fn pseudo_verify(
    pubkeys: &[PublicKeyBytes],
    message: Hash256,
    domain: Domain,
    signature: &Signature,
) -> bool {
    if pubkeys.is_empty() {
        return false;
    }
    let expected = pseudo_aggregate(pubkeys.iter().map(|pk| pseudo_sign(pk, message, domain)));
    expected == *signature
}

/// Verify an Ed25519 signature over `(message, domain)`.
pub fn verify_ed25519(
    pubkey: &PublicKeyBytes,
    message: Hash256,
    domain: Domain,
    signature: &Signature,
) -> Result<(), CryptoError> {
    let key = ed25519_dalek::VerifyingKey::from_bytes(&pubkey.0)
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    key.verify(&signing_bytes(message, domain), &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Signs with pseudo signatures keyed by a validator public key.
#[derive(Clone, Debug)]
pub struct PseudoSigner {
    pubkey: PublicKeyBytes,
}

impl PseudoSigner {
    pub fn new(pubkey: PublicKeyBytes) -> Self {
        Self { pubkey }
    }
}

impl MessageSigner for PseudoSigner {
    fn sign(&self, message: Hash256, domain: Domain) -> Signature {
        pseudo_sign(&self.pubkey, message, domain)
    }

    fn public_key(&self) -> PublicKeyBytes {
        self.pubkey
    }
}

/// Signs with a real Ed25519 key.
#[derive(Clone, Debug)]
pub struct KeyPairSigner {
    keypair: KeyPair,
}

impl KeyPairSigner {
    pub fn new(keypair: KeyPair) -> Self {
        Self { keypair }
    }
}

impl MessageSigner for KeyPairSigner {
    fn sign(&self, message: Hash256, domain: Domain) -> Signature {
        self.keypair.sign(&signing_bytes(message, domain))
    }

    fn public_key(&self) -> PublicKeyBytes {
        self.keypair.public_key()
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PseudoSignerFactory;

impl SignerFactory for PseudoSignerFactory {
    fn signer(&self, keypair: &KeyPair) -> Box<dyn MessageSigner> {
        Box::new(PseudoSigner::new(keypair.public_key()))
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct KeyPairSignerFactory;

impl SignerFactory for KeyPairSignerFactory {
    fn signer(&self, keypair: &KeyPair) -> Box<dyn MessageSigner> {
        Box::new(KeyPairSigner::new(keypair.clone()))
    }
}
