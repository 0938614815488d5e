//! Agent identity: a secp256k1 key derived from a secret seed
//!
//! The same seed and index always yield the same key, so an agent keeps its
//! address across restarts. Addresses are the bech32 encoding (`agent1…`) of
//! the compressed public key; signatures are bech32 (`sig1…`) encodings of the
//! 64-byte compact ECDSA signature over a SHA-256 digest.

use bech32::{Bech32, Hrp};
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use sha2::{Digest, Sha256};

use crate::error::AgentverseError;

const ADDRESS_HRP: Hrp = Hrp::parse_unchecked("agent");
const SIGNATURE_HRP: Hrp = Hrp::parse_unchecked("sig");

/// A signing identity for one agent
#[derive(Clone)]
pub struct AgentIdentity {
    signing_key: SigningKey,
    address: String,
}

impl std::fmt::Debug for AgentIdentity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentIdentity")
            .field("address", &self.address)
            .finish_non_exhaustive()
    }
}

impl AgentIdentity {
    /// Derive the identity for `seed` at key `index`
    pub fn from_seed(seed: &str, index: u8) -> Result<Self, AgentverseError> {
        if seed.is_empty() {
            return Err(AgentverseError::InvalidSeed("seed is empty".to_string()));
        }

        let key_bytes = seed_hash(seed, index);
        let signing_key = SigningKey::from_slice(&key_bytes)
            .map_err(|e| AgentverseError::InvalidSeed(e.to_string()))?;
        let address = encode_address(signing_key.verifying_key())?;

        Ok(Self {
            signing_key,
            address,
        })
    }

    /// The bech32 `agent1…` address other agents use to reach this one
    pub fn address(&self) -> &str {
        &self.address
    }

    /// Sign a 32-byte digest, returning the bech32 `sig1…` encoding
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, AgentverseError> {
        let signature: Signature = self
            .signing_key
            .sign_prehash(digest)
            .map_err(|e| AgentverseError::Signature(e.to_string()))?;

        bech32::encode::<Bech32>(SIGNATURE_HRP, &signature.to_bytes())
            .map_err(|e| AgentverseError::Signature(e.to_string()))
    }
}

/// Verify that `signature` over `digest` was produced by the key behind `address`
pub fn verify_digest(
    address: &str,
    digest: &[u8; 32],
    signature: &str,
) -> Result<(), AgentverseError> {
    let verifying_key = decode_address(address)?;

    let (hrp, sig_bytes) =
        bech32::decode(signature).map_err(|e| AgentverseError::Signature(e.to_string()))?;
    if hrp != SIGNATURE_HRP {
        return Err(AgentverseError::Signature(format!(
            "unexpected signature prefix '{}'",
            hrp
        )));
    }
    let signature = Signature::from_slice(&sig_bytes)
        .map_err(|e| AgentverseError::Signature(e.to_string()))?;

    verifying_key
        .verify_prehash(digest, &signature)
        .map_err(|_| AgentverseError::Signature("signature does not match sender".to_string()))
}

/// Parse an `agent1…` address back into the public key it encodes
pub fn decode_address(address: &str) -> Result<VerifyingKey, AgentverseError> {
    let invalid = |reason: String| AgentverseError::InvalidAddress {
        address: address.to_string(),
        reason,
    };

    let (hrp, key_bytes) = bech32::decode(address).map_err(|e| invalid(e.to_string()))?;
    if hrp != ADDRESS_HRP {
        return Err(invalid(format!("expected prefix 'agent', got '{}'", hrp)));
    }
    VerifyingKey::from_sec1_bytes(&key_bytes).map_err(|e| invalid(e.to_string()))
}

fn encode_address(key: &VerifyingKey) -> Result<String, AgentverseError> {
    let point = key.to_encoded_point(true);
    bech32::encode::<Bech32>(ADDRESS_HRP, point.as_bytes())
        .map_err(|e| AgentverseError::InvalidSeed(e.to_string()))
}

/// SHA-256(SHA-256("agent" ‖ index) ‖ seed)
fn seed_hash(seed: &str, index: u8) -> [u8; 32] {
    let mut derivation = Sha256::new();
    derivation.update(b"agent");
    derivation.update([index]);

    let mut hasher = Sha256::new();
    hasher.update(derivation.finalize());
    hasher.update(seed.as_bytes());
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn digest_of(data: &[u8]) -> [u8; 32] {
        Sha256::digest(data).into()
    }

    #[test]
    fn test_identity_is_deterministic() {
        let a = AgentIdentity::from_seed("correct horse battery staple", 0).unwrap();
        let b = AgentIdentity::from_seed("correct horse battery staple", 0).unwrap();
        assert_eq!(a.address(), b.address());
        assert!(a.address().starts_with("agent1"));
    }

    #[test]
    fn test_index_changes_address() {
        let a = AgentIdentity::from_seed("seed", 0).unwrap();
        let b = AgentIdentity::from_seed("seed", 1).unwrap();
        assert_ne!(a.address(), b.address());
    }

    #[test]
    fn test_empty_seed_rejected() {
        assert!(matches!(
            AgentIdentity::from_seed("", 0),
            Err(AgentverseError::InvalidSeed(_))
        ));
    }

    #[test]
    fn test_sign_and_verify() {
        let identity = AgentIdentity::from_seed("signer", 0).unwrap();
        let digest = digest_of(b"hello agents");
        let signature = identity.sign_digest(&digest).unwrap();
        assert!(signature.starts_with("sig1"));
        assert!(verify_digest(identity.address(), &digest, &signature).is_ok());
    }

    #[test]
    fn test_verify_rejects_other_signer() {
        let alice = AgentIdentity::from_seed("alice", 0).unwrap();
        let bob = AgentIdentity::from_seed("bob", 0).unwrap();
        let digest = digest_of(b"payload");
        let signature = bob.sign_digest(&digest).unwrap();
        assert!(verify_digest(alice.address(), &digest, &signature).is_err());
    }

    #[test]
    fn test_decode_address_rejects_garbage() {
        assert!(decode_address("not-an-address").is_err());
        let identity = AgentIdentity::from_seed("x", 0).unwrap();
        let signature = identity.sign_digest(&digest_of(b"x")).unwrap();
        // a signature is valid bech32 but carries the wrong prefix
        assert!(decode_address(&signature).is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let identity = AgentIdentity::from_seed("secret seed", 0).unwrap();
        let debug = format!("{:?}", identity);
        assert!(debug.contains(identity.address()));
        assert!(!debug.contains("signing_key"));
    }
}
