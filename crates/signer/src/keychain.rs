//! Key access for the signer.
//!
//! BIP-32 derivation and seed storage live in the device's key-management
//! subsystem; the signer only ever asks for the key at a path and hands it
//! digests to sign.

use std::collections::HashMap;

use k256::ecdsa::{signature::hazmat::PrehashSigner, Signature, SigningKey};

use coldsign_core::hashes::SigHash;

use crate::{error::SignError, types::DerivationPath};

/// A derived secp256k1 signing key.
pub struct DerivedKey {
    secret: SigningKey,
}

impl DerivedKey {
    /// Wrap an existing signing key.
    pub fn new(secret: SigningKey) -> Self {
        Self { secret }
    }

    /// Construct from a raw 32-byte secret.
    pub fn from_secret_bytes(bytes: &[u8]) -> Result<Self, SignError> {
        SigningKey::from_slice(bytes)
            .map(Self::new)
            .map_err(|_| SignError::Data("Invalid secret key"))
    }

    /// The 33-byte compressed public key.
    pub fn public_key(&self) -> Vec<u8> {
        self.secret
            .verifying_key()
            .to_encoded_point(true)
            .as_bytes()
            .to_vec()
    }

    /// Sign a digest: RFC-6979 nonce, low-S normalized, DER encoded.
    pub fn sign(&self, digest: &SigHash) -> Result<Vec<u8>, SignError> {
        let sig: Signature = self
            .secret
            .sign_prehash(&digest.0)
            .map_err(|_| SignError::Firmware("Signing failed"))?;
        let sig = sig.normalize_s().unwrap_or(sig);
        Ok(sig.to_der().as_bytes().to_vec())
    }
}

/// Resolves BIP-32 paths to signing keys.
pub trait Keychain {
    /// Return the key at `path` on the named curve.
    fn derive(&self, path: &DerivationPath, curve_name: &str) -> Result<DerivedKey, SignError>;
}

/// A flat path-to-secret map.
///
/// Stands in for the device keychain in hosts and tests; it performs no
/// derivation, so every path used in a session must be inserted up front.
#[derive(Default)]
pub struct MemoryKeychain {
    keys: HashMap<Vec<u32>, [u8; 32]>,
}

impl MemoryKeychain {
    /// Register a secret at a path.
    pub fn insert<P: Into<DerivationPath>>(&mut self, path: P, secret: [u8; 32]) {
        self.keys.insert(path.into().as_slice().to_vec(), secret);
    }
}

impl Keychain for MemoryKeychain {
    fn derive(&self, path: &DerivationPath, _curve_name: &str) -> Result<DerivedKey, SignError> {
        let secret = self
            .keys
            .get(path.as_slice())
            .ok_or(SignError::Firmware("No key at derivation path"))?;
        DerivedKey::from_secret_bytes(secret)
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use k256::ecdsa::{signature::hazmat::PrehashVerifier, VerifyingKey};

    #[test]
    fn it_signs_and_verifies() {
        let mut secret = [0u8; 32];
        secret[31] = 1;
        let key = DerivedKey::from_secret_bytes(&secret).unwrap();
        let digest = SigHash([0xab; 32]);

        let der = key.sign(&digest).unwrap();
        let sig = Signature::from_der(&der).unwrap();
        let vk = VerifyingKey::from_sec1_bytes(&key.public_key()).unwrap();
        vk.verify_prehash(&digest.0, &sig).unwrap();
    }

    #[test]
    fn it_reproduces_the_bip143_signature() {
        // BIP-143 P2SH-P2WPKH example: key, sighash, and expected signature
        let secret =
            hex::decode("eb696a065ef48a2192da5b28b694f87544b30fae8327c4510137a922f32c6dcf")
                .unwrap();
        let key = DerivedKey::from_secret_bytes(&secret).unwrap();
        assert_eq!(
            hex::encode(key.public_key()),
            "03ad1d8e89212f0b92c74d23bb710c00662ad1470198ac48c43f7d6f93a2a26873"
        );

        let mut digest = [0u8; 32];
        digest.copy_from_slice(
            &hex::decode("64f3b0f4dd2bb3aa1ce8566d220cc74dda9df97d8490cc81d89d735c92e59fb6")
                .unwrap(),
        );
        let der = key.sign(&SigHash(digest)).unwrap();
        assert_eq!(
            hex::encode(der),
            "3044022047ac8e878352d3ebbde1c94ce3a10d057c24175747116f8288e5d794d12d482f\
             0220217f36a485cae903c713331d877c1f64677e3622ad4010726870540656fe9dcb"
        );
    }
}
