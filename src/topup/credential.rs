//! Ephemeral deposit credential.
//!
//! A secp256k1 keypair issued per invoice. The public key doubles as the
//! deposit address the user transfers their coin to; the private key signs
//! the merge challenge that moves the coin into the exchange wallet.

use k256::ecdsa::SigningKey;
use k256::ecdsa::signature::hazmat::PrehashSigner;
use k256::ecdsa::{Error as EcdsaError, Signature};
use rand::rngs::OsRng;
use std::fmt;
#[cfg(test)]
use zeroize::Zeroizing;

pub use crate::config::PublicKeyFormat;

/// Lowercase hex encoding of a credential's public key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PublicKeyHex(String);

impl PublicKeyHex {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PublicKeyHex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct Credential {
    signing_key: SigningKey,
    public_key: PublicKeyHex,
}

impl Credential {
    /// Generate a fresh keypair
    pub fn generate(format: PublicKeyFormat) -> Self {
        Self::from_signing_key(SigningKey::random(&mut OsRng), format)
    }

    /// Rebuild a credential from a 32-byte secret scalar
    #[cfg(test)]
    pub(crate) fn from_secret_bytes(
        secret: Zeroizing<[u8; 32]>,
        format: PublicKeyFormat,
    ) -> Result<Self, EcdsaError> {
        let signing_key = SigningKey::from_bytes((&*secret).into())?;
        Ok(Self::from_signing_key(signing_key, format))
    }

    fn from_signing_key(signing_key: SigningKey, format: PublicKeyFormat) -> Self {
        let signing_key = normalize_even_y(signing_key);
        let public_key = encode_public_key(&signing_key, format);
        Self {
            signing_key,
            public_key,
        }
    }

    pub fn public_key(&self) -> &PublicKeyHex {
        &self.public_key
    }

    /// Byte-exact comparison against a holder string reported by the ledger
    pub fn is_held_by(&self, holder: &str) -> bool {
        self.public_key.as_str() == holder
    }

    /// ECDSA-sign a SHA-256 digest. Returns the 64-byte r||s signature as hex.
    pub fn sign_digest(&self, digest: &[u8; 32]) -> Result<String, EcdsaError> {
        let signature: Signature = self.signing_key.sign_prehash(digest)?;
        Ok(hex::encode(signature.to_bytes()))
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("public_key", &self.public_key)
            .field("signing_key", &"<redacted>")
            .finish()
    }
}

/// Negate the secret if its point has odd y, so the x coordinate alone
/// identifies the key.
fn normalize_even_y(signing_key: SigningKey) -> SigningKey {
    let compressed = signing_key.verifying_key().to_encoded_point(true);
    if compressed.as_bytes()[0] == 0x03 {
        SigningKey::from(-*signing_key.as_nonzero_scalar())
    } else {
        signing_key
    }
}

fn encode_public_key(signing_key: &SigningKey, format: PublicKeyFormat) -> PublicKeyHex {
    // Uncompressed SEC1: 0x04 || x || y
    let point = signing_key.verifying_key().to_encoded_point(false);
    let bytes = point.as_bytes();
    let encoded = match format {
        PublicKeyFormat::XOnly => hex::encode(&bytes[1..33]),
        PublicKeyFormat::Raw => hex::encode(&bytes[1..65]),
    };
    PublicKeyHex(encoded)
}
