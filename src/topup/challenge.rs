//! Merge challenge.
//!
//! The ledger authorizes a merge only if the origin coin's holder signed
//! `"{target_coin_id} {target_tx_count} {value}"`. Including the target's
//! transaction count makes every signature single-use: once anything touches
//! the target coin, old signatures stop verifying.

use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, VerifyingKey};
use rust_decimal::Decimal;
use sha2::{Digest, Sha256};

use crate::core_types::CoinId;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergeChallenge {
    target_coin_id: CoinId,
    target_tx_count: usize,
    value: Decimal,
}

impl MergeChallenge {
    pub fn new(target_coin_id: CoinId, target_tx_count: usize, value: Decimal) -> Self {
        Self {
            target_coin_id,
            target_tx_count,
            value,
        }
    }

    /// Canonical challenge text. The value is rendered without trailing zeros.
    pub fn message(&self) -> String {
        format!(
            "{} {} {}",
            self.target_coin_id,
            self.target_tx_count,
            self.value.normalize()
        )
    }

    pub fn digest(&self) -> [u8; 32] {
        Sha256::digest(self.message().as_bytes()).into()
    }
}

/// Check a hex r||s signature against a holder public key in any of the
/// encodings the ledger uses: x-only (32 bytes, even y), raw x||y (64 bytes),
/// or SEC1 (33/65 bytes).
pub fn verify_merge_signature(holder_hex: &str, challenge: &MergeChallenge, signature_hex: &str) -> bool {
    let Ok(holder) = hex::decode(holder_hex) else {
        return false;
    };
    let sec1 = match holder.len() {
        32 => [&[0x02u8][..], &holder[..]].concat(),
        64 => [&[0x04u8][..], &holder[..]].concat(),
        33 | 65 => holder,
        _ => return false,
    };
    let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&sec1) else {
        return false;
    };
    let Ok(signature_bytes) = hex::decode(signature_hex) else {
        return false;
    };
    let Ok(signature) = Signature::from_slice(&signature_bytes) else {
        return false;
    };
    verifying_key
        .verify_prehash(&challenge.digest(), &signature)
        .is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PublicKeyFormat;
    use crate::topup::credential::Credential;

    #[test]
    fn test_message_format() {
        let challenge = MergeChallenge::new(248, 17, Decimal::new(105, 1));
        assert_eq!(challenge.message(), "248 17 10.5");
    }

    #[test]
    fn test_message_drops_trailing_zeros() {
        let challenge = MergeChallenge::new(248, 3, Decimal::new(1000, 2));
        assert_eq!(challenge.message(), "248 3 10");
    }

    #[test]
    fn test_digest_is_sha256_of_message() {
        let challenge = MergeChallenge::new(1, 0, Decimal::ONE);
        let expected: [u8; 32] = Sha256::digest(b"1 0 1").into();
        assert_eq!(challenge.digest(), expected);
    }

    #[test]
    fn test_sign_and_verify_both_encodings() {
        for format in [PublicKeyFormat::XOnly, PublicKeyFormat::Raw] {
            let credential = Credential::generate(format);
            let challenge = MergeChallenge::new(248, 5, Decimal::new(42, 0));
            let signature = credential.sign_digest(&challenge.digest()).unwrap();
            assert!(verify_merge_signature(
                credential.public_key().as_str(),
                &challenge,
                &signature
            ));
        }
    }

    #[test]
    fn test_verify_fails_for_changed_tx_count() {
        let credential = Credential::generate(PublicKeyFormat::XOnly);
        let signed = MergeChallenge::new(248, 5, Decimal::new(42, 0));
        let signature = credential.sign_digest(&signed.digest()).unwrap();

        let stale = MergeChallenge::new(248, 6, Decimal::new(42, 0));
        assert!(!verify_merge_signature(
            credential.public_key().as_str(),
            &stale,
            &signature
        ));
    }

    #[test]
    fn test_verify_rejects_garbage() {
        let challenge = MergeChallenge::new(248, 5, Decimal::ONE);
        assert!(!verify_merge_signature("zz", &challenge, "00"));
        assert!(!verify_merge_signature(&"ab".repeat(10), &challenge, "00"));
        let credential = Credential::generate(PublicKeyFormat::XOnly);
        assert!(!verify_merge_signature(
            credential.public_key().as_str(),
            &challenge,
            "not-hex"
        ));
    }
}
