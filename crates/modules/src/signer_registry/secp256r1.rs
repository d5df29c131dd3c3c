use alloy_primitives::{B256, FixedBytes};
use p256::ecdsa::{Signature, VerifyingKey, signature::hazmat::PrehashVerifier};
use tempo_account_contracts::precompiles::{ERC7913_INVALID_VALUE, ERC7913_MAGIC_VALUE};

use super::{SignatureVerifier, VerifierError};

/// Length of an uncompressed P-256 key without its SEC1 tag.
pub(super) const P256_KEY_LEN: usize = 64;

/// ERC-7913 backend for P-256 keys.
///
/// Key is `qx || qy`, signature is `r || s`, both 64 bytes. High-s signatures
/// are rejected.
#[derive(Debug, Clone, Copy, Default)]
pub struct P256Verifier;

impl SignatureVerifier for P256Verifier {
    fn verify(
        &self,
        key: &[u8],
        hash: B256,
        signature: &[u8],
    ) -> Result<FixedBytes<4>, VerifierError> {
        let key = verifying_key(key)?;
        let signature = parse_signature(signature)?;
        Ok(if verify_prehash(&key, hash.as_slice(), &signature) {
            ERC7913_MAGIC_VALUE
        } else {
            ERC7913_INVALID_VALUE
        })
    }
}

pub(super) fn verifying_key(key: &[u8]) -> Result<VerifyingKey, VerifierError> {
    if key.len() != P256_KEY_LEN {
        return Err(VerifierError::MalformedKey("expected qx || qy"));
    }
    let mut sec1 = [0u8; P256_KEY_LEN + 1];
    sec1[0] = 0x04;
    sec1[1..].copy_from_slice(key);
    VerifyingKey::from_sec1_bytes(&sec1)
        .map_err(|_| VerifierError::MalformedKey("not a point on P-256"))
}

pub(super) fn parse_signature(signature: &[u8]) -> Result<Signature, VerifierError> {
    if signature.len() != 64 {
        return Err(VerifierError::MalformedSignature("expected r || s"));
    }
    Signature::from_slice(signature)
        .map_err(|_| VerifierError::MalformedSignature("scalar out of range"))
}

/// Verifies a low-s signature over an already hashed message.
pub(super) fn verify_prehash(key: &VerifyingKey, prehash: &[u8], signature: &Signature) -> bool {
    if signature.normalize_s().is_some() {
        tracing::debug!("p256 signature with high s");
        return false;
    }
    key.verify_prehash(prehash, signature).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::P256Key;
    use alloy_primitives::{U256, uint};

    #[test]
    fn test_valid_signature() {
        let key = P256Key::from_seed(1);
        let hash = B256::repeat_byte(0x42);
        let marker = P256Verifier.verify(&key.public_key(), hash, &key.sign(hash)).unwrap();
        assert_eq!(marker, ERC7913_MAGIC_VALUE);
    }

    #[test]
    fn test_wrong_key_or_hash() {
        let key = P256Key::from_seed(1);
        let other = P256Key::from_seed(2);
        let hash = B256::repeat_byte(0x42);
        let signature = key.sign(hash);

        assert_eq!(
            P256Verifier.verify(&other.public_key(), hash, &signature).unwrap(),
            ERC7913_INVALID_VALUE
        );
        assert_eq!(
            P256Verifier.verify(&key.public_key(), B256::ZERO, &signature).unwrap(),
            ERC7913_INVALID_VALUE
        );
    }

    #[test]
    fn test_high_s_is_invalid() {
        let key = P256Key::from_seed(3);
        let hash = B256::repeat_byte(0x42);
        let low = key.sign(hash);

        // n - s of a low-s signature is its malleable high-s twin.
        let n = uint!(0xFFFFFFFF00000000FFFFFFFFFFFFFFFFBCE6FAADA7179E84F3B9CAC2FC632551_U256);
        let s = U256::from_be_slice(&low[32..]);
        let mut high = low.to_vec();
        high[32..].copy_from_slice(&(n - s).to_be_bytes::<32>());

        assert_eq!(
            P256Verifier.verify(&key.public_key(), hash, &low).unwrap(),
            ERC7913_MAGIC_VALUE
        );
        assert_eq!(
            P256Verifier.verify(&key.public_key(), hash, &high).unwrap(),
            ERC7913_INVALID_VALUE
        );
    }

    #[test]
    fn test_malformed_inputs_are_errors() {
        let key = P256Key::from_seed(1);
        let hash = B256::repeat_byte(0x42);

        assert!(matches!(
            P256Verifier.verify(&key.public_key()[..63], hash, &key.sign(hash)),
            Err(VerifierError::MalformedKey(_))
        ));
        assert!(matches!(
            P256Verifier.verify(&[0u8; 64], hash, &key.sign(hash)),
            Err(VerifierError::MalformedKey(_))
        ));
        assert!(matches!(
            P256Verifier.verify(&key.public_key(), hash, &[1u8; 63]),
            Err(VerifierError::MalformedSignature(_))
        ));
    }
}
