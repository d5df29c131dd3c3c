//! ERC-7913 signer verification.
//!
//! A signer identity is opaque bytes:
//! - 20 bytes: a native address. Registered contract signers are asked via
//!   ERC-1271, any other address is checked with secp256k1 ECDSA recovery.
//! - more than 20 bytes: `verifier || key`, checked by the verifier backend
//!   registered at `verifier`.
//! - anything shorter is never valid.
//!
//! Verification never fails loudly. Backend errors, panics and unexpected
//! markers all count as an invalid signature.

mod secp256r1;
mod webauthn;

pub use self::{secp256r1::P256Verifier, webauthn::WebAuthnVerifier};

#[cfg(any(test, feature = "test-utils"))]
pub(crate) use self::webauthn::signed_message as webauthn_signed_message;

use std::{
    collections::HashMap,
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use alloy_primitives::{Address, B256, FixedBytes, Signature, U256, keccak256, uint};
use auto_impl::auto_impl;
use tempo_account_contracts::precompiles::{
    ERC1271_MAGIC_VALUE, ERC7913_INVALID_VALUE, ERC7913_MAGIC_VALUE,
};
use tracing::{debug, warn};

use crate::metrics::VerificationMetrics;

/// Length of a native address identity.
pub const ADDRESS_LEN: usize = 20;

/// Half the secp256k1 group order. Signatures with a larger `s` are malleable.
const SECP256K1N_HALF: U256 =
    uint!(0x7FFFFFFFFFFFFFFFFFFFFFFFFFFFFFFF5D576E7357A4501DDFE92F46681B20A0_U256);

/// Ordering and membership key of a signer identity.
#[inline]
pub fn signer_id(identity: &[u8]) -> B256 {
    keccak256(identity)
}

/// Failure of a verifier backend to produce an answer.
#[derive(Debug, thiserror::Error)]
pub enum VerifierError {
    #[error("malformed key: {0}")]
    MalformedKey(&'static str),
    #[error("malformed signature: {0}")]
    MalformedSignature(&'static str),
    #[error("verifier backend failure: {0}")]
    Backend(String),
}

/// ERC-7913 verifier backend.
///
/// Returns [`ERC7913_MAGIC_VALUE`] for a valid signature. Any other value, and
/// any error, is treated as invalid.
#[auto_impl(&, Arc, Box)]
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, key: &[u8], hash: B256, signature: &[u8])
    -> Result<FixedBytes<4>, VerifierError>;
}

/// Contract signer reachable through ERC-1271.
///
/// Returns [`ERC1271_MAGIC_VALUE`] for a valid signature.
#[auto_impl(&, Arc, Box)]
pub trait ContractSigner: Send + Sync {
    fn is_valid_signature(&self, hash: B256, signature: &[u8])
    -> Result<FixedBytes<4>, VerifierError>;
}

/// Verifier backends and contract signers known to the host.
#[derive(Clone)]
pub struct SignerRegistry {
    verifiers: HashMap<Address, Arc<dyn SignatureVerifier>>,
    contract_signers: HashMap<Address, Arc<dyn ContractSigner>>,
    ecdsa_metrics: VerificationMetrics,
    erc1271_metrics: VerificationMetrics,
    erc7913_metrics: VerificationMetrics,
}

impl Default for SignerRegistry {
    fn default() -> Self {
        Self {
            verifiers: HashMap::new(),
            contract_signers: HashMap::new(),
            ecdsa_metrics: VerificationMetrics::new("ecdsa"),
            erc1271_metrics: VerificationMetrics::new("erc1271"),
            erc7913_metrics: VerificationMetrics::new("erc7913"),
        }
    }
}

impl std::fmt::Debug for SignerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignerRegistry")
            .field("verifiers", &self.verifiers.keys().collect::<Vec<_>>())
            .field("contract_signers", &self.contract_signers.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SignerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `verifier` as the ERC-7913 backend deployed at `address`.
    pub fn register_verifier(
        &mut self,
        address: Address,
        verifier: impl SignatureVerifier + 'static,
    ) -> &mut Self {
        self.verifiers.insert(address, Arc::new(verifier));
        self
    }

    pub fn with_verifier(
        mut self,
        address: Address,
        verifier: impl SignatureVerifier + 'static,
    ) -> Self {
        self.register_verifier(address, verifier);
        self
    }

    /// Registers a contract signer. 20-byte identities naming `address` are
    /// verified through ERC-1271 from now on.
    pub fn register_contract_signer(
        &mut self,
        address: Address,
        signer: impl ContractSigner + 'static,
    ) -> &mut Self {
        self.contract_signers.insert(address, Arc::new(signer));
        self
    }

    pub fn with_contract_signer(
        mut self,
        address: Address,
        signer: impl ContractSigner + 'static,
    ) -> Self {
        self.register_contract_signer(address, signer);
        self
    }

    /// Returns true if `signature` is a valid signature of `hash` by `signer`.
    pub fn verify(&self, signer: &[u8], hash: B256, signature: &[u8]) -> bool {
        if signer.len() < ADDRESS_LEN {
            debug!(len = signer.len(), "signer identity shorter than an address");
            return false;
        }

        let (head, key) = signer.split_at(ADDRESS_LEN);
        let address = Address::from_slice(head);
        if key.is_empty() {
            self.verify_address(address, hash, signature)
        } else {
            self.verify_erc7913(address, key, hash, signature)
        }
    }

    fn verify_address(&self, address: Address, hash: B256, signature: &[u8]) -> bool {
        if let Some(contract) = self.contract_signers.get(&address) {
            let valid = guarded(address, || contract.is_valid_signature(hash, signature))
                .is_some_and(|magic| magic == ERC1271_MAGIC_VALUE);
            self.erc1271_metrics.record(valid);
            return valid;
        }

        let valid = recover_signer(hash, signature).is_some_and(|recovered| recovered == address);
        self.ecdsa_metrics.record(valid);
        valid
    }

    fn verify_erc7913(&self, verifier: Address, key: &[u8], hash: B256, signature: &[u8]) -> bool {
        let Some(backend) = self.verifiers.get(&verifier) else {
            debug!(%verifier, "no verifier registered");
            self.erc7913_metrics.record(false);
            return false;
        };

        let marker = guarded(verifier, || backend.verify(key, hash, signature));
        if marker.is_none() {
            self.erc7913_metrics.record_backend_failure();
        }
        let valid = marker.is_some_and(|magic| magic == ERC7913_MAGIC_VALUE);
        self.erc7913_metrics.record(valid);
        valid
    }
}

/// Runs a backend call, folding errors and panics to `None`.
fn guarded<F>(backend: Address, call: F) -> Option<FixedBytes<4>>
where
    F: FnOnce() -> Result<FixedBytes<4>, VerifierError>,
{
    match catch_unwind(AssertUnwindSafe(call)) {
        Ok(Ok(marker)) => Some(marker),
        Ok(Err(err)) => {
            warn!(%backend, %err, "signature backend failed");
            None
        }
        Err(_) => {
            warn!(%backend, "signature backend panicked");
            None
        }
    }
}

/// Recovers the signer of a 65-byte `r || s || v` secp256k1 signature,
/// rejecting high-s signatures.
pub(crate) fn recover_signer(hash: B256, signature: &[u8]) -> Option<Address> {
    let signature = match Signature::from_raw(signature) {
        Ok(signature) => signature,
        Err(err) => {
            debug!(%err, "malformed ecdsa signature");
            return None;
        }
    };
    if signature.s() > SECP256K1N_HALF {
        debug!("ecdsa signature with high s");
        return None;
    }
    signature.recover_address_from_prehash(&hash).ok()
}

/// ERC-7913 backend for secp256k1 keys. The key is the signer's 20-byte address.
#[derive(Debug, Clone, Copy, Default)]
pub struct Secp256k1Verifier;

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(
        &self,
        key: &[u8],
        hash: B256,
        signature: &[u8],
    ) -> Result<FixedBytes<4>, VerifierError> {
        if key.len() != ADDRESS_LEN {
            return Err(VerifierError::MalformedKey("expected a 20-byte address"));
        }
        let expected = Address::from_slice(key);
        Ok(match recover_signer(hash, signature) {
            Some(recovered) if recovered == expected => ERC7913_MAGIC_VALUE,
            _ => ERC7913_INVALID_VALUE,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::{EcdsaKey, P256Key};
    use alloy_primitives::{Bytes, b256};
    use tempo_account_contracts::precompiles::ERC1271_INVALID_VALUE;
    use test_case::test_case;

    const HASH: B256 = b256!("0x1111111111111111111111111111111111111111111111111111111111111111");
    const VERIFIER: Address = Address::repeat_byte(0x79);

    struct Panicking;

    impl SignatureVerifier for Panicking {
        fn verify(&self, _: &[u8], _: B256, _: &[u8]) -> Result<FixedBytes<4>, VerifierError> {
            panic!("hostile verifier")
        }
    }

    struct Failing;

    impl SignatureVerifier for Failing {
        fn verify(&self, _: &[u8], _: B256, _: &[u8]) -> Result<FixedBytes<4>, VerifierError> {
            Err(VerifierError::Backend("unreachable oracle".into()))
        }
    }

    /// Returns a fixed marker regardless of input.
    struct Fixed(FixedBytes<4>);

    impl SignatureVerifier for Fixed {
        fn verify(&self, _: &[u8], _: B256, _: &[u8]) -> Result<FixedBytes<4>, VerifierError> {
            Ok(self.0)
        }
    }

    impl ContractSigner for Fixed {
        fn is_valid_signature(&self, _: B256, _: &[u8]) -> Result<FixedBytes<4>, VerifierError> {
            Ok(self.0)
        }
    }

    fn identity(verifier: Address, key: &[u8]) -> Bytes {
        [verifier.as_slice(), key].concat().into()
    }

    #[test_case(0 ; "empty")]
    #[test_case(1 ; "one byte")]
    #[test_case(19 ; "one byte short of an address")]
    fn test_short_identity_is_invalid(len: usize) {
        let registry = SignerRegistry::new().with_verifier(VERIFIER, Fixed(ERC7913_MAGIC_VALUE));
        assert!(!registry.verify(&vec![0x79; len], HASH, b"anything"));
    }

    #[test]
    fn test_ecdsa_address_identity() {
        let key = EcdsaKey::random();
        let registry = SignerRegistry::new();

        let signature = key.sign(HASH);
        assert!(registry.verify(&key.identity(), HASH, &signature));
        assert!(!registry.verify(&key.identity(), B256::ZERO, &signature));
        assert!(!registry.verify(&EcdsaKey::random().identity(), HASH, &signature));
        assert!(!registry.verify(&key.identity(), HASH, &signature[..64]));
    }

    #[test]
    fn test_high_s_ecdsa_signature_is_rejected() {
        let key = EcdsaKey::random();
        let signature = Signature::from_raw(&key.sign(HASH)).unwrap();

        // Flip to the malleable twin: s' = n - s, parity inverted.
        let n = uint!(0xFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFFEBAAEDCE6AF48A03BBFD25E8CD0364141_U256);
        let twin = Signature::new(signature.r(), n - signature.s(), !signature.v());

        assert!(SignerRegistry::new().verify(&key.identity(), HASH, &key.sign(HASH)));
        assert!(!SignerRegistry::new().verify(&key.identity(), HASH, &twin.as_bytes()));
    }

    #[test]
    fn test_contract_signer_requires_exact_magic() {
        let contract = Address::repeat_byte(0xcc);
        let valid =
            SignerRegistry::new().with_contract_signer(contract, Fixed(ERC1271_MAGIC_VALUE));
        let invalid =
            SignerRegistry::new().with_contract_signer(contract, Fixed(ERC1271_INVALID_VALUE));

        assert!(valid.verify(contract.as_slice(), HASH, b""));
        assert!(!invalid.verify(contract.as_slice(), HASH, b""));
    }

    #[test]
    fn test_unregistered_verifier_is_invalid() {
        let registry = SignerRegistry::new();
        assert!(!registry.verify(&identity(VERIFIER, b"key"), HASH, b"sig"));
    }

    #[test]
    fn test_marker_must_be_the_verify_selector() {
        let good = SignerRegistry::new().with_verifier(VERIFIER, Fixed(ERC7913_MAGIC_VALUE));
        let wrong = SignerRegistry::new().with_verifier(VERIFIER, Fixed(ERC1271_MAGIC_VALUE));

        assert!(good.verify(&identity(VERIFIER, b"key"), HASH, b"sig"));
        assert!(!wrong.verify(&identity(VERIFIER, b"key"), HASH, b"sig"));
    }

    #[test]
    fn test_hostile_verifiers_fold_to_false() {
        let panicking = Address::repeat_byte(0x01);
        let failing = Address::repeat_byte(0x02);
        let registry = SignerRegistry::new()
            .with_verifier(panicking, Panicking)
            .with_verifier(failing, Failing);

        assert!(!registry.verify(&identity(panicking, b"key"), HASH, b"sig"));
        assert!(!registry.verify(&identity(failing, b"key"), HASH, b"sig"));
    }

    #[test]
    fn test_secp256k1_verifier_backend() {
        let key = EcdsaKey::random();
        let registry = SignerRegistry::new().with_verifier(VERIFIER, Secp256k1Verifier);
        let signer = identity(VERIFIER, key.address().as_slice());

        assert!(registry.verify(&signer, HASH, &key.sign(HASH)));
        assert!(!registry.verify(&signer, HASH, &EcdsaKey::random().sign(HASH)));
        assert!(!registry.verify(&identity(VERIFIER, b"short"), HASH, &key.sign(HASH)));
    }

    #[test]
    fn test_p256_and_webauthn_backends() {
        let p256_verifier = Address::repeat_byte(0x25);
        let webauthn_verifier = Address::repeat_byte(0xa0);
        let registry = SignerRegistry::new()
            .with_verifier(p256_verifier, P256Verifier)
            .with_verifier(webauthn_verifier, WebAuthnVerifier);

        let key = P256Key::from_seed(7);
        assert!(registry.verify(&key.identity(p256_verifier), HASH, &key.sign(HASH)));
        assert!(registry.verify(&key.identity(webauthn_verifier), HASH, &key.sign_webauthn(HASH)));

        // Each backend only understands its own signature format.
        assert!(!registry.verify(&key.identity(p256_verifier), HASH, &key.sign_webauthn(HASH)));
        assert!(!registry.verify(&key.identity(webauthn_verifier), HASH, &key.sign(HASH)));
    }
}
