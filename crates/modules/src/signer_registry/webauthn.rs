use alloy_primitives::{B256, FixedBytes};
use alloy_sol_types::SolValue;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
use tempo_account_contracts::precompiles::{
    ERC7913_INVALID_VALUE, ERC7913_MAGIC_VALUE, WebAuthnAuth,
};
use tracing::debug;

use super::{
    SignatureVerifier, VerifierError,
    secp256r1::{parse_signature, verify_prehash, verifying_key},
};

/// Flags byte follows the 32-byte RP id hash.
const FLAGS_OFFSET: usize = 32;
/// rpIdHash (32) + flags (1) + signCount (4).
const MIN_AUTHENTICATOR_DATA_LEN: usize = 37;
const FLAG_USER_PRESENT: u8 = 0x01;

const EXPECTED_TYPE: &str = r#""type":"webauthn.get""#;

/// ERC-7913 backend for WebAuthn (passkey) assertions over P-256 keys.
///
/// Key is `qx || qy`. The signature is an ABI encoded [`WebAuthnAuth`] whose
/// client data challenge must be the base64url encoding of the signed hash.
#[derive(Debug, Clone, Copy, Default)]
pub struct WebAuthnVerifier;

impl SignatureVerifier for WebAuthnVerifier {
    fn verify(
        &self,
        key: &[u8],
        hash: B256,
        signature: &[u8],
    ) -> Result<FixedBytes<4>, VerifierError> {
        let key = verifying_key(key)?;
        let auth = WebAuthnAuth::abi_decode(signature)
            .map_err(|_| VerifierError::MalformedSignature("expected WebAuthnAuth"))?;

        if !is_valid_assertion(&auth, hash) {
            return Ok(ERC7913_INVALID_VALUE);
        }

        let signature = parse_signature(&[auth.r.as_slice(), auth.s.as_slice()].concat())?;
        let message = signed_message(&auth.authenticatorData, &auth.clientDataJSON);
        Ok(if verify_prehash(&key, &message, &signature) {
            ERC7913_MAGIC_VALUE
        } else {
            ERC7913_INVALID_VALUE
        })
    }
}

/// Checks the authenticator flags and the client data fields.
fn is_valid_assertion(auth: &WebAuthnAuth, hash: B256) -> bool {
    let data = &auth.authenticatorData;
    if data.len() < MIN_AUTHENTICATOR_DATA_LEN || data[FLAGS_OFFSET] & FLAG_USER_PRESENT == 0 {
        debug!("authenticator data missing or user not present");
        return false;
    }

    let client_data = auth.clientDataJSON.as_bytes();
    if !contains_at(client_data, auth.typeIndex, EXPECTED_TYPE.as_bytes()) {
        debug!("client data is not a webauthn.get assertion");
        return false;
    }

    let expected_challenge = format!(r#""challenge":"{}""#, URL_SAFE_NO_PAD.encode(hash));
    if !contains_at(client_data, auth.challengeIndex, expected_challenge.as_bytes()) {
        debug!("client data challenge does not match the hash");
        return false;
    }
    true
}

fn contains_at(haystack: &[u8], index: alloy_primitives::U256, needle: &[u8]) -> bool {
    let Ok(start) = usize::try_from(index) else { return false };
    start
        .checked_add(needle.len())
        .and_then(|end| haystack.get(start..end))
        .is_some_and(|window| window == needle)
}

/// `sha256(authenticatorData || sha256(clientDataJSON))`
pub(crate) fn signed_message(authenticator_data: &[u8], client_data_json: &str) -> [u8; 32] {
    let client_data_hash = Sha256::digest(client_data_json.as_bytes());
    let mut hasher = Sha256::new();
    hasher.update(authenticator_data);
    hasher.update(client_data_hash);
    hasher.finalize().into()
}
