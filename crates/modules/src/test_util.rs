//! Test helpers: signing keys for every supported scheme and an in-memory
//! account that records executions.

use std::{
    cell::{Cell, RefCell},
    collections::HashSet,
};

use alloy_primitives::{Address, B256, Bytes, U256};
use alloy_signer::SignerSync;
use alloy_signer_local::PrivateKeySigner;
use alloy_sol_types::SolValue;
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use p256::ecdsa::{Signature, SigningKey, signature::hazmat::PrehashSigner};
use tempo_account_contracts::precompiles::WebAuthnAuth;

use crate::{
    dispatch::ExecutionDispatch,
    error::{Result, TempoPrecompileError},
    signer_registry::webauthn_signed_message,
};

const ORIGIN: &str = "https://tempo.xyz";

/// secp256k1 key whose identity is its 20-byte address.
#[derive(Debug, Clone)]
pub struct EcdsaKey(PrivateKeySigner);

impl EcdsaKey {
    pub fn random() -> Self {
        Self(PrivateKeySigner::random())
    }

    pub fn address(&self) -> Address {
        self.0.address()
    }

    pub fn identity(&self) -> Bytes {
        Bytes::copy_from_slice(self.address().as_slice())
    }

    /// 65-byte `r || s || v` signature over `hash`.
    pub fn sign(&self, hash: B256) -> Bytes {
        let signature = self.0.sign_hash_sync(&hash).expect("secp256k1 signing failed");
        Bytes::copy_from_slice(&signature.as_bytes())
    }
}

/// P-256 key usable with both the P256 and the WebAuthn verifier.
#[derive(Debug, Clone)]
pub struct P256Key(SigningKey);

impl P256Key {
    /// Deterministic key derived from a non-zero seed.
    pub fn from_seed(seed: u8) -> Self {
        assert_ne!(seed, 0, "seed must be non-zero");
        let mut secret = [0u8; 32];
        secret[0] = 0x01;
        secret[31] = seed;
        Self(SigningKey::from_slice(&secret).expect("valid p256 scalar"))
    }

    /// `qx || qy`
    pub fn public_key(&self) -> Bytes {
        let point = self.0.verifying_key().to_encoded_point(false);
        Bytes::copy_from_slice(&point.as_bytes()[1..])
    }

    /// ERC-7913 identity `verifier || qx || qy`.
    pub fn identity(&self, verifier: Address) -> Bytes {
        [verifier.as_slice(), &self.public_key()].concat().into()
    }

    /// Low-s `r || s` signature over a 32-byte prehash.
    pub fn sign_prehash(&self, prehash: &[u8]) -> [u8; 64] {
        let signature: Signature = self.0.sign_prehash(prehash).expect("p256 signing failed");
        let signature = signature.normalize_s().unwrap_or(signature);
        let mut out = [0u8; 64];
        out.copy_from_slice(&signature.to_bytes());
        out
    }

    pub fn sign(&self, hash: B256) -> Bytes {
        Bytes::copy_from_slice(&self.sign_prehash(hash.as_slice()))
    }

    /// ABI encoded WebAuthn assertion over `hash`.
    pub fn sign_webauthn(&self, hash: B256) -> Bytes {
        let mut authenticator_data = vec![0x49; 32];
        // user present + user verified, then the signature counter
        authenticator_data.push(0x05);
        authenticator_data.extend_from_slice(&1u32.to_be_bytes());

        let client_data = format!(
            r#"{{"type":"webauthn.get","challenge":"{}","origin":"{ORIGIN}","crossOrigin":false}}"#,
            URL_SAFE_NO_PAD.encode(hash)
        );
        let type_index = client_data.find(r#""type""#).expect("type field");
        let challenge_index = client_data.find(r#""challenge""#).expect("challenge field");

        let signature =
            self.sign_prehash(&webauthn_signed_message(&authenticator_data, &client_data));

        WebAuthnAuth {
            authenticatorData: authenticator_data.into(),
            clientDataJSON: client_data,
            challengeIndex: U256::from(challenge_index),
            typeIndex: U256::from(type_index),
            r: B256::from_slice(&signature[..32]),
            s: B256::from_slice(&signature[32..]),
        }
        .abi_encode()
        .into()
    }
}

/// A single recorded call of [`ExecutionDispatch::execute_from_executor`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub account: Address,
    pub mode: B256,
    pub payload: Bytes,
}

type ExecutionHook = Box<dyn Fn(&MockAccount, &Bytes)>;

/// In-memory ERC-7579 account.
///
/// Records executions, can be told to revert, and runs an optional hook
/// before recording so tests can re-enter a module from inside a dispatch.
#[derive(Default)]
pub struct MockAccount {
    installed: RefCell<HashSet<(Address, U256, Address)>>,
    executions: RefCell<Vec<Execution>>,
    revert: Cell<bool>,
    hook: RefCell<Option<ExecutionHook>>,
}

impl std::fmt::Debug for MockAccount {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAccount")
            .field("installed", &self.installed)
            .field("executions", &self.executions)
            .field("revert", &self.revert)
            .finish_non_exhaustive()
    }
}

impl MockAccount {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&self, account: Address, module_type_id: U256, module: Address) {
        self.installed.borrow_mut().insert((account, module_type_id, module));
    }

    pub fn uninstall(&self, account: Address, module_type_id: U256, module: Address) {
        self.installed.borrow_mut().remove(&(account, module_type_id, module));
    }

    /// Makes every following execution revert until reset.
    pub fn set_reverting(&self, revert: bool) {
        self.revert.set(revert);
    }

    pub fn set_hook(&self, hook: impl Fn(&Self, &Bytes) + 'static) {
        *self.hook.borrow_mut() = Some(Box::new(hook));
    }

    pub fn executions(&self) -> Vec<Execution> {
        self.executions.borrow().clone()
    }
}

impl ExecutionDispatch for MockAccount {
    fn execute_from_executor(
        &self,
        account: Address,
        mode: B256,
        payload: &Bytes,
    ) -> Result<Bytes> {
        if self.revert.get() {
            return Err(TempoPrecompileError::ExecutionReverted(Bytes::from_static(b"reverted")));
        }
        if let Some(hook) = self.hook.borrow().as_ref() {
            hook(self, payload);
        }
        self.executions.borrow_mut().push(Execution { account, mode, payload: payload.clone() });
        Ok(Bytes::new())
    }

    fn is_module_installed(&self, account: Address, module_type_id: U256, module: Address) -> bool {
        self.installed.borrow().contains(&(account, module_type_id, module))
    }
}
