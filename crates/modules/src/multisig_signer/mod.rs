//! ERC-7913 multisig validator module.
//!
//! Each installed account owns a [`ThresholdSignerSet`]. A signature for the
//! account is the ABI encoded `(bytes[] signers, bytes[] signatures)` pair,
//! valid when the presented signers reach the account's threshold.

mod signer_set;
mod weighting;

pub use signer_set::{InstallableSignerSet, SignatureRejection, ThresholdSignerSet};
pub use weighting::{Unweighted, Weighted, Weighting};

use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    sync::Arc,
};

use alloy_primitives::{Address, B256, Bytes, FixedBytes, IntoLogData, U256};
use tempo_account_contracts::precompiles::{
    ERC1271_INVALID_VALUE, ERC1271_MAGIC_VALUE, MODULE_TYPE_VALIDATOR, ModuleError,
    MultiSigSignerError, MultiSigSignerEvent, MultisigConfirmation,
};
use tracing::{debug, info};

use crate::{
    eip712,
    error::Result,
    module::Erc7579Module,
    signature::MultisigSignature,
    signer_registry::{SignerRegistry, signer_id},
    storage::StorageCtx,
};

/// EIP-712 domain name of the module.
pub const DOMAIN_NAME: &str = "MultiSigSigner";

/// ERC-4337 `validateUserOp` result for a valid signature.
pub const SIG_VALIDATION_SUCCESS: U256 = U256::ZERO;

/// ERC-4337 `validateUserOp` result for an invalid signature.
pub const SIG_VALIDATION_FAILED: U256 = U256::from_limbs([1, 0, 0, 0]);

#[derive(Debug, Clone)]
struct AccountSigners<W> {
    set: ThresholdSignerSet<W>,
    /// `(signer id, hash)` pairs validated ahead of time.
    presigned: HashSet<(B256, B256)>,
}

/// Multisig validator keyed by account.
#[derive(Debug)]
pub struct MultiSigSigner<W = Unweighted> {
    address: Address,
    registry: Arc<SignerRegistry>,
    accounts: RefCell<HashMap<Address, AccountSigners<W>>>,
}

impl<W: Weighting> MultiSigSigner<W> {
    pub fn new(address: Address, registry: Arc<SignerRegistry>) -> Self {
        Self { address, registry, accounts: RefCell::default() }
    }

    pub fn registry(&self) -> &SignerRegistry {
        &self.registry
    }

    fn emit_event(&self, event: MultiSigSignerEvent) -> Result<()> {
        StorageCtx.emit_event(self.address, event.into_log_data())
    }

    /// Applies `f` to a copy of the account's set and commits it on success.
    fn update_set<F>(&self, account: Address, f: F) -> Result<()>
    where
        F: FnOnce(&mut ThresholdSignerSet<W>) -> Result<(), MultiSigSignerError>,
    {
        let mut accounts = self.accounts.borrow_mut();
        let state =
            accounts.get_mut(&account).ok_or(ModuleError::module_not_installed(account))?;
        let mut next = state.set.clone();
        f(&mut next)?;
        state.set = next;
        Ok(())
    }

    /// Adds signers to the caller's set.
    pub fn add_signers(&self, account: Address, signers: &[Bytes]) -> Result<()> {
        self.update_set(account, |set| set.add_signers(signers))?;
        for signer in signers {
            self.emit_event(MultiSigSignerEvent::signer_added(account, signer.clone()))?;
        }
        info!(%account, count = signers.len(), "signers added");
        Ok(())
    }

    /// Adds signers that each signed a [`MultisigConfirmation`] for this
    /// account and module, valid until `deadline`.
    pub fn add_confirmed_signers(
        &self,
        account: Address,
        signers: &[Bytes],
        confirmations: &[Bytes],
        deadline: U256,
    ) -> Result<()>
    where
        ThresholdSignerSet<W>: InstallableSignerSet,
    {
        if !self.is_initialized(account) {
            return Err(ModuleError::module_not_installed(account).into());
        }
        if U256::from(StorageCtx.timestamp()?) > deadline {
            return Err(MultiSigSignerError::expired_confirmation(deadline).into());
        }
        if signers.len() != confirmations.len() {
            return Err(MultiSigSignerError::mismatched_length().into());
        }

        let digest = eip712::signing_hash(
            DOMAIN_NAME,
            self.address,
            &MultisigConfirmation { account, module: self.address, deadline },
        )?;
        for (signer, confirmation) in signers.iter().zip(confirmations) {
            if !self.registry.verify(signer, digest, confirmation) {
                let signer = signer.clone();
                return Err(MultiSigSignerError::invalid_confirmation_signature(signer).into());
            }
        }

        self.add_signers(account, signers)
    }

    pub fn remove_signers(&self, account: Address, signers: &[Bytes]) -> Result<()> {
        self.update_set(account, |set| set.remove_signers(signers))?;

        if let Some(state) = self.accounts.borrow_mut().get_mut(&account) {
            let removed: HashSet<B256> = signers.iter().map(|s| signer_id(s)).collect();
            state.presigned.retain(|(id, _)| !removed.contains(id));
        }
        for signer in signers {
            self.emit_event(MultiSigSignerEvent::signer_removed(account, signer.clone()))?;
        }
        info!(%account, count = signers.len(), "signers removed");
        Ok(())
    }

    pub fn set_threshold(&self, account: Address, threshold: u64) -> Result<()> {
        self.update_set(account, |set| set.set_threshold(threshold))?;
        self.emit_event(MultiSigSignerEvent::threshold_set(account, threshold))?;
        info!(%account, threshold, "threshold set");
        Ok(())
    }

    /// Validates `signature` by `signer` over `hash` now, so that `signer` may
    /// later present an empty signature for the same hash.
    pub fn presign(
        &self,
        account: Address,
        signer: &Bytes,
        hash: B256,
        signature: &[u8],
    ) -> Result<()>
    where
        ThresholdSignerSet<W>: InstallableSignerSet,
    {
        if !self.is_initialized(account) {
            return Err(ModuleError::module_not_installed(account).into());
        }
        if signature.is_empty() || !self.registry.verify(signer, hash, signature) {
            return Err(MultiSigSignerError::invalid_presignature(signer.clone()).into());
        }

        if let Some(state) = self.accounts.borrow_mut().get_mut(&account) {
            state.presigned.insert((signer_id(signer), hash));
        }
        self.emit_event(MultiSigSignerEvent::signature_presigned(account, hash, signer.clone()))
    }

    pub fn is_presigned(&self, account: Address, signer: &[u8], hash: B256) -> bool {
        self.accounts
            .borrow()
            .get(&account)
            .is_some_and(|state| state.presigned.contains(&(signer_id(signer), hash)))
    }

    /// Returns true if `signature` is a valid multisig signature of the
    /// account over `hash`. Never fails: malformed input is just invalid.
    pub fn is_valid_signature(&self, account: Address, hash: B256, signature: &[u8]) -> bool {
        let Ok(MultisigSignature { signers, signatures }) = MultisigSignature::decode(signature)
        else {
            debug!(%account, "malformed multisig signature");
            return false;
        };

        let accounts = self.accounts.borrow();
        let Some(state) = accounts.get(&account) else {
            debug!(%account, "account has no signer set");
            return false;
        };

        let tally = state.set.tally_with(&signers, &signatures, |signer, signature| {
            if signature.is_empty() {
                state.presigned.contains(&(signer_id(signer), hash))
            } else {
                self.registry.verify(signer, hash, signature)
            }
        });
        state.set.meets_threshold(tally)
    }

    /// ERC-7579 stateful validator entry point.
    pub fn is_valid_signature_with_sender(
        &self,
        account: Address,
        _sender: Address,
        hash: B256,
        signature: &[u8],
    ) -> FixedBytes<4> {
        if self.is_valid_signature(account, hash, signature) {
            ERC1271_MAGIC_VALUE
        } else {
            ERC1271_INVALID_VALUE
        }
    }

    /// ERC-4337 user operation validation.
    pub fn validate_user_op(&self, account: Address, user_op_hash: B256, signature: &[u8]) -> U256 {
        if self.is_valid_signature(account, user_op_hash, signature) {
            SIG_VALIDATION_SUCCESS
        } else {
            SIG_VALIDATION_FAILED
        }
    }

    pub fn signers(&self, account: Address) -> Vec<Bytes> {
        self.accounts
            .borrow()
            .get(&account)
            .map(|state| state.set.signers().cloned().collect())
            .unwrap_or_default()
    }

    pub fn is_signer(&self, account: Address, signer: &[u8]) -> bool {
        self.accounts.borrow().get(&account).is_some_and(|state| state.set.is_signer(signer))
    }

    pub fn threshold(&self, account: Address) -> u64 {
        self.accounts.borrow().get(&account).map_or(0, |state| state.set.threshold())
    }

    pub fn total_weight(&self, account: Address) -> u128 {
        self.accounts.borrow().get(&account).map_or(0, |state| state.set.total_weight())
    }

    pub fn weight_of(&self, account: Address, signer: &[u8]) -> u64 {
        self.accounts.borrow().get(&account).map_or(0, |state| state.set.weight_of(signer))
    }
}

impl MultiSigSigner<Weighted> {
    pub fn set_signer_weights(
        &self,
        account: Address,
        signers: &[Bytes],
        weights: &[u64],
    ) -> Result<()> {
        self.update_set(account, |set| set.set_weights(signers, weights))?;
        for (signer, &weight) in signers.iter().zip(weights) {
            let event = MultiSigSignerEvent::signer_weight_changed(account, signer.clone(), weight);
            self.emit_event(event)?;
        }
        Ok(())
    }
}

impl<W> Erc7579Module for MultiSigSigner<W>
where
    W: Weighting,
    ThresholdSignerSet<W>: InstallableSignerSet,
{
    fn address(&self) -> Address {
        self.address
    }

    fn module_type(&self) -> U256 {
        MODULE_TYPE_VALIDATOR
    }

    fn on_install(&self, account: Address, init_data: &[u8]) -> Result<()> {
        if self.is_initialized(account) {
            return Err(ModuleError::module_already_installed(account).into());
        }
        let set = ThresholdSignerSet::<W>::from_install_data(init_data)?;
        let threshold = set.threshold();
        let signers: Vec<Bytes> = set.signers().cloned().collect();

        self.accounts
            .borrow_mut()
            .insert(account, AccountSigners { set, presigned: HashSet::new() });

        for signer in signers {
            self.emit_event(MultiSigSignerEvent::signer_added(account, signer))?;
        }
        self.emit_event(MultiSigSignerEvent::threshold_set(account, threshold))?;
        info!(%account, threshold, "multisig signer installed");
        Ok(())
    }

    fn on_uninstall(&self, account: Address, _deinit_data: &[u8]) -> Result<()> {
        if self.accounts.borrow_mut().remove(&account).is_none() {
            return Err(ModuleError::module_not_installed(account).into());
        }
        info!(%account, "multisig signer uninstalled");
        Ok(())
    }

    fn is_initialized(&self, account: Address) -> bool {
        self.accounts.borrow().contains_key(&account)
    }
}
