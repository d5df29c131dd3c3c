use alloy_primitives::{B256, Bytes};
use alloy_sol_types::SolValue;
use indexmap::IndexMap;
use tempo_account_contracts::precompiles::{ModuleError, MultiSigSignerError};
use tracing::debug;

use super::weighting::{Unweighted, Weighted, Weighting};
use crate::{
    error::Result,
    signer_registry::{ADDRESS_LEN, SignerRegistry, signer_id},
};

/// Why a batch of signatures was not counted.
#[derive(Debug, Clone, PartialEq, Eq, derive_more::Display)]
pub enum SignatureRejection {
    #[display("signers and signatures differ in length")]
    MismatchedLength,
    #[display("signer {_0} is not strictly after the previous signer")]
    Unordered(B256),
    #[display("signer {_0} is not a member")]
    NotASigner(B256),
    #[display("invalid signature for signer {_0}")]
    InvalidSignature(B256),
}

/// An ordered set of unique ERC-7913 signers with a reachable threshold.
///
/// Signers are keyed by `keccak256(identity)` and kept in insertion order.
/// Every mutator is atomic: it either applies completely or leaves the set
/// untouched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ThresholdSignerSet<W = Unweighted> {
    signers: IndexMap<B256, Bytes>,
    threshold: u64,
    weighting: W,
}

impl<W: Weighting> ThresholdSignerSet<W> {
    /// Creates a set from `signers` and `threshold`, weighting every signer 1.
    pub fn new(signers: &[Bytes], threshold: u64) -> Result<Self, MultiSigSignerError> {
        let mut set = Self::empty();
        set.add_signers(signers)?;
        set.set_threshold(threshold)?;
        Ok(set)
    }

    /// Set under construction, not valid until a threshold is set.
    fn empty() -> Self {
        Self { signers: IndexMap::new(), threshold: 0, weighting: W::default() }
    }

    pub fn signers(&self) -> impl ExactSizeIterator<Item = &Bytes> {
        self.signers.values()
    }

    pub fn len(&self) -> usize {
        self.signers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.signers.is_empty()
    }

    pub fn is_signer(&self, signer: &[u8]) -> bool {
        self.signers.contains_key(&signer_id(signer))
    }

    pub const fn threshold(&self) -> u64 {
        self.threshold
    }

    pub fn total_weight(&self) -> u128 {
        self.weighting.total_weight(self.signers.len())
    }

    /// Weight of `signer`, zero for non members.
    pub fn weight_of(&self, signer: &[u8]) -> u64 {
        let id = signer_id(signer);
        if self.signers.contains_key(&id) { self.weighting.weight_of(&id) } else { 0 }
    }

    pub fn add_signers(&mut self, signers: &[Bytes]) -> Result<(), MultiSigSignerError> {
        let mut next = self.clone();
        for signer in signers {
            if signer.len() < ADDRESS_LEN {
                return Err(MultiSigSignerError::invalid_signer(signer.clone()));
            }
            let id = signer_id(signer);
            if next.signers.insert(id, signer.clone()).is_some() {
                return Err(MultiSigSignerError::already_exists(signer.clone()));
            }
            next.weighting.on_added(id);
        }
        *self = next;
        Ok(())
    }

    pub fn remove_signers(&mut self, signers: &[Bytes]) -> Result<(), MultiSigSignerError> {
        let mut next = self.clone();
        for signer in signers {
            let id = signer_id(signer);
            if next.signers.shift_remove(&id).is_none() {
                return Err(MultiSigSignerError::nonexistent_signer(signer.clone()));
            }
            next.weighting.on_removed(&id);
        }
        next.ensure_reachable()?;
        *self = next;
        Ok(())
    }

    pub fn set_threshold(&mut self, threshold: u64) -> Result<(), MultiSigSignerError> {
        if threshold == 0 {
            return Err(MultiSigSignerError::zero_threshold());
        }
        let mut next = self.clone();
        next.threshold = threshold;
        next.ensure_reachable()?;
        *self = next;
        Ok(())
    }

    fn ensure_reachable(&self) -> Result<(), MultiSigSignerError> {
        let total = self.total_weight();
        if total < u128::from(self.threshold) {
            return Err(MultiSigSignerError::unreachable_threshold(total, self.threshold));
        }
        Ok(())
    }

    /// Sums the weight of a batch of signatures over `hash`.
    ///
    /// `signers` must be sorted by strictly increasing signer id, each a
    /// member, each with a signature accepted by `verify`.
    pub fn tally_with<F>(
        &self,
        signers: &[Bytes],
        signatures: &[Bytes],
        mut verify: F,
    ) -> Result<u128, SignatureRejection>
    where
        F: FnMut(&Bytes, &Bytes) -> bool,
    {
        if signers.len() != signatures.len() {
            return Err(SignatureRejection::MismatchedLength);
        }

        let mut previous: Option<B256> = None;
        let mut weight: u128 = 0;
        for (signer, signature) in signers.iter().zip(signatures) {
            let id = signer_id(signer);
            if previous.is_some_and(|previous| id <= previous) {
                return Err(SignatureRejection::Unordered(id));
            }
            previous = Some(id);

            if !self.signers.contains_key(&id) {
                return Err(SignatureRejection::NotASigner(id));
            }
            if !verify(signer, signature) {
                return Err(SignatureRejection::InvalidSignature(id));
            }
            weight = weight.saturating_add(u128::from(self.weighting.weight_of(&id)));
        }
        Ok(weight)
    }

    /// Returns true if the batch is well formed, every signature verifies
    /// through `registry` and the combined weight reaches the threshold.
    pub fn validate_threshold_signatures(
        &self,
        hash: B256,
        signers: &[Bytes],
        signatures: &[Bytes],
        registry: &SignerRegistry,
    ) -> bool {
        self.meets_threshold(self.tally_with(signers, signatures, |signer, signature| {
            registry.verify(signer, hash, signature)
        }))
    }

    /// Folds a tally into a threshold decision. A set without a threshold
    /// accepts nothing.
    pub fn meets_threshold(&self, tally: Result<u128, SignatureRejection>) -> bool {
        match tally {
            Ok(_) if self.threshold == 0 => {
                debug!("signer set has no threshold");
                false
            }
            Ok(weight) => weight >= u128::from(self.threshold),
            Err(reason) => {
                debug!(%reason, "signature batch rejected");
                false
            }
        }
    }
}

impl ThresholdSignerSet<Weighted> {
    /// Creates a weighted set. `weights[i]` applies to `signers[i]`.
    pub fn new_weighted(
        signers: &[Bytes],
        weights: &[u64],
        threshold: u64,
    ) -> Result<Self, MultiSigSignerError> {
        let mut set = Self::empty();
        set.add_signers(signers)?;
        set.set_weights(signers, weights)?;
        set.set_threshold(threshold)?;
        Ok(set)
    }

    pub fn set_weights(
        &mut self,
        signers: &[Bytes],
        weights: &[u64],
    ) -> Result<(), MultiSigSignerError> {
        if signers.len() != weights.len() {
            return Err(MultiSigSignerError::mismatched_length());
        }
        let mut next = self.clone();
        for (signer, &weight) in signers.iter().zip(weights) {
            let id = signer_id(signer);
            if !next.signers.contains_key(&id) {
                return Err(MultiSigSignerError::nonexistent_signer(signer.clone()));
            }
            if weight == 0 {
                return Err(MultiSigSignerError::invalid_weight(signer.clone(), weight));
            }
            next.weighting.set_weight(id, weight);
        }
        // A freshly built set has no threshold yet.
        if next.threshold != 0 {
            next.ensure_reachable()?;
        }
        *self = next;
        Ok(())
    }
}

/// Signer sets that can be built from an ERC-7579 install payload.
pub trait InstallableSignerSet: Sized {
    fn from_install_data(init_data: &[u8]) -> Result<Self>;
}

impl InstallableSignerSet for ThresholdSignerSet<Unweighted> {
    /// `(bytes[] signers, uint64 threshold)`
    fn from_install_data(init_data: &[u8]) -> Result<Self> {
        let (signers, threshold) = <(Vec<Bytes>, u64)>::abi_decode_params(init_data)
            .map_err(|_| ModuleError::invalid_install_data())?;
        Ok(Self::new(&signers, threshold)?)
    }
}

impl InstallableSignerSet for ThresholdSignerSet<Weighted> {
    /// `(bytes[] signers, uint64[] weights, uint64 threshold)`
    fn from_install_data(init_data: &[u8]) -> Result<Self> {
        let (signers, weights, threshold) =
            <(Vec<Bytes>, Vec<u64>, u64)>::abi_decode_params(init_data)
                .map_err(|_| ModuleError::invalid_install_data())?;
        Ok(Self::new_weighted(&signers, &weights, threshold)?)
    }
}
