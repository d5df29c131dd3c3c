//! Codecs for the composite signature blobs accepted by the modules.

use alloy_primitives::Bytes;
use alloy_sol_types::SolValue;

use crate::signer_registry::signer_id;

/// Multisig signature, ABI encoded as `(bytes[] signers, bytes[] signatures)`.
///
/// `signatures[i]` is the signature of `signers[i]`. Signers must be sorted by
/// [`signer_id`] for validation to succeed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MultisigSignature {
    pub signers: Vec<Bytes>,
    pub signatures: Vec<Bytes>,
}

impl MultisigSignature {
    /// Builds a signature from `(signer, signature)` pairs, ordering them by
    /// signer id.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Bytes, Bytes)>) -> Self {
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort_by_cached_key(|(signer, _)| signer_id(signer));
        let (signers, signatures) = pairs.into_iter().unzip();
        Self { signers, signatures }
    }

    pub fn decode(data: &[u8]) -> Result<Self, alloy_sol_types::Error> {
        let (signers, signatures) = <(Vec<Bytes>, Vec<Bytes>)>::abi_decode_params(data)?;
        Ok(Self { signers, signatures })
    }

    pub fn encode(&self) -> Bytes {
        (self.signers.clone(), self.signatures.clone()).abi_encode_params().into()
    }
}

/// Guardian approvals, ABI encoded as `(bytes guardian, bytes signature)[]`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GuardianSignatures(pub Vec<(Bytes, Bytes)>);

impl GuardianSignatures {
    /// Builds approvals from `(guardian, signature)` pairs, ordering them by
    /// guardian id.
    pub fn from_pairs(pairs: impl IntoIterator<Item = (Bytes, Bytes)>) -> Self {
        let mut pairs: Vec<_> = pairs.into_iter().collect();
        pairs.sort_by_cached_key(|(guardian, _)| signer_id(guardian));
        Self(pairs)
    }

    pub fn decode(data: &[u8]) -> Result<Self, alloy_sol_types::Error> {
        Vec::<(Bytes, Bytes)>::abi_decode(data).map(Self)
    }

    pub fn encode(&self) -> Bytes {
        self.0.abi_encode().into()
    }

    /// Splits the approvals into parallel guardian and signature lists,
    /// keeping their order.
    pub fn into_parts(self) -> (Vec<Bytes>, Vec<Bytes>) {
        self.0.into_iter().unzip()
    }
}
