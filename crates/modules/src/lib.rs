//! Tempo account modules.
//!
//! ERC-7579 style modules for programmable accounts: ERC-7913 threshold
//! signer sets, guardian-driven social recovery and delayed execution.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub mod config;
pub mod delayed_executor;
pub mod dispatch;
pub mod eip712;
pub mod error;
pub mod metrics;
pub mod module;
pub mod multisig_signer;
pub mod recovery_guardian;
pub mod signature;
pub mod signer_registry;
pub mod storage;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_util;

pub use config::ModuleConfig;
pub use delayed_executor::{
    AccountOnly, DelayedExecutor, MultisigGated, OperationRequest, SchedulePolicy,
    SelectorRestricted,
};
pub use dispatch::ExecutionDispatch;
pub use error::{Result, TempoPrecompileError};
pub use module::Erc7579Module;
pub use multisig_signer::{MultiSigSigner, ThresholdSignerSet, Unweighted, Weighted, Weighting};
pub use recovery_guardian::RecoveryGuardian;
pub use signer_registry::{
    ContractSigner, P256Verifier, Secp256k1Verifier, SignatureVerifier, SignerRegistry,
    VerifierError, WebAuthnVerifier,
};

pub use tempo_account_contracts::precompiles::{
    ERC1271_INVALID_VALUE, ERC1271_MAGIC_VALUE, ERC7913_INVALID_VALUE, ERC7913_MAGIC_VALUE,
    MODULE_TYPE_EXECUTOR, MODULE_TYPE_VALIDATOR, OperationState, RecoveryStatus,
};
