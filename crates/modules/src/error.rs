use alloy_primitives::Bytes;
use tempo_account_contracts::precompiles::{
    DelayedExecutorError, ModuleError, MultiSigSignerError, RecoveryGuardianError,
};

/// Result type for account module operations.
pub type Result<T, E = TempoPrecompileError> = std::result::Result<T, E>;

/// Errors surfaced by the account modules.
///
/// Module specific failures carry the `sol!` error of the module's interface so
/// callers and tooling can tell rejection reasons apart.
#[derive(Debug, PartialEq, Eq, thiserror::Error, derive_more::From)]
pub enum TempoPrecompileError {
    /// ERC-7579 lifecycle and caller checks.
    #[error("module error: {0:?}")]
    Module(ModuleError),

    /// Signer set configuration and multisig validation.
    #[error("multisig signer error: {0:?}")]
    MultiSigSigner(MultiSigSignerError),

    /// Guardian recovery state machine.
    #[error("recovery guardian error: {0:?}")]
    RecoveryGuardian(RecoveryGuardianError),

    /// Delayed execution state machine.
    #[error("delayed executor error: {0:?}")]
    DelayedExecutor(DelayedExecutorError),

    /// The account reverted while executing an authorized operation.
    #[error("execution reverted: {0}")]
    #[from(skip)]
    ExecutionReverted(Bytes),

    /// Host misuse, e.g. no storage context installed.
    #[error("fatal error: {0}")]
    #[from(skip)]
    Fatal(String),
}

impl TempoPrecompileError {
    /// Returns true for failures of the dispatched execution itself.
    pub const fn is_execution_revert(&self) -> bool {
        matches!(self, Self::ExecutionReverted(_))
    }
}
