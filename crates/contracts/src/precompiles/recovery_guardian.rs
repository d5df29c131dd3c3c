use alloy_primitives::{Address, B256, Bytes};

pub use IRecoveryGuardian::{
    IRecoveryGuardianErrors as RecoveryGuardianError,
    IRecoveryGuardianEvents as RecoveryGuardianEvent,
};

crate::sol! {
    /// RecoveryGuardian interface for social recovery of accounts
    ///
    /// Guardians are ERC-7913 signer identities. A recovery is started with a
    /// threshold of guardian signatures over an EIP-712 digest binding the
    /// account, the hash of the execution to perform and the account nonce.
    /// After the timelock the execution can be dispatched by anyone. The
    /// account (or the guardians) may cancel at any time before that.
    #[derive(Debug, PartialEq, Eq)]
    interface IRecoveryGuardian {
        /// Start a recovery for `account`
        ///
        /// @param account The account to recover
        /// @param guardianSignatures ABI-encoded (bytes guardian, bytes signature)[] sorted by
        /// guardian id
        /// @param executionCalldata The execution to dispatch once the timelock passed
        function startRecovery(
            address account,
            bytes calldata guardianSignatures,
            bytes calldata executionCalldata
        ) external;

        /// Execute a recovery after the timelock has passed
        /// Anyone can call this
        ///
        /// @param account The account being recovered
        /// @param executionCalldata Must hash to the pending execution hash
        function executeRecovery(address account, bytes calldata executionCalldata) external;

        /// Cancel the caller's pending recovery
        function cancelRecovery() external;

        /// Cancel a pending recovery with guardian approval
        ///
        /// @param account The account being recovered
        /// @param guardianSignatures ABI-encoded (bytes guardian, bytes signature)[] sorted by
        /// guardian id
        function cancelRecoveryByGuardians(
            address account,
            bytes calldata guardianSignatures
        ) external;

        /// @param account The account address
        /// @return status 0 NotStarted, 1 Started, 2 Ready
        function getRecoveryStatus(address account) external view returns (uint8 status);

        /// @param account The account address
        /// @return nonce The nonce the next guardian digest must bind
        function nonces(address account) external view returns (uint256 nonce);

        // Events
        event RecoveryStarted(
            address indexed account,
            bytes32 indexed executionHash,
            uint64 executableAt
        );
        event RecoveryExecuted(address indexed account, bytes32 indexed executionHash);
        event RecoveryCanceled(address indexed account, bytes32 indexed executionHash);
        event GuardianAdded(address indexed account, bytes guardian);
        event GuardianRemoved(address indexed account, bytes guardian);
        event ThresholdChanged(address indexed account, uint64 threshold);
        event TimelockChanged(address indexed account, uint64 timelock);

        // Errors
        error RecoveryAlreadyStarted(address account);
        error RecoveryNotStarted(address account);
        error RecoveryNotReady(address account, uint64 executableAt);
        error ExecutionDiffersFromPending(bytes32 pending, bytes32 provided);
        error InvalidGuardianSignature();
        error ThresholdNotMet(uint128 weight, uint64 threshold);
        error InvalidTimelock(uint64 timelock, uint64 minimum);
    }

    /// EIP-712 payload guardians sign to start a recovery.
    #[derive(Debug, PartialEq, Eq)]
    struct StartRecovery {
        address account;
        bytes32 executionHash;
        uint256 nonce;
    }

    /// EIP-712 payload guardians sign to cancel a recovery.
    #[derive(Debug, PartialEq, Eq)]
    struct CancelRecovery {
        address account;
        uint256 nonce;
    }
}

impl RecoveryGuardianError {
    pub const fn recovery_already_started(account: Address) -> Self {
        Self::RecoveryAlreadyStarted(IRecoveryGuardian::RecoveryAlreadyStarted { account })
    }

    pub const fn recovery_not_started(account: Address) -> Self {
        Self::RecoveryNotStarted(IRecoveryGuardian::RecoveryNotStarted { account })
    }

    pub const fn recovery_not_ready(account: Address, executable_at: u64) -> Self {
        Self::RecoveryNotReady(IRecoveryGuardian::RecoveryNotReady {
            account,
            executableAt: executable_at,
        })
    }

    pub const fn execution_differs_from_pending(pending: B256, provided: B256) -> Self {
        Self::ExecutionDiffersFromPending(IRecoveryGuardian::ExecutionDiffersFromPending {
            pending,
            provided,
        })
    }

    pub const fn invalid_guardian_signature() -> Self {
        Self::InvalidGuardianSignature(IRecoveryGuardian::InvalidGuardianSignature {})
    }

    pub const fn threshold_not_met(weight: u128, threshold: u64) -> Self {
        Self::ThresholdNotMet(IRecoveryGuardian::ThresholdNotMet { weight, threshold })
    }

    pub const fn invalid_timelock(timelock: u64, minimum: u64) -> Self {
        Self::InvalidTimelock(IRecoveryGuardian::InvalidTimelock { timelock, minimum })
    }
}

impl RecoveryGuardianEvent {
    pub const fn recovery_started(
        account: Address,
        execution_hash: B256,
        executable_at: u64,
    ) -> Self {
        Self::RecoveryStarted(IRecoveryGuardian::RecoveryStarted {
            account,
            executionHash: execution_hash,
            executableAt: executable_at,
        })
    }

    pub const fn recovery_executed(account: Address, execution_hash: B256) -> Self {
        Self::RecoveryExecuted(IRecoveryGuardian::RecoveryExecuted {
            account,
            executionHash: execution_hash,
        })
    }

    pub const fn recovery_canceled(account: Address, execution_hash: B256) -> Self {
        Self::RecoveryCanceled(IRecoveryGuardian::RecoveryCanceled {
            account,
            executionHash: execution_hash,
        })
    }

    pub fn guardian_added(account: Address, guardian: Bytes) -> Self {
        Self::GuardianAdded(IRecoveryGuardian::GuardianAdded { account, guardian })
    }

    pub fn guardian_removed(account: Address, guardian: Bytes) -> Self {
        Self::GuardianRemoved(IRecoveryGuardian::GuardianRemoved { account, guardian })
    }

    pub const fn threshold_changed(account: Address, threshold: u64) -> Self {
        Self::ThresholdChanged(IRecoveryGuardian::ThresholdChanged { account, threshold })
    }

    pub const fn timelock_changed(account: Address, timelock: u64) -> Self {
        Self::TimelockChanged(IRecoveryGuardian::TimelockChanged { account, timelock })
    }
}

/// Derived status of an account's recovery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum RecoveryStatus {
    /// Nothing pending.
    #[default]
    NotStarted = 0,
    /// Pending, still inside the timelock.
    Started = 1,
    /// Pending and executable.
    Ready = 2,
}
