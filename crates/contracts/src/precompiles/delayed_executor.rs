use alloy_primitives::{Address, B256, Bytes, FixedBytes};

pub use IDelayedExecutor::{
    IDelayedExecutorErrors as DelayedExecutorError,
    IDelayedExecutorEvents as DelayedExecutorEvent,
};

crate::sol! {
    /// DelayedExecutor interface for time-locked account operations
    ///
    /// An operation is identified by
    /// `keccak256(abi.encode(account, mode, executionCalldata, salt))`. It
    /// becomes executable `delay` seconds after being scheduled and expires
    /// `expiration` seconds after being scheduled. Both values are snapshotted
    /// at schedule time. Changing an account's delay or expiration only takes
    /// effect after a setback.
    #[derive(Debug, PartialEq, Eq)]
    interface IDelayedExecutor {
        /// @param account The account the operation executes on
        /// @param salt Disambiguates otherwise identical operations
        /// @param mode ERC-7579 execution mode
        /// @param executionCalldata Encoded execution payload
        function schedule(
            address account,
            bytes32 salt,
            bytes32 mode,
            bytes calldata executionCalldata
        ) external;

        /// @param account The account the operation executes on
        /// @param salt The salt used when scheduling
        /// @param mode ERC-7579 execution mode
        /// @param executionCalldata Encoded execution payload
        /// @return returnData Data returned by the account
        function execute(
            address account,
            bytes32 salt,
            bytes32 mode,
            bytes calldata executionCalldata
        ) external returns (bytes memory returnData);

        /// @param account The account the operation executes on
        /// @param salt The salt used when scheduling
        /// @param mode ERC-7579 execution mode
        /// @param executionCalldata Encoded execution payload
        function cancel(
            address account,
            bytes32 salt,
            bytes32 mode,
            bytes calldata executionCalldata
        ) external;

        /// @param newDelay Delay applied to operations scheduled once the update is effective
        function setDelay(uint64 newDelay) external;

        /// @param newExpiration Expiration applied to operations scheduled once the update is
        /// effective
        function setExpiration(uint64 newExpiration) external;

        /// @param account The account address
        /// @param operationId The operation id
        /// @return state 0 Unknown, 1 Scheduled, 2 Ready, 3 Expired, 4 Executed
        function state(address account, bytes32 operationId) external view returns (uint8 state);

        // Events
        event ERC7579ExecutorOperationScheduled(
            address indexed account,
            bytes32 indexed operationId,
            bytes32 salt,
            bytes32 mode,
            bytes executionCalldata,
            uint64 schedule
        );
        event ERC7579ExecutorOperationExecuted(
            address indexed account,
            bytes32 indexed operationId
        );
        event ERC7579ExecutorOperationCanceled(
            address indexed account,
            bytes32 indexed operationId
        );
        event ERC7579ExecutorDelayUpdated(
            address indexed account,
            uint64 newDelay,
            uint64 effectTime
        );
        event ERC7579ExecutorExpirationUpdated(
            address indexed account,
            uint64 newExpiration,
            uint64 effectTime
        );
        event ERC7579ExecutorSelectorAuthorized(
            address indexed account,
            bytes4 selector,
            bool allowed
        );

        // Errors
        error OperationAlreadyScheduled(bytes32 operationId);
        error UnknownOperation(bytes32 operationId);
        error OperationAlreadyExecuted(bytes32 operationId);
        error OperationNotReady(bytes32 operationId, uint64 executableAt);
        error OperationExpired(bytes32 operationId, uint64 expiredAt);
        error OperationNotCancelable(bytes32 operationId);
        error UnauthorizedSelector(address account, bytes4 selector);
        error InvalidMultisigAuthorization(bytes32 operationId);
        error InvalidExecutionWindow(uint64 delay, uint64 expiration);
    }
}

impl DelayedExecutorError {
    pub const fn operation_already_scheduled(operation_id: B256) -> Self {
        Self::OperationAlreadyScheduled(IDelayedExecutor::OperationAlreadyScheduled {
            operationId: operation_id,
        })
    }

    pub const fn unknown_operation(operation_id: B256) -> Self {
        Self::UnknownOperation(IDelayedExecutor::UnknownOperation { operationId: operation_id })
    }

    pub const fn operation_already_executed(operation_id: B256) -> Self {
        Self::OperationAlreadyExecuted(IDelayedExecutor::OperationAlreadyExecuted {
            operationId: operation_id,
        })
    }

    pub const fn operation_not_ready(operation_id: B256, executable_at: u64) -> Self {
        Self::OperationNotReady(IDelayedExecutor::OperationNotReady {
            operationId: operation_id,
            executableAt: executable_at,
        })
    }

    pub const fn operation_expired(operation_id: B256, expired_at: u64) -> Self {
        Self::OperationExpired(IDelayedExecutor::OperationExpired {
            operationId: operation_id,
            expiredAt: expired_at,
        })
    }

    pub const fn operation_not_cancelable(operation_id: B256) -> Self {
        Self::OperationNotCancelable(IDelayedExecutor::OperationNotCancelable {
            operationId: operation_id,
        })
    }

    pub const fn unauthorized_selector(account: Address, selector: FixedBytes<4>) -> Self {
        Self::UnauthorizedSelector(IDelayedExecutor::UnauthorizedSelector { account, selector })
    }

    pub const fn invalid_multisig_authorization(operation_id: B256) -> Self {
        Self::InvalidMultisigAuthorization(IDelayedExecutor::InvalidMultisigAuthorization {
            operationId: operation_id,
        })
    }

    pub const fn invalid_execution_window(delay: u64, expiration: u64) -> Self {
        Self::InvalidExecutionWindow(IDelayedExecutor::InvalidExecutionWindow { delay, expiration })
    }
}

impl DelayedExecutorEvent {
    pub fn operation_scheduled(
        account: Address,
        operation_id: B256,
        salt: B256,
        mode: B256,
        execution_calldata: Bytes,
        schedule: u64,
    ) -> Self {
        Self::ERC7579ExecutorOperationScheduled(
            IDelayedExecutor::ERC7579ExecutorOperationScheduled {
                account,
                operationId: operation_id,
                salt,
                mode,
                executionCalldata: execution_calldata,
                schedule,
            },
        )
    }

    pub const fn operation_executed(account: Address, operation_id: B256) -> Self {
        Self::ERC7579ExecutorOperationExecuted(IDelayedExecutor::ERC7579ExecutorOperationExecuted {
            account,
            operationId: operation_id,
        })
    }

    pub const fn operation_canceled(account: Address, operation_id: B256) -> Self {
        Self::ERC7579ExecutorOperationCanceled(IDelayedExecutor::ERC7579ExecutorOperationCanceled {
            account,
            operationId: operation_id,
        })
    }

    pub const fn delay_updated(account: Address, new_delay: u64, effect_time: u64) -> Self {
        Self::ERC7579ExecutorDelayUpdated(IDelayedExecutor::ERC7579ExecutorDelayUpdated {
            account,
            newDelay: new_delay,
            effectTime: effect_time,
        })
    }

    pub const fn expiration_updated(
        account: Address,
        new_expiration: u64,
        effect_time: u64,
    ) -> Self {
        Self::ERC7579ExecutorExpirationUpdated(
            IDelayedExecutor::ERC7579ExecutorExpirationUpdated {
                account,
                newExpiration: new_expiration,
                effectTime: effect_time,
            },
        )
    }

    pub const fn selector_authorized(
        account: Address,
        selector: FixedBytes<4>,
        allowed: bool,
    ) -> Self {
        Self::ERC7579ExecutorSelectorAuthorized(
            IDelayedExecutor::ERC7579ExecutorSelectorAuthorized { account, selector, allowed },
        )
    }
}

/// Lifecycle state of a scheduled operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OperationState {
    /// Never scheduled, or canceled.
    #[default]
    Unknown = 0,
    /// Scheduled, delay not yet elapsed.
    Scheduled = 1,
    /// Inside the execution window.
    Ready = 2,
    /// Window closed without execution.
    Expired = 3,
    /// Executed. Terminal.
    Executed = 4,
}
