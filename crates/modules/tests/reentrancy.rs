//! Accounts calling back into a module while it dispatches to them.

use std::{cell::RefCell, rc::Rc, sync::Arc};

use alloy_primitives::{Address, B256, Bytes, U256, bytes, fixed_bytes, keccak256};
use alloy_sol_types::SolValue;
use tempo_account_contracts::precompiles::{DelayedExecutorError, RecoveryGuardianError};
use tempo_account_modules::{
    AccountOnly, DelayedExecutor, Erc7579Module, ExecutionDispatch, MODULE_TYPE_EXECUTOR,
    OperationRequest, OperationState, RecoveryGuardian, RecoveryStatus, Result,
    SelectorRestricted, SignerRegistry, TempoPrecompileError,
    config::{DAY, DelayedExecutorConfig, RecoveryGuardianConfig},
    signature::GuardianSignatures,
    storage::{StorageCtx, hashmap::HashMapStorageProvider},
    test_util::{EcdsaKey, MockAccount},
};

const ACCOUNT: Address = Address::repeat_byte(0xac);
const MODULE: Address = Address::repeat_byte(0xde);
const START: u64 = 1_700_000_000;

/// Account that lets `hook` call back into the module, then reverts.
struct RevertingAccount<F> {
    hook: F,
}

impl<F: Fn()> ExecutionDispatch for RevertingAccount<F> {
    fn execute_from_executor(&self, _: Address, _: B256, _: &Bytes) -> Result<Bytes> {
        (self.hook)();
        Err(TempoPrecompileError::ExecutionReverted(Bytes::from_static(b"reverted")))
    }

    fn is_module_installed(&self, _: Address, _: U256, _: Address) -> bool {
        true
    }
}

fn approvals(key: &EcdsaKey, digest: B256) -> Bytes {
    GuardianSignatures::from_pairs([(key.identity(), key.sign(digest))]).encode()
}

fn new_guardian(key: &EcdsaKey) -> eyre::Result<Rc<RecoveryGuardian>> {
    let guardian = Rc::new(RecoveryGuardian::new(
        MODULE,
        Arc::new(SignerRegistry::new()),
        RecoveryGuardianConfig::default(),
    ));
    guardian.on_install(ACCOUNT, &(vec![key.identity()], 1u64, DAY).abi_encode_params())?;
    Ok(guardian)
}

#[test]
fn reentrant_execute_is_rejected() -> eyre::Result<()> {
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let executor =
            Rc::new(DelayedExecutor::new(MODULE, DelayedExecutorConfig::default(), AccountOnly));
        executor.on_install(ACCOUNT, &(DAY, 2 * DAY).abi_encode_params())?;

        let op =
            OperationRequest::new(ACCOUNT, B256::ZERO, Bytes::from_static(b"withdraw"), B256::ZERO);
        let id = executor.schedule(ACCOUNT, &op, &[])?;
        StorageCtx.advance_time(DAY);

        let inner: Rc<RefCell<Vec<Result<Bytes>>>> = Rc::default();
        let account = MockAccount::new();
        account.set_hook({
            let executor = Rc::clone(&executor);
            let inner = Rc::clone(&inner);
            let op = op.clone();
            move |account: &MockAccount, _: &Bytes| {
                let result = executor.execute(ACCOUNT, &op, account);
                inner.borrow_mut().push(result);
                let cancel = executor.cancel(ACCOUNT, &op).map(|()| Bytes::new());
                inner.borrow_mut().push(cancel);
            }
        });

        executor.execute(ACCOUNT, &op, &account)?;

        assert_eq!(
            *inner.borrow(),
            vec![
                Err(DelayedExecutorError::operation_already_executed(id).into()),
                Err(DelayedExecutorError::operation_already_executed(id).into()),
            ]
        );
        assert_eq!(account.executions().len(), 1);
        assert_eq!(executor.state(ACCOUNT, id)?, OperationState::Executed);
        Ok(())
    })
}

#[test]
fn reentrant_recovery_is_rejected() -> eyre::Result<()> {
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let key = EcdsaKey::random();
        let guardian = new_guardian(&key)?;

        let payload = Bytes::from_static(b"replace owner");
        let digest = guardian.start_recovery_digest(ACCOUNT, keccak256(&payload))?;
        guardian.start_recovery(ACCOUNT, &approvals(&key, digest), &payload)?;
        StorageCtx.advance_time(DAY);

        let inner: Rc<RefCell<Vec<Result<Bytes>>>> = Rc::default();
        let account = MockAccount::new();
        account.install(ACCOUNT, MODULE_TYPE_EXECUTOR, MODULE);
        account.set_hook({
            let guardian = Rc::clone(&guardian);
            let inner = Rc::clone(&inner);
            move |account: &MockAccount, payload: &Bytes| {
                let result = guardian.execute_recovery(ACCOUNT, payload, account);
                inner.borrow_mut().push(result);
            }
        });

        guardian.execute_recovery(ACCOUNT, &payload, &account)?;

        assert_eq!(
            *inner.borrow(),
            vec![Err(RecoveryGuardianError::recovery_not_started(ACCOUNT).into())]
        );
        assert_eq!(account.executions().len(), 1);
        assert_eq!(guardian.pending_recovery(ACCOUNT), None);
        Ok(())
    })
}

#[test]
fn failed_recovery_rolls_back_reentrant_changes() -> eyre::Result<()> {
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let key = EcdsaKey::random();
        let guardian = new_guardian(&key)?;

        let payload = Bytes::from_static(b"replace owner");
        let digest = guardian.start_recovery_digest(ACCOUNT, keccak256(&payload))?;
        guardian.start_recovery(ACCOUNT, &approvals(&key, digest), &payload)?;
        StorageCtx.advance_time(DAY);

        let pending = guardian.pending_recovery(ACCOUNT);
        let nonce = guardian.nonce(ACCOUNT);
        let events = StorageCtx.get_events(MODULE).len();

        // Valid for the nonce the account sees while the recovery runs.
        let hijack = Bytes::from_static(b"hijack");
        let digest = guardian.start_recovery_digest(ACCOUNT, keccak256(&hijack))?;
        let hijack_approvals = approvals(&key, digest);

        let nested: Rc<RefCell<Vec<Result<()>>>> = Rc::default();
        let account = RevertingAccount {
            hook: {
                let guardian = Rc::clone(&guardian);
                let nested = Rc::clone(&nested);
                move || {
                    let started = guardian.start_recovery(ACCOUNT, &hijack_approvals, &hijack);
                    nested.borrow_mut().push(started);
                    nested.borrow_mut().push(guardian.set_timelock(ACCOUNT, 2 * DAY));
                }
            },
        };

        let err = guardian.execute_recovery(ACCOUNT, &payload, &account).unwrap_err();
        assert!(err.is_execution_revert());
        assert_eq!(*nested.borrow(), vec![Ok(()), Ok(())]);

        assert_eq!(guardian.pending_recovery(ACCOUNT), pending);
        assert_eq!(guardian.nonce(ACCOUNT), nonce);
        assert_eq!(guardian.timelock(ACCOUNT), DAY);
        assert_eq!(guardian.recovery_status(ACCOUNT)?, RecoveryStatus::Ready);
        assert_eq!(StorageCtx.get_events(MODULE).len(), events);
        Ok(())
    })
}

#[test]
fn failed_execution_rolls_back_reentrant_changes() -> eyre::Result<()> {
    let mut storage = HashMapStorageProvider::new(1).with_timestamp(START);
    StorageCtx::enter(&mut storage, || {
        let executor = Rc::new(DelayedExecutor::new(
            MODULE,
            DelayedExecutorConfig::default(),
            SelectorRestricted::default(),
        ));
        executor.on_install(ACCOUNT, &(DAY, 2 * DAY).abi_encode_params())?;

        let transfer = fixed_bytes!("0xa9059cbb");
        let approve = fixed_bytes!("0x095ea7b3");
        executor.add_selectors(ACCOUNT, &[transfer])?;
        let op = OperationRequest::new(ACCOUNT, B256::ZERO, bytes!("a9059cbb00"), B256::ZERO);
        let id = executor.schedule(ACCOUNT, &op, &[])?;
        StorageCtx.advance_time(DAY);
        let events = StorageCtx.get_events(MODULE).len();

        let smuggled = OperationRequest::new(ACCOUNT, B256::ZERO, bytes!("095ea7b300"), B256::ZERO);
        let smuggled_id = smuggled.operation_id();

        let nested: Rc<RefCell<Vec<Result<()>>>> = Rc::default();
        let account = RevertingAccount {
            hook: {
                let executor = Rc::clone(&executor);
                let nested = Rc::clone(&nested);
                move || {
                    let mut nested = nested.borrow_mut();
                    nested.push(executor.add_selectors(ACCOUNT, &[approve]));
                    nested.push(executor.schedule(ACCOUNT, &smuggled, &[]).map(drop));
                    nested.push(executor.set_delay(ACCOUNT, DAY + 1));
                }
            },
        };

        let err = executor.execute(ACCOUNT, &op, &account).unwrap_err();
        assert!(err.is_execution_revert());
        assert_eq!(*nested.borrow(), vec![Ok(()), Ok(()), Ok(())]);

        assert_eq!(executor.state(ACCOUNT, id)?, OperationState::Ready);
        assert_eq!(executor.state(ACCOUNT, smuggled_id)?, OperationState::Unknown);
        assert!(!executor.policy().is_authorized(ACCOUNT, approve));
        assert_eq!(executor.pending_delay(ACCOUNT)?, None);
        assert_eq!(StorageCtx.get_events(MODULE).len(), events);
        Ok(())
    })
}
