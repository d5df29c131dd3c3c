//! Delayed execution of account operations.
//!
//! An account schedules an operation, which becomes executable after the
//! account's delay and expires after its expiration, both snapshotted when
//! scheduling. Until executed the account may cancel it. Who may schedule and
//! execute is decided by a [`SchedulePolicy`].
//!
//! An account's delay is always below its expiration, so every operation has
//! a non-empty execution window.

mod delay;
mod policy;

pub use delay::DelayedValue;
pub use policy::{
    AccountOnly, MultisigGated, OperationRequest, SchedulePolicy, SelectorRestricted,
};

use std::{cell::RefCell, collections::HashMap};

use alloy_primitives::{Address, B256, Bytes, FixedBytes, IntoLogData, U256};
use alloy_sol_types::SolValue;
use tempo_account_contracts::precompiles::{
    DelayedExecutorError, DelayedExecutorEvent, MODULE_TYPE_EXECUTOR, ModuleError, OperationState,
};
use tracing::{info, warn};

use crate::{
    config::DelayedExecutorConfig, dispatch::ExecutionDispatch, error::Result,
    metrics::ExecutorMetrics, module::Erc7579Module, storage::StorageCtx,
};

/// Record of a scheduled operation. Delay and expiration are the account's
/// values at schedule time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Schedule {
    pub scheduled_at: u64,
    pub delay: u64,
    pub expiration: u64,
    pub executed: bool,
}

impl Schedule {
    pub const fn executable_at(&self) -> u64 {
        self.scheduled_at.saturating_add(self.delay)
    }

    pub const fn expires_at(&self) -> u64 {
        self.scheduled_at.saturating_add(self.expiration)
    }

    pub const fn state(&self, now: u64) -> OperationState {
        if self.executed {
            OperationState::Executed
        } else if now >= self.expires_at() {
            OperationState::Expired
        } else if now >= self.executable_at() {
            OperationState::Ready
        } else {
            OperationState::Scheduled
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct AccountDelays {
    delay: DelayedValue,
    expiration: DelayedValue,
}

/// Account state to roll back to when a dispatched operation fails.
struct Checkpoint<S> {
    delays: Option<AccountDelays>,
    operations: Option<HashMap<B256, Schedule>>,
    policy: S,
    events: usize,
}

/// Delayed executor module keyed by account.
#[derive(Debug)]
pub struct DelayedExecutor<P = AccountOnly> {
    address: Address,
    config: DelayedExecutorConfig,
    policy: P,
    accounts: RefCell<HashMap<Address, AccountDelays>>,
    /// Operations per account. Kept across uninstall.
    operations: RefCell<HashMap<Address, HashMap<B256, Schedule>>>,
    metrics: ExecutorMetrics,
}

impl<P: SchedulePolicy> DelayedExecutor<P> {
    pub fn new(address: Address, config: DelayedExecutorConfig, policy: P) -> Self {
        Self {
            address,
            config,
            policy,
            accounts: RefCell::default(),
            operations: RefCell::default(),
            metrics: ExecutorMetrics::default(),
        }
    }

    pub const fn policy(&self) -> &P {
        &self.policy
    }

    fn emit_event(&self, event: DelayedExecutorEvent) -> Result<()> {
        StorageCtx.emit_event(self.address, event.into_log_data())
    }

    fn delays(&self, account: Address) -> Result<AccountDelays> {
        self.accounts
            .borrow()
            .get(&account)
            .copied()
            .ok_or_else(|| ModuleError::module_not_installed(account).into())
    }

    pub fn schedule_of(&self, account: Address, operation_id: B256) -> Option<Schedule> {
        self.operations.borrow().get(&account).and_then(|ops| ops.get(&operation_id)).copied()
    }

    fn set_schedule(&self, account: Address, operation_id: B256, schedule: Option<Schedule>) {
        let mut operations = self.operations.borrow_mut();
        match schedule {
            Some(schedule) => {
                operations.entry(account).or_default().insert(operation_id, schedule);
            }
            None => {
                if let Some(ops) = operations.get_mut(&account) {
                    ops.remove(&operation_id);
                }
            }
        }
    }

    fn checkpoint(&self, account: Address) -> Result<Checkpoint<P::Snapshot>> {
        Ok(Checkpoint {
            delays: self.accounts.borrow().get(&account).copied(),
            operations: self.operations.borrow().get(&account).cloned(),
            policy: self.policy.snapshot(account),
            events: StorageCtx.event_checkpoint(self.address)?,
        })
    }

    fn revert_to(&self, account: Address, checkpoint: Checkpoint<P::Snapshot>) -> Result<()> {
        match checkpoint.delays {
            Some(delays) => self.accounts.borrow_mut().insert(account, delays),
            None => self.accounts.borrow_mut().remove(&account),
        };
        match checkpoint.operations {
            Some(operations) => self.operations.borrow_mut().insert(account, operations),
            None => self.operations.borrow_mut().remove(&account),
        };
        self.policy.restore(account, checkpoint.policy);
        StorageCtx.revert_events(self.address, checkpoint.events)
    }

    pub fn operation_id(&self, request: &OperationRequest) -> B256 {
        request.operation_id()
    }

    pub fn state(&self, account: Address, operation_id: B256) -> Result<OperationState> {
        let now = StorageCtx.timestamp()?;
        Ok(self
            .schedule_of(account, operation_id)
            .map_or(OperationState::Unknown, |schedule| schedule.state(now)))
    }

    /// Delay applied to operations scheduled now.
    pub fn delay(&self, account: Address) -> Result<u64> {
        Ok(self.delays(account)?.delay.get(StorageCtx.timestamp()?))
    }

    /// Expiration applied to operations scheduled now.
    pub fn expiration(&self, account: Address) -> Result<u64> {
        Ok(self.delays(account)?.expiration.get(StorageCtx.timestamp()?))
    }

    /// Delay update not yet in effect, as `(delay, effect_time)`.
    pub fn pending_delay(&self, account: Address) -> Result<Option<(u64, u64)>> {
        Ok(self.delays(account)?.delay.pending_update(StorageCtx.timestamp()?))
    }

    pub fn pending_expiration(&self, account: Address) -> Result<Option<(u64, u64)>> {
        Ok(self.delays(account)?.expiration.pending_update(StorageCtx.timestamp()?))
    }

    /// Schedules a new delay for the caller. Floored at the configured
    /// minimum and effective only after a setback.
    ///
    /// Must stay below both the expiration in effect and the last scheduled
    /// one.
    pub fn set_delay(&self, account: Address, new_delay: u64) -> Result<()> {
        let now = StorageCtx.timestamp()?;
        let new_delay = new_delay.max(self.config.min_delay);
        let effect_time = self.update_delays(account, |delays| {
            let expiration = delays.expiration.get(now).min(delays.expiration.latest());
            if new_delay >= expiration {
                return Err(
                    DelayedExecutorError::invalid_execution_window(new_delay, expiration).into()
                );
            }
            Ok(delays.delay.schedule_update(new_delay, now, self.config.min_setback))
        })?;
        self.emit_event(DelayedExecutorEvent::delay_updated(account, new_delay, effect_time))?;
        info!(%account, new_delay, effect_time, "delay update scheduled");
        Ok(())
    }

    /// Schedules a new expiration for the caller. Floored at the configured
    /// minimum and effective only after a setback.
    ///
    /// Must stay above both the delay in effect and the last scheduled one.
    pub fn set_expiration(&self, account: Address, new_expiration: u64) -> Result<()> {
        let now = StorageCtx.timestamp()?;
        let new_expiration = new_expiration.max(self.config.min_expiration);
        let effect_time = self.update_delays(account, |delays| {
            let delay = delays.delay.get(now).max(delays.delay.latest());
            if new_expiration <= delay {
                return Err(
                    DelayedExecutorError::invalid_execution_window(delay, new_expiration).into()
                );
            }
            Ok(delays.expiration.schedule_update(new_expiration, now, self.config.min_setback))
        })?;
        self.emit_event(DelayedExecutorEvent::expiration_updated(
            account,
            new_expiration,
            effect_time,
        ))?;
        info!(%account, new_expiration, effect_time, "expiration update scheduled");
        Ok(())
    }

    fn update_delays(
        &self,
        account: Address,
        f: impl FnOnce(&mut AccountDelays) -> Result<u64>,
    ) -> Result<u64> {
        let mut accounts = self.accounts.borrow_mut();
        let delays =
            accounts.get_mut(&account).ok_or(ModuleError::module_not_installed(account))?;
        f(delays)
    }

    /// Schedules `request` on behalf of `caller`. Returns the operation id.
    pub fn schedule(
        &self,
        caller: Address,
        request: &OperationRequest,
        auth: &[u8],
    ) -> Result<B256> {
        let account = request.account;
        let operation_id = request.operation_id();
        let delays = self.delays(account)?;

        self.policy.authorize_schedule(caller, request, operation_id, auth)?;
        if self.schedule_of(account, operation_id).is_some() {
            return Err(DelayedExecutorError::operation_already_scheduled(operation_id).into());
        }

        let now = StorageCtx.timestamp()?;
        let schedule = Schedule {
            scheduled_at: now,
            delay: delays.delay.get(now),
            expiration: delays.expiration.get(now),
            executed: false,
        };
        self.set_schedule(account, operation_id, Some(schedule));

        self.emit_event(DelayedExecutorEvent::operation_scheduled(
            account,
            operation_id,
            request.salt,
            request.mode,
            request.execution_calldata.clone(),
            schedule.executable_at(),
        ))?;
        self.metrics.record_scheduled();
        let executable_at = schedule.executable_at();
        info!(%account, %operation_id, executable_at, "operation scheduled");
        Ok(operation_id)
    }

    /// Executes a ready operation through `dispatch`.
    ///
    /// The operation is marked executed before the account is called. If the
    /// execution fails, everything the module recorded for the account since
    /// then is rolled back, including changes made by calls back into the
    /// module during the dispatch.
    pub fn execute(
        &self,
        caller: Address,
        request: &OperationRequest,
        dispatch: &dyn ExecutionDispatch,
    ) -> Result<Bytes> {
        let account = request.account;
        let operation_id = request.operation_id();
        let now = StorageCtx.timestamp()?;

        let Some(schedule) = self.schedule_of(account, operation_id) else {
            return Err(DelayedExecutorError::unknown_operation(operation_id).into());
        };
        match schedule.state(now) {
            OperationState::Executed => {
                return Err(DelayedExecutorError::operation_already_executed(operation_id).into());
            }
            OperationState::Scheduled => {
                return Err(DelayedExecutorError::operation_not_ready(
                    operation_id,
                    schedule.executable_at(),
                )
                .into());
            }
            OperationState::Expired => {
                let expired_at = schedule.expires_at();
                let err = DelayedExecutorError::operation_expired(operation_id, expired_at);
                return Err(err.into());
            }
            OperationState::Ready | OperationState::Unknown => {}
        }
        self.policy.authorize_execute(caller, request)?;

        let checkpoint = self.checkpoint(account)?;
        self.set_schedule(account, operation_id, Some(Schedule { executed: true, ..schedule }));

        let output =
            match dispatch.execute_from_executor(account, request.mode, &request.execution_calldata)
            {
                Ok(output) => output,
                Err(err) => {
                    warn!(%account, %operation_id, %err, "operation execution failed");
                    self.revert_to(account, checkpoint)?;
                    return Err(err);
                }
            };

        self.emit_event(DelayedExecutorEvent::operation_executed(account, operation_id))?;
        self.metrics.record_executed();
        info!(%account, %operation_id, "operation executed");
        Ok(output)
    }

    /// Cancels a scheduled operation, allowing it to be scheduled again.
    pub fn cancel(&self, caller: Address, request: &OperationRequest) -> Result<()> {
        let account = request.account;
        let operation_id = request.operation_id();
        self.policy.authorize_cancel(caller, request)?;

        let Some(schedule) = self.schedule_of(account, operation_id) else {
            return Err(DelayedExecutorError::unknown_operation(operation_id).into());
        };
        match schedule.state(StorageCtx.timestamp()?) {
            OperationState::Executed => {
                return Err(DelayedExecutorError::operation_already_executed(operation_id).into());
            }
            OperationState::Expired if !self.config.cancel_expired_operations => {
                return Err(DelayedExecutorError::operation_not_cancelable(operation_id).into());
            }
            _ => {}
        }

        self.set_schedule(account, operation_id, None);
        self.emit_event(DelayedExecutorEvent::operation_canceled(account, operation_id))?;
        self.metrics.record_canceled();
        info!(%account, %operation_id, "operation canceled");
        Ok(())
    }
}

impl DelayedExecutor<SelectorRestricted> {
    /// Authorizes payload selectors for the caller's operations.
    pub fn add_selectors(&self, account: Address, selectors: &[FixedBytes<4>]) -> Result<()> {
        self.delays(account)?;
        for selector in self.policy.insert(account, selectors) {
            self.emit_event(DelayedExecutorEvent::selector_authorized(account, selector, true))?;
        }
        Ok(())
    }

    pub fn remove_selectors(&self, account: Address, selectors: &[FixedBytes<4>]) -> Result<()> {
        self.delays(account)?;
        for selector in self.policy.remove(account, selectors) {
            self.emit_event(DelayedExecutorEvent::selector_authorized(account, selector, false))?;
        }
        Ok(())
    }
}

impl<P: SchedulePolicy> Erc7579Module for DelayedExecutor<P> {
    fn address(&self) -> Address {
        self.address
    }

    fn module_type(&self) -> U256 {
        MODULE_TYPE_EXECUTOR
    }

    /// `(uint64 delay, uint64 expiration)`, each floored at the configured
    /// minimum. The floored expiration must exceed the floored delay.
    fn on_install(&self, account: Address, init_data: &[u8]) -> Result<()> {
        if self.is_initialized(account) {
            return Err(ModuleError::module_already_installed(account).into());
        }
        let (delay, expiration) = <(u64, u64)>::abi_decode_params(init_data)
            .map_err(|_| ModuleError::invalid_install_data())?;
        let delay = delay.max(self.config.min_delay);
        let expiration = expiration.max(self.config.min_expiration);
        if expiration <= delay {
            warn!(%account, delay, expiration, "empty execution window");
            return Err(ModuleError::invalid_install_data().into());
        }

        self.accounts.borrow_mut().insert(
            account,
            AccountDelays {
                delay: DelayedValue::new(delay),
                expiration: DelayedValue::new(expiration),
            },
        );
        info!(%account, delay, expiration, "delayed executor installed");
        Ok(())
    }

    /// Drops the account's delays and policy state. Scheduled operations are
    /// kept and stay unexecutable until the module is installed again.
    fn on_uninstall(&self, account: Address, _deinit_data: &[u8]) -> Result<()> {
        if self.accounts.borrow_mut().remove(&account).is_none() {
            return Err(ModuleError::module_not_installed(account).into());
        }
        self.policy.on_uninstall(account);
        info!(%account, "delayed executor uninstalled");
        Ok(())
    }

    fn is_initialized(&self, account: Address) -> bool {
        self.accounts.borrow().contains_key(&account)
    }
}
