//! Guardian-driven social recovery.
//!
//! An account configures a set of guardians, a threshold and a timelock.
//! Guardians start a recovery by signing the hash of the execution to perform;
//! once the timelock passed anyone may dispatch it through the account. The
//! account can cancel a pending recovery at any time, and so can its
//! guardians with a fresh threshold of signatures.
//!
//! Guardian digests bind a per-account nonce that is bumped on every start and
//! cancel, so a set of signatures is only ever usable once.

use std::{cell::RefCell, collections::HashMap, sync::Arc};

use alloy_primitives::{Address, B256, Bytes, IntoLogData, U256, keccak256};
use alloy_sol_types::{SolStruct, SolValue};
use tempo_account_contracts::precompiles::{
    CancelRecovery, MODULE_TYPE_EXECUTOR, ModuleError, RecoveryGuardianError,
    RecoveryGuardianEvent, RecoveryStatus, StartRecovery,
};
use tracing::{debug, info, warn};

use crate::{
    config::RecoveryGuardianConfig,
    dispatch::ExecutionDispatch,
    eip712,
    error::Result,
    metrics::RecoveryMetrics,
    module::Erc7579Module,
    multisig_signer::{ThresholdSignerSet, Unweighted},
    signature::GuardianSignatures,
    signer_registry::SignerRegistry,
    storage::StorageCtx,
};

/// EIP-712 domain name of the module.
pub const DOMAIN_NAME: &str = "RecoveryGuardian";

/// Execution mode used to dispatch a recovery: single call, default exec type.
pub const RECOVERY_EXECUTION_MODE: B256 = B256::ZERO;

/// A started recovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingRecovery {
    /// `keccak256` of the execution payload guardians approved.
    pub execution_hash: B256,
    pub started_at: u64,
    /// Fixed at start, later timelock changes do not move it.
    pub executable_at: u64,
}

#[derive(Debug, Clone)]
struct RecoveryConfig {
    guardians: ThresholdSignerSet<Unweighted>,
    timelock: u64,
    pending: Option<PendingRecovery>,
}

impl RecoveryConfig {
    fn status(&self, now: u64) -> RecoveryStatus {
        match self.pending {
            None => RecoveryStatus::NotStarted,
            Some(pending) if now < pending.executable_at => RecoveryStatus::Started,
            Some(_) => RecoveryStatus::Ready,
        }
    }
}

/// Account state to roll back to when a dispatched recovery fails.
struct Checkpoint {
    config: Option<RecoveryConfig>,
    nonce: Option<U256>,
    events: usize,
}

/// Social recovery executor module keyed by account.
#[derive(Debug)]
pub struct RecoveryGuardian {
    address: Address,
    registry: Arc<SignerRegistry>,
    config: RecoveryGuardianConfig,
    accounts: RefCell<HashMap<Address, RecoveryConfig>>,
    /// Survive uninstall so that old approvals never become valid again.
    nonces: RefCell<HashMap<Address, U256>>,
    metrics: RecoveryMetrics,
}

impl RecoveryGuardian {
    pub fn new(
        address: Address,
        registry: Arc<SignerRegistry>,
        config: RecoveryGuardianConfig,
    ) -> Self {
        Self {
            address,
            registry,
            config,
            accounts: RefCell::default(),
            nonces: RefCell::default(),
            metrics: RecoveryMetrics::default(),
        }
    }

    fn emit_event(&self, event: RecoveryGuardianEvent) -> Result<()> {
        StorageCtx.emit_event(self.address, event.into_log_data())
    }

    fn bump_nonce(&self, account: Address) {
        *self.nonces.borrow_mut().entry(account).or_default() += U256::from(1);
    }

    /// Runs `f` on the account's configuration, failing if not installed.
    fn with_config<R>(
        &self,
        account: Address,
        f: impl FnOnce(&mut RecoveryConfig) -> Result<R>,
    ) -> Result<R> {
        let mut accounts = self.accounts.borrow_mut();
        let config =
            accounts.get_mut(&account).ok_or(ModuleError::module_not_installed(account))?;
        f(config)
    }

    /// Guardian set of `account`, cloned so that verification runs without a
    /// borrow of the module state.
    fn guardian_set(&self, account: Address) -> Result<ThresholdSignerSet<Unweighted>> {
        self.with_config(account, |config| Ok(config.guardians.clone()))
    }

    fn checkpoint(&self, account: Address) -> Result<Checkpoint> {
        Ok(Checkpoint {
            config: self.accounts.borrow().get(&account).cloned(),
            nonce: self.nonces.borrow().get(&account).copied(),
            events: StorageCtx.event_checkpoint(self.address)?,
        })
    }

    fn revert_to(&self, account: Address, checkpoint: Checkpoint) -> Result<()> {
        match checkpoint.config {
            Some(config) => self.accounts.borrow_mut().insert(account, config),
            None => self.accounts.borrow_mut().remove(&account),
        };
        match checkpoint.nonce {
            Some(nonce) => self.nonces.borrow_mut().insert(account, nonce),
            None => self.nonces.borrow_mut().remove(&account),
        };
        StorageCtx.revert_events(self.address, checkpoint.events)
    }

    /// EIP-712 digest guardians sign to start a recovery of `account`.
    pub fn start_recovery_digest(&self, account: Address, execution_hash: B256) -> Result<B256> {
        let payload =
            StartRecovery { account, executionHash: execution_hash, nonce: self.nonce(account) };
        self.digest(&payload)
    }

    /// EIP-712 digest guardians sign to cancel the pending recovery of `account`.
    pub fn cancel_recovery_digest(&self, account: Address) -> Result<B256> {
        self.digest(&CancelRecovery { account, nonce: self.nonce(account) })
    }

    fn digest<T: SolStruct>(&self, payload: &T) -> Result<B256> {
        eip712::signing_hash(DOMAIN_NAME, self.address, payload)
    }

    /// Checks that `guardian_signatures` reach the account's threshold over `digest`.
    fn authorize_guardians(
        &self,
        set: &ThresholdSignerSet<Unweighted>,
        digest: B256,
        guardian_signatures: &[u8],
    ) -> Result<()> {
        let Ok(approvals) = GuardianSignatures::decode(guardian_signatures) else {
            debug!("malformed guardian signatures");
            return Err(RecoveryGuardianError::invalid_guardian_signature().into());
        };
        let (guardians, signatures) = approvals.into_parts();

        let weight = set
            .tally_with(&guardians, &signatures, |guardian, signature| {
                self.registry.verify(guardian, digest, signature)
            })
            .map_err(|reason| {
                debug!(%reason, "guardian approval rejected");
                RecoveryGuardianError::invalid_guardian_signature()
            })?;

        let threshold = set.threshold();
        if weight < u128::from(threshold) {
            return Err(RecoveryGuardianError::threshold_not_met(weight, threshold).into());
        }
        Ok(())
    }

    /// Starts a recovery that will dispatch `execution_calldata` once the
    /// timelock passed.
    pub fn start_recovery(
        &self,
        account: Address,
        guardian_signatures: &[u8],
        execution_calldata: &Bytes,
    ) -> Result<()> {
        let now = StorageCtx.timestamp()?;
        let execution_hash = keccak256(execution_calldata);
        let nonce = self.nonce(account);
        let digest = self.start_recovery_digest(account, execution_hash)?;

        if self.pending_recovery(account).is_some() {
            return Err(RecoveryGuardianError::recovery_already_started(account).into());
        }
        self.authorize_guardians(&self.guardian_set(account)?, digest, guardian_signatures)?;

        // Contract guardians may have called back into the module while verifying.
        if self.nonce(account) != nonce {
            return Err(RecoveryGuardianError::invalid_guardian_signature().into());
        }
        let executable_at = self.with_config(account, |config| {
            if config.pending.is_some() {
                return Err(RecoveryGuardianError::recovery_already_started(account).into());
            }
            let executable_at = now.saturating_add(config.timelock);
            config.pending =
                Some(PendingRecovery { execution_hash, started_at: now, executable_at });
            Ok(executable_at)
        })?;
        self.bump_nonce(account);

        self.emit_event(RecoveryGuardianEvent::recovery_started(
            account,
            execution_hash,
            executable_at,
        ))?;
        self.metrics.record_started();
        info!(%account, %execution_hash, executable_at, "recovery started");
        Ok(())
    }

    /// Dispatches a ready recovery. Callable by anyone.
    ///
    /// The pending recovery is cleared before the account is called. If the
    /// execution fails, everything the module recorded for the account since
    /// then is rolled back, including changes made by calls back into the
    /// module during the dispatch.
    pub fn execute_recovery(
        &self,
        account: Address,
        execution_calldata: &Bytes,
        dispatch: &dyn ExecutionDispatch,
    ) -> Result<Bytes> {
        let now = StorageCtx.timestamp()?;
        let provided = keccak256(execution_calldata);

        let pending = self.with_config(account, |config| {
            let Some(pending) = config.pending else {
                return Err(RecoveryGuardianError::recovery_not_started(account).into());
            };
            if config.status(now) != RecoveryStatus::Ready {
                return Err(
                    RecoveryGuardianError::recovery_not_ready(account, pending.executable_at).into()
                );
            }
            if pending.execution_hash != provided {
                return Err(RecoveryGuardianError::execution_differs_from_pending(
                    pending.execution_hash,
                    provided,
                )
                .into());
            }
            Ok(pending)
        })?;

        if !dispatch.is_module_installed(account, MODULE_TYPE_EXECUTOR, self.address) {
            return Err(ModuleError::module_not_installed(account).into());
        }

        let checkpoint = self.checkpoint(account)?;
        self.with_config(account, |config| {
            config.pending = None;
            Ok(())
        })?;

        let output = match dispatch.execute_from_executor(
            account,
            RECOVERY_EXECUTION_MODE,
            execution_calldata,
        ) {
            Ok(output) => output,
            Err(err) => {
                warn!(%account, %err, "recovery execution failed");
                self.revert_to(account, checkpoint)?;
                return Err(err);
            }
        };

        self.emit_event(RecoveryGuardianEvent::recovery_executed(account, pending.execution_hash))?;
        self.metrics.record_executed();
        info!(%account, execution_hash = %pending.execution_hash, "recovery executed");
        Ok(output)
    }

    /// Cancels the caller's pending recovery.
    pub fn cancel_recovery(&self, sender: Address) -> Result<()> {
        let account = sender;
        let pending = self.with_config(account, |config| {
            config.pending.take().ok_or(RecoveryGuardianError::recovery_not_started(account).into())
        })?;
        self.finish_cancel(account, pending)
    }

    /// Cancels the pending recovery of `account` with a threshold of guardian
    /// approvals over the current [`CancelRecovery`] digest.
    pub fn cancel_recovery_by_guardians(
        &self,
        account: Address,
        guardian_signatures: &[u8],
    ) -> Result<()> {
        let nonce = self.nonce(account);
        let digest = self.cancel_recovery_digest(account)?;
        let set = self.guardian_set(account)?;
        let Some(pending) = self.pending_recovery(account) else {
            return Err(RecoveryGuardianError::recovery_not_started(account).into());
        };
        self.authorize_guardians(&set, digest, guardian_signatures)?;

        if self.nonce(account) != nonce {
            return Err(RecoveryGuardianError::invalid_guardian_signature().into());
        }
        self.with_config(account, |config| {
            if config.pending != Some(pending) {
                return Err(RecoveryGuardianError::recovery_not_started(account).into());
            }
            config.pending = None;
            Ok(())
        })?;
        self.finish_cancel(account, pending)
    }

    fn finish_cancel(&self, account: Address, pending: PendingRecovery) -> Result<()> {
        self.bump_nonce(account);
        self.emit_event(RecoveryGuardianEvent::recovery_canceled(account, pending.execution_hash))?;
        self.metrics.record_canceled();
        info!(%account, execution_hash = %pending.execution_hash, "recovery canceled");
        Ok(())
    }

    pub fn add_guardians(&self, account: Address, guardians: &[Bytes]) -> Result<()> {
        self.with_config(account, |config| Ok(config.guardians.add_signers(guardians)?))?;
        for guardian in guardians {
            self.emit_event(RecoveryGuardianEvent::guardian_added(account, guardian.clone()))?;
        }
        Ok(())
    }

    pub fn remove_guardians(&self, account: Address, guardians: &[Bytes]) -> Result<()> {
        self.with_config(account, |config| Ok(config.guardians.remove_signers(guardians)?))?;
        for guardian in guardians {
            self.emit_event(RecoveryGuardianEvent::guardian_removed(account, guardian.clone()))?;
        }
        Ok(())
    }

    pub fn set_threshold(&self, account: Address, threshold: u64) -> Result<()> {
        self.with_config(account, |config| Ok(config.guardians.set_threshold(threshold)?))?;
        self.emit_event(RecoveryGuardianEvent::threshold_changed(account, threshold))
    }

    /// Changes the timelock of future recoveries. A pending recovery keeps the
    /// ready time it was started with.
    pub fn set_timelock(&self, account: Address, timelock: u64) -> Result<()> {
        self.ensure_timelock(timelock)?;
        self.with_config(account, |config| {
            config.timelock = timelock;
            Ok(())
        })?;
        self.emit_event(RecoveryGuardianEvent::timelock_changed(account, timelock))
    }

    fn ensure_timelock(&self, timelock: u64) -> Result<()> {
        if timelock < self.config.min_timelock {
            return Err(
                RecoveryGuardianError::invalid_timelock(timelock, self.config.min_timelock).into()
            );
        }
        Ok(())
    }

    pub fn recovery_status(&self, account: Address) -> Result<RecoveryStatus> {
        let now = StorageCtx.timestamp()?;
        Ok(self
            .accounts
            .borrow()
            .get(&account)
            .map_or(RecoveryStatus::NotStarted, |config| config.status(now)))
    }

    /// Nonce the next guardian digest of `account` binds.
    pub fn nonce(&self, account: Address) -> U256 {
        self.nonces.borrow().get(&account).copied().unwrap_or_default()
    }

    pub fn pending_recovery(&self, account: Address) -> Option<PendingRecovery> {
        self.accounts.borrow().get(&account).and_then(|config| config.pending)
    }

    pub fn guardians(&self, account: Address) -> Vec<Bytes> {
        self.accounts
            .borrow()
            .get(&account)
            .map(|config| config.guardians.signers().cloned().collect())
            .unwrap_or_default()
    }

    pub fn threshold(&self, account: Address) -> u64 {
        self.accounts.borrow().get(&account).map_or(0, |config| config.guardians.threshold())
    }

    pub fn timelock(&self, account: Address) -> u64 {
        self.accounts.borrow().get(&account).map_or(0, |config| config.timelock)
    }
}

impl Erc7579Module for RecoveryGuardian {
    fn address(&self) -> Address {
        self.address
    }

    fn module_type(&self) -> U256 {
        MODULE_TYPE_EXECUTOR
    }

    /// `(bytes[] guardians, uint64 threshold, uint64 timelock)`
    fn on_install(&self, account: Address, init_data: &[u8]) -> Result<()> {
        if self.is_initialized(account) {
            return Err(ModuleError::module_already_installed(account).into());
        }
        let (guardians, threshold, timelock) =
            <(Vec<Bytes>, u64, u64)>::abi_decode_params(init_data)
                .map_err(|_| ModuleError::invalid_install_data())?;
        self.ensure_timelock(timelock)?;
        let set = ThresholdSignerSet::new(&guardians, threshold)?;

        self.accounts
            .borrow_mut()
            .insert(account, RecoveryConfig { guardians: set, timelock, pending: None });

        for guardian in guardians {
            self.emit_event(RecoveryGuardianEvent::guardian_added(account, guardian))?;
        }
        self.emit_event(RecoveryGuardianEvent::threshold_changed(account, threshold))?;
        self.emit_event(RecoveryGuardianEvent::timelock_changed(account, timelock))?;
        info!(%account, threshold, timelock, "recovery guardian installed");
        Ok(())
    }

    fn on_uninstall(&self, account: Address, _deinit_data: &[u8]) -> Result<()> {
        if self.accounts.borrow_mut().remove(&account).is_none() {
            return Err(ModuleError::module_not_installed(account).into());
        }
        info!(%account, "recovery guardian uninstalled");
        Ok(())
    }

    fn is_initialized(&self, account: Address) -> bool {
        self.accounts.borrow().contains_key(&account)
    }
}
