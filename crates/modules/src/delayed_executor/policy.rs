use std::{
    cell::RefCell,
    collections::{HashMap, HashSet},
    rc::Rc,
};

use alloy_primitives::{Address, B256, Bytes, FixedBytes, keccak256};
use alloy_sol_types::SolValue;
use tempo_account_contracts::precompiles::DelayedExecutorError;
use tracing::debug;

use crate::{
    error::Result,
    module::ensure_account,
    multisig_signer::{MultiSigSigner, Weighting},
};

/// An operation an account may schedule: execute `execution_calldata` in
/// `mode` on `account`, disambiguated by `salt`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OperationRequest {
    pub account: Address,
    pub mode: B256,
    pub execution_calldata: Bytes,
    pub salt: B256,
}

impl OperationRequest {
    pub fn new(
        account: Address,
        mode: B256,
        execution_calldata: impl Into<Bytes>,
        salt: B256,
    ) -> Self {
        Self { account, mode, execution_calldata: execution_calldata.into(), salt }
    }

    /// `keccak256(abi.encode(account, mode, executionCalldata, salt))`
    pub fn operation_id(&self) -> B256 {
        let Self { account, mode, execution_calldata, salt } = self;
        keccak256((*account, *mode, execution_calldata.clone(), *salt).abi_encode_params())
    }

    /// Leading four bytes of the payload, zero padded.
    pub fn selector(&self) -> FixedBytes<4> {
        let mut selector = FixedBytes::<4>::ZERO;
        let len = self.execution_calldata.len().min(4);
        selector[..len].copy_from_slice(&self.execution_calldata[..len]);
        selector
    }
}

/// Who may schedule, execute and cancel operations of an account.
///
/// Timing and existence checks are done by the executor; policies only
/// authorize.
pub trait SchedulePolicy {
    /// Policy state of one account, captured before a dispatch.
    type Snapshot;

    /// `auth` is opaque authorization evidence passed along by the caller.
    fn authorize_schedule(
        &self,
        caller: Address,
        request: &OperationRequest,
        operation_id: B256,
        auth: &[u8],
    ) -> Result<()>;

    /// Execution is open to anyone by default.
    fn authorize_execute(&self, _caller: Address, _request: &OperationRequest) -> Result<()> {
        Ok(())
    }

    /// Only the account may cancel by default.
    fn authorize_cancel(&self, caller: Address, request: &OperationRequest) -> Result<()> {
        ensure_account(request.account, caller)
    }

    /// Drops policy state of `account`.
    fn on_uninstall(&self, _account: Address) {}

    fn snapshot(&self, account: Address) -> Self::Snapshot;

    /// Puts back the state of `account` captured by [`Self::snapshot`].
    fn restore(&self, account: Address, snapshot: Self::Snapshot);
}

/// Only the account schedules and cancels its own operations.
#[derive(Debug, Clone, Copy, Default)]
pub struct AccountOnly;

impl SchedulePolicy for AccountOnly {
    type Snapshot = ();

    fn authorize_schedule(
        &self,
        caller: Address,
        request: &OperationRequest,
        _operation_id: B256,
        _auth: &[u8],
    ) -> Result<()> {
        ensure_account(request.account, caller)
    }

    fn snapshot(&self, _account: Address) {}

    fn restore(&self, _account: Address, _snapshot: ()) {}
}

/// Account-only scheduling, limited to payloads starting with a selector the
/// account authorized. Checked at schedule and at execution time.
#[derive(Debug, Default)]
pub struct SelectorRestricted {
    selectors: RefCell<HashMap<Address, HashSet<FixedBytes<4>>>>,
}

impl SelectorRestricted {
    pub fn is_authorized(&self, account: Address, selector: FixedBytes<4>) -> bool {
        self.selectors.borrow().get(&account).is_some_and(|set| set.contains(&selector))
    }

    pub fn selectors(&self, account: Address) -> Vec<FixedBytes<4>> {
        let mut selectors: Vec<_> =
            self.selectors.borrow().get(&account).into_iter().flatten().copied().collect();
        selectors.sort();
        selectors
    }

    /// Returns the selectors that were not authorized before.
    pub(crate) fn insert(
        &self,
        account: Address,
        selectors: &[FixedBytes<4>],
    ) -> Vec<FixedBytes<4>> {
        let mut map = self.selectors.borrow_mut();
        let set = map.entry(account).or_default();
        selectors.iter().copied().filter(|selector| set.insert(*selector)).collect()
    }

    /// Returns the selectors that were authorized before.
    pub(crate) fn remove(
        &self,
        account: Address,
        selectors: &[FixedBytes<4>],
    ) -> Vec<FixedBytes<4>> {
        let mut map = self.selectors.borrow_mut();
        let Some(set) = map.get_mut(&account) else { return Vec::new() };
        selectors.iter().copied().filter(|selector| set.remove(selector)).collect()
    }

    fn ensure_selector(&self, request: &OperationRequest) -> Result<()> {
        let selector = request.selector();
        if !self.is_authorized(request.account, selector) {
            debug!(account = %request.account, %selector, "selector not authorized");
            return Err(
                DelayedExecutorError::unauthorized_selector(request.account, selector).into()
            );
        }
        Ok(())
    }
}

impl SchedulePolicy for SelectorRestricted {
    type Snapshot = Option<HashSet<FixedBytes<4>>>;

    fn authorize_schedule(
        &self,
        caller: Address,
        request: &OperationRequest,
        _operation_id: B256,
        _auth: &[u8],
    ) -> Result<()> {
        ensure_account(request.account, caller)?;
        self.ensure_selector(request)
    }

    fn authorize_execute(&self, _caller: Address, request: &OperationRequest) -> Result<()> {
        self.ensure_selector(request)
    }

    fn on_uninstall(&self, account: Address) {
        self.selectors.borrow_mut().remove(&account);
    }

    fn snapshot(&self, account: Address) -> Self::Snapshot {
        self.selectors.borrow().get(&account).cloned()
    }

    fn restore(&self, account: Address, snapshot: Self::Snapshot) {
        let mut selectors = self.selectors.borrow_mut();
        match snapshot {
            Some(set) => selectors.insert(account, set),
            None => selectors.remove(&account),
        };
    }
}

/// Anyone may schedule with a multisig signature of the account's signer set
/// over the operation id. `auth` is the ABI encoded
/// `(bytes[] signers, bytes[] signatures)` pair.
#[derive(Debug)]
pub struct MultisigGated<W> {
    signers: Rc<MultiSigSigner<W>>,
}

impl<W: Weighting> MultisigGated<W> {
    pub fn new(signers: Rc<MultiSigSigner<W>>) -> Self {
        Self { signers }
    }

    pub fn signers(&self) -> &MultiSigSigner<W> {
        &self.signers
    }
}

/// Signer sets live in the multisig module, which is not rolled back here.
impl<W: Weighting> SchedulePolicy for MultisigGated<W> {
    type Snapshot = ();

    fn authorize_schedule(
        &self,
        _caller: Address,
        request: &OperationRequest,
        operation_id: B256,
        auth: &[u8],
    ) -> Result<()> {
        if !self.signers.is_valid_signature(request.account, operation_id, auth) {
            return Err(DelayedExecutorError::invalid_multisig_authorization(operation_id).into());
        }
        Ok(())
    }

    fn snapshot(&self, _account: Address) {}

    fn restore(&self, _account: Address, _snapshot: ()) {}
}
