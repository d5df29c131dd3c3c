use alloy_primitives::{Address, B256, Bytes, U256};
use auto_impl::auto_impl;

use crate::error::Result;

/// Execution capability of an ERC-7579 account, as seen by its modules.
///
/// Modules never execute anything themselves. Once an operation is
/// authorized they hand it to the account through this trait. An
/// implementation may call back into the module that dispatched it.
#[auto_impl(&, Rc, Arc, Box)]
pub trait ExecutionDispatch {
    /// Executes `payload` in `mode` on `account` on behalf of an installed
    /// executor module.
    ///
    /// A failed execution is returned as
    /// [`TempoPrecompileError::ExecutionReverted`](crate::TempoPrecompileError::ExecutionReverted).
    fn execute_from_executor(&self, account: Address, mode: B256, payload: &Bytes)
    -> Result<Bytes>;

    /// Returns true if `module` is installed on `account` as `module_type_id`.
    fn is_module_installed(&self, account: Address, module_type_id: U256, module: Address) -> bool;
}
