use alloy_primitives::{Address, U256};
use tempo_account_contracts::precompiles::ModuleError;

use crate::error::Result;

/// Lifecycle shared by every ERC-7579 account module.
///
/// Per-account state exists only between `on_install` and `on_uninstall`,
/// both of which are invoked by the account itself.
pub trait Erc7579Module {
    /// Address the module is deployed at. Bound into EIP-712 domains.
    fn address(&self) -> Address;

    /// ERC-7579 module type id.
    fn module_type(&self) -> U256;

    fn is_module_type(&self, module_type_id: U256) -> bool {
        self.module_type() == module_type_id
    }

    /// Installs the module for `account` from an ABI encoded payload.
    ///
    /// Fails with `ModuleAlreadyInstalled` on a second install, and leaves no
    /// state behind if the payload is rejected.
    fn on_install(&self, account: Address, init_data: &[u8]) -> Result<()>;

    /// Drops the module's state for `account`.
    fn on_uninstall(&self, account: Address, deinit_data: &[u8]) -> Result<()>;

    fn is_initialized(&self, account: Address) -> bool;
}

/// Rejects calls whose sender is not the account being configured.
pub(crate) fn ensure_account(account: Address, caller: Address) -> Result<()> {
    if account != caller {
        return Err(ModuleError::unauthorized_caller(caller).into());
    }
    Ok(())
}
