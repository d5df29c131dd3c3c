use alloy_primitives::U256;

pub use IERC7579Module::IERC7579ModuleErrors as ModuleError;

crate::sol! {
    /// Base ERC-7579 module interface
    ///
    /// Every account module is installed and uninstalled by the account
    /// itself. Per-account state exists only between the two calls.
    #[derive(Debug, PartialEq, Eq)]
    interface IERC7579Module {
        /// @param data Module specific installation payload
        function onInstall(bytes calldata data) external;

        /// @param data Module specific removal payload
        function onUninstall(bytes calldata data) external;

        /// @param moduleTypeId ERC-7579 module type id
        /// @return True if the module is of the given type
        function isModuleType(uint256 moduleTypeId) external view returns (bool);

        // Errors
        error ModuleAlreadyInstalled(address account);
        error ModuleNotInstalled(address account);
        error InvalidInstallData();
        error UnauthorizedCaller(address caller);
    }
}

/// ERC-7579 module type id of validators.
pub const MODULE_TYPE_VALIDATOR: U256 = U256::from_limbs([1, 0, 0, 0]);

/// ERC-7579 module type id of executors.
pub const MODULE_TYPE_EXECUTOR: U256 = U256::from_limbs([2, 0, 0, 0]);

impl ModuleError {
    pub const fn module_already_installed(account: alloy_primitives::Address) -> Self {
        Self::ModuleAlreadyInstalled(IERC7579Module::ModuleAlreadyInstalled { account })
    }

    pub const fn module_not_installed(account: alloy_primitives::Address) -> Self {
        Self::ModuleNotInstalled(IERC7579Module::ModuleNotInstalled { account })
    }

    pub const fn invalid_install_data() -> Self {
        Self::InvalidInstallData(IERC7579Module::InvalidInstallData {})
    }

    pub const fn unauthorized_caller(caller: alloy_primitives::Address) -> Self {
        Self::UnauthorizedCaller(IERC7579Module::UnauthorizedCaller { caller })
    }
}
