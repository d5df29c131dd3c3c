//! Tempo account module bindings.
//!
//! Solidity-style interfaces, errors, events and EIP-712 structs shared by the
//! account modules in `tempo-account-modules`.
#![cfg_attr(not(test), warn(unused_crate_dependencies))]
#![cfg_attr(docsrs, feature(doc_cfg))]

pub(crate) use alloy_sol_types::sol;

pub mod precompiles;
