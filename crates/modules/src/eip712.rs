//! EIP-712 domains of the account modules.

use std::borrow::Cow;

use alloy_primitives::{Address, B256, U256};
use alloy_sol_types::{Eip712Domain, SolStruct};

use crate::{error::Result, storage::StorageCtx};

/// Version of every module domain.
pub const DOMAIN_VERSION: &str = "1";

/// Builds the domain of module `name` deployed at `verifying_contract`,
/// bound to the host's chain id.
pub fn domain(name: &'static str, verifying_contract: Address) -> Result<Eip712Domain> {
    let chain_id = StorageCtx.chain_id()?;
    Ok(Eip712Domain::new(
        Some(Cow::Borrowed(name)),
        Some(Cow::Borrowed(DOMAIN_VERSION)),
        Some(U256::from(chain_id)),
        Some(verifying_contract),
        None,
    ))
}

/// Digest a signer signs to approve `payload` for module `name`.
pub fn signing_hash<T: SolStruct>(
    name: &'static str,
    verifying_contract: Address,
    payload: &T,
) -> Result<B256> {
    Ok(payload.eip712_signing_hash(&domain(name, verifying_contract)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hashmap::HashMapStorageProvider;
    use tempo_account_contracts::precompiles::CancelRecovery;

    #[test]
    fn test_digest_binds_chain_and_contract() -> eyre::Result<()> {
        let payload = CancelRecovery { account: Address::repeat_byte(0xaa), nonce: U256::ZERO };
        let module = Address::repeat_byte(0x01);

        let mut storage = HashMapStorageProvider::new(1);
        let on_chain_1 = StorageCtx::enter(&mut storage, || signing_hash("M", module, &payload))?;
        let other_module = StorageCtx::enter(&mut storage, || {
            signing_hash("M", Address::repeat_byte(0x02), &payload)
        })?;

        let mut storage = HashMapStorageProvider::new(2);
        let on_chain_2 = StorageCtx::enter(&mut storage, || signing_hash("M", module, &payload))?;

        assert_ne!(on_chain_1, on_chain_2);
        assert_ne!(on_chain_1, other_module);
        Ok(())
    }
}
