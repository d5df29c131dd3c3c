pub mod hashmap;
pub mod thread_local;

pub use thread_local::{StorageCtx, StorageGuard};

use alloy_primitives::{Address, LogData};

use crate::error::Result;

/// Host ledger services the account modules rely on.
///
/// The host serializes calls, provides the block clock and collects emitted
/// events. Module state itself lives in the modules, keyed by account.
pub trait PrecompileStorageProvider {
    fn chain_id(&self) -> u64;
    fn timestamp(&self) -> u64;
    fn emit_event(&mut self, address: Address, event: LogData) -> Result<()>;

    /// Number of events emitted by `address` so far.
    fn event_count(&self, address: Address) -> usize;

    /// Drops the events of `address` past the first `len`.
    fn truncate_events(&mut self, address: Address, len: usize);

    #[cfg(any(test, feature = "test-utils"))]
    fn get_events(&self, address: Address) -> &Vec<LogData>;

    #[cfg(any(test, feature = "test-utils"))]
    fn set_timestamp(&mut self, timestamp: u64);
}
