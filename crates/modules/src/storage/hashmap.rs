use std::collections::HashMap;

use alloy_primitives::{Address, LogData};

use crate::{error::Result, storage::PrecompileStorageProvider};

/// In-memory host used by tests and off-chain simulation.
#[derive(Debug, Default)]
pub struct HashMapStorageProvider {
    chain_id: u64,
    timestamp: u64,
    events: HashMap<Address, Vec<LogData>>,
    no_events: Vec<LogData>,
}

impl HashMapStorageProvider {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id, ..Default::default() }
    }

    pub fn with_timestamp(mut self, timestamp: u64) -> Self {
        self.timestamp = timestamp;
        self
    }
}

impl PrecompileStorageProvider for HashMapStorageProvider {
    fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn timestamp(&self) -> u64 {
        self.timestamp
    }

    fn emit_event(&mut self, address: Address, event: LogData) -> Result<()> {
        self.events.entry(address).or_default().push(event);
        Ok(())
    }

    fn event_count(&self, address: Address) -> usize {
        self.events.get(&address).map_or(0, Vec::len)
    }

    fn truncate_events(&mut self, address: Address, len: usize) {
        if let Some(events) = self.events.get_mut(&address) {
            events.truncate(len);
        }
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn get_events(&self, address: Address) -> &Vec<LogData> {
        self.events.get(&address).unwrap_or(&self.no_events)
    }

    #[cfg(any(test, feature = "test-utils"))]
    fn set_timestamp(&mut self, timestamp: u64) {
        self.timestamp = timestamp;
    }
}
