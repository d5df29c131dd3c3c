use alloy_primitives::{Address, LogData};
use std::{cell::Cell, marker::PhantomData};

use crate::{
    error::{Result, TempoPrecompileError},
    storage::PrecompileStorageProvider,
};

// Thread-local storage for accessing `PrecompileStorageProvider`
thread_local! {
    static STORAGE: Cell<Option<*mut dyn PrecompileStorageProvider>> = const { Cell::new(None) };
}

/// Thread-local storage guard for account modules.
///
/// This guard sets up thread-local access to a storage provider for the duration
/// of its lifetime. When dropped, it cleans up the thread-local storage.
///
/// # IMPORTANT
///
/// The caller must ensure that:
/// 1. Only one `StorageGuard` exists at a time, in the same thread.
/// 2. If multiple storage providers are instantiated in parallel threads,
///    they CANNOT point to the same host state.
#[derive(Default)]
pub struct StorageGuard<'s> {
    _storage: PhantomData<&'s mut dyn PrecompileStorageProvider>,
}

impl<'s> StorageGuard<'s> {
    /// Creates a new storage guard, initializing thread-local storage.
    /// See type-level documentation for important notes.
    pub fn new(storage: &'s mut dyn PrecompileStorageProvider) -> Result<Self> {
        if STORAGE.with(|s| s.get()).is_some() {
            return Err(TempoPrecompileError::Fatal(
                "'StorageGuard' already initialized".to_string(),
            ));
        }

        // SAFETY: Transmuting lifetime to 'static for `Cell` storage.
        //
        // This is safe because:
        // 1. Type system ensures this guard can't outlive 's
        // 2. The Drop impl clears the thread-local before the guard is destroyed
        // 3. Only one guard can exist per thread (checked above)
        let ptr: *mut dyn PrecompileStorageProvider = storage;
        let ptr_static: *mut (dyn PrecompileStorageProvider + 'static) =
            unsafe { std::mem::transmute(ptr) };

        STORAGE.with(|s| s.set(Some(ptr_static)));

        Ok(Self::default())
    }
}

impl Drop for StorageGuard<'_> {
    fn drop(&mut self) {
        STORAGE.with(|s| s.set(None));
    }
}

/// Thread-local accessor to the active host.
///
/// # Important
///
/// Since it provides access to the current thread-local storage context, it MUST be used with
/// an active `StorageGuard`, usually installed through [`StorageCtx::enter`].
///
/// Every access borrows the provider only for the duration of a single call, so module code
/// may dispatch into an account (which may re-enter the module) between two accesses.
#[derive(Debug, Default, Clone, Copy)]
pub struct StorageCtx;

impl StorageCtx {
    /// Runs `f` with `storage` installed as the thread's host.
    ///
    /// # Panics
    ///
    /// Panics if a host is already installed on this thread.
    pub fn enter<S, R>(storage: &mut S, f: impl FnOnce() -> R) -> R
    where
        S: PrecompileStorageProvider,
    {
        let _guard = match StorageGuard::new(storage) {
            Ok(guard) => guard,
            Err(err) => panic!("{err}"),
        };
        f()
    }

    /// Returns true if a host is installed on this thread.
    pub fn is_active() -> bool {
        STORAGE.with(|s| s.get()).is_some()
    }

    /// Execute a function with access to the current thread-local storage provider.
    fn with_storage_call<F, R>(f: F) -> Result<R>
    where
        F: FnOnce(&mut dyn PrecompileStorageProvider) -> Result<R>,
    {
        let storage_ptr = STORAGE
            .with(|s| s.get())
            .ok_or(TempoPrecompileError::Fatal(
                "No storage context. 'StorageGuard' must be initialized".to_string(),
            ))?;

        // SAFETY:
        // - Caller must ensure NO recursive calls.
        // - Type system ensures the storage pointer is valid.
        let storage = unsafe { &mut *storage_ptr };
        f(storage)
    }

    pub fn chain_id(&self) -> Result<u64> {
        Self::with_storage_call(|s| Ok(s.chain_id()))
    }

    pub fn timestamp(&self) -> Result<u64> {
        Self::with_storage_call(|s| Ok(s.timestamp()))
    }

    pub fn emit_event(&mut self, address: Address, event: LogData) -> Result<()> {
        Self::with_storage_call(|s| s.emit_event(address, event))
    }

    /// Position in the event log of `address` that [`Self::revert_events`]
    /// can roll back to.
    pub fn event_checkpoint(&self, address: Address) -> Result<usize> {
        Self::with_storage_call(|s| Ok(s.event_count(address)))
    }

    pub fn revert_events(&mut self, address: Address, checkpoint: usize) -> Result<()> {
        Self::with_storage_call(|s| {
            s.truncate_events(address, checkpoint);
            Ok(())
        })
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn get_events(&self, address: Address) -> Vec<LogData> {
        Self::with_storage_call(|s| Ok(s.get_events(address).clone())).unwrap_or_default()
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn set_timestamp(&mut self, timestamp: u64) {
        // NOTE: without a guard there is no clock to move, tests fail on the next read.
        let _ = Self::with_storage_call(|s| {
            s.set_timestamp(timestamp);
            Ok(())
        });
    }

    #[cfg(any(test, feature = "test-utils"))]
    pub fn advance_time(&mut self, seconds: u64) {
        let now = self.timestamp().unwrap_or_default();
        self.set_timestamp(now + seconds);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::hashmap::HashMapStorageProvider;

    #[test]
    fn test_accessor_without_guard_is_fatal() {
        assert!(matches!(StorageCtx.timestamp(), Err(TempoPrecompileError::Fatal(_))));
    }

    #[test]
    fn test_guard_is_cleared_on_exit() {
        let mut storage = HashMapStorageProvider::new(1).with_timestamp(42);
        StorageCtx::enter(&mut storage, || {
            assert!(StorageCtx::is_active());
            assert_eq!(StorageCtx.timestamp(), Ok(42));
            assert_eq!(StorageCtx.chain_id(), Ok(1));
        });
        assert!(!StorageCtx::is_active());
    }

    #[test]
    fn test_nested_guard_is_rejected() {
        let mut outer = HashMapStorageProvider::new(1);
        let mut inner = HashMapStorageProvider::new(2);
        StorageCtx::enter(&mut outer, || {
            assert!(StorageGuard::new(&mut inner).is_err());
        });
    }

    #[test]
    fn test_events_are_recorded_per_address() {
        let mut storage = HashMapStorageProvider::new(1);
        let module = Address::repeat_byte(0x11);
        StorageCtx::enter(&mut storage, || {
            StorageCtx
                .emit_event(module, LogData::new_unchecked(vec![], Default::default()))
                .unwrap();
            assert_eq!(StorageCtx.get_events(module).len(), 1);
            assert!(StorageCtx.get_events(Address::ZERO).is_empty());

            let checkpoint = StorageCtx.event_checkpoint(module).unwrap();
            StorageCtx
                .emit_event(module, LogData::new_unchecked(vec![], Default::default()))
                .unwrap();
            StorageCtx.revert_events(module, checkpoint).unwrap();
            assert_eq!(StorageCtx.get_events(module).len(), 1);
        });
    }
}
