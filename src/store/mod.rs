//! Persistence is a plain key-value store owned by the caller. The tracker only decides what is
//! written under which key:
//!  - [schema] maps the live state and the week archive onto stable keys.
//!  - [json_store::JsonFileStore] keeps every key in a single JSON document on disk.
//!  - [archive::ArchiveReader] is the read-only view over completed weeks.

pub mod archive;
pub mod json_store;
pub mod schema;

use std::{collections::HashMap, ops::DerefMut};

use anyhow::Result;

/// Synchronous key-value persistence. `set` may buffer, `flush` makes every buffered value
/// durable at once.
#[cfg_attr(test, mockall::automock)]
pub trait StateStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

impl<T: DerefMut> StateStore for T
where
    T::Target: StateStore,
{
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        StateStore::get(&**self, key)
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        StateStore::set(&mut **self, key, value)
    }

    fn flush(&mut self) -> Result<()> {
        StateStore::flush(&mut **self)
    }
}

/// Store living only as long as the process. Used by tests and by embedders that persist on
/// their own terms.
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    values: HashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl StateStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.values.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: Vec<u8>) -> Result<()> {
        self.values.insert(key.to_string(), value);
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        Ok(())
    }
}
