use serde::Serialize;
use serde::de::DeserializeOwned;
use sled::{Db, Tree};

use crate::utils::StoreError;

pub const BOTS_TABLE: &str = "bots";
pub const REQUESTS_TABLE: &str = "sensorsRequest";
pub const RESILIENCE_TABLE: &str = "resilience";

/// A value stored in one of the named tables.
pub trait Record: Serialize + DeserializeOwned {
    const TABLE: &'static str;

    type Key: Serialize;

    fn key(&self) -> Self::Key;
}

/// Handle to the sled database. Clones share the same database.
#[derive(Clone)]
pub struct Persistence {
    db: Db,
}

impl Persistence {
    /// Open or create a sled database at `path`.
    pub fn open(path: &str) -> Result<Self, StoreError> {
        let db = sled::open(path).map_err(|source| StoreError::Open {
            path: path.to_string(),
            source,
        })?;
        Ok(Self { db })
    }

    /// Insert or replace `record`. The tree is flushed before returning so a
    /// successful put survives a crash.
    pub fn put<R: Record>(&self, record: &R) -> Result<(), StoreError> {
        let tree = self.tree(R::TABLE)?;
        let key = encode_key::<R>(&record.key())?;
        let value = serde_json::to_vec(record).map_err(|source| StoreError::Encode {
            table: R::TABLE,
            source,
        })?;

        tree.insert(key, value).map_err(|source| StoreError::Sled {
            table: R::TABLE,
            source,
        })?;
        tree.flush().map_err(|source| StoreError::Sled {
            table: R::TABLE,
            source,
        })?;
        Ok(())
    }

    /// Remove the record stored under `key`. Removing a missing key is a no-op.
    pub fn delete<R: Record>(&self, key: &R::Key) -> Result<(), StoreError> {
        let tree = self.tree(R::TABLE)?;
        let key = encode_key::<R>(key)?;
        tree.remove(key).map_err(|source| StoreError::Sled {
            table: R::TABLE,
            source,
        })?;
        Ok(())
    }

    /// Look up the record stored under `key`.
    pub fn get<R: Record>(&self, key: &R::Key) -> Result<Option<R>, StoreError> {
        let tree = self.tree(R::TABLE)?;
        let key = encode_key::<R>(key)?;
        let value = tree.get(key).map_err(|source| StoreError::Sled {
            table: R::TABLE,
            source,
        })?;

        value.map(|bytes| decode::<R>(&bytes)).transpose()
    }

    /// Load every record of the table. Any unreadable record fails the scan.
    pub fn scan<R: Record>(&self) -> Result<Vec<R>, StoreError> {
        let tree = self.tree(R::TABLE)?;
        tree.iter()
            .map(|entry| {
                let (_, value) = entry.map_err(|source| StoreError::Sled {
                    table: R::TABLE,
                    source,
                })?;
                decode::<R>(&value)
            })
            .collect()
    }

    #[cfg(test)]
    pub fn len<R: Record>(&self) -> Result<usize, StoreError> {
        Ok(self.tree(R::TABLE)?.len())
    }

    fn tree(&self, table: &'static str) -> Result<Tree, StoreError> {
        self.db
            .open_tree(table)
            .map_err(|source| StoreError::Sled { table, source })
    }
}

fn encode_key<R: Record>(key: &R::Key) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec(key).map_err(|source| StoreError::Encode {
        table: R::TABLE,
        source,
    })
}

fn decode<R: Record>(bytes: &[u8]) -> Result<R, StoreError> {
    serde_json::from_slice(bytes).map_err(|source| StoreError::Decode {
        table: R::TABLE,
        source,
    })
}

impl std::fmt::Debug for Persistence {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Persistence")
            .field("db", &"sled::Db")
            .finish()
    }
}
