use serde::{de::DeserializeOwned, Serialize};
use std::path::Path;

use crate::error::StorageError;

/// Embedded keyed document store. Every collection is a sled tree holding
/// bincode-encoded values.
pub struct Storage {
    db: sled::Db,
}

impl Storage {
    pub fn open(path: &str) -> Result<Self, StorageError> {
        let db = sled::open(Path::new(path))?;
        Ok(Storage { db })
    }

    /// Throwaway database, removed when dropped.
    pub fn temporary() -> Result<Self, StorageError> {
        let db = sled::Config::new().temporary(true).open()?;
        Ok(Storage { db })
    }

    pub fn tree(&self, name: &str) -> Result<sled::Tree, StorageError> {
        Ok(self.db.open_tree(name)?)
    }

    pub async fn flush(&self) -> Result<(), StorageError> {
        self.db.flush_async().await?;
        Ok(())
    }
}

// Generic Helper: Get
pub fn get<T: DeserializeOwned>(tree: &sled::Tree, key: &str) -> Result<Option<T>, StorageError> {
    match tree.get(key.as_bytes())? {
        Some(data) => Ok(Some(decode(&data)?)),
        None => Ok(None),
    }
}

/// Decode every value of a tree, keeping those the filter accepts.
pub fn scan<T, F>(tree: &sled::Tree, filter: F) -> Result<Vec<T>, StorageError>
where
    T: DeserializeOwned,
    F: Fn(&T) -> bool,
{
    let mut out = Vec::new();
    for entry in tree.iter() {
        let (_, data) = entry?;
        let value: T = decode(&data)?;
        if filter(&value) {
            out.push(value);
        }
    }
    Ok(out)
}

pub fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, StorageError> {
    bincode::serialize(value).map_err(|e| StorageError::Serialization(e.to_string()))
}

pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T, StorageError> {
    bincode::deserialize(data).map_err(|e| StorageError::Deserialization(e.to_string()))
}
