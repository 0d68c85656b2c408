//! JSON-valued table helpers on top of [`SafeDatabase`].

use serde::de::DeserializeOwned;
use serde::Serialize;
use thiserror::Error;

use crate::basic_db::SafeDatabase;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Storage(#[from] libmdbx::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid UTF-8 in {table}: {source}")]
    Utf8 {
        table: String,
        #[source]
        source: std::string::FromUtf8Error,
    },
}

fn decode<T: DeserializeOwned>(table: &str, bytes: Vec<u8>) -> Result<T, DbError> {
    let text = String::from_utf8(bytes).map_err(|source| DbError::Utf8 {
        table: table.to_string(),
        source,
    })?;
    Ok(serde_json::from_str(&text)?)
}

pub fn get_json<D, T>(database: &D, table: &str, key: &str) -> Result<Option<T>, DbError>
where
    D: SafeDatabase,
    T: DeserializeOwned,
{
    match database.read(key, table)? {
        Some(bytes) => Ok(Some(decode(table, bytes)?)),
        None => Ok(None),
    }
}

pub fn put_json<D, T>(database: &D, table: &str, key: &str, value: &T) -> Result<(), DbError>
where
    D: SafeDatabase,
    T: Serialize,
{
    let json = serde_json::to_string(value)?;
    database.write(key, &json, table)?;
    Ok(())
}

/// Values under `prefix`, in key order. An empty prefix scans the whole table.
pub fn scan_json<D, T>(database: &D, table: &str, prefix: &str) -> Result<Vec<T>, DbError>
where
    D: SafeDatabase,
    T: DeserializeOwned,
{
    database
        .read_prefix(prefix, table)?
        .into_iter()
        .map(|(_, value)| decode(table, value))
        .collect()
}

pub fn remove<D: SafeDatabase>(database: &D, table: &str, key: &str) -> Result<bool, DbError> {
    Ok(database.delete(key, table)?)
}
