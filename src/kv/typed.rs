//! JSON marshalling helpers on top of [`KvBucket`].

use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::KvBucket;
use crate::StoreError;

/// Decoded value paired with the revision it was read at
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: u64,
}

pub fn encode<T>(
    key: &str,
    value: &T,
) -> Result<Bytes, StoreError>
where
    T: Serialize + ?Sized,
{
    serde_json::to_vec(value).map(Bytes::from).map_err(|e| StoreError::codec(key, e))
}

pub fn decode<T>(
    key: &str,
    raw: &[u8],
) -> Result<T, StoreError>
where
    T: DeserializeOwned,
{
    serde_json::from_slice(raw).map_err(|e| StoreError::codec(key, e))
}

/// Reads and decodes `key`.
///
/// # Returns
/// - `Ok(Some(_))` if the key exists and decodes as `T`
/// - `Ok(None)` if the key has never been written
/// - `Err` on store failures or undecodable payloads
pub async fn get_versioned<T>(
    bucket: &dyn KvBucket,
    key: &str,
) -> Result<Option<Versioned<T>>, StoreError>
where
    T: DeserializeOwned,
{
    match bucket.get(key).await? {
        Some(entry) => {
            let value = decode(key, &entry.value)?;
            Ok(Some(Versioned {
                value,
                revision: entry.revision,
            }))
        }
        None => Ok(None),
    }
}

pub async fn get_typed<T>(
    bucket: &dyn KvBucket,
    key: &str,
) -> Result<Option<T>, StoreError>
where
    T: DeserializeOwned,
{
    Ok(get_versioned(bucket, key).await?.map(|v| v.value))
}

/// Encodes `value` and writes it under `key`, returning the write revision
pub async fn set_typed<T>(
    bucket: &dyn KvBucket,
    key: &str,
    value: &T,
) -> Result<u64, StoreError>
where
    T: Serialize + Sync + ?Sized,
{
    let raw = encode(key, value)?;
    bucket.set(key, raw).await
}
