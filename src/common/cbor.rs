//! CBOR serialization and deserialization helpers.
use serde::{de::DeserializeOwned, Serialize};

/// CBOR decoding error.
pub use serde_cbor::Error;

/// Serialize a value into a CBOR byte vector.
pub fn to_vec<T>(value: &T) -> Vec<u8>
where
    T: Serialize,
{
    serde_cbor::to_vec(value).unwrap()
}

/// Deserialize a value from a CBOR byte slice.
pub fn from_slice<T>(data: &[u8]) -> Result<T, Error>
where
    T: DeserializeOwned,
{
    serde_cbor::from_slice(data)
}
