//! # Codecs
//!
//! Serializer and deserializer traits, closure adapters, and ready-made
//! codecs for serde types.

use crate::message::{Message, TypedMessage};
use anyhow::anyhow;
use bytes::Bytes;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Turns messages of one type into payload bytes.
pub trait Serializer: Send + Sync {
    /// Encode `message`.
    fn serialize(&self, message: &dyn Message) -> anyhow::Result<Bytes>;
}

/// Turns payload bytes back into messages of one type.
pub trait Deserializer: Send + Sync {
    /// Decode `payload`.
    fn deserialize(&self, payload: &[u8]) -> anyhow::Result<Arc<dyn Message>>;
}

impl<F> Serializer for F
where
    F: Fn(&dyn Message) -> anyhow::Result<Bytes> + Send + Sync,
{
    fn serialize(&self, message: &dyn Message) -> anyhow::Result<Bytes> {
        self(message)
    }
}

impl<F> Deserializer for F
where
    F: Fn(&[u8]) -> anyhow::Result<Arc<dyn Message>> + Send + Sync,
{
    fn deserialize(&self, payload: &[u8]) -> anyhow::Result<Arc<dyn Message>> {
        self(payload)
    }
}

fn expect_type<T: Message>(message: &dyn Message) -> anyhow::Result<&T> {
    message.downcast_ref::<T>().ok_or_else(|| {
        anyhow!(
            "expected {} but got message type {}",
            type_name::<T>(),
            message.message_type()
        )
    })
}

// =============================================================================
// BINCODE
// =============================================================================

/// Compact binary codec for serde types.
pub struct BincodeCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> BincodeCodec<T> {
    /// Codec for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for BincodeCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for BincodeCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "BincodeCodec<{}>", type_name::<T>())
    }
}

impl<T> Serializer for BincodeCodec<T>
where
    T: TypedMessage + Serialize,
{
    fn serialize(&self, message: &dyn Message) -> anyhow::Result<Bytes> {
        let typed = expect_type::<T>(message)?;
        Ok(Bytes::from(bincode::serialize(typed)?))
    }
}

impl<T> Deserializer for BincodeCodec<T>
where
    T: TypedMessage + DeserializeOwned,
{
    fn deserialize(&self, payload: &[u8]) -> anyhow::Result<Arc<dyn Message>> {
        let value: T = bincode::deserialize(payload)?;
        Ok(Arc::new(value))
    }
}

// =============================================================================
// JSON
// =============================================================================

/// Human-readable codec for serde types.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    /// Codec for `T`.
    #[must_use]
    pub fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for JsonCodec<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "JsonCodec<{}>", type_name::<T>())
    }
}

impl<T> Serializer for JsonCodec<T>
where
    T: TypedMessage + Serialize,
{
    fn serialize(&self, message: &dyn Message) -> anyhow::Result<Bytes> {
        let typed = expect_type::<T>(message)?;
        Ok(Bytes::from(serde_json::to_vec(typed)?))
    }
}

impl<T> Deserializer for JsonCodec<T>
where
    T: TypedMessage + DeserializeOwned,
{
    fn deserialize(&self, payload: &[u8]) -> anyhow::Result<Arc<dyn Message>> {
        let value: T = serde_json::from_slice(payload)?;
        Ok(Arc::new(value))
    }
}
