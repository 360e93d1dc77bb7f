//! # Serialization Registry
//!
//! Per-message-type lookup of serializers and deserializers.
//!
//! Keys are unique: a second registration for the same type is an error,
//! never a silent replacement. Lookups take the read lock only long enough
//! to clone the handler, so codecs run without holding it.

use crate::codec::{BincodeCodec, Deserializer, JsonCodec, Serializer};
use crate::message::{Message, TypedMessage};
use bytes::Bytes;
use lazy_static::lazy_static;
use mq_telemetry::metrics::SERIALIZATION_ERRORS;
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use shared_types::{Frame, MessageTypeId, SerializationError};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tracing::{debug, warn};

lazy_static! {
    static ref GLOBAL: Arc<SerializationRegistry> = Arc::new(SerializationRegistry::new());
}

/// Serializer/deserializer lookup keyed by message type.
#[derive(Default)]
pub struct SerializationRegistry {
    serializers: RwLock<HashMap<MessageTypeId, Arc<dyn Serializer>>>,
    deserializers: RwLock<HashMap<MessageTypeId, Arc<dyn Deserializer>>>,
}

impl SerializationRegistry {
    /// Empty registry, isolated from the process-wide one.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Process-wide registry.
    #[must_use]
    pub fn global() -> Arc<SerializationRegistry> {
        Arc::clone(&GLOBAL)
    }

    /// Register the serializer for `message_type`.
    pub fn register_serializer<S>(
        &self,
        message_type: MessageTypeId,
        serializer: S,
    ) -> Result<(), SerializationError>
    where
        S: Serializer + 'static,
    {
        let serializer: Arc<dyn Serializer> = Arc::new(serializer);
        insert_unique(&self.serializers, message_type, serializer)?;
        debug!(%message_type, "Serializer registered");
        Ok(())
    }

    /// Register the deserializer for `message_type`.
    pub fn register_deserializer<D>(
        &self,
        message_type: MessageTypeId,
        deserializer: D,
    ) -> Result<(), SerializationError>
    where
        D: Deserializer + 'static,
    {
        let deserializer: Arc<dyn Deserializer> = Arc::new(deserializer);
        insert_unique(&self.deserializers, message_type, deserializer)?;
        debug!(%message_type, "Deserializer registered");
        Ok(())
    }

    /// Register one codec for both directions. Either both halves are
    /// registered or neither is.
    pub fn register_codec<C>(
        &self,
        message_type: MessageTypeId,
        codec: C,
    ) -> Result<(), SerializationError>
    where
        C: Serializer + Deserializer + 'static,
    {
        let codec = Arc::new(codec);
        let mut serializers = self.serializers.write();
        let mut deserializers = self.deserializers.write();
        if serializers.contains_key(&message_type) || deserializers.contains_key(&message_type) {
            return Err(SerializationError::DuplicateRegistration(message_type));
        }
        serializers.insert(message_type, codec.clone());
        deserializers.insert(message_type, codec);
        debug!(%message_type, "Codec registered");
        Ok(())
    }

    /// Register `T` with the bincode codec.
    pub fn register_bincode<T>(&self) -> Result<(), SerializationError>
    where
        T: TypedMessage + Serialize + DeserializeOwned,
    {
        self.register_codec(T::MESSAGE_TYPE, BincodeCodec::<T>::new())
    }

    /// Register `T` with the JSON codec.
    pub fn register_json<T>(&self) -> Result<(), SerializationError>
    where
        T: TypedMessage + Serialize + DeserializeOwned,
    {
        self.register_codec(T::MESSAGE_TYPE, JsonCodec::<T>::new())
    }

    /// Whether a serializer exists for `message_type`.
    #[must_use]
    pub fn has_serializer(&self, message_type: MessageTypeId) -> bool {
        self.serializers.read().contains_key(&message_type)
    }

    /// Whether a deserializer exists for `message_type`.
    #[must_use]
    pub fn has_deserializer(&self, message_type: MessageTypeId) -> bool {
        self.deserializers.read().contains_key(&message_type)
    }

    /// Encode `message` with the serializer of its own type.
    pub fn serialize(&self, message: &dyn Message) -> Result<Bytes, SerializationError> {
        let message_type = message.message_type();
        let serializer = self
            .serializers
            .read()
            .get(&message_type)
            .cloned()
            .ok_or_else(|| {
                SERIALIZATION_ERRORS.with_label_values(&["no_serializer"]).inc();
                SerializationError::NoSerializerRegistered(message_type)
            })?;

        serializer.serialize(message).map_err(|e| {
            SERIALIZATION_ERRORS.with_label_values(&["failed"]).inc();
            warn!(%message_type, error = %e, "Serializer failed");
            SerializationError::SerializationFailed {
                message_type,
                reason: e.to_string(),
            }
        })
    }

    /// Encode `message` into a pub/sub frame.
    pub fn message_frame(&self, message: &dyn Message) -> Result<Frame, SerializationError> {
        Ok(Frame::message(message.message_type(), self.serialize(message)?))
    }

    /// Encode several messages, one frame each. Fails as a whole if any
    /// message cannot be encoded.
    pub fn serialize_batch(
        &self,
        messages: &[Arc<dyn Message>],
    ) -> Result<Vec<Frame>, SerializationError> {
        messages
            .iter()
            .map(|message| self.message_frame(message.as_ref()))
            .collect()
    }

    /// Decode `payload` as a `message_type` message.
    pub fn deserialize(
        &self,
        message_type: MessageTypeId,
        payload: &[u8],
    ) -> Result<Arc<dyn Message>, SerializationError> {
        let deserializer = self
            .deserializers
            .read()
            .get(&message_type)
            .cloned()
            .ok_or_else(|| {
                SERIALIZATION_ERRORS
                    .with_label_values(&["no_deserializer"])
                    .inc();
                SerializationError::NoDeserializerRegistered(message_type)
            })?;

        let malformed = |reason: String| {
            SERIALIZATION_ERRORS.with_label_values(&["malformed"]).inc();
            SerializationError::DeserializationError {
                message_type,
                reason,
            }
        };

        let message = deserializer
            .deserialize(payload)
            .map_err(|e| malformed(e.to_string()))?;
        if message.message_type() != message_type {
            return Err(malformed(format!(
                "deserializer produced message type {}",
                message.message_type()
            )));
        }
        Ok(message)
    }

    /// Decode the payload of `frame` by its type identifier.
    pub fn deserialize_frame(&self, frame: &Frame) -> Result<Arc<dyn Message>, SerializationError> {
        self.deserialize(frame.message_type, &frame.payload)
    }
}

impl fmt::Debug for SerializationRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut serializers: Vec<_> = self.serializers.read().keys().copied().collect();
        let mut deserializers: Vec<_> = self.deserializers.read().keys().copied().collect();
        serializers.sort();
        deserializers.sort();
        f.debug_struct("SerializationRegistry")
            .field("serializers", &serializers)
            .field("deserializers", &deserializers)
            .finish()
    }
}

fn insert_unique<H: ?Sized>(
    map: &RwLock<HashMap<MessageTypeId, Arc<H>>>,
    message_type: MessageTypeId,
    handler: Arc<H>,
) -> Result<(), SerializationError> {
    let mut map = map.write();
    if map.contains_key(&message_type) {
        return Err(SerializationError::DuplicateRegistration(message_type));
    }
    map.insert(message_type, handler);
    Ok(())
}
