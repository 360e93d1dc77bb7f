//! Application message trait.

use shared_types::MessageTypeId;
use std::any::Any;
use std::fmt;

/// An application object carried by the engines.
///
/// The core never inspects or mutates messages; it only routes them by
/// [`Message::message_type`] through the serialization registry.
pub trait Message: Any + Send + Sync + fmt::Debug {
    /// Type identifier used to pick a serializer and deserializer.
    fn message_type(&self) -> MessageTypeId;

    /// Upcast for downcasting to the concrete type.
    fn as_any(&self) -> &dyn Any;
}

/// Message with a compile-time type identifier.
///
/// Implementing this is enough to get [`Message`].
pub trait TypedMessage: Any + Send + Sync + fmt::Debug {
    /// Type identifier shared by every value of this type.
    const MESSAGE_TYPE: MessageTypeId;
}

impl<T: TypedMessage> Message for T {
    fn message_type(&self) -> MessageTypeId {
        T::MESSAGE_TYPE
    }

    fn as_any(&self) -> &dyn Any {
        self
    }
}

impl dyn Message {
    /// Borrow as the concrete type, if it is one.
    #[must_use]
    pub fn downcast_ref<T: Message>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    /// Whether the message is a `T`.
    #[must_use]
    pub fn is<T: Message>(&self) -> bool {
        self.as_any().is::<T>()
    }
}
