//! # mq-02 Serialization
//!
//! Converts application messages to and from frame payloads.
//!
//! Engines never know concrete message types. They hand `&dyn Message` to a
//! [`SerializationRegistry`] and get bytes back, or hand it a type identifier
//! and bytes and get an `Arc<dyn Message>`.
//!
//! ```text
//! TypedMessage ──▶ Message ──registry.serialize()──▶ Bytes ──▶ Frame
//!                     ▲                                          │
//!                     └──────────registry.deserialize()──────────┘
//! ```

#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

pub mod codec;
pub mod message;
pub mod registry;

pub use codec::{BincodeCodec, Deserializer, JsonCodec, Serializer};
pub use message::{Message, TypedMessage};
pub use registry::SerializationRegistry;
