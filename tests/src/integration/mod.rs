//! Cross-crate scenarios over both transports.

pub mod handshake;
pub mod pubsub;
pub mod reqrep;
pub mod service_queue;
