//! Core data types shared by the transport and generation layers.

pub mod message;

pub use message::{Message, MessageRole};
