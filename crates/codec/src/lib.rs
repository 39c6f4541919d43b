//! State codec: nested state trees and their durable compact encoding.
//!
//! # Invariants
//! - `decode(encode(t)) == t` for every valid tree.
//! - Encoding is deterministic: equal trees yield byte-identical payloads.
//! - Decode never returns partial data; corruption fails closed.

mod container;
mod encoding;
mod tag;

pub use container::{ContainerSlot, ContainerSnapshot};
pub use encoding::{CodecError, Payload, decode, encode};
pub use tag::Tag;
