//! JSON-RPC over HTTP primitive types
//!
//! This crate contains the message envelope, peer metadata and the named defaults shared by the
//! client, the server handler and the auth gate.

pub mod constants;
mod message;
mod peer;

pub use message::{parse_payload, Message};
pub use peer::{HttpInfo, PeerInfo};
