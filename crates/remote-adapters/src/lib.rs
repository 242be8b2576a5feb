//! sundew/crates/remote-adapters/src/lib.rs
//!
//! Clients for the remote collaborators the engine talks to over HTTP.

pub mod head_node;

pub use head_node::HeadNodeClient;
