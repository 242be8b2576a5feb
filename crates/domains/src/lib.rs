//! sundew/crates/domains/src/lib.rs
//!
//! Records, ports, and error taxonomy for the sundew reconciliation engine.

pub mod error;
pub mod models;
pub mod naming;
pub mod traits;
pub mod validation;

// Re-exporting for easier access in other crates
pub use error::*;
pub use models::*;
pub use naming::*;
pub use traits::*;
pub use validation::*;
