//! Shared types and models for the Almox warehouse platform
//!
//! This crate contains the domain model, validators and requisition workflow
//! guards shared between the backend and the browser client (via WASM).

pub mod models;
pub mod types;
pub mod validation;
pub mod workflow;

pub use models::*;
pub use types::*;
pub use validation::*;
pub use workflow::*;
