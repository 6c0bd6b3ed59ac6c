//! HTTP request handlers

pub mod health;
pub mod item;
pub mod requisition;
pub mod warehouse;

pub use health::*;
pub use item::*;
pub use requisition::*;
pub use warehouse::*;
