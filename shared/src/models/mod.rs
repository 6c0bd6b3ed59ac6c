//! Domain models for the Almox warehouse platform

mod item;
mod requisition;
mod user;
mod warehouse;

pub use item::*;
pub use requisition::*;
pub use user::*;
pub use warehouse::*;
