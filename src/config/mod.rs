//! Configuration for deskpet
//!
//! Provides types and parsing for `deskpet.toml`.

pub mod loader;
pub mod schema;

pub use loader::*;
pub use schema::*;
