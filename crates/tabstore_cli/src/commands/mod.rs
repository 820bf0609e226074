//! CLI command implementations.

pub mod append;
pub mod dump;
pub mod inspect;
pub mod objects;
pub mod tail;
