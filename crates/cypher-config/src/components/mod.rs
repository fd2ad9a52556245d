//! Configuration components for the compiler
//!
//! Simple, focused configuration for the stages that actually need it.

pub mod binding;
pub mod generation;

pub use binding::*;
pub use generation::*;
