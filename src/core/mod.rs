//! Core chain flattening functionality
//!
//! This module contains the rule/chain model and the pure algorithms over it.
//! It provides:
//!
//! - [`model`]: Chain and rule data structures
//! - [`intersect`]: Protocol, source and port-range intersection
//! - [`flatten`]: Recursive chain flattening
//! - [`error`]: Error types for all chainfold operations

pub mod error;
pub mod flatten;
pub mod intersect;
pub mod model;

#[cfg(test)]
pub mod test_helpers;

#[cfg(test)]
mod tests;
