//! chainfold - firewall chain flattening
//!
//! Resolves a multi-chain, iptables-style firewall configuration into one
//! equivalent chain: policy DROP plus a flat list of ACCEPT rules.
//!
//! # Architecture
//!
//! - [`core`] - Chain/rule model, intersection primitives, and the flattener
//! - [`discovery`] - Parsers for captured `iptables -S` and `netsh` output
//! - [`render`] - iptables-restore and nftables rendering, rule-set diffs
//! - [`snapshots`] - Named chain universes stored on disk
//! - [`validators`] - Input validation and sanitization
//! - [`config`] - Configuration persistence
//! - [`utils`] - Utility functions (XDG directories, input loading)

#![allow(clippy::must_use_candidate)]
#![allow(clippy::return_self_not_must_use)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::missing_errors_doc)]

pub mod config;
pub mod core;
pub mod discovery;
pub mod render;
pub mod snapshots;
pub mod utils;
pub mod validators;

// Re-export commonly used types
pub use core::error::{Error, Result};
pub use core::flatten::{Flattened, Flattener, flatten_chain};
pub use core::model::{FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};
