//! Discovery adapters
//!
//! Turn captured firewall state into a chain universe for the flattener.
//! Nothing here runs `iptables` or `netsh`; callers hand in their output.
//!
//! - [`iptables`]: `iptables -S` / `iptables-save` text
//! - [`netsh`]: `netsh advfirewall firewall show rule name=all` text
//!
//! Rules the model cannot express (negated matches, destination or
//! source-port restrictions, non-terminal targets) are left out and reported
//! as [`ParseWarning`]s. Which way that skews the flattened result depends on
//! the skipped target: a skipped ACCEPT or jump narrows it, while a skipped
//! DROP or `RETURN` can widen it, since later ACCEPT rules then also cover
//! traffic the original would have stopped or returned.

pub mod iptables;
pub mod netsh;

use crate::core::error::{Error, Result};
use crate::core::model::{FirewallChain, Policy, check_limits};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A discovered line that was ignored or only partly represented
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseWarning {
    pub line: usize,
    pub message: String,
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}: {}", self.line, self.message)
    }
}

/// Chains found in one discovery input
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Discovery {
    /// Chains in declaration order
    pub chains: Vec<FirewallChain>,
    pub warnings: Vec<ParseWarning>,
}

impl Discovery {
    pub(crate) fn warn(&mut self, line: usize, message: impl Into<String>) {
        let message = message.into();
        tracing::warn!("Discovery line {}: {}", line, message);
        self.warnings.push(ParseWarning { line, message });
    }
}

/// Format of a chain universe on disk or stdin
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Default,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
pub enum InputFormat {
    /// JSON array of chains
    #[default]
    #[strum(serialize = "json")]
    Json,
    /// `iptables -S` or `iptables-save` output
    #[strum(serialize = "iptables")]
    Iptables,
    /// `netsh advfirewall firewall show rule name=all` output
    #[strum(serialize = "netsh")]
    Netsh,
}

/// Parses `text` in the given format.
///
/// `inbound_policy` is only used for netsh input, which carries no chain
/// policy of its own.
///
/// # Errors
///
/// Returns a parse or JSON error for malformed input, and
/// [`Error::Parse`] when the universe exceeds the size limits.
pub fn parse(format: InputFormat, text: &str, inbound_policy: Policy) -> Result<Discovery> {
    let discovery = match format {
        InputFormat::Json => Discovery {
            chains: serde_json::from_str(text)?,
            warnings: Vec::new(),
        },
        InputFormat::Iptables => iptables::parse(text)?,
        InputFormat::Netsh => netsh::parse(text, inbound_policy)?,
    };

    check_limits(&discovery.chains).map_err(|message| Error::Parse { line: 0, message })?;

    Ok(discovery)
}
