//! Firewall chain and rule data structures
//!
//! This module defines the value types handed from discovery to the
//! flattener and from the flattener to the renderers.
//!
//! # Structure
//!
//! A [`FirewallChain`] is a named, ordered rule list with a default
//! [`Policy`]. A [`FirewallRule`] carries:
//! - A [`Target`] (ACCEPT, DROP, or a jump to another chain)
//! - A [`Protocol`] (`all` matches every protocol)
//! - A source IPv4 CIDR, kept as text so intersection can report parse
//!   errors where they are encountered
//! - An inclusive destination [`PortRange`]
//!
//! # Limits
//!
//! A universe is limited to [`MAX_CHAINS`] chains and [`MAX_RULES`] rules in
//! total to prevent memory exhaustion from malformed snapshots.
//!
//! # Example
//!
//! ```
//! use chainfold::core::model::{FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};
//!
//! let chain = FirewallChain {
//!     name: "INPUT".to_string(),
//!     policy: Policy::Drop,
//!     rules: vec![FirewallRule {
//!         name: "ssh".to_string(),
//!         target: Target::Accept,
//!         protocol: Protocol::Tcp,
//!         source: "10.0.0.0/8".to_string(),
//!         dports: PortRange::single(22),
//!     }],
//! };
//! assert_eq!(chain.rules[0].to_string(), "ACCEPT tcp 10.0.0.0/8 dport 22 # ssh");
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;

/// Maximum number of chains in a single universe
pub const MAX_CHAINS: usize = 1000;

/// Maximum number of rules across all chains of a single universe
pub const MAX_RULES: usize = 10_000;

/// Source CIDR matching every IPv4 address
pub const ANY_SOURCE: &str = "0.0.0.0/0";

/// Network protocol a rule matches
///
/// `Copy` trait allows efficient passing by value for this small enum.
#[derive(
    Debug,
    Clone,
    Copy,
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Hash,
    Default,
    strum::Display,
    strum::EnumString,
    strum::EnumIter,
    strum::AsRefStr,
)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum Protocol {
    /// Wildcard matching every protocol
    #[default]
    #[strum(serialize = "all")]
    All,
    /// Transmission Control Protocol
    #[strum(serialize = "tcp")]
    Tcp,
    /// User Datagram Protocol
    #[strum(serialize = "udp")]
    Udp,
    /// Internet Control Message Protocol (IPv4)
    #[strum(serialize = "icmp")]
    Icmp,
}

impl Protocol {
    pub const fn as_str(self) -> &'static str {
        match self {
            Protocol::All => "all",
            Protocol::Tcp => "tcp",
            Protocol::Udp => "udp",
            Protocol::Icmp => "icmp",
        }
    }

    /// Returns `true` for protocols that carry destination ports
    pub const fn has_ports(self) -> bool {
        matches!(self, Protocol::Tcp | Protocol::Udp)
    }
}

/// Inclusive destination port range
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(try_from = "[u16; 2]", into = "[u16; 2]")]
pub struct PortRange {
    pub start: u16,
    pub end: u16,
}

impl PortRange {
    /// Every usable port
    pub const ALL: PortRange = PortRange {
        start: 1,
        end: 65535,
    };

    pub fn single(port: u16) -> Self {
        Self {
            start: port,
            end: port,
        }
    }

    /// Builds a range after checking `start <= end` and that neither port is 0.
    pub fn new(start: u16, end: u16) -> crate::core::error::Result<Self> {
        crate::validators::validate_port_range(start, end)
            .map(|(start, end)| Self { start, end })
            .map_err(|_| crate::core::error::Error::InvalidPortRange { start, end })
    }

    pub fn is_all(&self) -> bool {
        *self == Self::ALL
    }
}

impl Default for PortRange {
    fn default() -> Self {
        Self::ALL
    }
}

impl TryFrom<[u16; 2]> for PortRange {
    type Error = String;

    fn try_from([start, end]: [u16; 2]) -> Result<Self, Self::Error> {
        crate::validators::validate_port_range(start, end).map(|(start, end)| Self { start, end })
    }
}

impl From<PortRange> for [u16; 2] {
    fn from(range: PortRange) -> Self {
        [range.start, range.end]
    }
}

impl fmt::Display for PortRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.start == self.end {
            write!(f, "{}", self.start)
        } else {
            write!(f, "{}-{}", self.start, self.end)
        }
    }
}

/// Chain default policy
///
/// An empty policy string means DROP. Anything other than ACCEPT/DROP is kept
/// as [`Policy::Custom`] so discovery can report it; flattening such a chain
/// fails.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(from = "String", into = "String")]
pub enum Policy {
    Accept,
    #[default]
    Drop,
    Custom(String),
}

impl Policy {
    pub fn as_str(&self) -> &str {
        match self {
            Policy::Accept => "ACCEPT",
            Policy::Drop => "DROP",
            Policy::Custom(s) => s,
        }
    }
}

impl From<&str> for Policy {
    fn from(s: &str) -> Self {
        match s {
            "ACCEPT" => Policy::Accept,
            "DROP" | "" => Policy::Drop,
            other => Policy::Custom(other.to_string()),
        }
    }
}

impl From<String> for Policy {
    fn from(s: String) -> Self {
        Policy::from(s.as_str())
    }
}

impl From<Policy> for String {
    fn from(policy: Policy) -> Self {
        policy.as_str().to_string()
    }
}

impl fmt::Display for Policy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rule disposition
///
/// Any target that is not ACCEPT or DROP names a chain to jump to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(from = "String", into = "String")]
pub enum Target {
    Accept,
    Drop,
    Jump(String),
}

impl Target {
    pub fn as_str(&self) -> &str {
        match self {
            Target::Accept => "ACCEPT",
            Target::Drop => "DROP",
            Target::Jump(chain) => chain,
        }
    }
}

impl From<&str> for Target {
    fn from(s: &str) -> Self {
        match s {
            "ACCEPT" => Target::Accept,
            "DROP" => Target::Drop,
            chain => Target::Jump(chain.to_string()),
        }
    }
}

impl From<String> for Target {
    fn from(s: String) -> Self {
        match s.as_str() {
            "ACCEPT" => Target::Accept,
            "DROP" => Target::Drop,
            _ => Target::Jump(s),
        }
    }
}

impl From<Target> for String {
    fn from(target: Target) -> Self {
        match target {
            Target::Accept => "ACCEPT".to_string(),
            Target::Drop => "DROP".to_string(),
            Target::Jump(chain) => chain,
        }
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single rule inside a chain
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct FirewallRule {
    /// Display label, not used when evaluating
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,
    pub target: Target,
    #[serde(default)]
    pub protocol: Protocol,
    #[serde(default = "default_source")]
    pub source: String,
    #[serde(default)]
    pub dports: PortRange,
}

fn default_source() -> String {
    ANY_SOURCE.to_string()
}

impl FirewallRule {
    /// The maximally permissive rule: every protocol, source and port.
    pub fn any() -> Self {
        Self {
            name: String::new(),
            target: Target::Accept,
            protocol: Protocol::All,
            source: default_source(),
            dports: PortRange::ALL,
        }
    }

    /// Creates an ACCEPT rule with an empty label.
    pub fn accept(protocol: Protocol, source: impl Into<String>, dports: PortRange) -> Self {
        Self {
            name: String::new(),
            target: Target::Accept,
            protocol,
            source: source.into(),
            dports,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    pub fn with_target(mut self, target: Target) -> Self {
        self.target = target;
        self
    }
}

impl fmt::Display for FirewallRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.target, self.protocol, self.source)?;
        if !self.dports.is_all() {
            write!(f, " dport {}", self.dports)?;
        }
        if !self.name.is_empty() {
            write!(f, " # {}", self.name)?;
        }
        Ok(())
    }
}

/// A named, ordered rule list with a default policy
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FirewallChain {
    pub name: String,
    #[serde(default)]
    pub policy: Policy,
    #[serde(default)]
    pub rules: Vec<FirewallRule>,
}

impl FirewallChain {
    pub fn new(name: impl Into<String>, policy: Policy) -> Self {
        Self {
            name: name.into(),
            policy,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: FirewallRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// Rejects universes exceeding [`MAX_CHAINS`] or [`MAX_RULES`].
pub fn check_limits(chains: &[FirewallChain]) -> Result<(), String> {
    if chains.len() > MAX_CHAINS {
        return Err(format!(
            "{} chains (max: {})",
            chains.len(),
            MAX_CHAINS
        ));
    }
    let rules: usize = chains.iter().map(|c| c.rules.len()).sum();
    if rules > MAX_RULES {
        return Err(format!("{rules} rules (max: {MAX_RULES})"));
    }
    Ok(())
}
