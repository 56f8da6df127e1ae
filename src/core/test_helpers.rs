//! Shared test utilities for core module tests
//!
//! Provides compact builders for rules and chains so test universes stay
//! readable. This module is only compiled in test mode.

use crate::core::model::{FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};

/// Creates a rule from its string form, the way discovery would hand it over.
///
/// # Arguments
///
/// * `target` - `ACCEPT`, `DROP`, or a chain name
/// * `protocol` - `all`, `tcp`, `udp` or `icmp`
/// * `source` - IPv4 CIDR text
/// * `ports` - inclusive `(start, end)`
pub fn rule(target: &str, protocol: &str, source: &str, ports: (u16, u16)) -> FirewallRule {
    FirewallRule {
        name: String::new(),
        target: Target::from(target),
        protocol: protocol.parse::<Protocol>().expect("test protocol"),
        source: source.to_string(),
        dports: PortRange::new(ports.0, ports.1).expect("test port range"),
    }
}

/// Creates an unrestricted jump to `chain`.
pub fn jump(chain: &str) -> FirewallRule {
    rule(chain, "all", "0.0.0.0/0", (1, 65535))
}

pub fn chain(name: &str, policy: &str, rules: Vec<FirewallRule>) -> FirewallChain {
    FirewallChain {
        name: name.to_string(),
        policy: Policy::from(policy),
        rules,
    }
}

/// A small host firewall: INPUT dispatches to per-service chains.
///
/// Accept surface:
/// - tcp 22 from 10.0.0.0/8
/// - tcp 80 and 443 from anywhere
/// - udp 53 from 192.168.0.0/16
pub fn host_universe() -> Vec<FirewallChain> {
    vec![
        chain(
            "INPUT",
            "DROP",
            vec![
                rule("DROP", "all", "203.0.113.0/24", (1, 65535)),
                rule("admin", "tcp", "10.0.0.0/8", (1, 65535)),
                rule("web", "tcp", "0.0.0.0/0", (1, 65535)),
                rule("dns", "udp", "192.168.0.0/16", (53, 53)),
            ],
        ),
        chain("admin", "", vec![rule("ACCEPT", "tcp", "0.0.0.0/0", (22, 22))]),
        chain(
            "web",
            "DROP",
            vec![
                rule("ACCEPT", "tcp", "0.0.0.0/0", (80, 80)),
                rule("ACCEPT", "tcp", "0.0.0.0/0", (443, 443)),
            ],
        ),
        chain("dns", "ACCEPT", vec![]),
    ]
}
