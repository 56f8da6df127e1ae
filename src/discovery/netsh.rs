//! Parser for Windows `netsh advfirewall` output
//!
//! Reads the rule listing of `netsh advfirewall firewall show rule name=all`
//! into a single `INPUT` chain. Only enabled inbound rules are used. The
//! listing carries no default policy; take it from
//! `netsh advfirewall show currentprofile` via [`parse_inbound_policy`].

use super::Discovery;
use crate::core::error::{Error, Result};
use crate::core::model::{ANY_SOURCE, FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};
use crate::validators::{normalize_source, parse_port_spec};
use std::collections::HashMap;

/// Name of the chain produced from a netsh listing
pub const INBOUND_CHAIN: &str = "INPUT";

/// RemoteIP keywords that expand to addresses only Windows knows
const ADDRESS_KEYWORDS: &[&str] = &[
    "localsubnet",
    "dns",
    "dhcp",
    "wins",
    "defaultgateway",
    "intranet",
    "rmtintranet",
    "internet",
    "ply2renum",
];

/// One `Rule Name:` block; values keep the line they came from
#[derive(Default)]
struct Block {
    start: usize,
    fields: HashMap<String, (usize, String)>,
}

impl Block {
    fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(|(_, v)| v.as_str())
    }

    fn line_of(&self, key: &str) -> usize {
        self.fields.get(key).map_or(self.start, |(line, _)| *line)
    }
}

fn split_blocks(text: &str) -> Result<Vec<Block>> {
    let mut blocks: Vec<Block> = Vec::new();

    for (index, raw) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = raw.trim();

        if line.is_empty() || line.starts_with("---") || line.eq_ignore_ascii_case("ok.") {
            continue;
        }

        let Some((key, value)) = line.split_once(':') else {
            return Err(Error::Parse {
                line: line_no,
                message: format!("expected 'Key: Value', found '{line}'"),
            });
        };
        let key = key.trim().to_ascii_lowercase();
        let value = value.trim().to_string();

        if key == "rule name" {
            blocks.push(Block {
                start: line_no,
                fields: HashMap::new(),
            });
        }

        let Some(block) = blocks.last_mut() else {
            return Err(Error::Parse {
                line: line_no,
                message: "field outside of a 'Rule Name:' block".to_string(),
            });
        };
        block.fields.insert(key, (line_no, value));
    }

    Ok(blocks)
}

fn parse_protocol(value: &str) -> Option<Protocol> {
    match value.to_ascii_lowercase().as_str() {
        "any" => Some(Protocol::All),
        "tcp" => Some(Protocol::Tcp),
        "udp" => Some(Protocol::Udp),
        "icmpv4" => Some(Protocol::Icmp),
        _ => None,
    }
}

fn parse_ports(block: &Block) -> Result<std::result::Result<Vec<PortRange>, String>> {
    let value = block.get("localport").unwrap_or("Any");
    if value.eq_ignore_ascii_case("any") {
        return Ok(Ok(vec![PortRange::ALL]));
    }

    let mut ranges = Vec::new();
    for entry in value.split(',').map(str::trim) {
        if !entry.starts_with(|c: char| c.is_ascii_digit()) {
            return Ok(Err(format!("local port '{entry}' not supported")));
        }
        let (start, end) = parse_port_spec(entry).map_err(|message| Error::Parse {
            line: block.line_of("localport"),
            message,
        })?;
        ranges.push(PortRange { start, end });
    }
    Ok(Ok(ranges))
}

fn parse_remote_ips(block: &Block) -> std::result::Result<Vec<String>, String> {
    let value = block.get("remoteip").unwrap_or("Any");
    if value.eq_ignore_ascii_case("any") {
        return Ok(vec![ANY_SOURCE.to_string()]);
    }

    value
        .split(',')
        .map(str::trim)
        .map(|entry| {
            if ADDRESS_KEYWORDS.contains(&entry.to_ascii_lowercase().as_str()) {
                Err(format!("remote address keyword '{entry}' not supported"))
            } else if entry.contains(':') {
                Err(format!("IPv6 remote address '{entry}' not supported"))
            } else if entry.contains('-') {
                Err(format!("remote address range '{entry}' not supported"))
            } else {
                Ok(normalize_source(entry))
            }
        })
        .collect()
}

/// Parses a netsh rule listing into a one-chain universe.
///
/// `inbound_policy` becomes the policy of the [`INBOUND_CHAIN`].
///
/// # Errors
///
/// Returns [`Error::Parse`] for lines that are not `Key: Value` pairs, fields
/// before the first `Rule Name:`, and malformed numeric ports.
///
/// # Example
///
/// ```
/// use chainfold::discovery::netsh::parse;
/// use chainfold::core::model::{Policy, PortRange};
///
/// let text = "
/// Rule Name:                            Remote Desktop
/// ----------------------------------------------------------------------
/// Enabled:                              Yes
/// Direction:                            In
/// RemoteIP:                             10.0.0.0/8
/// Protocol:                             TCP
/// LocalPort:                            3389
/// Action:                               Allow
/// Ok.
/// ";
///
/// let discovery = parse(text, Policy::Drop).unwrap();
/// let rules = &discovery.chains[0].rules;
/// assert_eq!(rules.len(), 1);
/// assert_eq!(rules[0].dports, PortRange::single(3389));
/// ```
pub fn parse(text: &str, inbound_policy: Policy) -> Result<Discovery> {
    let mut discovery = Discovery::default();
    let mut chain = FirewallChain::new(INBOUND_CHAIN, inbound_policy);

    for block in split_blocks(text)? {
        let name = block.get("rule name").unwrap_or_default().to_string();

        if !block
            .get("enabled")
            .is_some_and(|v| v.eq_ignore_ascii_case("yes"))
        {
            continue;
        }
        if !block
            .get("direction")
            .is_some_and(|v| v.eq_ignore_ascii_case("in"))
        {
            continue;
        }

        let target = match block.get("action").map(str::to_ascii_lowercase).as_deref() {
            Some("allow") => Target::Accept,
            Some("block") => Target::Drop,
            other => {
                discovery.warn(
                    block.line_of("action"),
                    format!("rule '{name}': action '{}' not supported", other.unwrap_or("")),
                );
                continue;
            }
        };

        let proto_text = block.get("protocol").unwrap_or("Any");
        let Some(protocol) = parse_protocol(proto_text) else {
            discovery.warn(
                block.line_of("protocol"),
                format!("rule '{name}': protocol '{proto_text}' not supported"),
            );
            continue;
        };

        if block
            .get("localip")
            .is_some_and(|v| !v.eq_ignore_ascii_case("any"))
        {
            discovery.warn(
                block.line_of("localip"),
                format!("rule '{name}': local address match not supported"),
            );
            continue;
        }

        let dports = if protocol.has_ports() {
            match parse_ports(&block)? {
                Ok(ports) => ports,
                Err(message) => {
                    discovery.warn(block.line_of("localport"), format!("rule '{name}': {message}"));
                    continue;
                }
            }
        } else {
            vec![PortRange::ALL]
        };

        let sources = match parse_remote_ips(&block) {
            Ok(sources) => sources,
            Err(message) => {
                discovery.warn(block.line_of("remoteip"), format!("rule '{name}': {message}"));
                continue;
            }
        };

        for source in &sources {
            for range in &dports {
                chain.rules.push(FirewallRule {
                    name: name.clone(),
                    target: target.clone(),
                    protocol,
                    source: source.clone(),
                    dports: *range,
                });
            }
        }
    }

    discovery.chains.push(chain);
    Ok(discovery)
}

/// Extracts the inbound default from `netsh advfirewall show currentprofile`.
///
/// Looks for the `Firewall Policy` line, e.g. `BlockInbound,AllowOutbound`.
pub fn parse_inbound_policy(text: &str) -> Option<Policy> {
    text.lines()
        .map(str::trim)
        .find_map(|line| line.strip_prefix("Firewall Policy"))
        .and_then(|rest| rest.trim().split(',').next())
        .and_then(|inbound| match inbound.trim().to_ascii_lowercase().as_str() {
            "allowinbound" => Some(Policy::Accept),
            "blockinbound" | "blockinboundalways" => Some(Policy::Drop),
            _ => None,
        })
}
