//! Rendering of flattened chains
//!
//! Produces the inputs an apply step would hand to the platform firewall
//! (`iptables-restore` scripts, nftables text), a plain listing for
//! terminals, and a desired-vs-actual diff. Nothing here executes commands.

use crate::core::model::{ANY_SOURCE, FirewallChain, FirewallRule, Protocol};
use crate::validators::sanitize_label;
use serde::{Deserialize, Serialize};
use std::fmt::Write;

/// Built-in iptables chains that accept a policy
const BUILTIN_CHAINS: &[&str] = &["INPUT", "FORWARD", "OUTPUT"];

/// Output format for a flattened chain
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
pub enum OutputFormat {
    /// One line per rule
    #[default]
    #[strum(serialize = "text")]
    Text,
    /// The flattened chain as JSON
    #[strum(serialize = "json")]
    Json,
    /// `iptables-restore` input
    #[strum(serialize = "iptables")]
    Iptables,
    /// nftables ruleset text
    #[strum(serialize = "nft")]
    Nft,
}

/// Renders `chain` in `format`.
///
/// # Errors
///
/// Only JSON rendering can fail.
pub fn render(chain: &FirewallChain, format: OutputFormat) -> serde_json::Result<String> {
    Ok(match format {
        OutputFormat::Text => rules_text(chain),
        OutputFormat::Json => serde_json::to_string_pretty(chain)?,
        OutputFormat::Iptables => iptables_restore(chain),
        OutputFormat::Nft => nft_text(chain),
    })
}

/// Lists the chain header and one line per rule.
pub fn rules_text(chain: &FirewallChain) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# chain {} (policy {})", chain.name, chain.policy);
    if chain.rules.is_empty() {
        let _ = writeln!(out, "# no traffic accepted");
    }
    for rule in &chain.rules {
        let _ = writeln!(out, "{rule}");
    }
    out
}

/// Protocols a rule must be rendered under when the backend needs an
/// explicit protocol for port matching.
fn port_protocols(rule: &FirewallRule) -> Vec<Protocol> {
    match rule.protocol {
        Protocol::All if !rule.dports.is_all() => vec![Protocol::Tcp, Protocol::Udp],
        protocol => vec![protocol],
    }
}

/// Generates an `iptables-restore` script for the filter table.
///
/// Built-in chains get policy DROP and start with the loopback and
/// ESTABLISHED/RELATED accepts; any other chain name is declared as a user
/// chain ending in an explicit DROP.
pub fn iptables_restore(chain: &FirewallChain) -> String {
    let builtin = BUILTIN_CHAINS.contains(&chain.name.as_str());
    let mut out = String::new();

    let _ = writeln!(out, "*filter");
    if builtin {
        let _ = writeln!(out, ":{} DROP [0:0]", chain.name);
        write_base_rules_iptables(&mut out, &chain.name);
    } else {
        let _ = writeln!(out, ":{} - [0:0]", chain.name);
    }

    for rule in &chain.rules {
        for protocol in port_protocols(rule) {
            let _ = write!(out, "-A {}", chain.name);
            if protocol != Protocol::All {
                let _ = write!(out, " -p {protocol}");
            }
            if rule.source != ANY_SOURCE {
                let _ = write!(out, " -s {}", rule.source);
            }
            if protocol.has_ports() && !rule.dports.is_all() {
                let _ = write!(out, " -m {protocol} --dport ");
                if rule.dports.start == rule.dports.end {
                    let _ = write!(out, "{}", rule.dports.start);
                } else {
                    let _ = write!(out, "{}:{}", rule.dports.start, rule.dports.end);
                }
            }
            let label = sanitize_label(&rule.name);
            if !label.is_empty() {
                let _ = write!(out, " -m comment --comment \"{label}\"");
            }
            let _ = writeln!(out, " -j ACCEPT");
        }
    }

    if !builtin {
        let _ = writeln!(out, "-A {} -j DROP", chain.name);
    }
    let _ = writeln!(out, "COMMIT");
    out
}

/// Loopback and reply traffic for a built-in chain.
///
/// Discovery drops these rules from its input, so an applied script has to
/// bring them back or it cuts established sessions.
fn write_base_rules_iptables(out: &mut String, chain: &str) {
    match chain {
        "INPUT" => {
            let _ = writeln!(out, "-A INPUT -i lo -j ACCEPT");
        }
        "OUTPUT" => {
            let _ = writeln!(out, "-A OUTPUT -o lo -j ACCEPT");
        }
        _ => {}
    }
    let _ = writeln!(
        out,
        "-A {chain} -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT"
    );
}

fn write_base_rules_nft(out: &mut String, hook: &str) {
    match hook {
        "input" => {
            let _ = writeln!(out, "        iifname \"lo\" accept comment \"allow from loopback\"");
        }
        "output" => {
            let _ = writeln!(out, "        oifname \"lo\" accept comment \"allow to loopback\"");
        }
        _ => {}
    }
    let _ = writeln!(
        out,
        "        ct state established,related accept comment \"allow tracked connections\"\n"
    );
}

/// Generates human-readable .nft text for the flattened chain.
pub fn nft_text(chain: &FirewallChain) -> String {
    let name = chain.name.to_lowercase();
    let mut out = String::new();

    let _ = writeln!(out, "table inet chainfold {{");
    let _ = writeln!(out, "    chain {name} {{");
    if BUILTIN_CHAINS.contains(&chain.name.as_str()) {
        let _ = writeln!(
            out,
            "        type filter hook {name} priority 0; policy drop;\n"
        );
        write_base_rules_nft(&mut out, &name);
    }

    for rule in &chain.rules {
        let _ = write!(out, "       ");
        if rule.source != ANY_SOURCE {
            let _ = write!(out, " ip saddr {}", rule.source);
        }
        match rule.protocol {
            Protocol::All if !rule.dports.is_all() => {
                let _ = write!(out, " meta l4proto {{ tcp, udp }} th dport {}", rule.dports);
            }
            Protocol::All => {}
            Protocol::Icmp => {
                let _ = write!(out, " meta l4proto icmp");
            }
            protocol => {
                if rule.dports.is_all() {
                    let _ = write!(out, " meta l4proto {protocol}");
                } else {
                    let _ = write!(out, " {protocol} dport {}", rule.dports);
                }
            }
        }
        let _ = write!(out, " accept");
        let label = sanitize_label(&rule.name);
        if !label.is_empty() {
            let _ = write!(out, " comment \"{label}\"");
        }
        let _ = writeln!(out);
    }

    if !BUILTIN_CHAINS.contains(&chain.name.as_str()) {
        let _ = writeln!(out, "        drop");
    }
    let _ = writeln!(out, "    }}");
    let _ = writeln!(out, "}}");
    out
}

/// Sorted, de-duplicated rule lines without labels
fn canonical_lines(chain: &FirewallChain) -> String {
    let mut lines: Vec<String> = chain
        .rules
        .iter()
        .map(|r| format!("{} {} dport {}\n", r.protocol, r.source, r.dports))
        .collect();
    lines.sort();
    lines.dedup();
    lines.concat()
}

/// Line counts of a rule-set diff
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DiffSummary {
    pub added: usize,
    pub removed: usize,
}

impl DiffSummary {
    pub fn is_empty(&self) -> bool {
        self.added == 0 && self.removed == 0
    }
}

/// Diffs two flattened chains, ignoring rule order, duplicates and labels.
///
/// Lines prefixed `- ` are accepted only by `old`, `+ ` only by `new`.
pub fn diff(old: &FirewallChain, new: &FirewallChain) -> (String, DiffSummary) {
    let old_text = canonical_lines(old);
    let new_text = canonical_lines(new);

    let diff = similar::TextDiff::from_lines(&old_text, &new_text);
    let mut result = String::new();
    let mut summary = DiffSummary::default();

    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            similar::ChangeTag::Delete => {
                summary.removed += 1;
                "- "
            }
            similar::ChangeTag::Insert => {
                summary.added += 1;
                "+ "
            }
            similar::ChangeTag::Equal => "  ",
        };
        let _ = write!(result, "{sign}{change}");
    }

    (result, summary)
}
