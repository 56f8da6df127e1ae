//! Parser for `iptables -S` and `iptables-save` output
//!
//! Only the filter table is read. Loopback rules and rules matching
//! ESTABLISHED/RELATED connection state are dropped here, since the
//! flattener has no notion of interfaces or connection tracking. The
//! renderers in [`crate::render`] emit them again for built-in chains.
//!
//! # Example
//!
//! ```
//! use chainfold::discovery::iptables::parse;
//! use chainfold::core::model::{Policy, Target};
//!
//! let text = "\
//! -P INPUT DROP
//! -N ssh-in
//! -A INPUT -i lo -j ACCEPT
//! -A INPUT -m conntrack --ctstate RELATED,ESTABLISHED -j ACCEPT
//! -A INPUT -p tcp -m tcp --dport 22 -j ssh-in
//! -A ssh-in -s 10.0.0.0/8 -j ACCEPT
//! ";
//!
//! let discovery = parse(text).unwrap();
//! assert_eq!(discovery.chains.len(), 2);
//! assert_eq!(discovery.chains[0].policy, Policy::Drop);
//! assert_eq!(discovery.chains[0].rules.len(), 1);
//! assert_eq!(discovery.chains[0].rules[0].target, Target::Jump("ssh-in".into()));
//! ```

use super::Discovery;
use crate::core::error::{Error, Result};
use crate::core::model::{ANY_SOURCE, FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};
use crate::validators::{normalize_source, parse_port_spec, validate_chain_name};
use tracing::debug;

/// Extension targets that do not end evaluation and cannot be modeled
const NON_TERMINAL_TARGETS: &[&str] = &[
    "RETURN", "LOG", "NFLOG", "ULOG", "MARK", "CONNMARK", "CT", "NOTRACK", "TCPMSS", "TRACE",
    "QUEUE", "NFQUEUE", "AUDIT", "SET",
];

/// Options whose value is irrelevant to the accept surface
const IGNORED_VALUE_OPTIONS: &[&str] = &[
    "-m",
    "--match",
    "--reject-with",
    "--log-prefix",
    "--log-level",
    "--limit",
    "--limit-burst",
];

/// Splits a line into words, keeping double-quoted strings together.
fn tokenize(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    let mut has_token = false;
    let mut chars = line.chars();

    while let Some(c) = chars.next() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                has_token = true;
            }
            '\\' if in_quotes => {
                if let Some(escaped) = chars.next() {
                    current.push(escaped);
                }
            }
            c if c.is_whitespace() && !in_quotes => {
                if has_token {
                    tokens.push(std::mem::take(&mut current));
                    has_token = false;
                }
            }
            c => {
                current.push(c);
                has_token = true;
            }
        }
    }
    if has_token {
        tokens.push(current);
    }
    tokens
}

/// What became of one `-A` line
enum Parsed {
    Rules(Vec<FirewallRule>),
    /// Dropped on purpose (loopback, conntrack, no target)
    Filtered(&'static str),
    /// Cannot be represented; reported as a warning
    Unsupported(String),
}

struct Parser {
    discovery: Discovery,
}

impl Parser {
    fn chain_mut(&mut self, name: &str) -> Option<&mut FirewallChain> {
        self.discovery.chains.iter_mut().find(|c| c.name == name)
    }

    fn declare(&mut self, line: usize, name: &str, policy: Policy) -> Result<()> {
        validate_chain_name(name).map_err(|message| Error::Parse { line, message })?;
        if let Some(chain) = self.chain_mut(name) {
            chain.policy = policy;
        } else {
            self.discovery.chains.push(FirewallChain::new(name, policy));
        }
        Ok(())
    }

    fn is_declared(&self, name: &str) -> bool {
        self.discovery.chains.iter().any(|c| c.name == name)
    }

    fn parse_line(&mut self, line_no: usize, tokens: &[String]) -> Result<()> {
        let parse_err = |message: String| Error::Parse {
            line: line_no,
            message,
        };

        match tokens[0].as_str() {
            "-P" | "--policy" => {
                let [_, chain, policy, ..] = tokens else {
                    return Err(parse_err("-P needs a chain and a policy".to_string()));
                };
                self.declare(line_no, chain, Policy::from(policy.as_str()))
            }
            "-N" | "--new-chain" => {
                let Some(chain) = tokens.get(1) else {
                    return Err(parse_err("-N needs a chain name".to_string()));
                };
                self.declare(line_no, chain, Policy::Drop)
            }
            "-A" | "--append" => {
                let Some(chain) = tokens.get(1) else {
                    return Err(parse_err("-A needs a chain name".to_string()));
                };
                if !self.is_declared(chain) {
                    return Err(parse_err(format!("rule appended to undeclared chain '{chain}'")));
                }
                match self.parse_rule(line_no, &tokens[2..])? {
                    Parsed::Rules(rules) => {
                        if let Some(target) = self.chain_mut(chain) {
                            target.rules.extend(rules);
                        }
                    }
                    Parsed::Filtered(reason) => {
                        debug!("Line {}: filtered {} rule", line_no, reason);
                    }
                    Parsed::Unsupported(message) => self.discovery.warn(line_no, message),
                }
                Ok(())
            }
            declaration if declaration.starts_with(':') => {
                let name = &declaration[1..];
                let policy = match tokens.get(1).map(String::as_str) {
                    Some("-") | None => Policy::Drop,
                    Some(policy) => Policy::from(policy),
                };
                self.declare(line_no, name, policy)
            }
            other => Err(parse_err(format!("unsupported command '{other}'"))),
        }
    }

    fn parse_rule(&self, line_no: usize, tokens: &[String]) -> Result<Parsed> {
        let mut protocol = Protocol::All;
        let mut source = ANY_SOURCE.to_string();
        let mut dports = vec![PortRange::ALL];
        let mut target = None;
        let mut name = String::new();

        let mut iter = tokens.iter();
        while let Some(option) = iter.next() {
            let option = option.as_str();
            if option == "!" {
                return Ok(Parsed::Unsupported("negated match not supported".to_string()));
            }
            if option == "--syn" {
                continue;
            }

            let mut value = || {
                iter.next().map(String::as_str).ok_or_else(|| Error::Parse {
                    line: line_no,
                    message: format!("option '{option}' needs a value"),
                })
            };

            match option {
                "-p" | "--protocol" => {
                    let proto = value()?;
                    match proto.parse::<Protocol>() {
                        Ok(parsed) => protocol = parsed,
                        Err(_) => {
                            return Ok(Parsed::Unsupported(format!("protocol '{proto}' not supported")));
                        }
                    }
                }
                "-s" | "--source" => source = normalize_source(value()?),
                "-d" | "--destination" => {
                    let destination = value()?;
                    if destination != ANY_SOURCE {
                        return Ok(Parsed::Unsupported(format!(
                            "destination match '{destination}' not supported"
                        )));
                    }
                }
                "-o" | "--out-interface" => {
                    if value()? == "lo" {
                        return Ok(Parsed::Filtered("loopback"));
                    }
                }
                "-i" | "--in-interface" => {
                    let iface = value()?;
                    if iface == "lo" {
                        return Ok(Parsed::Filtered("loopback"));
                    }
                    return Ok(Parsed::Unsupported(format!(
                        "interface match '{iface}' not supported"
                    )));
                }
                "--dport" | "--destination-port" => {
                    let (start, end) = parse_port_spec(value()?)
                        .map_err(|message| Error::Parse { line: line_no, message })?;
                    dports = vec![PortRange { start, end }];
                }
                "--dports" | "--destination-ports" => {
                    dports = value()?
                        .split(',')
                        .map(|spec| {
                            parse_port_spec(spec)
                                .map(|(start, end)| PortRange { start, end })
                                .map_err(|message| Error::Parse { line: line_no, message })
                        })
                        .collect::<Result<_>>()?;
                }
                "--sport" | "--source-port" | "--sports" | "--source-ports" => {
                    return Ok(Parsed::Unsupported("source port match not supported".to_string()));
                }
                "--ctstate" | "--state" => {
                    let states = value()?;
                    if states
                        .split(',')
                        .any(|s| s == "ESTABLISHED" || s == "RELATED")
                    {
                        return Ok(Parsed::Filtered("connection tracking"));
                    }
                }
                "--comment" => name = crate::validators::sanitize_label(value()?),
                "-j" | "--jump" | "-g" | "--goto" => target = Some(value()?.to_string()),
                ignored if IGNORED_VALUE_OPTIONS.contains(&ignored) => {
                    value()?;
                }
                unknown => {
                    return Ok(Parsed::Unsupported(format!("match option '{unknown}' not supported")));
                }
            }
        }

        let Some(target) = target else {
            return Ok(Parsed::Filtered("target-less"));
        };

        let target = match target.as_str() {
            "ACCEPT" => Target::Accept,
            "DROP" | "REJECT" => Target::Drop,
            chain if self.is_declared(chain) => Target::Jump(chain.to_string()),
            other if NON_TERMINAL_TARGETS.contains(&other) => {
                return Ok(Parsed::Unsupported(format!("target '{other}' not supported")));
            }
            // Undeclared jump targets are passed through; flattening reports them
            chain => Target::Jump(chain.to_string()),
        };

        Ok(Parsed::Rules(
            dports
                .into_iter()
                .map(|dports| FirewallRule {
                    name: name.clone(),
                    target: target.clone(),
                    protocol,
                    source: source.clone(),
                    dports,
                })
                .collect(),
        ))
    }
}

/// Parses `iptables -S` or `iptables-save` output into a chain universe.
///
/// # Errors
///
/// Returns [`Error::Parse`] for unknown commands, rules appended to
/// undeclared chains, missing option values, and malformed ports.
pub fn parse(text: &str) -> Result<Discovery> {
    let mut parser = Parser {
        discovery: Discovery::default(),
    };
    let mut in_filter = true;

    for (index, line) in text.lines().enumerate() {
        let line_no = index + 1;
        let line = line.trim();

        if line.is_empty() || line.starts_with('#') || line == "COMMIT" {
            continue;
        }
        if let Some(table) = line.strip_prefix('*') {
            in_filter = table == "filter";
            continue;
        }
        if !in_filter {
            continue;
        }

        let tokens = tokenize(line);
        if tokens.is_empty() {
            continue;
        }
        parser.parse_line(line_no, &tokens)?;
    }

    Ok(parser.discovery)
}
