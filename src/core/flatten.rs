//! Chain flattening
//!
//! Resolves a chain and everything it jumps to into one chain with policy
//! DROP and a list of ACCEPT rules covering the same accept surface.
//!
//! # Semantics
//!
//! Every rule of a DROP-policy chain is visited; the result is the union of
//! all ACCEPT-reachable rules intersected with the restriction carried in by
//! the jump that led to the chain. There is no first-match short-circuit: a
//! DROP rule contributes nothing, and the order of ACCEPT rules does not
//! change the union. This differs from iptables only when an earlier DROP
//! shadows a later ACCEPT, which the model does not capture.
//!
//! # Failure policy
//!
//! Structural problems with the chain being flattened (not defined, custom
//! policy, unparseable source on a direct ACCEPT rule) fail the call. Any
//! error raised while resolving a jump is logged, recorded as a
//! [`FlattenWarning`], and the jump contributes nothing.
//!
//! # Example
//!
//! ```
//! use chainfold::core::flatten::flatten_chain;
//! use chainfold::core::model::{FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};
//!
//! let chains = vec![
//!     FirewallChain::new("A", Policy::Drop).with_rule(
//!         FirewallRule::accept(Protocol::Tcp, "0.0.0.0/0", PortRange::ALL)
//!             .with_target(Target::Jump("B".into())),
//!     ),
//!     FirewallChain::new("B", Policy::Drop)
//!         .with_rule(FirewallRule::accept(Protocol::Tcp, "10.0.0.0/8", PortRange::single(22))),
//! ];
//!
//! let flat = flatten_chain("A", &chains, None).unwrap();
//! assert_eq!(flat.chain.rules.len(), 1);
//! assert_eq!(flat.chain.rules[0].source, "10.0.0.0/8");
//! assert!(flat.warnings.is_empty());
//! ```

use crate::core::error::{Error, Result};
use crate::core::intersect::intersect_rules;
use crate::core::model::{FirewallChain, FirewallRule, Policy, Target};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info, warn};

/// A jump that was skipped because resolving it failed
#[derive(Debug)]
pub struct FlattenWarning {
    /// Chain containing the jump rule
    pub chain: String,
    /// Position of the jump rule within `chain`
    pub rule_index: usize,
    /// Chain the rule jumps to
    pub target: String,
    pub error: Error,
}

impl fmt::Display for FlattenWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}[{}] -> {}: {}",
            self.chain, self.rule_index, self.target, self.error
        )
    }
}

/// Result of flattening a chain
#[derive(Debug)]
pub struct Flattened {
    /// Single chain, policy DROP, ACCEPT rules only
    pub chain: FirewallChain,
    /// Jump branches skipped along the way
    pub warnings: Vec<FlattenWarning>,
}

impl Flattened {
    /// Returns `true` if any jump branch was skipped
    pub fn is_degraded(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn into_chain(self) -> FirewallChain {
        self.chain
    }

    /// Returns the chain only if no jump branch was skipped.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegradedResolution`] when there are warnings.
    pub fn into_strict(self) -> Result<FirewallChain> {
        if self.is_degraded() {
            return Err(Error::DegradedResolution {
                chain: self.chain.name,
                warnings: self.warnings.len(),
            });
        }
        Ok(self.chain)
    }
}

/// Resolved sub-chains of one flatten call, keyed by chain, restriction, and
/// the ancestors on the path that the chain can jump back to
type Memo = HashMap<(String, FirewallRule, Vec<String>), Vec<FirewallRule>>;

/// Read-only index over a chain universe
///
/// The universe is borrowed immutably, so one `Flattener` can serve any
/// number of flatten calls, including from several threads.
#[derive(Debug, Clone)]
pub struct Flattener<'a> {
    chains: HashMap<&'a str, &'a FirewallChain>,
    /// Chains reachable through jumps from each chain, itself included
    reach: HashMap<&'a str, HashSet<&'a str>>,
}

impl<'a> Flattener<'a> {
    /// Indexes `chains` by name.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateChain`] if two chains share a name.
    pub fn new(chains: &'a [FirewallChain]) -> Result<Self> {
        let mut index = HashMap::with_capacity(chains.len());
        for chain in chains {
            if index.insert(chain.name.as_str(), chain).is_some() {
                return Err(Error::DuplicateChain(chain.name.clone()));
            }
        }

        let reach = index
            .keys()
            .map(|&name| (name, reachable(&index, name)))
            .collect();

        Ok(Self {
            chains: index,
            reach,
        })
    }

    /// Returns `true` if `name` is defined in the universe.
    pub fn contains(&self, name: &str) -> bool {
        self.chains.contains_key(name)
    }

    /// Flattens `name`, restricted by `incoming` (everything when `None`).
    ///
    /// # Errors
    ///
    /// Fails if `name` is not defined, has a custom policy, or one of its
    /// direct ACCEPT rules has an invalid source. Errors below a jump are
    /// reported in [`Flattened::warnings`] instead.
    pub fn flatten(&self, name: &str, incoming: Option<&FirewallRule>) -> Result<Flattened> {
        let any = FirewallRule::any();
        let incoming = incoming.unwrap_or(&any);

        let mut memo = Memo::new();
        let flat = self.resolve(name, incoming, &[], &mut memo)?;

        info!(
            "Flattened chain '{}' into {} rule(s) ({} skipped jump(s))",
            name,
            flat.chain.rules.len(),
            flat.warnings.len()
        );
        Ok(flat)
    }

    /// Like [`Flattener::flatten`], but any skipped jump fails the call.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DegradedResolution`] when the lenient result would
    /// carry warnings.
    pub fn flatten_strict(
        &self,
        name: &str,
        incoming: Option<&FirewallRule>,
    ) -> Result<FirewallChain> {
        self.flatten(name, incoming)?.into_strict()
    }

    fn resolve(
        &self,
        name: &str,
        incoming: &FirewallRule,
        path: &[String],
        memo: &mut Memo,
    ) -> Result<Flattened> {
        let chain = self
            .chains
            .get(name)
            .ok_or_else(|| Error::ChainNotDefined(name.to_string()))?;

        if path.iter().any(|visited| visited == name) {
            let mut path = path.to_vec();
            path.push(name.to_string());
            return Err(Error::ChainCycleDetected {
                name: name.to_string(),
                path,
            });
        }

        let mut path = path.to_vec();
        path.push(name.to_string());

        debug!(chain = name, depth = path.len(), "Resolving chain");

        let mut result = Flattened {
            chain: FirewallChain::new(name, Policy::Drop),
            warnings: Vec::new(),
        };
        let mut seen = HashSet::new();

        match &chain.policy {
            Policy::Accept => {
                result
                    .chain
                    .rules
                    .push(incoming.clone().with_target(Target::Accept));
            }
            Policy::Drop => {
                for (index, rule) in chain.rules.iter().enumerate() {
                    match &rule.target {
                        Target::Accept => {
                            if let Some(accepted) = intersect_rules(incoming, rule)?
                                && seen.insert(accepted.clone())
                            {
                                result.chain.rules.push(accepted);
                            }
                        }
                        Target::Drop => {}
                        Target::Jump(target) => {
                            match self.resolve_jump(target, incoming, rule, &path, memo) {
                                Ok(Some(sub)) => {
                                    for accepted in sub.chain.rules {
                                        if seen.insert(accepted.clone()) {
                                            result.chain.rules.push(accepted);
                                        }
                                    }
                                    result.warnings.extend(sub.warnings);
                                }
                                Ok(None) => {}
                                Err(error) => {
                                    warn!(
                                        "Skipping jump {}[{}] -> {}: {}",
                                        name, index, target, error
                                    );
                                    result.warnings.push(FlattenWarning {
                                        chain: name.to_string(),
                                        rule_index: index,
                                        target: target.clone(),
                                        error,
                                    });
                                }
                            }
                        }
                    }
                }
            }
            Policy::Custom(policy) => {
                return Err(Error::UnsupportedPolicy {
                    chain: name.to_string(),
                    policy: policy.clone(),
                });
            }
        }

        Ok(result)
    }

    /// Resolves the chain a jump leads to, reusing an earlier resolution of
    /// the same chain under the same restriction.
    ///
    /// A reused resolution contributes its rules only; its warnings were
    /// already recorded the first time.
    fn resolve_jump(
        &self,
        target: &str,
        incoming: &FirewallRule,
        rule: &FirewallRule,
        path: &[String],
        memo: &mut Memo,
    ) -> Result<Option<Flattened>> {
        let Some(restriction) = intersect_rules(incoming, rule)? else {
            return Ok(None);
        };

        // Only ancestors the target can reach affect cycle detection below it
        let mut ancestors: Vec<String> = self
            .reach
            .get(target)
            .map(|reach| {
                path.iter()
                    .filter(|p| reach.contains(p.as_str()))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        ancestors.sort();
        let key = (target.to_string(), restriction, ancestors);

        if let Some(rules) = memo.get(&key) {
            debug!(chain = target, "Reusing resolved chain");
            return Ok(Some(Flattened {
                chain: FirewallChain {
                    name: target.to_string(),
                    policy: Policy::Drop,
                    rules: rules.clone(),
                },
                warnings: Vec::new(),
            }));
        }

        let sub = self.resolve(target, &key.1, path, memo)?;
        memo.insert(key, sub.chain.rules.clone());
        Ok(Some(sub))
    }
}

/// Collects every chain reachable from `start` through jump targets.
fn reachable<'a>(index: &HashMap<&'a str, &'a FirewallChain>, start: &'a str) -> HashSet<&'a str> {
    let mut seen = HashSet::from([start]);
    let mut stack = vec![start];
    while let Some(name) = stack.pop() {
        let Some(&chain) = index.get(name) else {
            continue;
        };
        for rule in &chain.rules {
            if let Target::Jump(target) = &rule.target
                && seen.insert(target.as_str())
            {
                stack.push(target.as_str());
            }
        }
    }
    seen
}

/// Flattens `name` within `chains` in one call.
///
/// # Errors
///
/// See [`Flattener::new`] and [`Flattener::flatten`].
pub fn flatten_chain(
    name: &str,
    chains: &[FirewallChain],
    incoming: Option<&FirewallRule>,
) -> Result<Flattened> {
    Flattener::new(chains)?.flatten(name, incoming)
}
