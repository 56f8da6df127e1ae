//! Rule intersection primitives
//!
//! Each function computes the overlap of two rules along one dimension
//! (protocol, source network, destination ports). No overlap is reported as
//! `None`, never as an error; only a malformed or non-IPv4 source is an error.

use crate::core::error::{Error, Result};
use crate::core::model::{FirewallRule, PortRange, Protocol, Target};
use ipnetwork::{IpNetwork, Ipv4Network};

/// Intersects two protocol matches. `all` absorbs the other side.
///
/// # Examples
///
/// ```
/// use chainfold::core::intersect::intersect_protocol;
/// use chainfold::core::model::Protocol;
///
/// assert_eq!(intersect_protocol(Protocol::All, Protocol::Tcp), Some(Protocol::Tcp));
/// assert_eq!(intersect_protocol(Protocol::Tcp, Protocol::Udp), None);
/// ```
pub fn intersect_protocol(p1: Protocol, p2: Protocol) -> Option<Protocol> {
    match (p1, p2) {
        (a, b) if a == b => Some(a),
        (Protocol::All, other) | (other, Protocol::All) => Some(other),
        _ => None,
    }
}

fn parse_ipv4(source: &str) -> Result<Ipv4Network> {
    match source.parse::<IpNetwork>() {
        Ok(IpNetwork::V4(net)) => Ok(net),
        Ok(IpNetwork::V6(_)) => Err(Error::UnsupportedAddressFamily(source.to_string())),
        Err(e) => Err(Error::InvalidSource {
            value: source.to_string(),
            reason: e.to_string(),
        }),
    }
}

/// Intersects two IPv4 source CIDRs.
///
/// Textually equal inputs are returned without parsing. Otherwise the more
/// specific network is returned when one contains the other, and `None` when
/// they are disjoint. Containment is tested against each side's address as
/// written, so `10.1.2.3/16` counts as the address `10.1.2.3`.
///
/// # Errors
///
/// Returns [`Error::InvalidSource`] if either side does not parse and
/// [`Error::UnsupportedAddressFamily`] if either side is IPv6.
pub fn intersect_source(s1: &str, s2: &str) -> Result<Option<String>> {
    if s1 == s2 {
        return Ok(Some(s1.to_string()));
    }

    let net1 = parse_ipv4(s1)?;
    let net2 = parse_ipv4(s2)?;

    let net1_has_ip2 = net1.contains(net2.ip());
    let net2_has_ip1 = net2.contains(net1.ip());

    let overlap = match (net1_has_ip2, net2_has_ip1) {
        (true, true) => {
            if net2.prefix() > net1.prefix() {
                Some(s2)
            } else {
                Some(s1)
            }
        }
        (true, false) => Some(s2),
        (false, true) => Some(s1),
        (false, false) => None,
    };

    Ok(overlap.map(str::to_string))
}

/// Intersects two inclusive port ranges; `None` when they do not overlap.
///
/// # Examples
///
/// ```
/// use chainfold::core::intersect::intersect_dports;
/// use chainfold::core::model::PortRange;
///
/// let a = PortRange { start: 1, end: 100 };
/// let b = PortRange { start: 50, end: 200 };
/// assert_eq!(intersect_dports(&a, &b), Some(PortRange { start: 50, end: 100 }));
/// assert_eq!(intersect_dports(&PortRange::single(10), &PortRange::single(20)), None);
/// ```
pub fn intersect_dports(d1: &PortRange, d2: &PortRange) -> Option<PortRange> {
    let start = d1.start.max(d2.start);
    let end = d1.end.min(d2.end);
    (start <= end).then_some(PortRange { start, end })
}

/// Intersects two rules along every dimension.
///
/// The result is an ACCEPT rule labelled with `r2`'s name (the rule being
/// visited when `r1` is the accumulated restriction), or `None` when any
/// dimension is empty.
///
/// # Errors
///
/// Propagates source parse errors from [`intersect_source`].
pub fn intersect_rules(r1: &FirewallRule, r2: &FirewallRule) -> Result<Option<FirewallRule>> {
    let Some(protocol) = intersect_protocol(r1.protocol, r2.protocol) else {
        return Ok(None);
    };

    let Some(source) = intersect_source(&r1.source, &r2.source)? else {
        return Ok(None);
    };

    let Some(dports) = intersect_dports(&r1.dports, &r2.dports) else {
        return Ok(None);
    };

    Ok(Some(FirewallRule {
        name: r2.name.clone(),
        target: Target::Accept,
        protocol,
        source,
        dports,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_protocol_same_and_wildcard() {
        assert_eq!(intersect_protocol(Protocol::Tcp, Protocol::Tcp), Some(Protocol::Tcp));
        assert_eq!(intersect_protocol(Protocol::Udp, Protocol::All), Some(Protocol::Udp));
        assert_eq!(intersect_protocol(Protocol::All, Protocol::All), Some(Protocol::All));
        assert_eq!(intersect_protocol(Protocol::Tcp, Protocol::Icmp), None);
    }

    #[test]
    fn test_source_nested() {
        assert_eq!(
            intersect_source("10.0.0.0/8", "10.1.0.0/16").unwrap(),
            Some("10.1.0.0/16".to_string())
        );
        assert_eq!(
            intersect_source("10.1.0.0/16", "10.0.0.0/8").unwrap(),
            Some("10.1.0.0/16".to_string())
        );
    }

    #[test]
    fn test_source_any_absorbs() {
        assert_eq!(
            intersect_source("0.0.0.0/0", "192.168.1.0/24").unwrap(),
            Some("192.168.1.0/24".to_string())
        );
    }

    #[test]
    fn test_source_reciprocal_picks_longer_prefix() {
        // Same base address, both networks contain the other's address
        assert_eq!(
            intersect_source("10.0.0.0/8", "10.0.0.0/16").unwrap(),
            Some("10.0.0.0/16".to_string())
        );
        assert_eq!(
            intersect_source("10.0.0.0/24", "10.0.0.0/16").unwrap(),
            Some("10.0.0.0/24".to_string())
        );
    }

    #[test]
    fn test_source_reciprocal_tie_picks_first() {
        // Same network written with different host bits
        assert_eq!(
            intersect_source("10.0.0.1/24", "10.0.0.2/24").unwrap(),
            Some("10.0.0.1/24".to_string())
        );
    }

    #[test]
    fn test_source_disjoint() {
        assert_eq!(intersect_source("10.0.0.0/8", "192.168.0.0/16").unwrap(), None);
    }

    #[test]
    fn test_source_equal_text_skips_parsing() {
        assert_eq!(
            intersect_source("whatever", "whatever").unwrap(),
            Some("whatever".to_string())
        );
    }

    #[test]
    fn test_source_invalid() {
        let err = intersect_source("not-a-cidr", "10.0.0.0/8").unwrap_err();
        assert!(matches!(err, Error::InvalidSource { ref value, .. } if value == "not-a-cidr"));
    }

    #[test]
    fn test_source_ipv6_rejected() {
        let err = intersect_source("2001:db8::/32", "10.0.0.0/8").unwrap_err();
        assert!(matches!(err, Error::UnsupportedAddressFamily(_)));
    }

    #[test]
    fn test_dports() {
        let r = intersect_dports(&PortRange { start: 1, end: 100 }, &PortRange { start: 50, end: 200 });
        assert_eq!(r, Some(PortRange { start: 50, end: 100 }));
        let r = intersect_dports(&PortRange { start: 1, end: 10 }, &PortRange { start: 20, end: 30 });
        assert_eq!(r, None);
        // Touching ranges share one port
        let r = intersect_dports(&PortRange { start: 1, end: 20 }, &PortRange { start: 20, end: 30 });
        assert_eq!(r, Some(PortRange::single(20)));
    }

    #[test]
    fn test_rules_protocol_mismatch_is_none() {
        let a = FirewallRule::accept(Protocol::Tcp, "0.0.0.0/0", PortRange::ALL);
        let b = FirewallRule::accept(Protocol::Udp, "0.0.0.0/0", PortRange::ALL);
        assert_eq!(intersect_rules(&a, &b).unwrap(), None);
    }

    #[test]
    fn test_rules_composes_all_dimensions() {
        let incoming = FirewallRule::accept(Protocol::All, "10.0.0.0/8", PortRange::new(1, 1024).unwrap());
        let rule = FirewallRule::accept(Protocol::Tcp, "10.20.0.0/16", PortRange::new(443, 8443).unwrap())
            .with_name("web")
            .with_target(Target::Jump("WEB".to_string()));

        let result = intersect_rules(&incoming, &rule).unwrap().unwrap();
        assert_eq!(result.target, Target::Accept);
        assert_eq!(result.protocol, Protocol::Tcp);
        assert_eq!(result.source, "10.20.0.0/16");
        assert_eq!(result.dports, PortRange::new(443, 1024).unwrap());
        assert_eq!(result.name, "web");
    }

    #[test]
    fn test_rules_source_error_propagates() {
        let a = FirewallRule::any();
        let b = FirewallRule::accept(Protocol::Tcp, "300.0.0.0/8", PortRange::ALL);
        assert!(intersect_rules(&a, &b).is_err());
    }

    #[test]
    fn test_rules_protocol_checked_before_source() {
        // A bad source never gets parsed if protocols already disagree
        let a = FirewallRule::accept(Protocol::Tcp, "bogus", PortRange::ALL);
        let b = FirewallRule::accept(Protocol::Udp, "10.0.0.0/8", PortRange::ALL);
        assert_eq!(intersect_rules(&a, &b).unwrap(), None);
    }
}
