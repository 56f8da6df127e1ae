#[cfg(test)]
mod tests_impl {
    use crate::core::error::Error;
    use crate::core::flatten::{Flattener, flatten_chain};
    use crate::core::intersect::{intersect_dports, intersect_protocol, intersect_rules, intersect_source};
    use crate::core::model::{FirewallRule, PortRange, Protocol};
    use crate::core::test_helpers::{chain, host_universe, jump, rule};

    #[test]
    fn test_protocol_wildcard_absorption() {
        assert_eq!(intersect_protocol(Protocol::All, Protocol::Tcp), Some(Protocol::Tcp));
        assert_eq!(intersect_protocol(Protocol::Tcp, Protocol::Udp), None);
    }

    #[test]
    fn test_port_range_intersection() {
        assert_eq!(
            intersect_dports(&PortRange { start: 1, end: 100 }, &PortRange { start: 50, end: 200 }),
            Some(PortRange { start: 50, end: 100 })
        );
        assert_eq!(
            intersect_dports(&PortRange { start: 1, end: 10 }, &PortRange { start: 20, end: 30 }),
            None
        );
    }

    #[test]
    fn test_source_intersection_cases() {
        assert_eq!(
            intersect_source("10.0.0.0/8", "10.1.0.0/16").unwrap().as_deref(),
            Some("10.1.0.0/16")
        );
        assert_eq!(intersect_source("10.0.0.0/8", "192.168.0.0/16").unwrap(), None);
        assert!(intersect_source("not-a-cidr", "10.0.0.0/8").is_err());
    }

    #[test]
    fn test_flatten_accept_policy_chain() {
        let chains = vec![chain("X", "ACCEPT", vec![])];
        let flat = flatten_chain("X", &chains, None).unwrap();
        assert_eq!(flat.chain.rules, vec![rule("ACCEPT", "all", "0.0.0.0/0", (1, 65535))]);
    }

    #[test]
    fn test_flatten_single_accept_rule() {
        let entry = rule("ACCEPT", "tcp", "10.0.0.0/8", (80, 80));
        let chains = vec![chain("X", "DROP", vec![entry.clone()])];
        let flat = flatten_chain("X", &chains, None).unwrap();
        assert_eq!(flat.chain.rules, vec![entry]);
    }

    #[test]
    fn test_flatten_chain_not_found() {
        let chains = host_universe();
        assert!(matches!(
            flatten_chain("nonexistent", &chains, None),
            Err(Error::ChainNotDefined(_))
        ));
    }

    #[test]
    fn test_flatten_jump_composition() {
        let chains = vec![
            chain("A", "DROP", vec![rule("B", "tcp", "0.0.0.0/0", (1, 65535))]),
            chain("B", "DROP", vec![rule("ACCEPT", "tcp", "10.0.0.0/8", (22, 22))]),
        ];
        let flat = flatten_chain("A", &chains, None).unwrap();
        assert_eq!(flat.chain.rules, vec![rule("ACCEPT", "tcp", "10.0.0.0/8", (22, 22))]);
    }

    #[test]
    fn test_flatten_custom_policy_rejected() {
        let chains = vec![chain("X", "CUSTOM", vec![])];
        assert!(matches!(
            flatten_chain("X", &chains, None),
            Err(Error::UnsupportedPolicy { .. })
        ));
    }

    #[test]
    fn test_custom_policy_below_jump_is_warning() {
        let chains = vec![
            chain("A", "DROP", vec![jump("B")]),
            chain("B", "QUEUE", vec![]),
        ];
        let flat = flatten_chain("A", &chains, None).unwrap();
        assert!(flat.is_degraded());
        assert!(matches!(flat.warnings[0].error, Error::UnsupportedPolicy { .. }));
    }

    #[test]
    fn test_self_jump_records_cycle() {
        let chains = vec![chain(
            "A",
            "DROP",
            vec![jump("A"), rule("ACCEPT", "tcp", "0.0.0.0/0", (22, 22))],
        )];
        let flat = flatten_chain("A", &chains, None).unwrap();
        assert_eq!(flat.chain.rules.len(), 1);
        assert!(matches!(
            &flat.warnings[0].error,
            Error::ChainCycleDetected { name, .. } if name == "A"
        ));
    }

    #[test]
    fn test_host_universe_surface() {
        let chains = host_universe();
        let flat = flatten_chain("INPUT", &chains, None).unwrap();
        assert!(flat.warnings.is_empty());
        assert_eq!(
            flat.chain.rules,
            vec![
                rule("ACCEPT", "tcp", "10.0.0.0/8", (22, 22)),
                rule("ACCEPT", "tcp", "0.0.0.0/0", (80, 80)),
                rule("ACCEPT", "tcp", "0.0.0.0/0", (443, 443)),
                rule("ACCEPT", "udp", "192.168.0.0/16", (53, 53)),
            ]
        );
    }

    #[test]
    fn test_incoming_restriction_applies_throughout() {
        let chains = host_universe();
        let incoming = rule("ACCEPT", "tcp", "10.5.0.0/16", (1, 1024));
        let flat = Flattener::new(&chains)
            .unwrap()
            .flatten("INPUT", Some(&incoming))
            .unwrap();
        // udp/53 is excluded by protocol, every tcp rule narrows to 10.5.0.0/16
        assert_eq!(flat.chain.rules.len(), 3);
        assert!(flat.chain.rules.iter().all(|r| r.source == "10.5.0.0/16"));
    }

    #[test]
    fn test_flattener_shared_across_threads() {
        let chains = host_universe();
        let flattener = Flattener::new(&chains).unwrap();
        let flattener = &flattener;
        std::thread::scope(|s| {
            let handles: Vec<_> = (0..4)
                .map(|_| s.spawn(move || flattener.flatten("INPUT", None).unwrap().chain.rules.len()))
                .collect();
            for handle in handles {
                assert_eq!(handle.join().unwrap(), 4);
            }
        });
    }

    #[test]
    fn test_rule_intersection_reflexive() {
        let r = rule("ACCEPT", "udp", "172.16.0.0/12", (1000, 2000));
        assert_eq!(intersect_rules(&r, &r).unwrap(), Some(r));
        let any = FirewallRule::any();
        assert_eq!(intersect_rules(&any, &any).unwrap(), Some(any));
    }
}

#[cfg(test)]
mod property_tests {
    use crate::core::flatten::flatten_chain;
    use crate::core::intersect::{intersect_dports, intersect_protocol, intersect_rules, intersect_source};
    use crate::core::model::{FirewallChain, FirewallRule, Policy, PortRange, Protocol, Target};
    use proptest::prelude::*;

    fn arb_protocol() -> impl Strategy<Value = Protocol> {
        prop_oneof![
            Just(Protocol::All),
            Just(Protocol::Tcp),
            Just(Protocol::Udp),
            Just(Protocol::Icmp),
        ]
    }

    prop_compose! {
        fn arb_port_range()(start in 1u16..=65535, end in 1u16..=65535) -> PortRange {
            PortRange {
                start: start.min(end),
                end: start.max(end),
            }
        }
    }

    prop_compose! {
        fn arb_cidr()(a in 0u8..=255, b in 0u8..=255, prefix in 0u8..=32) -> String {
            format!("{a}.{b}.0.0/{prefix}")
        }
    }

    prop_compose! {
        fn arb_accept_rule()(
            protocol in arb_protocol(),
            source in arb_cidr(),
            dports in arb_port_range(),
        ) -> FirewallRule {
            FirewallRule::accept(protocol, source, dports)
        }
    }

    /// Chains c0..cN where each rule is ACCEPT, DROP, or a jump to any chain
    fn arb_universe() -> impl Strategy<Value = Vec<FirewallChain>> {
        (1usize..5).prop_flat_map(|n| {
            let rule = (arb_accept_rule(), 0usize..(n + 2)).prop_map(move |(rule, pick)| {
                let target = match pick {
                    0 => Target::Accept,
                    1 => Target::Drop,
                    chain => Target::Jump(format!("c{}", chain - 2)),
                };
                rule.with_target(target)
            });
            let policy = prop_oneof![Just(Policy::Accept), Just(Policy::Drop)];
            proptest::collection::vec((policy, proptest::collection::vec(rule, 0..4)), n).prop_map(
                |chains| {
                    chains
                        .into_iter()
                        .enumerate()
                        .map(|(i, (policy, rules))| FirewallChain {
                            name: format!("c{i}"),
                            policy,
                            rules,
                        })
                        .collect()
                },
            )
        })
    }

    proptest! {
        #[test]
        fn test_protocol_intersection_symmetric(a in arb_protocol(), b in arb_protocol()) {
            prop_assert_eq!(intersect_protocol(a, b), intersect_protocol(b, a));
        }

        #[test]
        fn test_dports_result_within_both(a in arb_port_range(), b in arb_port_range()) {
            match intersect_dports(&a, &b) {
                Some(r) => {
                    prop_assert!(r.start <= r.end);
                    prop_assert!(r.start >= a.start && r.start >= b.start);
                    prop_assert!(r.end <= a.end && r.end <= b.end);
                }
                None => prop_assert!(a.end < b.start || b.end < a.start),
            }
        }

        #[test]
        fn test_source_intersection_never_panics(a in arb_cidr(), b in arb_cidr()) {
            prop_assert!(intersect_source(&a, &b).is_ok());
        }

        #[test]
        fn test_source_intersection_returns_an_input(a in arb_cidr(), b in arb_cidr()) {
            if let Some(s) = intersect_source(&a, &b).unwrap() {
                prop_assert!(s == a || s == b);
            }
        }

        #[test]
        fn test_rule_intersection_reflexive(r in arb_accept_rule()) {
            prop_assert_eq!(intersect_rules(&r, &r).unwrap(), Some(r));
        }

        #[test]
        fn test_flatten_terminates_and_only_accepts(chains in arb_universe()) {
            let flat = flatten_chain("c0", &chains, None).unwrap();
            prop_assert_eq!(flat.chain.policy, Policy::Drop);
            prop_assert!(flat.chain.rules.iter().all(|r| r.target == Target::Accept));
            prop_assert!(flat.chain.rules.iter().all(|r| r.dports.start <= r.dports.end));
        }
    }
}
