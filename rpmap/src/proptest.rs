// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Property-based tests for prefixes and RP selection using proptest

#[cfg(test)]
mod proptest {
    use crate::config::RpConfig;
    use crate::map::RpMap;
    use crate::resolver::Resolver;
    use crate::types::{
        AddressFamily, Prefix, Prefix4, Prefix6, PrefixListEntry, RpScope,
    };
    use proptest::prelude::*;
    use rp_common::log::discard_logger;
    use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

    fn ipv4_prefix_strategy() -> impl Strategy<Value = Prefix4> {
        (any::<u32>(), 0u8..=32u8).prop_map(|(addr_bits, length)| {
            Prefix4::new(Ipv4Addr::from(addr_bits), length)
        })
    }

    fn ipv6_prefix_strategy() -> impl Strategy<Value = Prefix6> {
        (any::<u128>(), 0u8..=128u8).prop_map(|(addr_bits, length)| {
            Prefix6::new(Ipv6Addr::from(addr_bits), length)
        })
    }

    // Multicast group inside 239.0.0.0/8
    fn group_strategy() -> impl Strategy<Value = Ipv4Addr> {
        any::<u32>().prop_map(|bits| {
            Ipv4Addr::from_bits(0xef00_0000 | (bits & 0x00ff_ffff))
        })
    }

    fn single_list(config: &mut RpConfig, name: &str, prefix: Prefix4) {
        config
            .prefix_lists
            .replace(
                name,
                AddressFamily::Ipv4,
                [PrefixListEntry::permit(10, Prefix::V4(prefix))],
            )
            .expect("replace");
    }

    proptest! {
        /// Property: host bits are always unset after construction
        #[test]
        fn prop_ipv4_host_bits_always_unset(prefix in ipv4_prefix_strategy()) {
            prop_assert!(
                prefix.host_bits_are_unset(),
                "IPv4 prefix {prefix} should have host bits unset"
            );
        }

        #[test]
        fn prop_ipv6_host_bits_always_unset(prefix in ipv6_prefix_strategy()) {
            prop_assert!(
                prefix.host_bits_are_unset(),
                "IPv6 prefix {prefix} should have host bits unset"
            );
        }

        /// Property: a prefix contains the address it was built from
        #[test]
        fn prop_prefix_contains_origin(
            bits in any::<u32>(),
            length in 0u8..=32u8,
        ) {
            let addr = Ipv4Addr::from(bits);
            let prefix = Prefix4::new(addr, length);
            prop_assert!(prefix.contains(addr));
        }

        /// Property: parsing the display form gives back the same prefix
        #[test]
        fn prop_prefix_display_parses(prefix in ipv6_prefix_strategy()) {
            let parsed: Prefix6 = prefix.to_string().parse().expect("parse");
            prop_assert_eq!(parsed, prefix);
        }

        /// Property: with one candidate, a group resolves exactly when its
        /// list permits it
        #[test]
        fn prop_single_candidate(
            prefix in ipv4_prefix_strategy(),
            group in group_strategy(),
        ) {
            let log = discard_logger();
            let mut config = RpConfig::new();
            single_list(&mut config, "pl", prefix);
            let rp = IpAddr::V4(Ipv4Addr::new(192, 168, 0, 11));
            config.candidates.add(rp, RpScope::PrefixList("pl".into()), 0);

            let result =
                Resolver::new(&config, &log).resolve(IpAddr::V4(group));
            if prefix.contains(group) {
                let m = result.expect("resolve");
                prop_assert_eq!(m.rp, rp);
                prop_assert_eq!(m.prefix_length, prefix.length);
            } else {
                prop_assert!(result.is_err());
            }
        }

        /// Property: of two nested prefixes the more specific one wins for
        /// groups it covers, regardless of configuration order
        #[test]
        fn prop_longest_prefix_wins(
            group in group_strategy(),
            short in 8u8..=24u8,
            extra in 1u8..=8u8,
            specific_first in any::<bool>(),
        ) {
            let log = discard_logger();
            let wide = Prefix4::new(group, short);
            let narrow = Prefix4::new(group, short + extra);
            let wide_rp = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
            let narrow_rp = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 2));

            let mut config = RpConfig::new();
            single_list(&mut config, "wide", wide);
            single_list(&mut config, "narrow", narrow);
            let wide_c = (wide_rp, RpScope::PrefixList("wide".into()));
            let narrow_c = (narrow_rp, RpScope::PrefixList("narrow".into()));
            let order = if specific_first {
                [narrow_c, wide_c]
            } else {
                [wide_c, narrow_c]
            };
            for (rp, scope) in order {
                config.candidates.add(rp, scope, 0);
            }

            let m = Resolver::new(&config, &log)
                .resolve(IpAddr::V4(group))
                .expect("resolve");
            prop_assert_eq!(m.rp, narrow_rp);
        }

        /// Property: among equally specific candidates the first configured
        /// wins, whatever the RP addresses are
        #[test]
        fn prop_first_configured_wins(
            group in group_strategy(),
            length in 8u8..=32u8,
            a in any::<u32>(),
            b in any::<u32>(),
        ) {
            prop_assume!(a != b);
            let log = discard_logger();
            let prefix = Prefix4::new(group, length);
            let mut config = RpConfig::new();
            single_list(&mut config, "a", prefix);
            single_list(&mut config, "b", prefix);
            let first = IpAddr::V4(Ipv4Addr::from(a));
            config.candidates.add(first, RpScope::PrefixList("a".into()), 0);
            config.candidates.add(
                IpAddr::V4(Ipv4Addr::from(b)),
                RpScope::PrefixList("b".into()),
                0,
            );

            let m = Resolver::new(&config, &log)
                .resolve(IpAddr::V4(group))
                .expect("resolve");
            prop_assert_eq!(m.rp, first);
            prop_assert_eq!(m.order, 1);
        }

        /// Property: a cached resolution equals a fresh one and costs no
        /// prefix-list evaluation
        #[test]
        fn prop_cached_resolution_is_stable(
            prefix in ipv4_prefix_strategy(),
            group in group_strategy(),
        ) {
            let map = RpMap::new(discard_logger());
            map.load_prefix_list(
                "pl",
                AddressFamily::Ipv4,
                vec![PrefixListEntry::permit(10, Prefix::V4(prefix))],
            )
            .expect("load prefix list");
            map.load_candidate(IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1)), "pl")
                .expect("load candidate");

            let group = IpAddr::V4(group);
            let first = map.resolve(group);
            let calls = map.match_calls();
            let second = map.resolve(group);
            match (first, second) {
                (Ok(a), Ok(b)) => {
                    prop_assert_eq!(a, b);
                    prop_assert_eq!(map.match_calls(), calls);
                }
                (Err(_), Err(_)) => {}
                _ => prop_assert!(false, "resolution changed between calls"),
            }
        }
    }
}
