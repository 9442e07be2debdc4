// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Fixtures shared by the unit tests of this crate and its consumers.

use std::net::IpAddr;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{parse_config, RpConfig};

/// PIM configuration of router r1 in a five-RP access-list topology. Each
/// RP serves the groups permitted by its own prefix list.
///
/// | group           | rp           |
/// |-----------------|--------------|
/// | 239.100.0.0/28  | 192.168.0.11 |
/// | 239.100.0.17/32 | 192.168.0.12 |
/// | 239.100.0.32/27 | 192.168.0.13 |
/// | 239.100.0.128/25, 239.100.0.96/28 | 192.168.0.14 |
/// | 239.100.0.64/28 | 192.168.0.15 |
pub const PIM_ACL_R1: &str = "\
hostname r1
!
interface r1-eth0
 ip igmp
 ip pim
!
interface r1-eth1
 ip pim
!
interface lo
 ip pim
!
ip pim rp 192.168.0.11 prefix-list rp-pl-1
ip pim rp 192.168.0.12 prefix-list rp-pl-2
ip pim rp 192.168.0.13 prefix-list rp-pl-3
ip pim rp 192.168.0.14 prefix-list rp-pl-4
ip pim rp 192.168.0.15 prefix-list rp-pl-5
!
ip prefix-list rp-pl-1 seq 10 permit 239.100.0.0/28
ip prefix-list rp-pl-2 seq 10 permit 239.100.0.17/32
ip prefix-list rp-pl-3 seq 10 permit 239.100.0.32/27
ip prefix-list rp-pl-4 seq 10 permit 239.100.0.128/25
ip prefix-list rp-pl-4 seq 20 permit 239.100.0.96/28
ip prefix-list rp-pl-5 seq 10 permit 239.100.0.64/28
!
debug pim events
debug pim packets joins
debug pim trace
!
";

pub fn pim_acl_r1() -> RpConfig {
    let statements = parse_config(PIM_ACL_R1).expect("parse pim_acl r1");
    RpConfig::from_statements(&statements).expect("build pim_acl r1")
}

pub fn addr(s: &str) -> IpAddr {
    s.parse().expect("ip address")
}

/// A scratch directory for a sled database.
///
/// The directory is removed when the test passes and left behind for
/// inspection when it panics.
pub struct TestDir {
    path: String,
}

impl TestDir {
    pub fn new(test_name: &str) -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);

        std::fs::create_dir_all("/tmp").expect("create tmp dir");

        let path = format!(
            "/tmp/{}_{}_{}.db",
            test_name,
            std::process::id(),
            COUNTER.fetch_add(1, Ordering::SeqCst)
        );

        // stale from a crashed run
        if std::path::Path::new(&path).exists() {
            let _ = std::fs::remove_dir_all(&path);
        }

        Self { path }
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for TestDir {
    fn drop(&mut self) {
        if !std::thread::panicking() {
            let _ = std::fs::remove_dir_all(&self.path);
        }
    }
}
