//! Flow-steering rules directing PTP frames to the dedicated RX queue.
//!
//! NICs differ in which classification patterns they can validate, so
//! installation walks a cascade from the most general pattern to the
//! narrowest and keeps the first one the device accepts. Losing all three
//! is not fatal: the port then shares the default RX queue and the worker
//! filters defensively.

use crate::config::PTP_RX_QUEUE;
use crate::net::{FlowAction, FlowHandle, FlowPattern, PtpNic};
use crate::wire::frame::{ETHERTYPE_PTP, ETHERTYPE_VLAN};

/// The candidate patterns, most general first:
///
/// 1. any outer Ethernet + VLAN with inner EtherType 0x88F7 (any VLAN id);
/// 2. outer EtherType 0x8100 + VLAN with inner EtherType 0x88F7;
/// 3. untagged EtherType 0x88F7.
#[must_use]
pub fn pattern_cascade() -> [FlowPattern; 3] {
    [
        FlowPattern {
            outer_ether_type: None,
            vlan_inner_type: Some(ETHERTYPE_PTP),
        },
        FlowPattern {
            outer_ether_type: Some(ETHERTYPE_VLAN),
            vlan_inner_type: Some(ETHERTYPE_PTP),
        },
        FlowPattern {
            outer_ether_type: Some(ETHERTYPE_PTP),
            vlan_inner_type: None,
        },
    ]
}

/// Try the cascade on one port. Returns the installed handle, or `None`
/// when every pattern was rejected.
pub fn install_port_rule(nic: &dyn PtpNic, port_id: u16) -> Option<FlowHandle> {
    let action = FlowAction::Queue(PTP_RX_QUEUE);
    for (attempt, pattern) in pattern_cascade().iter().enumerate() {
        match nic.create_rule(port_id, pattern, action) {
            Ok(handle) => {
                tracing::info!(
                    port_id,
                    attempt = attempt + 1,
                    ?pattern,
                    queue = PTP_RX_QUEUE,
                    "PTP flow rule installed"
                );
                if pattern.vlan_inner_type.is_none() {
                    tracing::warn!(
                        port_id,
                        "untagged-only flow rule: VLAN-tagged PTP will not reach the PTP queue"
                    );
                }
                return Some(handle);
            }
            Err(err) => {
                tracing::debug!(port_id, attempt = attempt + 1, %err, "flow pattern rejected");
            }
        }
    }
    tracing::warn!(
        port_id,
        "all flow patterns rejected; PTP shares the default RX queue on this port"
    );
    None
}

/// Tear down a previously installed rule.
pub fn remove_port_rule(nic: &dyn PtpNic, port_id: u16, handle: FlowHandle) {
    match nic.destroy_rule(port_id, handle) {
        Ok(()) => tracing::debug!(port_id, ?handle, "PTP flow rule removed"),
        Err(err) => tracing::warn!(port_id, %err, "flow rule destroy failed"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeNic;

    #[test]
    fn test_cascade_order() {
        let cascade = pattern_cascade();
        assert_eq!(cascade[0].outer_ether_type, None);
        assert_eq!(cascade[0].vlan_inner_type, Some(0x88F7));
        assert_eq!(cascade[1].outer_ether_type, Some(0x8100));
        assert_eq!(cascade[2].outer_ether_type, Some(0x88F7));
        assert_eq!(cascade[2].vlan_inner_type, None);
    }

    #[test]
    fn test_first_pattern_wins_by_default() {
        let nic = FakeNic::new();
        let handle = install_port_rule(&nic, 3).unwrap();

        let rules = nic.installed_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].port_id, 3);
        assert_eq!(rules[0].handle, handle);
        assert_eq!(rules[0].pattern, pattern_cascade()[0]);
        assert_eq!(rules[0].action, FlowAction::Queue(PTP_RX_QUEUE));
    }

    #[test]
    fn test_fallback_to_explicit_outer() {
        let nic = FakeNic::new();
        nic.reject_pattern(3, pattern_cascade()[0]);

        install_port_rule(&nic, 3).unwrap();
        let rules = nic.installed_rules();
        assert_eq!(rules.len(), 1);
        assert_eq!(rules[0].pattern, pattern_cascade()[1]);
    }

    #[test]
    fn test_fallback_to_untagged() {
        let nic = FakeNic::new();
        nic.reject_pattern(0, pattern_cascade()[0]);
        nic.reject_pattern(0, pattern_cascade()[1]);

        install_port_rule(&nic, 0).unwrap();
        assert_eq!(nic.installed_rules()[0].pattern, pattern_cascade()[2]);
    }

    #[test]
    fn test_all_patterns_rejected_yields_none() {
        let nic = FakeNic::new();
        for pattern in pattern_cascade() {
            nic.reject_pattern(1, pattern);
        }
        assert!(install_port_rule(&nic, 1).is_none());
        assert!(nic.installed_rules().is_empty());
    }

    #[test]
    fn test_remove_destroys_handle() {
        let nic = FakeNic::new();
        let handle = install_port_rule(&nic, 2).unwrap();
        remove_port_rule(&nic, 2, handle);
        assert!(nic.installed_rules().is_empty());
        assert_eq!(nic.destroyed_rules().len(), 1);
        assert_eq!(nic.destroyed_rules()[0].handle, handle);
    }
}
