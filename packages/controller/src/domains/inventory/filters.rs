//! Ingest filters for synced topology.
//!
//! Only front-panel Ethernet interfaces become switch ports, and only
//! access-layer switch roles are retained; spines never carry compute-node
//! links so mirroring them would only bloat the inventory.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    // Ethernet<slot>/<port> with an optional breakout sub-port.
    static ref ETHERNET_PORT: Regex = Regex::new(r"^Ethernet\d+/\d+(/\d+)?$").unwrap();
}

/// Interface names that are mirrored into the inventory.
pub fn is_ethernet_port_name(name: &str) -> bool {
    ETHERNET_PORT.is_match(name)
}

/// Switch roles that are mirrored into the inventory.
pub fn is_retained_switch_role(role: &str) -> bool {
    let role = role.trim().to_ascii_lowercase();
    matches!(role.as_str(), "leaf" | "tor" | "border" | "border gateway" | "border_gateway")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ethernet_names_accepted() {
        assert!(is_ethernet_port_name("Ethernet1/1"));
        assert!(is_ethernet_port_name("Ethernet1/49/4"));
        assert!(is_ethernet_port_name("Ethernet10/32"));
    }

    #[test]
    fn non_ethernet_names_rejected() {
        assert!(!is_ethernet_port_name("Eth1/1"));
        assert!(!is_ethernet_port_name("Loopback0"));
        assert!(!is_ethernet_port_name("port-channel1"));
        assert!(!is_ethernet_port_name("mgmt0"));
        assert!(!is_ethernet_port_name(""));
        assert!(!is_ethernet_port_name("Ethernet1/1/"));
        assert!(!is_ethernet_port_name("Ethernet1"));
    }

    #[test]
    fn access_roles_accepted_any_case() {
        for role in ["leaf", "Leaf", "LEAF", "tor", "ToR", "border", "border_gateway"] {
            assert!(is_retained_switch_role(role), "{} should be retained", role);
        }
    }

    #[test]
    fn spine_roles_rejected() {
        for role in ["spine", "Spine", "super_spine", "super spine", ""] {
            assert!(!is_retained_switch_role(role), "{} should be filtered", role);
        }
    }
}
