use regex::Regex;

use crate::error::{NodeError, Result};

/// Interface reserved for the management network on every kind.
const MGMT_INTERFACE: &str = "eth0";

/// Naming rule for a kind's data-plane interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InterfaceRule {
    pub pattern: &'static str,
    /// Shown to the user when a name does not match.
    pub example: &'static str,
}

/// Any Linux interface name (at most 15 characters).
pub const LINUX: InterfaceRule = InterfaceRule {
    pattern: r"^[A-Za-z0-9][A-Za-z0-9._@-]{0,14}$",
    example: "eth1",
};

/// `e<slot>-<port>`, optionally with a breakout suffix.
pub const SRL: InterfaceRule = InterfaceRule {
    pattern: r"^e[1-9][0-9]*-[1-9][0-9]*(-[1-9][0-9]*)?$",
    example: "e1-1",
};

/// Data ports of the VM are passed through as `eth1` and up.
pub const VR: InterfaceRule = InterfaceRule {
    pattern: r"^eth[1-9][0-9]*$",
    example: "eth1",
};

impl InterfaceRule {
    pub fn check(&self, node: &str, interfaces: &[String]) -> Result<()> {
        let re = Regex::new(self.pattern)
            .map_err(|e| NodeError::interface_name(node, self.pattern, e.to_string()))?;

        for interface in interfaces {
            if interface == MGMT_INTERFACE {
                return Err(NodeError::interface_name(
                    node,
                    interface,
                    "reserved for the management network",
                ));
            }
            if !re.is_match(interface) {
                return Err(NodeError::interface_name(
                    node,
                    interface,
                    format!("expected a name like {}", self.example),
                ));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_linux_rule() {
        assert!(LINUX.check("h1", &names(&["eth1", "veth-a.10"])).is_ok());
        assert!(LINUX.check("h1", &names(&["this-name-is-far-too-long"])).is_err());
        assert!(LINUX.check("h1", &names(&["-dash"])).is_err());
    }

    #[test]
    fn test_mgmt_interface_rejected() {
        let err = LINUX.check("h1", &names(&["eth0"])).unwrap_err();
        assert!(err.to_string().contains("management"));
    }

    #[test]
    fn test_srl_rule() {
        assert!(SRL.check("srl1", &names(&["e1-1", "e1-32", "e1-3-1"])).is_ok());
        assert!(SRL.check("srl1", &names(&["ethernet-1/1"])).is_err());
        assert!(SRL.check("srl1", &names(&["e0-1"])).is_err());
        assert!(SRL.check("srl1", &names(&["eth1"])).is_err());
    }

    #[test]
    fn test_vr_rule() {
        assert!(VR.check("sr1", &names(&["eth1", "eth12"])).is_ok());
        assert!(VR.check("sr1", &names(&["1/1/1"])).is_err());
    }

    #[test]
    fn test_empty_list_is_ok() {
        assert!(SRL.check("srl1", &[]).is_ok());
    }
}
