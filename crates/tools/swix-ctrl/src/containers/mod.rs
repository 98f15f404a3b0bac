//! Service containers and their upgrades.

use std::fmt;

use clap::ValueEnum;

pub mod registry;
pub mod rollback;
pub mod runtime;
pub mod upgrade;
pub mod warm_restart;

/// Known system services, each running in a container of the same name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, ValueEnum)]
pub enum ContainerName {
    Swss,
    Snmp,
    Lldp,
    Bgp,
    Pmon,
    #[value(name = "dhcp_relay")]
    DhcpRelay,
    Telemetry,
    Teamd,
    Radv,
}

impl ContainerName {
    /// Name of the container and its systemd unit.
    pub fn as_str(self) -> &'static str {
        match self {
            ContainerName::Swss => "swss",
            ContainerName::Snmp => "snmp",
            ContainerName::Lldp => "lldp",
            ContainerName::Bgp => "bgp",
            ContainerName::Pmon => "pmon",
            ContainerName::DhcpRelay => "dhcp_relay",
            ContainerName::Telemetry => "telemetry",
            ContainerName::Teamd => "teamd",
            ContainerName::Radv => "radv",
        }
    }

    /// Application reporting the reconciliation state after a warm restart.
    ///
    /// Services without such an application cannot be restarted warm.
    pub fn warm_restart_app(self) -> Option<&'static str> {
        match self {
            ContainerName::Swss => Some("orchagent"),
            ContainerName::Bgp => Some("bgp"),
            ContainerName::Teamd => Some("teamsyncd"),
            _ => None,
        }
    }

    /// Indicates whether the service supports warm restarts.
    pub fn is_warm_capable(self) -> bool {
        self.warm_restart_app().is_some()
    }

    /// Units which are not brought back by restarting the service.
    pub fn dependent_units(self) -> &'static [ContainerName] {
        match self {
            ContainerName::Swss => &[
                ContainerName::Radv,
                ContainerName::Snmp,
                ContainerName::DhcpRelay,
            ],
            _ => &[],
        }
    }
}

impl fmt::Display for ContainerName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_warm_restart_apps() {
        assert_eq!(ContainerName::Swss.warm_restart_app(), Some("orchagent"));
        assert_eq!(ContainerName::Teamd.warm_restart_app(), Some("teamsyncd"));
        assert!(!ContainerName::Lldp.is_warm_capable());
        assert_eq!(ContainerName::Swss.dependent_units().len(), 3);
        assert!(ContainerName::Bgp.dependent_units().is_empty());
    }

    #[test]
    fn test_value_names() {
        let relay = ContainerName::from_str("dhcp_relay", false).unwrap();
        assert_eq!(relay, ContainerName::DhcpRelay);
        assert_eq!(relay.to_string(), "dhcp_relay");
    }
}
