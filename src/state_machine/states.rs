use serde::{Deserialize, Serialize};
use std::fmt;

/// Run state of the federation service on one node, or the engine's aggregate view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ServiceStatus {
    /// Nothing observed yet
    #[default]
    Unknown,
    /// A start or stop wait is in flight
    Pending,
    Running,
    Stopped,
    /// The last start or stop did not reach its target
    InError,
}

impl ServiceStatus {
    /// Check whether the service run state table allows `self -> next`
    ///
    /// Pending is entered from any state because a start or stop may be
    /// retried after an error. Re-entering the same state is never a transition.
    pub fn can_transition_to(&self, next: ServiceStatus) -> bool {
        match (self, next) {
            (from, to) if *from == to => false,
            (_, Self::Pending) => true,
            (Self::Pending, Self::Running | Self::Stopped | Self::InError) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ServiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Stopped => write!(f, "stopped"),
            Self::InError => write!(f, "in_error"),
        }
    }
}

impl std::str::FromStr for ServiceStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "pending" => Ok(Self::Pending),
            "running" => Ok(Self::Running),
            "stopped" => Ok(Self::Stopped),
            "in_error" => Ok(Self::InError),
            _ => Err(format!("Invalid service status: {s}")),
        }
    }
}

/// Lifecycle of the in-memory configuration relative to its persisted form
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ConfigStatus {
    /// Never loaded
    #[default]
    Unknown,
    Loaded,
    /// Mutated in memory, not yet persisted
    Dirty,
    Saved,
    /// The authentication provider is deactivated on the platform
    Stopped,
    InError,
}

impl ConfigStatus {
    /// Check whether the configuration table allows `self -> next`
    pub fn can_transition_to(&self, next: ConfigStatus) -> bool {
        match (self, next) {
            (from, to) if *from == to => false,
            (_, Self::Stopped) => true,
            (Self::Unknown, Self::Loaded | Self::InError) => true,
            (Self::Loaded, Self::Dirty) => true,
            (Self::Dirty, Self::Loaded | Self::Saved | Self::InError) => true,
            (Self::Saved, Self::Dirty | Self::Loaded) => true,
            (Self::Stopped, Self::Loaded | Self::Dirty) => true,
            // A failed load or save is retried by loading again
            (Self::InError, Self::Loaded | Self::Dirty) => true,
            (Self::Loaded, Self::InError) | (Self::Saved, Self::InError) => true,
            _ => false,
        }
    }
}

impl fmt::Display for ConfigStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => write!(f, "unknown"),
            Self::Loaded => write!(f, "loaded"),
            Self::Dirty => write!(f, "dirty"),
            Self::Saved => write!(f, "saved"),
            Self::Stopped => write!(f, "stopped"),
            Self::InError => write!(f, "in_error"),
        }
    }
}

impl std::str::FromStr for ConfigStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "loaded" => Ok(Self::Loaded),
            "dirty" => Ok(Self::Dirty),
            "saved" => Ok(Self::Saved),
            "stopped" => Ok(Self::Stopped),
            "in_error" => Ok(Self::InError),
            _ => Err(format!("Invalid configuration status: {s}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn any_service_status() -> impl Strategy<Value = ServiceStatus> {
        prop_oneof![
            Just(ServiceStatus::Unknown),
            Just(ServiceStatus::Pending),
            Just(ServiceStatus::Running),
            Just(ServiceStatus::Stopped),
            Just(ServiceStatus::InError),
        ]
    }

    fn any_config_status() -> impl Strategy<Value = ConfigStatus> {
        prop_oneof![
            Just(ConfigStatus::Unknown),
            Just(ConfigStatus::Loaded),
            Just(ConfigStatus::Dirty),
            Just(ConfigStatus::Saved),
            Just(ConfigStatus::Stopped),
            Just(ConfigStatus::InError),
        ]
    }

    #[test]
    fn test_service_start_and_stop_paths() {
        assert!(ServiceStatus::Unknown.can_transition_to(ServiceStatus::Pending));
        assert!(ServiceStatus::Pending.can_transition_to(ServiceStatus::Running));
        assert!(ServiceStatus::Running.can_transition_to(ServiceStatus::Pending));
        assert!(ServiceStatus::Pending.can_transition_to(ServiceStatus::Stopped));
        assert!(ServiceStatus::Pending.can_transition_to(ServiceStatus::InError));

        assert!(!ServiceStatus::Unknown.can_transition_to(ServiceStatus::Running));
        assert!(!ServiceStatus::Running.can_transition_to(ServiceStatus::Stopped));
    }

    #[test]
    fn test_config_lifecycle_paths() {
        assert!(ConfigStatus::Unknown.can_transition_to(ConfigStatus::Loaded));
        assert!(ConfigStatus::Loaded.can_transition_to(ConfigStatus::Dirty));
        assert!(ConfigStatus::Dirty.can_transition_to(ConfigStatus::Loaded));
        assert!(ConfigStatus::Dirty.can_transition_to(ConfigStatus::Saved));
        assert!(ConfigStatus::Stopped.can_transition_to(ConfigStatus::Loaded));

        assert!(!ConfigStatus::Unknown.can_transition_to(ConfigStatus::Saved));
        assert!(!ConfigStatus::Stopped.can_transition_to(ConfigStatus::Saved));
    }

    #[test]
    fn test_status_string_conversion() {
        assert_eq!(ServiceStatus::InError.to_string(), "in_error");
        assert_eq!("running".parse::<ServiceStatus>().unwrap(), ServiceStatus::Running);
        assert_eq!("dirty".parse::<ConfigStatus>().unwrap(), ConfigStatus::Dirty);
        assert!("paused".parse::<ServiceStatus>().is_err());
    }

    proptest! {
        #[test]
        fn prop_same_state_is_never_a_transition(s in any_service_status(), c in any_config_status()) {
            prop_assert!(!s.can_transition_to(s));
            prop_assert!(!c.can_transition_to(c));
        }

        #[test]
        fn prop_provider_deactivation_reachable_from_anywhere(c in any_config_status()) {
            prop_assume!(c != ConfigStatus::Stopped);
            prop_assert!(c.can_transition_to(ConfigStatus::Stopped));
        }

        #[test]
        fn prop_display_round_trips(s in any_service_status(), c in any_config_status()) {
            prop_assert_eq!(s.to_string().parse::<ServiceStatus>().unwrap(), s);
            prop_assert_eq!(c.to_string().parse::<ConfigStatus>().unwrap(), c);
        }
    }
}
