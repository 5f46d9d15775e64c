//! # System Constants
//!
//! Wire opcodes, default timeouts and well-known names shared by the
//! orchestrator, the notification channel and the provisioning scripts.

use std::time::Duration;

/// Notification channel opcodes
pub mod opcodes {
    pub const START_PENDING: u8 = 0x01;
    pub const START_COMPLETE: u8 = 0x02;
    pub const STOP_PENDING: u8 = 0x03;
    pub const STOP_COMPLETE: u8 = 0x04;
    pub const ERROR: u8 = 0x05;
    pub const CONFIGURATION_CHANGED: u8 = 0x10;
}

/// Notification channel framing
pub mod channel {
    use std::time::Duration;

    /// Frame magic
    pub const MAGIC: [u8; 2] = *b"MF";
    pub const VERSION: u8 = 1;
    /// magic + version + opcode + origin + payload length
    pub const HEADER_LEN: usize = 2 + 1 + 1 + 4 + 1;
    pub const MAX_PAYLOAD_BYTES: usize = 240;
    pub const DEFAULT_NAME: &str = "mfa-farm-notify";
    /// Listener registration file suffix
    pub const REGISTRATION_SUFFIX: &str = ".port";
    /// How often a running listener refreshes its registration
    pub const REGISTRATION_HEARTBEAT: Duration = Duration::from_secs(30);
    /// Registrations not refreshed for this long belong to dead processes
    pub const REGISTRATION_STALE_AFTER: Duration = Duration::from_secs(120);
}

/// Windows service name of the federation service
pub const DEFAULT_SERVICE_NAME: &str = "adfssrv";

/// Name under which the provider registers with the federation platform
pub const DEFAULT_PROVIDER_NAME: &str = "MultiFactor";

/// Start/stop wait bound
pub const DEFAULT_SERVICE_TIMEOUT: Duration = Duration::from_secs(60);

pub const DEFAULT_SERVICE_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub const DEFAULT_CERTIFICATE_VALIDITY_YEARS: u32 = 5;

/// Upper bound that keeps `notAfter` within X.509 GeneralizedTime
pub const MAX_CERTIFICATE_VALIDITY_YEARS: u32 = 100;

pub const MIN_RSA_KEY_BITS: usize = 2048;

/// Node names that always mean "this machine"
pub const LOCAL_NODE_ALIASES: &[&str] = &[".", "localhost", "self"];

/// Platform build thresholds for metadata strategy selection
pub mod platform_builds {
    /// First build of the standard generation
    pub const STANDARD: u32 = 14393;
    /// First build of the extended generation
    pub const EXTENDED: u32 = 17763;
}

/// Legacy platforms have no farm behavior query
pub const LEGACY_FARM_BEHAVIOR: i32 = 1;

/// Certificate store path prefix used in wrapped column key metadata
pub const COLUMN_MASTER_KEY_STORE_PROVIDER: &str = "MSSQL_CERTIFICATE_STORE";
pub const COLUMN_MASTER_KEY_PATH_PREFIX: &str = "LocalMachine/My/";
