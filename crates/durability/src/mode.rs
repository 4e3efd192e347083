//! Durability mode configuration
//!
//! Controls whether durable writes are fsynced before returning.

use lxp_core::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Durability mode for store writes
///
/// Every durable write (records, shadows, log records, the OID high-water
/// mark) goes through write-then-rename. The mode decides whether the file
/// and its directory are fsynced before the write returns.
///
/// # Modes
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Always | Every write | Zero |
/// | Os | Never (left to the OS) | Whatever the OS has not flushed |
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DurabilityMode {
    /// fsync file and parent directory on every write (safest, slowest)
    #[default]
    Always,

    /// Rename without fsync
    ///
    /// Survives process crashes but not power loss. Use for tests and
    /// scratch stores.
    Os,
}

impl DurabilityMode {
    /// Check if this mode requires fsync on every write
    pub fn requires_fsync(&self) -> bool {
        matches!(self, DurabilityMode::Always)
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Always => "Always sync (safest, slowest)",
            DurabilityMode::Os => "OS-buffered (survives process crash, not power loss)",
        }
    }
}

impl fmt::Display for DurabilityMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DurabilityMode::Always => f.write_str("always"),
            DurabilityMode::Os => f.write_str("os"),
        }
    }
}

impl FromStr for DurabilityMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "always" => Ok(DurabilityMode::Always),
            "os" => Ok(DurabilityMode::Os),
            other => Err(Error::Config(format!(
                "invalid durability mode '{}', expected \"always\" or \"os\"",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_always() {
        assert_eq!(DurabilityMode::default(), DurabilityMode::Always);
        assert!(DurabilityMode::Always.requires_fsync());
        assert!(!DurabilityMode::Os.requires_fsync());
    }

    #[test]
    fn test_parse() {
        assert_eq!("always".parse::<DurabilityMode>().unwrap(), DurabilityMode::Always);
        assert_eq!("os".parse::<DurabilityMode>().unwrap(), DurabilityMode::Os);
        assert!(matches!(
            "sometimes".parse::<DurabilityMode>(),
            Err(Error::Config(_))
        ));
        assert_eq!(DurabilityMode::Os.to_string(), "os");
    }
}
