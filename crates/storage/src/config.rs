//! Store configuration via `lxp.toml`
//!
//! On first open, a default `lxp.toml` is written into the store root. To
//! change settings, edit the file and reopen the store.

use crate::bucket::BucketKind;
use lxp_core::{Error, Result};
use lxp_durability::DurabilityMode;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Store configuration loaded from `lxp.toml`
///
/// # Example
///
/// ```toml
/// durability = "always"
/// default_bucket_kind = "directory"
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Durability mode: `"always"` or `"os"`
    #[serde(default = "default_durability_str")]
    pub durability: String,
    /// Kind of buckets created without an explicit kind: `"directory"` or `"indexed"`
    #[serde(default = "default_bucket_kind_str")]
    pub default_bucket_kind: String,
}

fn default_durability_str() -> String {
    "always".to_string()
}

fn default_bucket_kind_str() -> String {
    "directory".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            durability: default_durability_str(),
            default_bucket_kind: default_bucket_kind_str(),
        }
    }
}

impl StoreConfig {
    /// Config with the given durability mode and default bucket kind
    pub fn with_durability(mut self, mode: DurabilityMode) -> Self {
        self.durability = mode.to_string();
        self
    }

    /// Config with the given default bucket kind
    pub fn with_default_bucket_kind(mut self, kind: BucketKind) -> Self {
        self.default_bucket_kind = kind.to_string();
        self
    }

    /// Parse the durability string into a `DurabilityMode`
    pub fn durability_mode(&self) -> Result<DurabilityMode> {
        self.durability.parse()
    }

    /// Parse the default bucket kind
    pub fn bucket_kind(&self) -> Result<BucketKind> {
        self.default_bucket_kind.parse()
    }

    /// Check that every value parses
    pub fn validate(&self) -> Result<()> {
        self.durability_mode()?;
        self.bucket_kind()?;
        Ok(())
    }

    /// Read and validate a config file
    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        let config: StoreConfig = toml::from_str(&text).map_err(|e| {
            Error::Config(format!("failed to parse {}: {}", path.display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Read the config file, writing the commented default first if it is absent
    pub fn load_or_create(path: &Path) -> Result<Self> {
        if !path.exists() {
            std::fs::write(path, Self::default_toml())?;
        }
        Self::from_file(path)
    }

    /// Default config file content with comments
    pub fn default_toml() -> &'static str {
        r#"# LXP store configuration
#
# Durability mode: "always" (default) or "os"
#   "always" = fsync every record, shadow and log write
#   "os"     = leave flushing to the OS; survives process crashes, not power loss
durability = "always"

# Kind of buckets created without an explicit kind: "directory" (default) or "indexed"
#   "directory" = existence and enumeration answered from the filesystem
#   "indexed"   = in-memory OID index loaded at open
default_bucket_kind = "directory"
"#
    }
}
