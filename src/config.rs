//! Configuration file support
//!
//! Binding tables, thresholds and detector switches are loaded from TOML
//! before any traffic is processed.

use std::collections::BTreeMap;
use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::guard::{ArpBindings, ComparisonMode, GuardError, MacAddr, Result, SourceBindings};

/// Root configuration structure
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub general: GeneralConfig,

    /// ARP reply inspection (IP -> MAC bindings)
    pub arp_inspection: ArpInspectionConfig,

    /// IPv4 source guard (MAC -> IP bindings)
    pub ip_source_guard: IpSourceGuardConfig,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Default tracing filter when RUST_LOG is unset
    pub log_level: String,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ArpInspectionConfig {
    pub enabled: bool,
    pub threshold: u32,
    pub mode: ComparisonMode,
    pub block_priority: u16,
    pub bindings: BTreeMap<Ipv4Addr, MacAddr>,
}

impl Default for ArpInspectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            threshold: 3,
            mode: ComparisonMode::default(),
            block_priority: 100,
            bindings: (1..=3)
                .map(|i| (Ipv4Addr::new(10, 0, 0, i), MacAddr::new(0, 0, 0, 0, 0, i)))
                .collect(),
        }
    }
}

impl ArpInspectionConfig {
    pub fn binding_table(&self) -> ArpBindings {
        self.bindings.iter().map(|(ip, mac)| (*ip, *mac)).collect()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IpSourceGuardConfig {
    pub enabled: bool,
    pub threshold: u32,
    pub mode: ComparisonMode,
    pub block_priority: u16,
    /// Install a flood-everything rule when a switch connects
    pub hubify_on_connect: bool,
    pub bindings: BTreeMap<MacAddr, Ipv4Addr>,
}

impl Default for IpSourceGuardConfig {
    fn default() -> Self {
        let mut bindings: BTreeMap<MacAddr, Ipv4Addr> = (1..=3)
            .map(|i| (MacAddr::new(0, 0, 0, 0, 0, i), Ipv4Addr::new(10, 0, 0, i)))
            .collect();
        bindings.insert(
            MacAddr::new(0x00, 0x00, 0xde, 0xad, 0xbe, 0xef),
            Ipv4Addr::new(10, 0, 0, 5),
        );

        Self {
            enabled: true,
            threshold: 1,
            mode: ComparisonMode::default(),
            block_priority: 100,
            hubify_on_connect: true,
            bindings,
        }
    }
}

impl IpSourceGuardConfig {
    pub fn binding_table(&self) -> SourceBindings {
        self.bindings.iter().map(|(mac, ip)| (*mac, *ip)).collect()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            general: GeneralConfig::default(),
            arp_inspection: ArpInspectionConfig::default(),
            ip_source_guard: IpSourceGuardConfig::default(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path.as_ref()).map_err(|e| {
            GuardError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.as_ref().display(),
                e
            ))
        })?;
        let mut config = Self::from_str(&content)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a TOML string
    pub fn from_str(content: &str) -> Result<Self> {
        toml::from_str(content)
            .map_err(|e| GuardError::ConfigError(format!("Failed to parse config: {}", e)))
    }

    /// Load from the first config file found, or fall back to defaults
    pub fn load_or_default() -> Result<Self> {
        for path in Self::search_paths() {
            if path.exists() {
                return Self::from_file(path);
            }
        }

        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn search_paths() -> Vec<PathBuf> {
        let mut paths = vec![PathBuf::from("/etc/spoofguard/config.toml")];
        if let Some(dir) = dirs_next::config_dir() {
            paths.push(dir.join("spoofguard/config.toml"));
        }
        paths.push(PathBuf::from("spoofguard.toml"));
        paths
    }

    /// Serialize configuration to a TOML string
    pub fn to_string(&self) -> Result<String> {
        toml::to_string_pretty(self)
            .map_err(|e| GuardError::ConfigError(format!("Failed to serialize config: {}", e)))
    }

    /// Save configuration to a file
    pub fn save<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = self.to_string()?;
        std::fs::write(path.as_ref(), content).map_err(|e| {
            GuardError::ConfigError(format!("Failed to write config file: {}", e))
        })
    }

    /// Generate default config file content with comments
    pub fn default_with_comments() -> &'static str {
        DEFAULT_CONFIG
    }

    /// Apply environment variable overrides.
    ///
    /// Supported environment variables:
    /// - SPOOFGUARD_LOG_LEVEL
    /// - SPOOFGUARD_ARP_THRESHOLD
    /// - SPOOFGUARD_IPSG_THRESHOLD
    pub fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("SPOOFGUARD_LOG_LEVEL") {
            self.general.log_level = v;
        }
        if let Some(threshold) = env_threshold("SPOOFGUARD_ARP_THRESHOLD") {
            self.arp_inspection.threshold = threshold;
        }
        if let Some(threshold) = env_threshold("SPOOFGUARD_IPSG_THRESHOLD") {
            self.ip_source_guard.threshold = threshold;
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !self.arp_inspection.enabled && !self.ip_source_guard.enabled {
            return Err(GuardError::ConfigError(
                "at least one of arp_inspection or ip_source_guard must be enabled".to_string(),
            ));
        }
        if self.arp_inspection.enabled && self.arp_inspection.threshold == 0 {
            return Err(GuardError::ConfigError(
                "arp_inspection.threshold must be at least 1".to_string(),
            ));
        }
        if self.ip_source_guard.enabled && self.ip_source_guard.threshold == 0 {
            return Err(GuardError::ConfigError(
                "ip_source_guard.threshold must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_threshold(name: &str) -> Option<u32> {
    let value = std::env::var(name).ok()?;
    match value.parse() {
        Ok(threshold) => Some(threshold),
        Err(_) => {
            warn!("Ignoring {}={:?}: not a valid threshold", name, value);
            None
        }
    }
}

const DEFAULT_CONFIG: &str = r#"# spoofguard configuration

[general]
# Tracing filter used when RUST_LOG is not set
log_level = "info"

# ARP inspection: ARP replies must carry the MAC bound to the sender IP.
[arp_inspection]
enabled = true
# Violations per offending MAC before its ingress port is blocked
threshold = 3
# "reaches": block when count >= threshold
# "exceeds": block when count > threshold
mode = "reaches"
block_priority = 100

[arp_inspection.bindings]
"10.0.0.1" = "00:00:00:00:00:01"
"10.0.0.2" = "00:00:00:00:00:02"
"10.0.0.3" = "00:00:00:00:00:03"

# IP source guard: IPv4 packets must carry the IP bound to the source MAC.
# Traffic that is not IPv4 is flooded.
[ip_source_guard]
enabled = true
threshold = 1
mode = "reaches"
block_priority = 100
# Install a flood-all rule on each switch as it connects
hubify_on_connect = true

[ip_source_guard.bindings]
"00:00:00:00:00:01" = "10.0.0.1"
"00:00:00:00:00:02" = "10.0.0.2"
"00:00:00:00:00:03" = "10.0.0.3"
"00:00:de:ad:be:ef" = "10.0.0.5"
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_commented_default_matches_default() {
        let parsed = Config::from_str(Config::default_with_comments()).unwrap();
        assert_eq!(parsed, Config::default());
    }

    #[test]
    fn test_round_trip_through_toml() {
        let config = Config::default();
        let text = config.to_string().unwrap();
        assert_eq!(Config::from_str(&text).unwrap(), config);
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let config = Config::from_str(
            r#"
            [arp_inspection]
            threshold = 5
            mode = "exceeds"

            [arp_inspection.bindings]
            "192.168.1.1" = "AA:BB:CC:DD:EE:FF"
            "#,
        )
        .unwrap();

        assert_eq!(config.arp_inspection.threshold, 5);
        assert_eq!(config.arp_inspection.mode, ComparisonMode::Exceeds);
        assert_eq!(config.arp_inspection.bindings.len(), 1);
        assert_eq!(
            config.arp_inspection.binding_table().lookup(&Ipv4Addr::new(192, 168, 1, 1)),
            Some(&MacAddr::new(0xaa, 0xbb, 0xcc, 0xdd, 0xee, 0xff))
        );
        assert_eq!(config.ip_source_guard, IpSourceGuardConfig::default());
    }

    #[test]
    fn test_bad_mac_rejected() {
        let err = Config::from_str(
            r#"
            [ip_source_guard.bindings]
            "00:00:00:00:01" = "10.0.0.1"
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, GuardError::ConfigError(_)));
    }

    #[test]
    fn test_validate() {
        let mut config = Config::default();
        assert!(config.validate().is_ok());

        config.arp_inspection.threshold = 0;
        assert!(config.validate().is_err());

        config.arp_inspection.enabled = false;
        assert!(config.validate().is_ok());

        config.ip_source_guard.enabled = false;
        assert!(config.validate().is_err());
    }

    // Tests that read or write SPOOFGUARD_* variables hold this lock
    static ENV_LOCK: parking_lot::Mutex<()> = parking_lot::Mutex::new(());

    #[test]
    fn test_env_overrides() {
        let _guard = ENV_LOCK.lock();
        std::env::set_var("SPOOFGUARD_ARP_THRESHOLD", "7");
        std::env::set_var("SPOOFGUARD_IPSG_THRESHOLD", "abc");
        std::env::set_var("SPOOFGUARD_LOG_LEVEL", "debug");

        let mut config = Config::default();
        config.apply_env_overrides();

        std::env::remove_var("SPOOFGUARD_ARP_THRESHOLD");
        std::env::remove_var("SPOOFGUARD_IPSG_THRESHOLD");
        std::env::remove_var("SPOOFGUARD_LOG_LEVEL");

        assert_eq!(config.arp_inspection.threshold, 7);
        // Unparsable value is ignored
        assert_eq!(config.ip_source_guard.threshold, IpSourceGuardConfig::default().threshold);
        assert_eq!(config.general.log_level, "debug");
    }

    #[test]
    fn test_save_then_load() {
        let _guard = ENV_LOCK.lock();
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("spoofguard.toml");

        let mut config = Config::default();
        config.arp_inspection.mode = ComparisonMode::Exceeds;
        config.ip_source_guard.hubify_on_connect = false;
        config.save(&path).unwrap();

        assert_eq!(Config::from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_from_file() {
        let _guard = ENV_LOCK.lock();
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[ip_source_guard]\nthreshold = 2\nhubify_on_connect = false\n"
        )
        .unwrap();

        let config = Config::from_file(file.path()).unwrap();
        assert!(!config.ip_source_guard.hubify_on_connect);
        assert_eq!(config.ip_source_guard.bindings.len(), 4);
    }

    #[test]
    fn test_missing_file_is_config_error() {
        let err = Config::from_file("/nonexistent/spoofguard.toml").unwrap_err();
        assert!(matches!(err, GuardError::ConfigError(_)));
    }
}
