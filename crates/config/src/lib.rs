/*
 * SPDX-FileCopyrightText: Copyright (c) 2026 NVIDIA CORPORATION & AFFILIATES. All rights reserved.
 * SPDX-License-Identifier: LicenseRef-NvidiaProprietary
 *
 * NVIDIA CORPORATION, its affiliates and licensors retain all intellectual
 * property and proprietary rights in and to this material, related
 * documentation and any modifications thereto. Any use, reproduction,
 * disclosure or distribution of this material and related documentation
 * without an express license agreement from NVIDIA CORPORATION or
 * its affiliates is strictly prohibited.
 */

use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The IPMI 2.0 RAKP exchange cannot carry passwords longer than 20 bytes.
pub const MAX_IPMI_PASSWORD_LEN: usize = 20;

/// Top-level configuration, loaded once at startup from a single JSON file.
///
/// Every VM listed in `vms` gets its own pair of listeners: an IPMI BMC on
/// `ipmi_port` (UDP) and a Redfish service on `redfish_port` (TLS).
#[derive(Debug, Serialize, Deserialize, PartialEq)]
pub struct Config {
    pub vmware: VmwareConfig,
    #[serde(default)]
    pub ssl: SslConfig,
    pub vms: Vec<VmConfig>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
pub struct VmwareConfig {
    pub host: String,
    pub user: String,
    pub password: String,
    #[serde(default = "Defaults::vmware_port")]
    pub port: u16,
    #[serde(default = "Defaults::disable_ssl")]
    pub disable_ssl: bool,
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone, Default)]
pub struct SslConfig {
    #[serde(default)]
    pub cert_path: Option<PathBuf>,
    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

#[derive(Serialize, Deserialize, PartialEq, Clone)]
pub struct VmConfig {
    /// vSphere inventory name; also the external id on both protocol surfaces.
    pub name: String,
    pub ipmi_port: u16,
    pub redfish_port: u16,
    pub ipmi_user: String,
    pub ipmi_password: String,
    pub redfish_user: String,
    pub redfish_password: String,
    #[serde(default)]
    pub disable_ssl: Option<bool>,
    #[serde(default)]
    pub default_iso: Option<IsoConfig>,
}

/// Datastore-resident ISO mounted when a boot-to-CD override is requested.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct IsoConfig {
    pub datastore: String,
    pub path: String,
}

impl IsoConfig {
    /// Datastore path in the `[datastore] dir/image.iso` form vCenter expects.
    pub fn datastore_path(&self) -> String {
        format!("[{}] {}", self.datastore, self.path.trim_start_matches('/'))
    }
}

impl Config {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|error| ConfigError::CouldNotRead {
            path: path.to_string_lossy().to_string(),
            error,
        })?;
        let config: Self =
            serde_json::from_str(&raw).map_err(|error| ConfigError::InvalidJson {
                path: path.to_string_lossy().to_string(),
                error,
            })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.vmware.host.is_empty() {
            return Err(ConfigError::MissingField("vmware.host"));
        }
        if self.vmware.user.is_empty() || self.vmware.password.is_empty() {
            return Err(ConfigError::MissingField("vmware credentials"));
        }
        if self.vms.is_empty() {
            return Err(ConfigError::NoVms);
        }

        let mut names = HashSet::new();
        let mut ipmi_ports = HashSet::new();
        let mut redfish_ports = HashSet::new();
        for vm in &self.vms {
            if vm.name.is_empty() {
                return Err(ConfigError::MissingField("vm name"));
            }
            if !names.insert(vm.name.clone()) {
                return Err(ConfigError::DuplicateName(vm.name.clone()));
            }
            for (label, port) in [("ipmi_port", vm.ipmi_port), ("redfish_port", vm.redfish_port)] {
                if port == 0 {
                    return Err(ConfigError::InvalidPort {
                        vm: vm.name.clone(),
                        field: label,
                    });
                }
            }
            if !ipmi_ports.insert(vm.ipmi_port) || !redfish_ports.insert(vm.redfish_port) {
                return Err(ConfigError::DuplicatePort {
                    vm: vm.name.clone(),
                });
            }
            if vm.ipmi_user.is_empty()
                || vm.ipmi_password.is_empty()
                || vm.redfish_user.is_empty()
                || vm.redfish_password.is_empty()
            {
                return Err(ConfigError::MissingCredentials(vm.name.clone()));
            }
            if vm.ipmi_password.len() > MAX_IPMI_PASSWORD_LEN {
                return Err(ConfigError::IpmiPasswordTooLong(vm.name.clone()));
            }
        }
        Ok(())
    }

    pub fn find_vm(&self, name: &str) -> Option<&VmConfig> {
        self.vms.iter().find(|vm| vm.name == name)
    }

    /// Whether a given VM's Redfish endpoint should skip upstream TLS
    /// verification, falling back to the global vmware setting.
    pub fn vm_disable_ssl(&self, vm: &VmConfig) -> bool {
        vm.disable_ssl.unwrap_or(self.vmware.disable_ssl)
    }

    /// A complete example configuration, rendered as pretty JSON. Printed by
    /// the `default-config` subcommand as a starting point for operators.
    pub fn example() -> Self {
        Self {
            vmware: VmwareConfig {
                host: "vcenter.example.com".to_string(),
                user: "administrator@vsphere.local".to_string(),
                password: "changeme".to_string(),
                port: Defaults::vmware_port(),
                disable_ssl: Defaults::disable_ssl(),
            },
            ssl: SslConfig::default(),
            vms: vec![VmConfig {
                name: "worker-1".to_string(),
                ipmi_port: 6230,
                redfish_port: 8443,
                ipmi_user: "admin".to_string(),
                ipmi_password: "password".to_string(),
                redfish_user: "admin".to_string(),
                redfish_password: "password".to_string(),
                disable_ssl: None,
                default_iso: Some(IsoConfig {
                    datastore: "datastore1".to_string(),
                    path: "isos/discovery.iso".to_string(),
                }),
            }],
        }
    }

    pub fn example_json() -> String {
        serde_json::to_string_pretty(&Self::example()).expect("BUG: example config must serialize")
    }
}

pub struct Defaults;

impl Defaults {
    pub fn vmware_port() -> u16 {
        443
    }

    pub fn disable_ssl() -> bool {
        true
    }
}

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("Could not read config file at {path}: {error}")]
    CouldNotRead { path: String, error: std::io::Error },
    #[error("JSON error reading config file at {path}: {error}")]
    InvalidJson {
        path: String,
        error: serde_json::Error,
    },
    #[error("Missing required field: {0}")]
    MissingField(&'static str),
    #[error("No VMs configured")]
    NoVms,
    #[error("Duplicate VM name: {0}")]
    DuplicateName(String),
    #[error("VM {vm}: {field} must be in 1..=65535")]
    InvalidPort { vm: String, field: &'static str },
    #[error("VM {vm}: ipmi_port and redfish_port must be unique across all VMs")]
    DuplicatePort { vm: String },
    #[error("VM {0}: all IPMI and Redfish credentials must be non-empty")]
    MissingCredentials(String),
    #[error("VM {0}: ipmi_password exceeds the 20-byte IPMI limit")]
    IpmiPasswordTooLong(String),
}

// Never print vCenter or BMC passwords, even at debug level.
impl fmt::Debug for VmwareConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmwareConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("port", &self.port)
            .field("disable_ssl", &self.disable_ssl)
            .finish()
    }
}

impl fmt::Debug for VmConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VmConfig")
            .field("name", &self.name)
            .field("ipmi_port", &self.ipmi_port)
            .field("redfish_port", &self.redfish_port)
            .field("ipmi_user", &self.ipmi_user)
            .field("redfish_user", &self.redfish_user)
            .field("default_iso", &self.default_iso)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    const MINIMAL: &str = indoc! {r#"
        {
          "vmware": { "host": "vc.local", "user": "admin", "password": "secret" },
          "vms": [
            {
              "name": "worker-1",
              "ipmi_port": 6230,
              "redfish_port": 8443,
              "ipmi_user": "admin",
              "ipmi_password": "password",
              "redfish_user": "admin",
              "redfish_password": "password"
            }
          ]
        }
    "#};

    fn parse(raw: &str) -> Config {
        serde_json::from_str(raw).expect("config JSON didn't parse")
    }

    #[test]
    fn minimal_config_parses_with_defaults() {
        let config = parse(MINIMAL);
        config.validate().expect("minimal config should validate");
        assert_eq!(config.vmware.port, 443);
        assert!(config.vmware.disable_ssl);
        assert_eq!(config.ssl, SslConfig::default());
        assert!(config.vms[0].default_iso.is_none());
    }

    #[test]
    fn example_config_validates_and_round_trips() {
        let rendered = Config::example_json();
        let reparsed = parse(&rendered);
        reparsed.validate().expect("example config should validate");
        assert_eq!(reparsed, Config::example());
    }

    #[test]
    fn duplicate_vm_name_is_rejected() {
        let mut config = parse(MINIMAL);
        let mut clone = config.vms[0].clone();
        clone.ipmi_port = 6231;
        clone.redfish_port = 8444;
        config.vms.push(clone);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicateName(name)) if name == "worker-1"
        ));
    }

    #[test]
    fn duplicate_port_is_rejected() {
        let mut config = parse(MINIMAL);
        let mut clone = config.vms[0].clone();
        clone.name = "worker-2".to_string();
        clone.redfish_port = 8444;
        config.vms.push(clone);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::DuplicatePort { vm }) if vm == "worker-2"
        ));
    }

    #[test]
    fn zero_port_is_rejected() {
        let mut config = parse(MINIMAL);
        config.vms[0].ipmi_port = 0;
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidPort { field: "ipmi_port", .. })
        ));
    }

    #[test]
    fn long_ipmi_password_is_rejected() {
        let mut config = parse(MINIMAL);
        config.vms[0].ipmi_password = "x".repeat(MAX_IPMI_PASSWORD_LEN + 1);
        assert!(matches!(
            config.validate(),
            Err(ConfigError::IpmiPasswordTooLong(_))
        ));
    }

    #[test]
    fn empty_credentials_are_rejected() {
        let mut config = parse(MINIMAL);
        config.vms[0].redfish_password = String::new();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingCredentials(_))
        ));
    }

    #[test]
    fn iso_datastore_path_formatting() {
        let iso = IsoConfig {
            datastore: "datastore1".to_string(),
            path: "/isos/install.iso".to_string(),
        };
        assert_eq!(iso.datastore_path(), "[datastore1] isos/install.iso");
    }

    #[test]
    fn debug_output_skips_passwords() {
        let config = parse(MINIMAL);
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("secret"));
        assert!(!rendered.contains("password\""));
    }

    #[test]
    fn load_reports_missing_file() {
        let err = Config::load(Path::new("/nonexistent/config.json"))
            .expect_err("missing file should fail");
        assert!(matches!(err, ConfigError::CouldNotRead { .. }));
    }
}
