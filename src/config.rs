//! CLI parsing (`structopt`), optional config-file layering (`toml`), and
//! the process-wide immutable `AgentConfig`.

use std::fs::read_to_string;
use std::path::PathBuf;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use structopt::StructOpt;

use crate::telemetry::{MAX_DISKS, MAX_INTERFACES};

#[derive(Debug, StructOpt)]
#[structopt(name = "mini-snmpd", about = "A minimal SNMP v1/v2c agent")]
struct CliOpt {
    #[structopt(long)]
    use_ipv4: bool,
    #[structopt(long)]
    use_ipv6: bool,
    #[structopt(long)]
    auth: bool,
    #[structopt(long)]
    community: Option<String>,
    #[structopt(long)]
    contact: Option<String>,
    #[structopt(long)]
    location: Option<String>,
    #[structopt(long)]
    description: Option<String>,
    #[structopt(long)]
    vendor: Option<String>,
    #[structopt(long, use_delimiter = true)]
    disks: Vec<String>,
    #[structopt(long, use_delimiter = true)]
    interfaces: Vec<String>,
    #[structopt(long)]
    listen: Option<String>,
    #[structopt(long)]
    udp_port: Option<u16>,
    #[structopt(long)]
    tcp_port: Option<u16>,
    #[structopt(long)]
    timeout: Option<u64>,
    #[structopt(long)]
    loglevel: Option<String>,
    #[structopt(long)]
    drop_privs: Option<String>,
    #[structopt(long)]
    foreground: bool,
    #[structopt(long)]
    syslog: bool,
    #[structopt(long, parse(from_os_str))]
    file: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AddressFamily {
    V4,
    V6,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(default = "default_family")]
    pub family: AddressFamily,
    #[serde(default)]
    pub auth: bool,
    #[serde(default = "default_community")]
    pub community: String,
    #[serde(default)]
    pub contact: String,
    #[serde(default)]
    pub location: String,
    #[serde(default = "default_description")]
    pub description: String,
    #[serde(default = "default_vendor")]
    pub vendor: String,
    #[serde(default)]
    pub disks: Vec<String>,
    #[serde(default)]
    pub interfaces: Vec<String>,
    #[serde(default)]
    pub bind_to_device: Option<String>,
    #[serde(default = "default_udp_port")]
    pub udp_port: u16,
    #[serde(default = "default_tcp_port")]
    pub tcp_port: u16,
    /// MIB refresh interval, stored as centiseconds (`timeout_seconds * 100`).
    #[serde(default = "default_timeout_centiseconds")]
    pub timeout_centiseconds: u64,
    #[serde(default = "default_loglevel")]
    pub loglevel: String,
    #[serde(default)]
    pub drop_privs_user: Option<String>,
    #[serde(default)]
    pub foreground: bool,
    #[serde(default)]
    pub syslog: bool,
}

fn default_family() -> AddressFamily {
    AddressFamily::V4
}
fn default_community() -> String {
    "public".to_string()
}
fn default_description() -> String {
    "mini-snmpd-rs".to_string()
}
fn default_vendor() -> String {
    ".1.3.6.1.4.1.8072.3.2.10".to_string() // net-snmp's "notConfigured", a safe placeholder enterprise OID
}
fn default_udp_port() -> u16 {
    161
}
fn default_tcp_port() -> u16 {
    161
}
fn default_timeout_centiseconds() -> u64 {
    10_000 // 100s
}
fn default_loglevel() -> String {
    "info".to_string()
}

impl Default for AgentConfig {
    fn default() -> Self {
        AgentConfig {
            family: default_family(),
            auth: false,
            community: default_community(),
            contact: String::new(),
            location: String::new(),
            description: default_description(),
            vendor: default_vendor(),
            disks: Vec::new(),
            interfaces: Vec::new(),
            bind_to_device: None,
            udp_port: default_udp_port(),
            tcp_port: default_tcp_port(),
            timeout_centiseconds: default_timeout_centiseconds(),
            loglevel: default_loglevel(),
            drop_privs_user: None,
            foreground: false,
            syslog: false,
        }
    }
}

/// Flat key/value config-file shape, loaded after CLI; CLI-set
/// fields win, the file only fills in what CLI left at its default.
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    #[serde(flatten)]
    fields: std::collections::HashMap<String, toml::Value>,
    #[serde(default)]
    disk_table: Vec<String>,
    #[serde(default)]
    iface_table: Vec<String>,
}

pub fn from_args() -> Result<AgentConfig> {
    let cli = CliOpt::from_args();
    build_config(cli)
}

fn build_config(cli: CliOpt) -> Result<AgentConfig> {
    let mut cfg = AgentConfig::default();

    if cli.use_ipv6 {
        cfg.family = AddressFamily::V6;
    } else if cli.use_ipv4 {
        cfg.family = AddressFamily::V4;
    }
    cfg.auth = cli.auth;
    if let Some(v) = cli.community {
        cfg.community = v;
    }
    if let Some(v) = cli.contact {
        cfg.contact = v;
    }
    if let Some(v) = cli.location {
        cfg.location = v;
    }
    if let Some(v) = cli.description {
        cfg.description = v;
    }
    if let Some(v) = cli.vendor {
        if crate::oid::Oid::from_ascii(&v).is_none() {
            return Err(anyhow::anyhow!("vendor must be a dotted OID, got '{}'", v));
        }
        cfg.vendor = v;
    }
    if !cli.disks.is_empty() {
        if cli.disks.len() > MAX_DISKS {
            return Err(anyhow::anyhow!("at most {} disks supported", MAX_DISKS));
        }
        cfg.disks = cli.disks;
    }
    if !cli.interfaces.is_empty() {
        if cli.interfaces.len() > MAX_INTERFACES {
            return Err(anyhow::anyhow!(
                "at most {} interfaces supported",
                MAX_INTERFACES
            ));
        }
        cfg.interfaces = cli.interfaces;
    }
    if let Some(v) = cli.listen {
        cfg.bind_to_device = Some(v);
    }
    if let Some(v) = cli.udp_port {
        cfg.udp_port = v;
    }
    if let Some(v) = cli.tcp_port {
        cfg.tcp_port = v;
    }
    if let Some(v) = cli.timeout {
        cfg.timeout_centiseconds = v * 100;
    }
    if let Some(v) = cli.loglevel {
        cfg.loglevel = v;
    }
    if let Some(v) = cli.drop_privs {
        cfg.drop_privs_user = Some(v);
    }
    cfg.foreground = cli.foreground;
    cfg.syslog = cli.syslog;

    if let Some(path) = cli.file {
        apply_file_config(&mut cfg, &path)?;
    }

    Ok(cfg)
}

fn apply_file_config(cfg: &mut AgentConfig, path: &PathBuf) -> Result<()> {
    let content = read_to_string(path)
        .with_context(|| format!("could not read config file '{}'", path.display()))?;
    let file: FileConfig = toml::from_str(&content)
        .with_context(|| format!("could not parse config file '{}'", path.display()))?;

    // only fill in what CLI did not already set (CLI wins)
    if cfg.family == default_family() {
        match file.fields.get("family").and_then(|v| v.as_str()) {
            Some("v4") => cfg.family = AddressFamily::V4,
            Some("v6") => cfg.family = AddressFamily::V6,
            Some(other) => {
                return Err(anyhow::anyhow!(
                    "config file: 'family' must be 'v4' or 'v6', got '{}'",
                    other
                ))
            }
            None => {}
        }
    }
    if !cfg.auth {
        if let Some(v) = file.fields.get("auth").and_then(|v| v.as_bool()) {
            cfg.auth = v;
        }
    }
    if cfg.community == default_community() {
        if let Some(v) = file.fields.get("community").and_then(|v| v.as_str()) {
            cfg.community = v.to_string();
        }
    }
    if cfg.contact.is_empty() {
        if let Some(v) = file.fields.get("contact").and_then(|v| v.as_str()) {
            cfg.contact = v.to_string();
        }
    }
    if cfg.location.is_empty() {
        if let Some(v) = file.fields.get("location").and_then(|v| v.as_str()) {
            cfg.location = v.to_string();
        }
    }
    if cfg.description == default_description() {
        if let Some(v) = file.fields.get("description").and_then(|v| v.as_str()) {
            cfg.description = v.to_string();
        }
    }
    if cfg.vendor == default_vendor() {
        if let Some(v) = file.fields.get("vendor").and_then(|v| v.as_str()) {
            if crate::oid::Oid::from_ascii(v).is_none() {
                return Err(anyhow::anyhow!(
                    "config file: vendor must be a dotted OID, got '{}'",
                    v
                ));
            }
            cfg.vendor = v.to_string();
        }
    }
    if cfg.disks.is_empty() {
        cfg.disks = file.disk_table;
    }
    if cfg.interfaces.is_empty() {
        cfg.interfaces = file.iface_table;
    }
    if cfg.bind_to_device.is_none() {
        if let Some(v) = file.fields.get("bind_to_device").and_then(|v| v.as_str()) {
            cfg.bind_to_device = Some(v.to_string());
        }
    }
    if cfg.udp_port == default_udp_port() {
        if let Some(v) = file.fields.get("udp_port").and_then(|v| v.as_integer()) {
            cfg.udp_port = v as u16;
        }
    }
    if cfg.tcp_port == default_tcp_port() {
        if let Some(v) = file.fields.get("tcp_port").and_then(|v| v.as_integer()) {
            cfg.tcp_port = v as u16;
        }
    }
    if cfg.timeout_centiseconds == default_timeout_centiseconds() {
        if let Some(v) = file.fields.get("timeout").and_then(|v| v.as_integer()) {
            cfg.timeout_centiseconds = (v as u64) * 100;
        }
    }
    if cfg.loglevel == default_loglevel() {
        if let Some(v) = file.fields.get("loglevel").and_then(|v| v.as_str()) {
            cfg.loglevel = v.to_string();
        }
    }
    if cfg.drop_privs_user.is_none() {
        if let Some(v) = file.fields.get("drop_privs").and_then(|v| v.as_str()) {
            cfg.drop_privs_user = Some(v.to_string());
        }
    }
    if !cfg.foreground {
        if let Some(v) = file.fields.get("foreground").and_then(|v| v.as_bool()) {
            cfg.foreground = v;
        }
    }
    if !cfg.syslog {
        if let Some(v) = file.fields.get("syslog").and_then(|v| v.as_bool()) {
            cfg.syslog = v;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cli(args: &[&str]) -> CliOpt {
        let mut full = vec!["mini-snmpd"];
        full.extend_from_slice(args);
        CliOpt::from_iter(full)
    }

    #[test]
    fn defaults_are_sane() {
        let cfg = build_config(cli(&[])).unwrap();
        assert_eq!(cfg.community, "public");
        assert_eq!(cfg.udp_port, 161);
        assert_eq!(cfg.tcp_port, 161);
        assert_eq!(cfg.family, AddressFamily::V4);
    }

    #[test]
    fn timeout_converted_to_centiseconds() {
        let cfg = build_config(cli(&["--timeout", "30"])).unwrap();
        assert_eq!(cfg.timeout_centiseconds, 3000);
    }

    #[test]
    fn rejects_non_oid_vendor() {
        assert!(build_config(cli(&["--vendor", "not-an-oid"])).is_err());
    }

    #[test]
    fn rejects_too_many_disks() {
        assert!(build_config(cli(&["--disks", "a,b,c,d,e"])).is_err());
    }

    #[test]
    fn file_config_fills_every_field_cli_left_unset() {
        let path = std::env::temp_dir().join(format!("mini-snmpd-rs-test-{}.toml", std::process::id()));
        std::fs::write(
            &path,
            r#"
            family = "v6"
            auth = true
            description = "from file"
            vendor = ".1.3.6.1.4.1.99999"
            bind_to_device = "eth1"
            udp_port = 1161
            tcp_port = 1162
            timeout = 42
            loglevel = "debug"
            drop_privs = "nobody"
            foreground = true
            syslog = true
            "#,
        )
        .unwrap();

        let mut cfg = AgentConfig::default();
        apply_file_config(&mut cfg, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.family, AddressFamily::V6);
        assert!(cfg.auth);
        assert_eq!(cfg.description, "from file");
        assert_eq!(cfg.vendor, ".1.3.6.1.4.1.99999");
        assert_eq!(cfg.bind_to_device.as_deref(), Some("eth1"));
        assert_eq!(cfg.udp_port, 1161);
        assert_eq!(cfg.tcp_port, 1162);
        assert_eq!(cfg.timeout_centiseconds, 4200);
        assert_eq!(cfg.loglevel, "debug");
        assert_eq!(cfg.drop_privs_user.as_deref(), Some("nobody"));
        assert!(cfg.foreground);
        assert!(cfg.syslog);
    }

    #[test]
    fn file_config_never_overrides_a_value_the_cli_already_set() {
        let path = std::env::temp_dir().join(format!(
            "mini-snmpd-rs-test-cli-wins-{}.toml",
            std::process::id()
        ));
        std::fs::write(&path, r#"udp_port = 1161"#).unwrap();

        let mut cfg = build_config(cli(&["--udp-port", "5161"])).unwrap();
        apply_file_config(&mut cfg, &path).unwrap();
        std::fs::remove_file(&path).unwrap();

        assert_eq!(cfg.udp_port, 5161);
    }
}
