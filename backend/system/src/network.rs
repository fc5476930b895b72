//! Network status detection and manual configuration.

use anyhow::{Context, Result};
use boxinstall_core::{InstallError, NetworkConfigRequest, NetworkMethod};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::net::Ipv4Addr;
use tracing::{info, warn};

use crate::command::{run, run_checked};

static ESSID_PATTERN: Lazy<Regex> = Lazy::new(|| Regex::new(r#"ESSID:"([^"]+)""#).unwrap());

static IFACE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9][A-Za-z0-9_.:-]{0,14}$").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConnectionType {
    Ethernet,
    Wifi,
    None,
}

/// Body of `GET /api/network/status`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkStatus {
    pub connection_type: ConnectionType,
    pub interface: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub networks: Option<Vec<String>>,
}

/// The subset of `ip -j addr` used here.
#[derive(Debug, Clone, Deserialize)]
pub struct Interface {
    pub ifname: String,
    #[serde(default)]
    pub flags: Vec<String>,
    #[serde(default)]
    pub operstate: Option<String>,
    #[serde(default)]
    pub addr_info: Vec<AddrInfo>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AddrInfo {
    #[serde(default)]
    pub family: String,
}

impl Interface {
    fn is_up(&self) -> bool {
        self.flags.iter().any(|f| f == "UP")
            || self.operstate.as_deref().is_some_and(|s| s.eq_ignore_ascii_case("up"))
    }

    fn has_ipv4(&self) -> bool {
        self.addr_info.iter().any(|a| a.family == "inet")
    }

    fn is_ethernet(&self) -> bool {
        self.ifname.starts_with("en") || self.ifname.starts_with("eth")
    }

    fn is_wireless(&self) -> bool {
        self.ifname.starts_with('w')
    }
}

pub fn parse_ip_addr(raw: &str) -> Result<Vec<Interface>> {
    serde_json::from_str(raw).context("ip -j addr output is not valid JSON")
}

pub fn parse_essids(scan: &str) -> Vec<String> {
    let mut ssids: Vec<String> = Vec::new();
    for cap in ESSID_PATTERN.captures_iter(scan) {
        let ssid = cap[1].to_string();
        if !ssids.contains(&ssid) {
            ssids.push(ssid);
        }
    }
    ssids
}

/// An up Ethernet interface with an IPv4 address wins; otherwise the first
/// up wireless interface; otherwise nothing.
pub fn classify(interfaces: &[Interface]) -> (ConnectionType, Option<&Interface>) {
    let candidates = || interfaces.iter().filter(|i| i.ifname != "lo" && i.is_up());
    if let Some(eth) = candidates().find(|i| i.is_ethernet() && i.has_ipv4()) {
        return (ConnectionType::Ethernet, Some(eth));
    }
    if let Some(wifi) = candidates().find(|i| i.is_wireless()) {
        return (ConnectionType::Wifi, Some(wifi));
    }
    (ConnectionType::None, None)
}

pub async fn network_status() -> Result<NetworkStatus, InstallError> {
    let raw = run_checked("ip", &["-j", "addr"]).await?;
    let interfaces = parse_ip_addr(&raw)?;

    let status = match classify(&interfaces) {
        (ConnectionType::Wifi, Some(iface)) => {
            let networks = match run("iwlist", &[&iface.ifname, "scan"]).await {
                Ok(out) if out.success() => parse_essids(&out.stdout),
                Ok(out) => {
                    warn!(interface = %iface.ifname, code = out.code, "Wireless scan failed");
                    Vec::new()
                }
                Err(e) => {
                    warn!(interface = %iface.ifname, error = %e, "Wireless scan unavailable");
                    Vec::new()
                }
            };
            NetworkStatus {
                connection_type: ConnectionType::Wifi,
                interface: Some(iface.ifname.clone()),
                networks: Some(networks),
            }
        }
        (kind, iface) => NetworkStatus {
            connection_type: kind,
            interface: iface.map(|i| i.ifname.clone()),
            networks: None,
        },
    };
    Ok(status)
}

fn invalid(message: impl Into<String>) -> InstallError {
    InstallError::InvalidRequest(message.into())
}

/// Accepts a prefix length or a contiguous dotted netmask.
pub fn prefix_len(netmask: &str) -> Result<u8, InstallError> {
    let netmask = netmask.trim().trim_start_matches('/');
    if let Ok(prefix) = netmask.parse::<u8>() {
        if prefix <= 32 {
            return Ok(prefix);
        }
        return Err(invalid(format!("prefix length {prefix} out of range")));
    }
    let mask: Ipv4Addr = netmask
        .parse()
        .map_err(|_| invalid(format!("'{netmask}' is not a netmask")))?;
    let bits = u32::from(mask);
    if bits.leading_ones() + bits.trailing_zeros() != 32 {
        return Err(invalid(format!("'{netmask}' is not a contiguous netmask")));
    }
    Ok(bits.leading_ones() as u8)
}

/// The commands that apply `request`, in order. Nothing is executed.
pub fn plan_network_config(request: &NetworkConfigRequest) -> Result<Vec<Vec<String>>, InstallError> {
    let iface = request.interface.trim();
    if !IFACE_PATTERN.is_match(iface) {
        return Err(invalid(format!("'{iface}' is not an interface name")));
    }
    let cmd = |parts: &[&str]| parts.iter().map(|p| p.to_string()).collect::<Vec<_>>();

    match request.method {
        NetworkMethod::Dhcp => Ok(vec![cmd(&["dhclient", iface])]),
        NetworkMethod::Static => {
            let cfg = request
                .config
                .as_ref()
                .ok_or_else(|| invalid("static configuration requires 'config'"))?;
            let address: Ipv4Addr = cfg
                .address
                .trim()
                .parse()
                .map_err(|_| invalid(format!("'{}' is not an IPv4 address", cfg.address)))?;
            let prefix = prefix_len(&cfg.netmask)?;
            let cidr = format!("{address}/{prefix}");

            let mut plan = vec![
                cmd(&["ip", "addr", "flush", "dev", iface]),
                cmd(&["ip", "addr", "add", &cidr, "dev", iface]),
            ];
            if let Some(gateway) = cfg.gateway.as_deref().filter(|g| !g.trim().is_empty()) {
                let gateway: Ipv4Addr = gateway
                    .trim()
                    .parse()
                    .map_err(|_| invalid(format!("'{gateway}' is not an IPv4 gateway")))?;
                plan.push(cmd(&["ip", "route", "add", "default", "via", &gateway.to_string()]));
            }
            Ok(plan)
        }
    }
}

pub async fn apply_network_config(request: &NetworkConfigRequest) -> Result<(), InstallError> {
    let plan = plan_network_config(request)?;
    for step in &plan {
        let (program, args) = step.split_first().ok_or_else(|| invalid("empty command"))?;
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        run_checked(program, &args).await?;
    }
    info!(interface = %request.interface, method = ?request.method, steps = plan.len(), "Network configured");
    Ok(())
}
