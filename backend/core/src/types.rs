use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Installation request submitted by the browser form.
///
/// Every field is optional; defaults are applied when the installer
/// configuration is materialized. Unknown fields are ignored.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallRequest {
    /// Language code such as `en` or `de`.
    #[serde(rename = "archinstall-language")]
    pub language: Option<String>,
    /// Caller-supplied disk configuration, passed through unless it asks for
    /// the default layout.
    pub disk_config: Option<Value>,
    pub filesystem: Option<String>,
    /// Target drive; a device path string selects the default layout.
    pub harddrive: Option<Value>,
    pub profile: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "additional-repositories")]
    pub additional_repositories: Vec<String>,
    pub audio_config: Option<String>,
    pub bootloader: Option<String>,
    pub debug: bool,
    pub hostname: Option<String>,
    pub sys_enc: Option<String>,
    pub kb_layout: Option<String>,
    pub mirror_config: Option<Value>,
    pub no_pkg_lookups: bool,
    pub ntp: Option<bool>,
    pub offline: bool,
    pub packages: Vec<String>,
    #[serde(rename = "parallel downloads")]
    pub parallel_downloads: u32,
    pub silent: bool,
    pub skip_ntp: bool,
    pub skip_version_check: bool,
    pub swap: Option<bool>,
    pub timezone: Option<String>,
    pub uikit: bool,
    pub user: Option<UserRequest>,
    pub root_password: Option<Secret>,
}

impl InstallRequest {
    /// The target device when `harddrive` was given as a plain path.
    pub fn harddrive_path(&self) -> Option<&str> {
        self.harddrive
            .as_ref()
            .and_then(Value::as_str)
            .filter(|s| !s.trim().is_empty())
    }
}

/// The user account to create.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRequest {
    pub username: String,
    #[serde(default)]
    pub password: Option<Secret>,
    #[serde(default = "default_sudo")]
    pub sudo: bool,
}

fn default_sudo() -> bool {
    true
}

/// A password that never shows up in `Debug` output.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("***")
    }
}

/// Body of `POST /api/network/config`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkConfigRequest {
    pub interface: String,
    pub method: NetworkMethod,
    #[serde(default)]
    pub config: Option<StaticAddress>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkMethod {
    Dhcp,
    Static,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StaticAddress {
    pub address: String,
    /// Either a prefix length (`24`) or a dotted mask (`255.255.255.0`).
    pub netmask: String,
    #[serde(default)]
    pub gateway: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn deserializes_minimal_request() {
        let req: InstallRequest = serde_json::from_value(json!({
            "harddrive": "/dev/sdX",
            "user": { "username": "alice", "password": "secret" }
        }))
        .unwrap();
        assert_eq!(req.harddrive_path(), Some("/dev/sdX"));
        let user = req.user.unwrap();
        assert_eq!(user.username, "alice");
        assert!(user.sudo);
        assert_eq!(user.password.unwrap().expose(), "secret");
        assert!(req.packages.is_empty());
    }

    #[test]
    fn harddrive_object_is_not_a_path() {
        let req: InstallRequest =
            serde_json::from_value(json!({ "harddrive": {} })).unwrap();
        assert_eq!(req.harddrive_path(), None);
    }

    #[test]
    fn reads_hyphenated_keys() {
        let req: InstallRequest = serde_json::from_value(json!({
            "archinstall-language": "de",
            "parallel downloads": 4,
            "additional-repositories": ["multilib"]
        }))
        .unwrap();
        assert_eq!(req.language.as_deref(), Some("de"));
        assert_eq!(req.parallel_downloads, 4);
        assert_eq!(req.additional_repositories, vec!["multilib"]);
    }

    #[test]
    fn rejects_wrong_types() {
        let res = serde_json::from_value::<InstallRequest>(json!({ "packages": "vim" }));
        assert!(res.is_err());
    }

    #[test]
    fn debug_hides_password() {
        let user = UserRequest {
            username: "alice".into(),
            password: Some(Secret::new("secret")),
            sudo: true,
        };
        let printed = format!("{:?}", user);
        assert!(printed.contains("alice"));
        assert!(!printed.contains("secret"));
    }

    #[test]
    fn parses_network_request() {
        let req: NetworkConfigRequest = serde_json::from_value(json!({
            "interface": "eth0",
            "method": "static",
            "config": { "address": "10.0.0.5", "netmask": "24", "gateway": "10.0.0.1" }
        }))
        .unwrap();
        assert_eq!(req.method, NetworkMethod::Static);
        assert_eq!(req.config.unwrap().gateway.as_deref(), Some("10.0.0.1"));
    }
}
