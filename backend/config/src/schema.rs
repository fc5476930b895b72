//! Documents consumed by `archinstall`: the installer configuration and the
//! separate credentials file.

use boxinstall_core::types::Secret;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Installer config
// ---------------------------------------------------------------------------

/// Configuration passed to `archinstall --config`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallerConfig {
    /// Either the generated default layout or the caller's document as-is.
    pub disk_config: Option<Value>,
    pub filesystem: String,
    pub config_version: Option<String>,
    pub version: Option<String>,
    #[serde(rename = "additional-repositories")]
    pub additional_repositories: Vec<String>,
    /// Display name of the installer language (e.g. `Deutsch`).
    #[serde(rename = "archinstall-language")]
    pub language: String,
    pub audio_config: AudioConfig,
    pub bootloader: String,
    pub debug: bool,
    pub harddrive: Value,
    pub hostname: String,
    pub locale_config: LocaleConfig,
    pub mirror_config: Value,
    pub network_config: NetworkConfig,
    pub no_pkg_lookups: bool,
    pub ntp: bool,
    pub offline: bool,
    pub packages: Vec<String>,
    #[serde(rename = "parallel downloads")]
    pub parallel_downloads: u32,
    pub script: String,
    pub silent: bool,
    pub skip_ntp: bool,
    pub skip_version_check: bool,
    pub swap: bool,
    pub timezone: String,
    pub uikit: bool,
    pub profile_config: ProfileConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AudioConfig {
    pub audio: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocaleConfig {
    pub sys_lang: String,
    pub sys_enc: String,
    pub kb_layout: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkConfig {
    #[serde(rename = "type")]
    pub kind: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    pub gfx_driver: Option<String>,
    pub greeter: Option<String>,
    pub profile: ProfileSelection,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfileSelection {
    pub main: String,
    pub details: Vec<String>,
    pub custom_settings: Map<String, Value>,
}

// ---------------------------------------------------------------------------
// Credentials
// ---------------------------------------------------------------------------

/// Contents of `archinstall --creds`. Written with owner-only permissions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(
        rename = "!root-password",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub root_password: Option<Secret>,
    #[serde(rename = "!users", default)]
    pub users: Vec<CredentialUser>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CredentialUser {
    pub username: String,
    #[serde(rename = "!password", default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    pub sudo: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credentials_use_installer_key_names() {
        let creds = Credentials {
            root_password: Some(Secret::new("toor")),
            users: vec![CredentialUser {
                username: "alice".into(),
                password: Some(Secret::new("secret")),
                sudo: true,
            }],
        };
        let v = serde_json::to_value(&creds).unwrap();
        assert_eq!(v["!root-password"], "toor");
        assert_eq!(v["!users"][0]["username"], "alice");
        assert_eq!(v["!users"][0]["!password"], "secret");
    }

    #[test]
    fn credentials_debug_is_masked() {
        let creds = Credentials {
            root_password: Some(Secret::new("toor")),
            users: vec![],
        };
        assert!(!format!("{:?}", creds).contains("toor"));
    }

    #[test]
    fn network_kind_serializes_as_type() {
        let v = serde_json::to_value(NetworkConfig { kind: "nm".into() }).unwrap();
        assert_eq!(v["type"], "nm");
    }
}
