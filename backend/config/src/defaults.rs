//! Default values applied when turning a request into installer documents.

use boxinstall_core::InstallRequest;
use serde_json::{json, Map, Value};

use crate::schema::{
    AudioConfig, CredentialUser, Credentials, InstallerConfig, LocaleConfig, NetworkConfig,
    ProfileConfig, ProfileSelection,
};

pub const DEFAULT_LANGUAGE: &str = "en";
pub const DEFAULT_FILESYSTEM: &str = "ext4";
pub const DEFAULT_BOOTLOADER: &str = "systemd-boot";
pub const DEFAULT_TIMEZONE: &str = "UTC";
pub const DEFAULT_AUDIO: &str = "pipewire";
pub const DEFAULT_PROFILE: &str = "Minimal";
pub const DEFAULT_HOSTNAME: &str = "archlinux";
pub const DEFAULT_KB_LAYOUT: &str = "us";
pub const DEFAULT_ENCODING: &str = "UTF-8";

/// Packages installed on every system regardless of the selection.
pub const BASELINE_PACKAGES: &[&str] = &["networkmanager", "sudo", "nano"];

static LANGUAGES: &[(&str, &str)] = &[
    ("en", "English"),
    ("fr", "Français"),
    ("es", "Español"),
    ("de", "Deutsch"),
    ("it", "Italiano"),
    ("pt", "Português"),
];

/// Map a language code to the display name the installer expects, falling
/// back to the code itself.
pub fn language_name(code: &str) -> String {
    LANGUAGES
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, name)| name.to_string())
        .unwrap_or_else(|| code.to_string())
}

pub fn is_known_language(code: &str) -> bool {
    LANGUAGES.iter().any(|(c, _)| *c == code)
}

/// User packages followed by any baseline packages not already listed.
pub fn merge_packages(requested: &[String]) -> Vec<String> {
    let mut packages: Vec<String> = Vec::with_capacity(requested.len() + BASELINE_PACKAGES.len());
    let candidates = requested
        .iter()
        .map(|p| p.trim())
        .chain(BASELINE_PACKAGES.iter().copied());
    for pkg in candidates {
        if !pkg.is_empty() && !packages.iter().any(|p| p == pkg) {
            packages.push(pkg.to_string());
        }
    }
    packages
}

/// Build the installer configuration for `request`, using `disk_config` as
/// the already-resolved disk layout.
pub fn build_installer_config(request: &InstallRequest, disk_config: Option<Value>) -> InstallerConfig {
    let lang_code = request
        .language
        .clone()
        .unwrap_or_else(|| DEFAULT_LANGUAGE.to_string());

    InstallerConfig {
        disk_config,
        filesystem: or_default(&request.filesystem, DEFAULT_FILESYSTEM),
        config_version: request.version.clone(),
        version: request.version.clone(),
        additional_repositories: request.additional_repositories.clone(),
        language: language_name(&lang_code),
        audio_config: AudioConfig {
            audio: or_default(&request.audio_config, DEFAULT_AUDIO),
        },
        bootloader: or_default(&request.bootloader, DEFAULT_BOOTLOADER),
        debug: request.debug,
        harddrive: request.harddrive.clone().unwrap_or_else(|| json!({})),
        hostname: or_default(&request.hostname, DEFAULT_HOSTNAME),
        locale_config: LocaleConfig {
            sys_lang: lang_code,
            sys_enc: or_default(&request.sys_enc, DEFAULT_ENCODING),
            kb_layout: or_default(&request.kb_layout, DEFAULT_KB_LAYOUT),
        },
        mirror_config: request.mirror_config.clone().unwrap_or_else(|| json!({})),
        network_config: NetworkConfig { kind: "nm".into() },
        no_pkg_lookups: request.no_pkg_lookups,
        ntp: request.ntp.unwrap_or(true),
        offline: request.offline,
        packages: merge_packages(&request.packages),
        parallel_downloads: request.parallel_downloads,
        script: "guided".into(),
        silent: request.silent,
        skip_ntp: request.skip_ntp,
        skip_version_check: request.skip_version_check,
        swap: request.swap.unwrap_or(true),
        timezone: or_default(&request.timezone, DEFAULT_TIMEZONE),
        uikit: request.uikit,
        profile_config: ProfileConfig {
            gfx_driver: None,
            greeter: None,
            profile: ProfileSelection {
                main: or_default(&request.profile, DEFAULT_PROFILE),
                details: Vec::new(),
                custom_settings: Map::new(),
            },
        },
    }
}

/// Build the credentials document for `request`.
pub fn build_credentials(request: &InstallRequest) -> Credentials {
    Credentials {
        root_password: request.root_password.clone(),
        users: request
            .user
            .iter()
            .map(|u| CredentialUser {
                username: u.username.trim().to_string(),
                password: u.password.clone(),
                sudo: u.sudo,
            })
            .collect(),
    }
}

fn or_default(value: &Option<String>, default: &str) -> String {
    value
        .as_deref()
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(v: Value) -> InstallRequest {
        serde_json::from_value(v).unwrap()
    }

    #[test]
    fn maps_known_languages() {
        assert_eq!(language_name("de"), "Deutsch");
        assert_eq!(language_name("pt"), "Português");
    }

    #[test]
    fn unknown_language_falls_back_to_code() {
        assert_eq!(language_name("nl"), "nl");
    }

    #[test]
    fn packages_are_union_without_duplicates() {
        let merged = merge_packages(&["vim".into(), "sudo".into(), "vim".into()]);
        assert_eq!(merged, vec!["vim", "sudo", "networkmanager", "nano"]);
    }

    #[test]
    fn empty_request_gets_all_defaults() {
        let cfg = build_installer_config(&InstallRequest::default(), None);
        assert_eq!(cfg.filesystem, "ext4");
        assert_eq!(cfg.bootloader, "systemd-boot");
        assert_eq!(cfg.timezone, "UTC");
        assert_eq!(cfg.language, "English");
        assert_eq!(cfg.locale_config.sys_lang, "en");
        assert_eq!(cfg.audio_config.audio, "pipewire");
        assert_eq!(cfg.profile_config.profile.main, "Minimal");
        assert_eq!(cfg.script, "guided");
        assert!(cfg.ntp);
        assert!(cfg.swap);
        assert_eq!(cfg.harddrive, json!({}));
        assert_eq!(cfg.packages, vec!["networkmanager", "sudo", "nano"]);
    }

    #[test]
    fn request_values_override_defaults() {
        let cfg = build_installer_config(
            &request(json!({
                "archinstall-language": "fr",
                "filesystem": "btrfs",
                "bootloader": "grub",
                "timezone": "Europe/Paris",
                "swap": false,
                "packages": ["firefox"]
            })),
            None,
        );
        assert_eq!(cfg.language, "Français");
        assert_eq!(cfg.locale_config.sys_lang, "fr");
        assert_eq!(cfg.filesystem, "btrfs");
        assert_eq!(cfg.bootloader, "grub");
        assert_eq!(cfg.timezone, "Europe/Paris");
        assert!(!cfg.swap);
        assert_eq!(cfg.packages[0], "firefox");
    }

    #[test]
    fn blank_strings_use_defaults() {
        let cfg = build_installer_config(&request(json!({ "timezone": "  " })), None);
        assert_eq!(cfg.timezone, "UTC");
    }

    #[test]
    fn config_never_contains_passwords() {
        let req = request(json!({
            "user": { "username": "alice", "password": "secret" },
            "root_password": "toor"
        }));
        let text = serde_json::to_string(&build_installer_config(&req, None)).unwrap();
        assert!(!text.contains("secret"));
        assert!(!text.contains("toor"));
    }

    #[test]
    fn credentials_list_the_user() {
        let req = request(json!({
            "user": { "username": "alice", "password": "secret", "sudo": false }
        }));
        let creds = build_credentials(&req);
        assert!(creds.root_password.is_none());
        assert_eq!(creds.users.len(), 1);
        assert_eq!(creds.users[0].username, "alice");
        assert!(!creds.users[0].sudo);
        assert_eq!(creds.users[0].password.as_ref().unwrap().expose(), "secret");
    }
}
