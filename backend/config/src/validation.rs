//! Request validation: checks run before anything is written to disk.

use boxinstall_core::InstallRequest;
use once_cell::sync::Lazy;
use regex::Regex;
use thiserror::Error;

use crate::defaults::is_known_language;

static USERNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_-]{0,31}$").unwrap());

static TIMEZONE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_+-]+(/[A-Za-z0-9_+-]+)*$").unwrap());

static PACKAGE_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z0-9@._+-]+$").unwrap());

static HOSTNAME_PATTERN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9]([A-Za-z0-9-]{0,61}[A-Za-z0-9])?$").unwrap());

pub const SUPPORTED_FILESYSTEMS: &[&str] = &["ext4", "btrfs", "xfs", "f2fs"];

/// A validation finding with field path and message.
#[derive(Debug, Error)]
#[error("'{path}': {message}")]
pub struct RequestValidationError {
    pub path: String,
    pub message: String,
}

/// All errors and warnings found in one pass.
#[derive(Debug, Default)]
pub struct ValidationReport {
    pub errors: Vec<RequestValidationError>,
    pub warnings: Vec<RequestValidationError>,
}

impl ValidationReport {
    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }

    /// All errors joined into one line, for responses.
    pub fn error_summary(&self) -> String {
        self.errors
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("; ")
    }

    fn error(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.errors.push(RequestValidationError {
            path: path.into(),
            message: message.into(),
        });
    }

    fn warn(&mut self, path: impl Into<String>, message: impl Into<String>) {
        self.warnings.push(RequestValidationError {
            path: path.into(),
            message: message.into(),
        });
    }
}

/// Validate an install request and return every error and warning.
pub fn validate(request: &InstallRequest) -> ValidationReport {
    let mut report = ValidationReport::default();
    validate_user(request, &mut report);
    validate_disk(request, &mut report);
    validate_system(request, &mut report);
    validate_packages(request, &mut report);
    report
}

fn validate_user(request: &InstallRequest, report: &mut ValidationReport) {
    let Some(user) = &request.user else {
        if request.root_password.is_none() {
            report.warn("user", "No user account or root password; the system will have no login");
        }
        return;
    };
    if !USERNAME_PATTERN.is_match(user.username.trim()) {
        report.error(
            "user.username",
            "must start with a lowercase letter or underscore and contain only [a-z0-9_-]",
        );
    }
    if user.password.as_ref().map_or(true, |p| p.expose().is_empty()) {
        report.warn("user.password", "User has no password");
    }
}

fn validate_disk(request: &InstallRequest, report: &mut ValidationReport) {
    if let Some(path) = request.harddrive_path() {
        if !path.starts_with("/dev/") || path.contains("..") {
            report.error("harddrive", "must be a device path under /dev/");
        }
    }
    if let Some(fs) = &request.filesystem {
        if !SUPPORTED_FILESYSTEMS.contains(&fs.as_str()) {
            report.error(
                "filesystem",
                format!("unsupported filesystem '{fs}'; expected one of {SUPPORTED_FILESYSTEMS:?}"),
            );
        }
    }
    if request.disk_config.is_none() && request.harddrive_path().is_none() {
        report.warn("disk_config", "No disk selected; the installer will reject the config");
    }
}

fn validate_system(request: &InstallRequest, report: &mut ValidationReport) {
    if let Some(hostname) = &request.hostname {
        if !HOSTNAME_PATTERN.is_match(hostname) {
            report.error("hostname", "not a valid hostname");
        }
    }
    if let Some(tz) = &request.timezone {
        if !TIMEZONE_PATTERN.is_match(tz) {
            report.error("timezone", format!("'{tz}' is not a valid zone name"));
        }
    }
    if let Some(lang) = &request.language {
        if !is_known_language(lang) {
            report.warn("archinstall-language", format!("'{lang}' has no display name mapping"));
        }
    }
}

fn validate_packages(request: &InstallRequest, report: &mut ValidationReport) {
    for (i, pkg) in request.packages.iter().enumerate() {
        if !PACKAGE_PATTERN.is_match(pkg.trim()) {
            report.error(format!("packages[{i}]"), format!("'{pkg}' is not a package name"));
        }
    }
}
