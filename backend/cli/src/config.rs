use boxinstall_config::Settings;
use std::path::PathBuf;

/// Settings given on the command line; these win over file and environment.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub port: Option<u16>,
    pub bind: Option<String>,
    pub web_root: Option<PathBuf>,
    pub installer: Option<String>,
}

impl CliOverrides {
    pub fn apply(self, mut settings: Settings) -> Settings {
        if let Some(port) = self.port {
            settings.port = port;
        }
        if let Some(bind) = self.bind {
            settings.bind_address = bind;
        }
        if let Some(web_root) = self.web_root {
            settings.web_root = web_root;
        }
        if let Some(installer) = self.installer {
            settings.installer.program = installer;
        }
        settings
    }
}
