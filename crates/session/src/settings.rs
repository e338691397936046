use anyhow::{Context, Result};
use log::debug;
use serde::Deserialize;
use snapmaker_qemu::ToolPaths;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV: &str = "SNAPMAKER_CONFIG";
pub const SCAN_PATH_ENV: &str = "SNAPMAKER_SCAN_PATH";
pub const QEMU_IMG_ENV: &str = "SNAPMAKER_QEMU_IMG";

/// On-disk settings. Every field is optional; absent fields keep defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SettingsFile {
    pub scan_path: Option<PathBuf>,
    pub qemu_img_path: Option<PathBuf>,
    pub qemu_img_fallback_path: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub scan_path: PathBuf,
    pub tools: ToolPaths,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            scan_path: default_scan_path(),
            tools: ToolPaths::default(),
        }
    }
}

/// UTM and other sandboxed apps keep their VMs under `~/Library/Containers/`.
pub fn default_scan_path() -> PathBuf {
    dirs::home_dir()
        .map(|home| home.join("Library").join("Containers"))
        .unwrap_or_else(|| PathBuf::from("."))
}

pub fn default_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("snapmaker").join("config.json"))
}

impl Settings {
    /// Defaults, then the settings file, then the environment.
    ///
    /// An explicit `config` path must exist. Without one, `$SNAPMAKER_CONFIG`
    /// or the per-user config file is used when present.
    pub fn load(config: Option<&Path>) -> Result<Self> {
        let mut settings = Settings::default();
        if let Some(file) = locate_config_file(config) {
            settings.apply_file(&load_settings_file(&file)?);
        }
        settings.apply_env(|key| std::env::var_os(key).map(PathBuf::from));
        Ok(settings)
    }

    pub fn apply_file(&mut self, file: &SettingsFile) {
        if let Some(path) = &file.scan_path {
            self.scan_path = path.clone();
        }
        if let Some(path) = &file.qemu_img_path {
            self.tools.preferred = path.clone();
        }
        if let Some(path) = &file.qemu_img_fallback_path {
            self.tools.fallback = Some(path.clone());
        }
    }

    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<PathBuf>) {
        if let Some(path) = lookup(SCAN_PATH_ENV) {
            self.scan_path = path;
        }
        if let Some(path) = lookup(QEMU_IMG_ENV) {
            self.tools.preferred = path;
        }
    }
}

fn locate_config_file(explicit: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(path) = std::env::var_os(CONFIG_ENV) {
        return Some(PathBuf::from(path));
    }
    default_config_file().filter(|path| path.is_file())
}

pub fn load_settings_file(path: &Path) -> Result<SettingsFile> {
    debug!("loading settings from {}", path.display());
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("read settings {}", path.display()))?;
    let file: SettingsFile = serde_json::from_str(&data)
        .with_context(|| format!("parse settings {}", path.display()))?;
    Ok(file)
}
