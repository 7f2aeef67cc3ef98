use crate::launcher::LoginChannel;
use crate::registry::RegistryLookup;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Close the companion as soon as the game has been started.
    pub auto_exit: bool,
    /// Last applied graphics preset, 0 when none is applied.
    pub graphics_profile: u32,
    pub login_channel: LoginChannel,
    pub install_cache: Vec<CachedLookup>,
    pub wine: WineSettings,

    #[serde(skip)]
    path: Option<PathBuf>,
}

/// A registry value remembered from the last successful resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedLookup {
    pub key: String,
    pub field: String,
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WineSettings {
    /// Prefix holding the launchers; `$WINEPREFIX` or `~/.wine` when unset.
    pub prefix: Option<PathBuf>,
    /// Program used to run `game.exe`; `wine` from `$PATH` when unset.
    pub runner: Option<PathBuf>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            auto_exit: true,
            graphics_profile: 0,
            login_channel: LoginChannel::default(),
            install_cache: Vec::new(),
            wine: WineSettings::default(),
            path: None,
        }
    }
}

impl Settings {
    /// Loads settings from `path` (or the default location). A missing or
    /// unreadable file yields defaults; it is never an error.
    pub fn load(path: Option<&Path>) -> Self {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Self::default_path);

        let mut settings = match std::fs::read_to_string(&path) {
            Ok(contents) => match toml::from_str::<Settings>(&contents) {
                Ok(settings) => settings,
                Err(e) => {
                    warn!("Ignoring corrupt settings file {}: {}", path.display(), e);
                    Settings::default()
                }
            },
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No settings file at {}, using defaults", path.display());
                Settings::default()
            }
            Err(e) => {
                warn!("Cannot read settings file {}: {}", path.display(), e);
                Settings::default()
            }
        };

        settings.path = Some(path);
        settings
    }

    pub fn save(&self) -> Result<()> {
        let path = self.path();

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("create settings directory {}", parent.display()))?;
        }

        let contents = toml::to_string_pretty(self).context("serialize settings")?;
        std::fs::write(&path, contents)
            .with_context(|| format!("write settings file {}", path.display()))?;

        Ok(())
    }

    pub fn path(&self) -> PathBuf {
        self.path.clone().unwrap_or_else(Self::default_path)
    }

    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .or_else(|| dirs::home_dir().map(|home| home.join(".config")))
            .unwrap_or_else(|| PathBuf::from("."))
            .join("snowbreak-box")
            .join("settings.toml")
    }

    /// Replaces any cached value for `key`/`field`.
    pub fn remember_lookup(&mut self, key: &str, field: &str, value: &str) {
        self.install_cache
            .retain(|c| !(c.key.eq_ignore_ascii_case(key) && c.field.eq_ignore_ascii_case(field)));
        self.install_cache.push(CachedLookup {
            key: key.to_string(),
            field: field.to_string(),
            value: value.to_string(),
        });
    }

    pub fn install_cache(&self) -> InstallCache {
        InstallCache {
            entries: self.install_cache.clone(),
        }
    }
}

/// Last known install paths, consulted before the live registry.
#[derive(Debug, Clone, Default)]
pub struct InstallCache {
    entries: Vec<CachedLookup>,
}

impl RegistryLookup for InstallCache {
    fn get(&self, key: &str, field: &str) -> Option<String> {
        self.entries
            .iter()
            .find(|c| c.key.eq_ignore_ascii_case(key) && c.field.eq_ignore_ascii_case(field))
            .map(|c| c.value.clone())
    }

    fn describe(&self) -> String {
        "install cache".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let settings = Settings::load(Some(&dir.path().join("settings.toml")));
        assert!(settings.auto_exit);
        assert_eq!(settings.graphics_profile, 0);
        assert_eq!(settings.login_channel, LoginChannel::Jinshan);
        assert!(settings.install_cache.is_empty());
    }

    #[test]
    fn corrupt_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "auto_exit = \"maybe\"\ngraphics_profile = [").unwrap();

        let settings = Settings::load(Some(&path));
        assert!(settings.auto_exit);
        assert_eq!(settings.graphics_profile, 0);
    }

    #[test]
    fn partial_file_fills_in_defaults() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("settings.toml");
        std::fs::write(&path, "graphics_profile = 2\n").unwrap();

        let settings = Settings::load(Some(&path));
        assert_eq!(settings.graphics_profile, 2);
        assert!(settings.auto_exit);
    }

    #[test]
    fn save_and_reload() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("settings.toml");

        let mut settings = Settings::load(Some(&path));
        settings.auto_exit = false;
        settings.login_channel = LoginChannel::Bilibili;
        settings.remember_lookup(r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\cbjq", "InstallPath", "/games/old");
        settings.remember_lookup(r"hkey_local_machine\software\kingsoft\cbjq", "installpath", "/games/Snow");
        settings.save().unwrap();

        let reloaded = Settings::load(Some(&path));
        assert_eq!(reloaded, settings);
        assert_eq!(reloaded.install_cache.len(), 1);
        assert_eq!(
            reloaded.install_cache().get(r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\cbjq", "InstallPath"),
            Some("/games/Snow".to_string())
        );
    }
}
