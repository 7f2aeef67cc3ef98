//! Host services the core relies on: where the registry comes from, where
//! per-user data lives, how paths look to the game and how processes start.
//!
//! Windows uses the live registry and starts the game directly. Elsewhere the
//! launchers live in a Wine prefix and everything goes through it.

use crate::config::Settings;
use crate::game_launcher::SystemStarter;
use crate::planner::PathRenderer;
use crate::registry::RegistryLookup;
use std::path::PathBuf;

#[cfg(windows)]
#[derive(Debug, Clone, Default)]
pub struct Host;

#[cfg(windows)]
impl Host {
    pub fn detect(_settings: &Settings) -> Self {
        Host
    }

    pub fn system_registry(&self) -> Box<dyn RegistryLookup> {
        Box::new(crate::registry::WindowsRegistry)
    }

    pub fn local_app_data(&self) -> Option<PathBuf> {
        dirs::data_local_dir()
    }

    pub fn paths(&self) -> &dyn PathRenderer {
        &crate::planner::NativePaths
    }

    pub fn starter(&self) -> SystemStarter {
        SystemStarter::native()
    }

    pub fn describe(&self) -> String {
        "Windows".to_string()
    }
}

#[cfg(not(windows))]
#[derive(Debug, Clone)]
pub struct Host {
    prefix: crate::prefix::WinePrefix,
    runner: Option<PathBuf>,
}

#[cfg(not(windows))]
impl Host {
    /// Prefix and runner from the settings, else `$WINEPREFIX`/`~/.wine` and `wine` on `$PATH`.
    pub fn detect(settings: &Settings) -> Self {
        use crate::prefix::WinePrefix;
        use tracing::warn;

        let prefix = settings
            .wine
            .prefix
            .clone()
            .map(WinePrefix::new)
            .or_else(WinePrefix::from_env)
            .unwrap_or_else(fallback_prefix);
        if !prefix.exists() {
            warn!("Wine prefix {} has no registry, nothing will be found", prefix.path.display());
        }

        let runner = settings.wine.runner.clone().or_else(|| which::which("wine").ok());
        if runner.is_none() {
            warn!("No Wine runner configured and `wine` is not on PATH");
        }

        Self { prefix, runner }
    }

    pub fn system_registry(&self) -> Box<dyn RegistryLookup> {
        Box::new(self.prefix.registry())
    }

    pub fn local_app_data(&self) -> Option<PathBuf> {
        Some(self.prefix.local_app_data())
    }

    pub fn paths(&self) -> &dyn PathRenderer {
        &self.prefix
    }

    pub fn starter(&self) -> SystemStarter {
        match &self.runner {
            Some(runner) => SystemStarter::wine(runner.clone(), self.prefix.path.clone()),
            None => SystemStarter::native(),
        }
    }

    pub fn describe(&self) -> String {
        match &self.runner {
            Some(runner) => format!("Wine prefix {} ({})", self.prefix.path.display(), runner.display()),
            None => format!("Wine prefix {} (no runner)", self.prefix.path.display()),
        }
    }
}

/// No `$WINEPREFIX` and no home directory: `.wine` below the working directory.
#[cfg(not(windows))]
fn fallback_prefix() -> crate::prefix::WinePrefix {
    let path = std::path::absolute(".wine").unwrap_or_else(|_| PathBuf::from(".wine"));
    tracing::warn!("No $WINEPREFIX and no home directory, using {}", path.display());
    crate::prefix::WinePrefix::new(path)
}

#[cfg(all(test, not(windows)))]
mod tests {
    use super::*;
    use crate::config::WineSettings;
    use tempfile::TempDir;

    #[test]
    fn configured_prefix_and_runner_win() {
        let dir = TempDir::new().unwrap();
        let mut settings = Settings::default();
        settings.wine = WineSettings {
            prefix: Some(dir.path().join("pfx")),
            runner: Some(PathBuf::from("/opt/wine/bin/wine")),
        };

        let host = Host::detect(&settings);
        assert_eq!(host.prefix.path, dir.path().join("pfx"));
        assert_eq!(host.runner, Some(PathBuf::from("/opt/wine/bin/wine")));
        assert!(host.local_app_data().unwrap().ends_with("AppData/Local"));
        assert!(host.starter().wine.is_some());
        assert_eq!(
            host.paths().render(&dir.path().join("pfx/drive_c/Games/Snow")),
            r"C:\Games\Snow"
        );
    }

    #[test]
    fn fallback_prefix_is_absolute() {
        let prefix = fallback_prefix();
        assert!(prefix.path.is_absolute());
        assert!(prefix.path.ends_with(".wine"));
    }
}
