use crate::config::Settings;
use crate::error::{BoxError, Result};
use crate::ini::IniFile;
use crate::launcher::layout;
use crate::resolver::ResolvedEnvironment;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const SPLASH_SECTION: &str = "Distribution";
const SPLASH_KEY: &str = "SplashScreen";
const CONTENT_FILTER_KEY: &str = "localization";

/// Engine.ini presets, indexed by level - 1.
const GRAPHICS_PRESETS: [(&str, &str); 3] = [
    ("performance", include_str!("presets/profile1.ini")),
    ("balanced", include_str!("presets/profile2.ini")),
    ("quality", include_str!("presets/profile3.ini")),
];

pub fn graphics_profile_name(level: u32) -> Option<&'static str> {
    match level {
        0 => Some("default"),
        n => GRAPHICS_PRESETS.get(n as usize - 1).map(|(name, _)| *name),
    }
}

pub fn graphics_profile_count() -> u32 {
    GRAPHICS_PRESETS.len() as u32
}

/// Preferences stored in the game's own files for one resolved installation.
pub struct GamePreferences<'a> {
    env: &'a ResolvedEnvironment,
}

impl<'a> GamePreferences<'a> {
    pub fn new(env: &'a ResolvedEnvironment) -> Self {
        Self { env }
    }

    /// Applied graphics preset.
    ///
    /// The game rewrites Engine.ini on start, so the level itself lives in the
    /// settings; it only counts while Engine.ini still has the preset's marker
    /// section. A stale level is reset to 0 in `settings` (the caller persists it).
    pub fn graphics_profile(&self, settings: &mut Settings) -> u32 {
        if settings.graphics_profile == 0 {
            return 0;
        }

        if !has_graphics_marker(&self.env.engine_ini()) {
            info!(
                "Graphics preset {} no longer applied, Engine.ini was reset",
                settings.graphics_profile
            );
            settings.graphics_profile = 0;
        }
        settings.graphics_profile
    }

    /// Replaces Engine.ini with the preset for `level`; 0 empties it and the game
    /// regenerates its defaults on the next start.
    pub fn set_graphics_profile(&self, settings: &mut Settings, level: u32) -> Result<()> {
        let contents = match level {
            0 => "",
            n => GRAPHICS_PRESETS
                .get(n as usize - 1)
                .map(|(_, ini)| *ini)
                .ok_or(BoxError::UnknownGraphicsProfile(level))?,
        };

        let path = self.env.engine_ini();
        write_file(&path, contents)?;
        settings.graphics_profile = level;
        debug!("Wrote graphics preset {} to {}", level, path.display());
        Ok(())
    }

    /// `true` when `localization.txt` turns filtering off. Anything unexpected reads as filtered.
    pub fn content_filter_disabled(&self) -> bool {
        let path = self.content_filter_file();
        let Ok(contents) = fs::read_to_string(&path) else {
            return false;
        };

        let Some((key, value)) = contents.lines().next().and_then(|line| line.split_once('=')) else {
            return false;
        };
        if value.contains('=') {
            return false;
        }
        key.trim() == CONTENT_FILTER_KEY && value.trim() == "1"
    }

    pub fn set_content_filter_disabled(&self, disabled: bool) -> Result<()> {
        let value = if disabled { 1 } else { 0 };
        write_file(&self.content_filter_file(), &format!("{CONTENT_FILTER_KEY} = {value}"))
    }

    fn content_filter_file(&self) -> PathBuf {
        self.env.game_root.join(layout::CONTENT_FILTER_FILE)
    }

    pub fn splash_disabled(&self) -> bool {
        splash_disabled(&self.env.save_dir)
    }

    pub fn set_splash_disabled(&self, disabled: bool) -> Result<()> {
        set_splash_disabled(&self.env.save_dir, disabled)
    }

    /// Mirrors the active graphics config and splash flag into another save
    /// directory (a per-channel one) so every channel starts the same way.
    pub fn propagate_to(&self, target_save_dir: &Path) -> Result<()> {
        let source = self.env.engine_ini();
        let target = layout::engine_ini(target_save_dir);

        let config_dir = layout::config_dir(target_save_dir);
        fs::create_dir_all(&config_dir).map_err(|e| preference_error(&config_dir, e))?;
        if source.is_file() {
            fs::copy(&source, &target).map_err(|e| preference_error(&target, e))?;
        }

        set_splash_disabled(target_save_dir, self.splash_disabled())?;
        debug!("Propagated preferences to {}", target_save_dir.display());
        Ok(())
    }
}

fn has_graphics_marker(engine_ini: &Path) -> bool {
    fs::read_to_string(engine_ini)
        .map(|contents| contents.contains(layout::GRAPHICS_MARKER))
        .unwrap_or(false)
}

fn splash_disabled(save_dir: &Path) -> bool {
    IniFile::new(layout::game_ini(save_dir))
        .read(SPLASH_SECTION, SPLASH_KEY)
        .map(|value| value.eq_ignore_ascii_case("false"))
        .unwrap_or(false)
}

fn set_splash_disabled(save_dir: &Path, disabled: bool) -> Result<()> {
    let ini = IniFile::new(layout::game_ini(save_dir));
    let written = if disabled {
        ini.write(SPLASH_SECTION, SPLASH_KEY, "False")
    } else {
        ini.delete_key(SPLASH_SECTION, SPLASH_KEY)
    };
    written.map_err(|e| preference_error(ini.path(), e))
}

fn write_file(path: &Path, contents: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| preference_error(parent, e))?;
    }
    fs::write(path, contents).map_err(|e| preference_error(path, e))
}

fn preference_error(path: &Path, source: io::Error) -> BoxError {
    BoxError::Preference {
        path: path.to_path_buf(),
        source,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launcher::{LauncherType, LoginChannel};
    use crate::probe::{SaveLayout, SaveSource};
    use crate::test_support::touch;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    fn env(dir: &TempDir) -> ResolvedEnvironment {
        let root = dir.path().join("Snow");
        ResolvedEnvironment {
            launcher_type: LauncherType::Classic,
            launcher_path: dir.path().join("launcher.exe"),
            save_dir: layout::canonical_save_dir(&root),
            game_root: root,
            layout: SaveLayout::Standard,
            save_source: SaveSource::GameSubfolder,
            local_version: None,
            save_path_is_canonical: true,
            default_channel: LoginChannel::Jinshan,
            update_available: false,
        }
    }

    fn settings(dir: &TempDir) -> Settings {
        Settings::load(Some(&dir.path().join("settings.toml")))
    }

    #[test]
    fn presets_carry_the_marker() {
        for (name, ini) in GRAPHICS_PRESETS {
            assert!(ini.contains(layout::GRAPHICS_MARKER), "{name}");
        }
        assert_eq!(graphics_profile_name(2), Some("balanced"));
        assert_eq!(graphics_profile_name(4), None);
    }

    #[test]
    fn graphics_profile_round_trips_while_marker_present() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        let mut settings = settings(&dir);

        for level in 1..=graphics_profile_count() {
            prefs.set_graphics_profile(&mut settings, level).unwrap();
            assert_eq!(prefs.graphics_profile(&mut settings), level);
        }
    }

    #[test]
    fn graphics_profile_resets_when_game_rewrites_engine_ini() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        let mut settings = settings(&dir);

        prefs.set_graphics_profile(&mut settings, 3).unwrap();
        touch(&env.engine_ini(), "[Core.System]\nPaths=../../../Engine/Content\n");

        assert_eq!(prefs.graphics_profile(&mut settings), 0);
        assert_eq!(settings.graphics_profile, 0);
    }

    #[test]
    fn graphics_profile_zero_empties_engine_ini() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        let mut settings = settings(&dir);

        prefs.set_graphics_profile(&mut settings, 1).unwrap();
        prefs.set_graphics_profile(&mut settings, 0).unwrap();
        assert_eq!(fs::read_to_string(env.engine_ini()).unwrap(), "");
        assert_eq!(prefs.graphics_profile(&mut settings), 0);
    }

    #[test]
    fn unknown_graphics_profile_is_rejected() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        let mut settings = settings(&dir);
        touch(&env.engine_ini(), "[SystemSettings]\n");

        let err = prefs.set_graphics_profile(&mut settings, 7).unwrap_err();
        assert!(matches!(err, BoxError::UnknownGraphicsProfile(7)));
        assert_eq!(fs::read_to_string(env.engine_ini()).unwrap(), "[SystemSettings]\n");
    }

    #[test]
    fn content_filter_round_trip() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);

        prefs.set_content_filter_disabled(true).unwrap();
        assert!(prefs.content_filter_disabled());
        assert_eq!(
            fs::read_to_string(env.game_root.join("localization.txt")).unwrap(),
            "localization = 1"
        );

        prefs.set_content_filter_disabled(false).unwrap();
        assert!(!prefs.content_filter_disabled());
    }

    #[test]
    fn content_filter_fails_safe() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        let file = env.game_root.join("localization.txt");

        // Missing file
        assert!(!prefs.content_filter_disabled());

        for contents in ["localization 1", "censor = 1", "localization = 1 = 1", "", "localization = yes"] {
            touch(&file, contents);
            assert!(!prefs.content_filter_disabled(), "{contents:?}");
        }

        touch(&file, "  localization=1  \r\n");
        assert!(prefs.content_filter_disabled());
    }

    #[test]
    fn splash_toggle_edits_game_ini() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        touch(&env.game_ini(), "[Distribution]\nChannel=1\n");

        assert!(!prefs.splash_disabled());
        prefs.set_splash_disabled(true).unwrap();
        assert!(prefs.splash_disabled());

        prefs.set_splash_disabled(false).unwrap();
        assert!(!prefs.splash_disabled());
        assert_eq!(fs::read_to_string(env.game_ini()).unwrap(), "[Distribution]\nChannel=1\n");
    }

    #[test]
    fn splash_value_is_case_insensitive() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        touch(&env.game_ini(), "[Distribution]\nSplashScreen=FALSE\n");
        assert!(GamePreferences::new(&env).splash_disabled());
    }

    #[test]
    fn propagation_copies_engine_ini_and_splash() {
        let dir = TempDir::new().unwrap();
        let env = env(&dir);
        let prefs = GamePreferences::new(&env);
        let mut settings = settings(&dir);
        prefs.set_graphics_profile(&mut settings, 2).unwrap();
        prefs.set_splash_disabled(true).unwrap();

        let channel_save = dir.path().join("Snow/game/Saved/Channels/bilibili/Saved");
        prefs.propagate_to(&channel_save).unwrap();

        assert_eq!(
            fs::read_to_string(layout::engine_ini(&channel_save)).unwrap(),
            fs::read_to_string(env.engine_ini()).unwrap()
        );
        assert!(splash_disabled(&channel_save));

        prefs.set_splash_disabled(false).unwrap();
        prefs.propagate_to(&channel_save).unwrap();
        assert!(!splash_disabled(&channel_save));
    }
}
