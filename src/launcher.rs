use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Registry field holding the launcher executable (uninstall entry icon).
pub const LAUNCHER_PATH_FIELD: &str = "DisplayIcon";
/// Registry field holding the game root chosen in the launcher.
pub const INSTALL_PATH_FIELD: &str = "InstallPath";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LauncherType {
    /// The original Kingsoft launcher
    Classic,
    /// Seasun launcher; versions before 1.7.7 stored saves without the `game` folder
    Seasun,
}

/// Where the installed game records its own version.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionSource {
    /// JSON manifest next to the game, string field.
    Manifest { file: &'static str, field: &'static str },
    /// Sectioned text file below the game root.
    Ini {
        file: &'static str,
        section: &'static str,
        key: &'static str,
    },
}

/// Publisher identity passed to the game as `-ChannelID`.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum LoginChannel {
    #[default]
    Jinshan,
    Bilibili,
}

impl LoginChannel {
    pub fn id(self) -> &'static str {
        match self {
            LoginChannel::Jinshan => "jinshan",
            LoginChannel::Bilibili => "bilibili",
        }
    }

    pub fn all() -> &'static [LoginChannel] {
        &[LoginChannel::Jinshan, LoginChannel::Bilibili]
    }
}

impl fmt::Display for LoginChannel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.id())
    }
}

impl FromStr for LoginChannel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        LoginChannel::all()
            .iter()
            .copied()
            .find(|channel| channel.id().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let known: Vec<_> = LoginChannel::all().iter().map(|c| c.id()).collect();
                format!("unknown login channel '{s}' (expected one of: {})", known.join(", "))
            })
    }
}

/// Everything that distinguishes one installer lineage from another.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lineage {
    pub launcher_type: LauncherType,
    pub name: &'static str,
    pub launcher_key: &'static str,
    pub game_key: &'static str,
    /// Whether saves may sit directly under the game root or a space-truncated copy of it.
    pub legacy_capable: bool,
    pub default_channel: LoginChannel,
    pub version_source: VersionSource,
}

pub const CLASSIC: Lineage = Lineage {
    launcher_type: LauncherType::Classic,
    name: "Classic launcher",
    launcher_key: r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\ProjectSnow",
    game_key: r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\cbjq",
    legacy_capable: false,
    default_channel: LoginChannel::Jinshan,
    // The launcher diffs manifest.json against the CDN, version.cfg lags behind
    version_source: VersionSource::Manifest {
        file: "manifest.json",
        field: "version",
    },
};

pub const SEASUN: Lineage = Lineage {
    launcher_type: LauncherType::Seasun,
    name: "Seasun launcher",
    launcher_key: r"HKEY_LOCAL_MACHINE\SOFTWARE\Microsoft\Windows\CurrentVersion\Uninstall\SeasunGameCBJQos",
    game_key: r"HKEY_LOCAL_MACHINE\SOFTWARE\Kingsoft\SeasunGameSSG\cbjq",
    legacy_capable: true,
    default_channel: LoginChannel::Jinshan,
    version_source: VersionSource::Ini {
        file: "Temp/VersionManager.ini",
        section: "cbjq",
        key: "GameVersion",
    },
};

/// Probe order; earlier lineages win exact recency ties.
pub static LINEAGES: [Lineage; 2] = [CLASSIC, SEASUN];

impl Lineage {
    pub fn by_type(launcher_type: LauncherType) -> &'static Lineage {
        match launcher_type {
            LauncherType::Classic => &LINEAGES[0],
            LauncherType::Seasun => &LINEAGES[1],
        }
    }
}

/// Fixed layout of an installed game below its root folder.
pub mod layout {
    use super::*;

    pub const GAME_EXE: &str = "game.exe";
    pub const ENGINE_INI: &str = "Engine.ini";
    pub const GAME_INI: &str = "Game.ini";
    pub const GRAPHICS_MARKER: &str = "[SystemSettings]";
    pub const CONTENT_FILTER_FILE: &str = "localization.txt";
    /// Per-channel user dirs, kept inside the canonical save directory.
    pub const CHANNELS_DIR: &str = "Channels";

    pub fn user_dir(game_root: &Path) -> PathBuf {
        game_root.join("game")
    }

    pub fn binaries_dir(game_root: &Path) -> PathBuf {
        user_dir(game_root).join("Game").join("Binaries").join("Win64")
    }

    pub fn game_exe(game_root: &Path) -> PathBuf {
        binaries_dir(game_root).join(GAME_EXE)
    }

    pub fn canonical_save_dir(game_root: &Path) -> PathBuf {
        user_dir(game_root).join("Saved")
    }

    pub fn config_dir(save_dir: &Path) -> PathBuf {
        save_dir.join("Config").join("WindowsNoEditor")
    }

    /// Rewritten by the game on every start; doubles as the recency signal.
    pub fn engine_ini(save_dir: &Path) -> PathBuf {
        config_dir(save_dir).join(ENGINE_INI)
    }

    pub fn game_ini(save_dir: &Path) -> PathBuf {
        config_dir(save_dir).join(GAME_INI)
    }

    /// `-userdir` for a channel other than the lineage default.
    pub fn channel_user_dir(game_root: &Path, channel: LoginChannel) -> PathBuf {
        canonical_save_dir(game_root).join(CHANNELS_DIR).join(channel.id())
    }

    pub fn is_save_dir(path: &Path) -> bool {
        engine_ini(path).is_file()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn login_channel_parses_ids() {
        assert_eq!("jinshan".parse::<LoginChannel>(), Ok(LoginChannel::Jinshan));
        assert_eq!(" Bilibili ".parse::<LoginChannel>(), Ok(LoginChannel::Bilibili));
        assert!("steam".parse::<LoginChannel>().is_err());
    }

    #[test]
    fn lineages_are_distinct_and_ordered() {
        assert_eq!(LINEAGES[0].launcher_type, LauncherType::Classic);
        assert_eq!(Lineage::by_type(LauncherType::Seasun).game_key, SEASUN.game_key);
        assert!(!CLASSIC.legacy_capable);
        assert!(SEASUN.legacy_capable);
    }

    #[test]
    fn channel_user_dir_sits_under_canonical_saves() {
        let root = Path::new("/games/Snow");
        let dir = layout::channel_user_dir(root, LoginChannel::Bilibili);
        assert!(dir.starts_with(layout::canonical_save_dir(root)));
        assert!(dir.ends_with("bilibili"));
    }
}
