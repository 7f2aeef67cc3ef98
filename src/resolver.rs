use crate::error::{BoxError, Result};
use crate::ini::IniFile;
use crate::launcher::{layout, LauncherType, Lineage, LoginChannel, VersionSource};
use crate::probe::{DiscoveryProgress, InstallationCandidate, SaveLayout, SaveSource};
use crate::version::{read_json_string, LocalVersion};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Snapshot of the one installation this session works with.
///
/// Never mutated in place: migration and the update check hand back a new
/// snapshot and the caller decides what to refresh.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResolvedEnvironment {
    pub launcher_type: LauncherType,
    pub launcher_path: PathBuf,
    pub game_root: PathBuf,
    pub save_dir: PathBuf,
    pub layout: SaveLayout,
    pub save_source: SaveSource,
    pub local_version: Option<LocalVersion>,
    pub save_path_is_canonical: bool,
    pub default_channel: LoginChannel,
    pub update_available: bool,
}

impl ResolvedEnvironment {
    pub fn lineage(&self) -> &'static Lineage {
        Lineage::by_type(self.launcher_type)
    }

    pub fn canonical_save_dir(&self) -> PathBuf {
        layout::canonical_save_dir(&self.game_root)
    }

    pub fn engine_ini(&self) -> PathBuf {
        layout::engine_ini(&self.save_dir)
    }

    pub fn game_ini(&self) -> PathBuf {
        layout::game_ini(&self.save_dir)
    }

    pub fn with_update_available(&self, update_available: bool) -> Self {
        Self {
            update_available,
            ..self.clone()
        }
    }

    /// The same installation with its saves moved to the canonical location.
    pub fn with_canonical_saves(&self) -> Self {
        Self {
            save_dir: self.canonical_save_dir(),
            layout: SaveLayout::Standard,
            save_source: SaveSource::GameSubfolder,
            save_path_is_canonical: true,
            ..self.clone()
        }
    }

    /// When the active saves were last written by the game.
    pub fn last_played(&self) -> Option<SystemTime> {
        fs::metadata(self.engine_ini()).and_then(|m| m.modified()).ok()
    }
}

/// Picks the single active installation out of the probed candidates.
pub fn resolve(candidates: Vec<InstallationCandidate>) -> Result<ResolvedEnvironment> {
    let max_progress = candidates
        .iter()
        .map(InstallationCandidate::progress)
        .max()
        .unwrap_or(DiscoveryProgress::LineageAbsent);

    let mut winner: Option<(InstallationCandidate, SystemTime)> = None;
    for candidate in candidates {
        if candidate.progress() != DiscoveryProgress::Resolved {
            continue;
        }
        let Some(save_dir) = candidate.save_dir.as_deref() else {
            continue;
        };

        let written = last_write(save_dir);
        debug!("{} saves last written {:?}", candidate.lineage.name, written);

        // Only a strictly newer save replaces the current pick, so probe order breaks ties
        let newer = winner.as_ref().map(|(_, best)| written > *best).unwrap_or(true);
        if newer {
            winner = Some((candidate, written));
        }
    }

    let Some((candidate, _)) = winner else {
        return Err(progress_error(max_progress));
    };

    build_environment(candidate).ok_or_else(|| progress_error(max_progress))
}

fn build_environment(candidate: InstallationCandidate) -> Option<ResolvedEnvironment> {
    let lineage = candidate.lineage;
    let layout = candidate.layout();
    let save_source = candidate.save_source?;
    let launcher_path = candidate.launcher_path?;
    let game_root = candidate.game_root?;
    let save_dir = candidate.save_dir?;

    let local_version = read_local_version(lineage, &game_root);
    match &local_version {
        Some(version) => info!("Using {} install at {} (version {})", lineage.name, game_root.display(), version),
        None => warn!(
            "Using {} install at {}, local version unknown, update checks disabled",
            lineage.name,
            game_root.display()
        ),
    }

    Some(ResolvedEnvironment {
        launcher_type: lineage.launcher_type,
        launcher_path,
        game_root,
        save_dir,
        layout,
        save_source,
        local_version,
        save_path_is_canonical: layout == SaveLayout::Standard,
        default_channel: lineage.default_channel,
        update_available: false,
    })
}

fn progress_error(progress: DiscoveryProgress) -> BoxError {
    match progress {
        DiscoveryProgress::LineageAbsent => BoxError::NoLauncherFound,
        DiscoveryProgress::GameNotInstalled => BoxError::GameNotInstalled,
        DiscoveryProgress::SaveNotFound | DiscoveryProgress::Resolved => BoxError::SaveDataNotFound,
    }
}

/// Modification time of the save's Engine.ini; access time is not trustworthy.
fn last_write(save_dir: &Path) -> SystemTime {
    fs::metadata(layout::engine_ini(save_dir))
        .and_then(|m| m.modified())
        .unwrap_or(SystemTime::UNIX_EPOCH)
}

/// Reads the version the launcher recorded for the installed game.
/// Any read or parse failure yields `None`.
pub fn read_local_version(lineage: &Lineage, game_root: &Path) -> Option<LocalVersion> {
    let raw = match lineage.version_source {
        VersionSource::Manifest { file, field } => {
            let path = game_root.join(file);
            let json = fs::read_to_string(&path)
                .map_err(|e| debug!("Cannot read {}: {}", path.display(), e))
                .ok()?;
            read_json_string(&json, field)?
        }
        VersionSource::Ini { file, section, key } => IniFile::new(game_root.join(file)).read(section, key)?,
    };

    let parsed = LocalVersion::parse(&raw);
    if parsed.is_none() {
        debug!("Unrecognised local version '{}'", raw);
    }
    parsed
}
