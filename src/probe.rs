use crate::launcher::{layout, Lineage, INSTALL_PATH_FIELD, LAUNCHER_PATH_FIELD, LINEAGES};
use crate::planner::{NativePaths, PathRenderer};
use crate::registry::RegistryLookup;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::debug;

/// How far probing a lineage got. Ordered, so the most advanced partial result wins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscoveryProgress {
    LineageAbsent = 0,
    GameNotInstalled = 1,
    SaveNotFound = 2,
    Resolved = 3,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveLayout {
    /// `<root>/game/Saved`
    Standard,
    /// `<root>/Saved`, written by Seasun launchers before 1.7.7
    LegacyNoGameSubfolder,
    Other,
}

/// Which probe step found the save directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SaveSource {
    GameSubfolder,
    GameRoot,
    /// Game root cut at its first space (Seasun 1.7.7 passed `-userdir` unquoted)
    TruncatedRoot,
    LocalAppData,
}

impl SaveSource {
    pub fn layout(self) -> SaveLayout {
        match self {
            SaveSource::GameSubfolder => SaveLayout::Standard,
            SaveSource::GameRoot => SaveLayout::LegacyNoGameSubfolder,
            SaveSource::TruncatedRoot | SaveSource::LocalAppData => SaveLayout::Other,
        }
    }
}

/// Result of probing one lineage. Built fresh on every resolution.
#[derive(Debug, Clone)]
pub struct InstallationCandidate {
    pub lineage: &'static Lineage,
    pub launcher_path: Option<PathBuf>,
    pub game_root: Option<PathBuf>,
    pub save_dir: Option<PathBuf>,
    pub save_source: Option<SaveSource>,
}

impl InstallationCandidate {
    fn absent(lineage: &'static Lineage) -> Self {
        Self {
            lineage,
            launcher_path: None,
            game_root: None,
            save_dir: None,
            save_source: None,
        }
    }

    pub fn progress(&self) -> DiscoveryProgress {
        match (&self.launcher_path, &self.game_root, &self.save_dir) {
            (None, _, _) => DiscoveryProgress::LineageAbsent,
            (Some(_), None, _) => DiscoveryProgress::GameNotInstalled,
            (Some(_), Some(_), None) => DiscoveryProgress::SaveNotFound,
            (Some(_), Some(_), Some(_)) => DiscoveryProgress::Resolved,
        }
    }

    pub fn layout(&self) -> SaveLayout {
        self.save_source
            .map(SaveSource::layout)
            .unwrap_or(SaveLayout::Other)
    }
}

/// Probes installer lineages through an ordered chain of lookup sources.
///
/// For every lookup the sources are tried in order and the first value that
/// passes the on-disk check wins, so a stale cached path falls through to the
/// live registry.
pub struct InstallerProbe<'a> {
    sources: Vec<&'a dyn RegistryLookup>,
    local_app_data: Option<PathBuf>,
    paths: &'a dyn PathRenderer,
}

impl<'a> InstallerProbe<'a> {
    pub fn new(sources: Vec<&'a dyn RegistryLookup>, local_app_data: Option<PathBuf>) -> Self {
        Self {
            sources,
            local_app_data,
            paths: &NativePaths,
        }
    }

    /// How the launchers see host paths; the truncated-root workaround cuts
    /// the path as they wrote it.
    pub fn with_paths(mut self, paths: &'a dyn PathRenderer) -> Self {
        self.paths = paths;
        self
    }

    pub fn probe_all(&self) -> Vec<InstallationCandidate> {
        LINEAGES.iter().map(|lineage| self.probe(lineage)).collect()
    }

    pub fn probe(&self, lineage: &'static Lineage) -> InstallationCandidate {
        let mut candidate = InstallationCandidate::absent(lineage);

        let Some(launcher_path) = self.lookup_path(lineage.launcher_key, LAUNCHER_PATH_FIELD, |p| p.is_file())
        else {
            debug!("{}: launcher not found", lineage.name);
            return candidate;
        };
        candidate.launcher_path = Some(launcher_path);

        let Some(game_root) =
            self.lookup_path(lineage.game_key, INSTALL_PATH_FIELD, |p| layout::game_exe(p).is_file())
        else {
            debug!("{}: game not installed", lineage.name);
            return candidate;
        };

        if let Some((save_dir, source)) = self.find_save_dir(&game_root, lineage.legacy_capable) {
            debug!("{}: saves at {} ({:?})", lineage.name, save_dir.display(), source);
            candidate.save_dir = Some(save_dir);
            candidate.save_source = Some(source);
        } else {
            debug!("{}: no save directory for {}", lineage.name, game_root.display());
        }
        candidate.game_root = Some(game_root);

        candidate
    }

    fn lookup_path(&self, key: &str, field: &str, accept: impl Fn(&Path) -> bool) -> Option<PathBuf> {
        self.sources.iter().find_map(|source| {
            let raw = source.get(key, field)?;
            let path = normalize_separators(&strip_icon_suffix(&raw));
            if accept(&path) {
                debug!("{} {}\\{} -> {}", source.describe(), key, field, path.display());
                Some(path)
            } else {
                debug!("{} {}\\{} -> {} (rejected)", source.describe(), key, field, path.display());
                None
            }
        })
    }

    fn find_save_dir(&self, game_root: &Path, legacy_capable: bool) -> Option<(PathBuf, SaveSource)> {
        let mut attempts = vec![(layout::canonical_save_dir(game_root), SaveSource::GameSubfolder)];

        if legacy_capable {
            attempts.push((game_root.join("Saved"), SaveSource::GameRoot));

            if let Some(truncated) = truncate_at_space(game_root, self.paths) {
                attempts.push((truncated.join("Saved"), SaveSource::TruncatedRoot));
            }
        }

        if let Some(local) = &self.local_app_data {
            attempts.push((local.join("Game").join("Saved"), SaveSource::LocalAppData));
        }

        attempts
            .into_iter()
            .find(|(dir, _)| layout::is_save_dir(dir))
    }
}

/// Registry values mix `/` and `\`; rewrite them to the host separator.
pub fn normalize_separators(raw: &str) -> PathBuf {
    let normalized = if cfg!(windows) {
        raw.replace('/', "\\")
    } else {
        raw.replace('\\', "/")
    };
    PathBuf::from(normalized)
}

/// `DisplayIcon` may be quoted and carry an icon index (`"C:\x\launcher.exe",0`).
fn strip_icon_suffix(raw: &str) -> String {
    let trimmed = raw.trim();
    let without_index = match trimmed.rsplit_once(',') {
        Some((path, index)) if !index.is_empty() && index.trim().trim_start_matches('-').bytes().all(|b| b.is_ascii_digit()) => path,
        _ => trimmed,
    };
    without_index.trim().trim_matches('"').to_string()
}

/// The game root up to (excluding) its first space, if it has one.
///
/// The cut happens on the path as the launcher recorded it, so a space in a
/// Wine prefix location never counts.
pub fn truncate_at_space(game_root: &Path, paths: &dyn PathRenderer) -> Option<PathBuf> {
    let rendered = paths.render(game_root);
    let idx = rendered.find(' ')?;
    Some(paths.to_host(&rendered[..idx]))
}
