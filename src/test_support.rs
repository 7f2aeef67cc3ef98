//! Fake installations on disk for probe, resolver and launch tests.

use crate::launcher::{layout, Lineage, INSTALL_PATH_FIELD, LAUNCHER_PATH_FIELD};
use crate::registry::StaticRegistry;
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

pub struct GameFixture {
    dir: TempDir,
}

impl GameFixture {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().unwrap(),
        }
    }

    pub fn path(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn registry(&self) -> StaticRegistry {
        StaticRegistry::new()
    }

    pub fn launcher(&self, name: &str) -> PathBuf {
        let path = self.path("launchers").join(name).join("launcher.exe");
        touch(&path, "");
        path
    }

    pub fn game_root(&self, name: &str) -> PathBuf {
        let root = self.path(name);
        touch(&layout::game_exe(&root), "MZ");
        root
    }

    /// Turns `dir` into a save directory (creates its Engine.ini).
    pub fn save_dir(&self, dir: &Path) -> PathBuf {
        touch(&layout::engine_ini(dir), "");
        dir.to_path_buf()
    }

    /// Launcher plus game for `lineage`, registered the way the launcher does it.
    pub fn install(&self, lineage: &Lineage, root_name: &str) -> StaticRegistry {
        let launcher = self.launcher(&format!("{:?}", lineage.launcher_type));
        let root = self.game_root(root_name);
        self.registry()
            .with(lineage.launcher_key, LAUNCHER_PATH_FIELD, launcher.to_string_lossy())
            .with(lineage.game_key, INSTALL_PATH_FIELD, root.to_string_lossy())
    }
}

pub fn touch(path: &Path, content: &str) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).unwrap();
    }
    fs::write(path, content).unwrap();
}
