use crate::error::{BoxError, Result};
use crate::launcher::layout;
use crate::resolver::ResolvedEnvironment;
use chrono::Utc;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Moves the active saves to `<root>/game/Saved`.
///
/// Whatever already sits at the canonical location is deleted first, except
/// the per-channel user dirs, which are set aside and put back afterwards. On
/// error the old save directory is left as it was and the caller keeps its
/// environment; on success the returned environment replaces it.
pub fn migrate(env: &ResolvedEnvironment) -> Result<ResolvedEnvironment> {
    if env.save_path_is_canonical {
        debug!("Saves already at {}", env.save_dir.display());
        return Ok(env.clone());
    }

    let source = &env.save_dir;
    let target = env.canonical_save_dir();
    info!("Moving saves from {} to {}", source.display(), target.display());

    let parked = park_channels(&target).map_err(BoxError::MigrationFailed)?;
    let moved = replace_target(source, &target);

    if let Some(parked) = &parked {
        match restore_channels(parked, &target) {
            Ok(()) => debug!("Channel saves back in {}", target.display()),
            Err(e) => warn!(
                "Channel saves could not be put back and remain at {}: {}",
                parked.display(),
                e
            ),
        }
    }

    moved.map_err(BoxError::MigrationFailed)?;
    remove_empty_parents(source);

    Ok(env.with_canonical_saves())
}

fn replace_target(source: &Path, target: &Path) -> io::Result<()> {
    if target.exists() {
        fs::remove_dir_all(target)?;
    }
    relocate(source, target, same_volume(source, target))
}

/// Moves `<target>/Channels` next to `target` so clearing the target spares it.
fn park_channels(target: &Path) -> io::Result<Option<PathBuf>> {
    let channels = target.join(layout::CHANNELS_DIR);
    let Some(parent) = target.parent() else {
        return Ok(None);
    };
    if !channels.is_dir() {
        return Ok(None);
    }

    let parked = parent.join(format!(
        "{}.parked-{}",
        layout::CHANNELS_DIR,
        Utc::now().format("%Y%m%d%H%M%S%3f")
    ));
    fs::rename(&channels, &parked)?;
    debug!("Set channel saves aside at {}", parked.display());
    Ok(Some(parked))
}

/// Never overwrites: a `Channels` directory brought along by the moved saves
/// makes this fail and the parked copy stays where it is.
fn restore_channels(parked: &Path, target: &Path) -> io::Result<()> {
    fs::create_dir_all(target)?;
    let channels = target.join(layout::CHANNELS_DIR);
    if channels.exists() {
        return Err(io::Error::new(
            io::ErrorKind::AlreadyExists,
            format!("{} already exists", channels.display()),
        ));
    }
    fs::rename(parked, channels)
}

/// Moves `source` to `target`: a rename within one volume, otherwise a full
/// copy followed by removing the source. A failed copy is rolled back and the
/// source is never touched before the copy is complete.
pub fn relocate(source: &Path, target: &Path, same_volume: bool) -> io::Result<()> {
    if let Some(parent) = target.parent() {
        fs::create_dir_all(parent)?;
    }

    if same_volume {
        match fs::rename(source, target) {
            Ok(()) => return Ok(()),
            Err(e) => debug!("Rename failed ({}), copying instead", e),
        }
    }

    if let Err(e) = copy_dir_all(source, target) {
        if target.exists() {
            let _ = fs::remove_dir_all(target);
        }
        return Err(e);
    }

    if let Err(e) = fs::remove_dir_all(source) {
        warn!("Saves copied, but the old copy at {} could not be removed: {}", source.display(), e);
    }
    Ok(())
}

fn copy_dir_all(source: &Path, target: &Path) -> io::Result<()> {
    for entry in WalkDir::new(source) {
        let entry = entry.map_err(io::Error::other)?;
        let rel = entry
            .path()
            .strip_prefix(source)
            .map_err(io::Error::other)?;
        let dest = target.join(rel);

        if entry.file_type().is_dir() {
            fs::create_dir_all(&dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

/// Best effort: stops at the first directory that is not empty or cannot go.
fn remove_empty_parents(old: &Path) {
    let mut current = old.parent();
    while let Some(dir) = current {
        if fs::remove_dir(dir).is_err() {
            break;
        }
        debug!("Removed empty directory {}", dir.display());
        current = dir.parent();
    }
}

#[cfg(unix)]
fn same_volume(source: &Path, target: &Path) -> bool {
    use std::os::unix::fs::MetadataExt;

    let Some(existing) = target.ancestors().find(|p| p.exists()) else {
        return false;
    };
    match (fs::metadata(source), fs::metadata(existing)) {
        (Ok(a), Ok(b)) => a.dev() == b.dev(),
        _ => false,
    }
}

#[cfg(windows)]
fn same_volume(source: &Path, target: &Path) -> bool {
    use std::path::Component;

    let prefix = |p: &Path| match p.components().next() {
        Some(Component::Prefix(prefix)) => Some(prefix.as_os_str().to_ascii_uppercase()),
        _ => None,
    };
    matches!((prefix(source), prefix(target)), (Some(a), Some(b)) if a == b)
}

#[cfg(not(any(unix, windows)))]
fn same_volume(_source: &Path, _target: &Path) -> bool {
    false
}
