use crate::launcher::{layout, LauncherType, LoginChannel};
use crate::probe::SaveSource;
use crate::resolver::ResolvedEnvironment;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Turns host paths into the form the game sees on its command line.
pub trait PathRenderer {
    fn render(&self, path: &Path) -> String;

    /// Maps a rendered path back to the host.
    fn to_host(&self, rendered: &str) -> PathBuf {
        PathBuf::from(rendered)
    }
}

/// Paths are passed as they are on the host.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativePaths;

impl PathRenderer for NativePaths {
    fn render(&self, path: &Path) -> String {
        path.display().to_string()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchTarget {
    Game,
    /// The official launcher, which takes care of the pending update.
    Launcher,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LaunchPlan {
    pub target: LaunchTarget,
    pub working_directory: PathBuf,
    pub executable: PathBuf,
    /// Passed to the process verbatim.
    pub arguments: String,
    /// Save directory of a non-default channel; preferences are mirrored into it before launch.
    pub channel_save_dir: Option<PathBuf>,
}

/// Builds the command line that makes the game attach to the resolved saves.
pub fn plan(env: &ResolvedEnvironment, channel: LoginChannel, paths: &dyn PathRenderer) -> LaunchPlan {
    if env.update_available {
        return LaunchPlan {
            target: LaunchTarget::Launcher,
            working_directory: env
                .launcher_path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_default(),
            executable: env.launcher_path.clone(),
            arguments: String::new(),
            channel_save_dir: None,
        };
    }

    let mut channel_save_dir = None;
    let user_dir = if channel == env.default_channel {
        user_dir_argument(env, paths)
    } else {
        let dir = layout::channel_user_dir(&env.game_root, channel);
        channel_save_dir = Some(dir.join("Saved"));
        format!("\"-userdir={}\"", paths.render(&dir))
    };

    LaunchPlan {
        target: LaunchTarget::Game,
        working_directory: layout::binaries_dir(&env.game_root),
        executable: layout::game_exe(&env.game_root),
        arguments: format!("-FeatureLevelES31 -ChannelID={} {}", channel.id(), user_dir),
        channel_save_dir,
    }
}

/// Each launcher wrote its saves with its own quoting; existing saves are only
/// found again when the argument is reproduced exactly.
fn user_dir_argument(env: &ResolvedEnvironment, paths: &dyn PathRenderer) -> String {
    let game_user_dir = paths.render(&layout::user_dir(&env.game_root));

    if env.save_path_is_canonical {
        return format!("\"-userdir={game_user_dir}\"");
    }

    match (env.launcher_type, env.save_source) {
        (LauncherType::Classic, _) => format!("\"-userdir=\\\"{game_user_dir}\\\"\""),
        (LauncherType::Seasun, SaveSource::GameRoot) => {
            format!("-userdir=\"{}\"", paths.render(&env.game_root))
        }
        (LauncherType::Seasun, SaveSource::TruncatedRoot) => {
            let truncated = env.save_dir.parent().unwrap_or(&env.game_root);
            format!("-userdir=\"{}\"", paths.render(truncated))
        }
        (LauncherType::Seasun, _) => format!("-userdir={game_user_dir}"),
    }
}
